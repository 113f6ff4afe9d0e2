use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    /// Caller is neither the owner nor an administrator.
    Forbidden,
    /// Dates outside the property window, or end not after start.
    InvalidRange(String),
    /// An overlapping confirmed booking already occupies the dates.
    Conflict(Ulid),
    AlreadyCancelled(Ulid),
    /// Operation disallowed given current status or date.
    InvalidState(&'static str),
    /// Malformed or out-of-bounds input.
    Validation(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Forbidden => write!(f, "access denied"),
            EngineError::InvalidRange(msg) => write!(f, "invalid date range: {msg}"),
            EngineError::Conflict(id) => {
                write!(f, "dates overlap with existing booking: {id}")
            }
            EngineError::AlreadyCancelled(id) => {
                write!(f, "booking already cancelled: {id}")
            }
            EngineError::InvalidState(msg) => write!(f, "{msg}"),
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
