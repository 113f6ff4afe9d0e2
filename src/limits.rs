//! Hard limits on stored data. Everything here exists so a single bad client
//! cannot blow up memory or date arithmetic.

pub const MIN_TITLE_LEN: usize = 3;
pub const MAX_TITLE_LEN: usize = 200;
pub const MIN_DESCRIPTION_LEN: usize = 10;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MIN_USER_NAME_LEN: usize = 2;
pub const MAX_USER_NAME_LEN: usize = 100;

pub const MAX_PROPERTIES: usize = 100_000;
pub const MAX_BOOKINGS_PER_PROPERTY: usize = 10_000;

/// Nightly price cap in cents. Together with the year bounds below this
/// keeps `nights * price` far from `i64` overflow.
pub const MAX_PRICE_CENTS: i64 = 10_000_000;

/// Dates outside this year window are rejected before they reach any
/// `+/- 1 day` arithmetic, so day stepping can never overflow.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 9999;

pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Longest accepted request line on the wire (bytes).
pub const MAX_WIRE_LINE_LEN: usize = 64 * 1024;
