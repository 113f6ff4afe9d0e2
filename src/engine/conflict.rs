use chrono::{Datelike, NaiveDate};

use crate::limits::*;
use crate::model::{DateRange, PropertyState};
use ulid::Ulid;

use super::EngineError;

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

pub(crate) fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Bounds-check a single date so later day arithmetic cannot overflow.
fn validate_date(d: NaiveDate) -> Result<(), EngineError> {
    if d.year() < MIN_VALID_YEAR || d.year() > MAX_VALID_YEAR {
        return Err(EngineError::Validation("date out of supported range"));
    }
    Ok(())
}

/// A stay must cover at least one night: `end > start`.
pub(crate) fn validate_stay(start: NaiveDate, end: NaiveDate) -> Result<DateRange, EngineError> {
    validate_date(start)?;
    validate_date(end)?;
    if end <= start {
        return Err(EngineError::InvalidRange(
            "end date must be after start date".into(),
        ));
    }
    Ok(DateRange::new(start, end))
}

/// Property availability windows follow the same shape as stays.
pub(crate) fn validate_window(from: NaiveDate, to: NaiveDate) -> Result<DateRange, EngineError> {
    validate_date(from)?;
    validate_date(to)?;
    if to <= from {
        return Err(EngineError::InvalidRange(
            "available_to must be after available_from".into(),
        ));
    }
    Ok(DateRange::new(from, to))
}

/// Reject stays that fall outside the property's availability window.
pub(crate) fn validate_within_window(
    property: &PropertyState,
    range: &DateRange,
) -> Result<(), EngineError> {
    if !property.window().contains_range(range) {
        return Err(EngineError::InvalidRange(format!(
            "booking dates must be within property availability range ({} to {})",
            property.available_from, property.available_to
        )));
    }
    Ok(())
}

/// The core invariant check: `range` must not overlap any confirmed booking
/// on the property, closed-closed. `exclude` skips the booking being updated
/// so it does not conflict with itself.
///
/// Callers hold the property's write lock for the whole check-then-persist
/// sequence, which is what makes this safe under concurrent requests.
pub(crate) fn check_no_conflict(
    property: &PropertyState,
    range: &DateRange,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for booking in property.confirmed() {
        if exclude == Some(booking.id) {
            continue;
        }
        if booking.range().overlaps(range) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Conflict(booking.id));
        }
    }
    Ok(())
}
