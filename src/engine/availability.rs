use crate::model::{day_after, day_before, DateRange};

// ── Availability sweep ────────────────────────────────────────────

/// Compute the free sub-ranges of `window` given the occupied ranges of its
/// confirmed bookings, sorted by start date.
///
/// Left-to-right sweep: a cursor starts at `window.start`; each booking that
/// begins past the cursor leaves a gap `[cursor, start - 1]`, then the cursor
/// jumps to `end + 1`. Whatever remains after the last booking is the
/// trailing free range.
///
/// Valid data cannot contain overlapping occupied ranges, but the sweep must
/// not misbehave if it ever does: the cursor only moves forward, so an
/// already-covered range simply produces no gap.
///
/// The output is disjoint, ascending and non-empty, and together with
/// `occupied` exactly reconstructs `window`.
pub fn available_ranges(window: DateRange, occupied: &[DateRange]) -> Vec<DateRange> {
    let mut free = Vec::new();
    let mut cursor = window.start;

    for range in occupied {
        if range.start > cursor {
            free.push(DateRange::new(cursor, day_before(range.start)));
        }
        let next = day_after(range.end);
        if next > cursor {
            cursor = next;
        }
        if cursor > window.end {
            break;
        }
    }

    if cursor <= window.end {
        free.push(DateRange::new(cursor, window.end));
    }

    free
}

/// Sum of inclusive day counts over a set of free ranges.
pub fn total_free_days(ranges: &[DateRange]) -> i64 {
    ranges.iter().map(|r| r.days()).sum()
}

/// True if any free range can host a stay of at least one night.
pub fn has_availability(ranges: &[DateRange]) -> bool {
    !ranges.is_empty()
}
