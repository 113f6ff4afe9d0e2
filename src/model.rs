use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — used for record timestamps only, never for calendars.
pub type Ms = i64;

/// All money is integer cents.
pub type Cents = i64;

/// The day after `d`, saturating at the calendar maximum. Inputs are bounded
/// to [`crate::limits::MAX_VALID_YEAR`] long before this can saturate.
pub fn day_after(d: NaiveDate) -> NaiveDate {
    d.succ_opt().unwrap_or(NaiveDate::MAX)
}

/// The day before `d`, saturating at the calendar minimum.
pub fn day_before(d: NaiveDate) -> NaiveDate {
    d.pred_opt().unwrap_or(NaiveDate::MIN)
}

/// Closed date interval `[start, end]` — both endpoint days belong to the
/// range. A booking ending on day D and another starting on day D collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "DateRange start must not be after end");
        Self { start, end }
    }

    /// Closed-closed overlap: touching endpoints count.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Number of nights for a stay `[start, end]`. Callers must have
    /// validated `end > start`.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Number of calendar days covered, endpoints inclusive.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains_day(&self, d: NaiveDate) -> bool {
        self.start <= d && d <= self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_range(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The free days strictly between two occupied ranges: `[prev_end + 1,
    /// next_start - 1]`, or `None` when the ranges touch or overlap.
    pub fn gap_between(prev_end: NaiveDate, next_start: NaiveDate) -> Option<DateRange> {
        let start = day_after(prev_end);
        let end = day_before(next_start);
        if start <= end {
            Some(DateRange::new(start, end))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BookingStatus::Cancelled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A stay on a property. `user_name` is a snapshot taken at creation time —
/// an owned copy, never re-synced with later user edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub property_id: Ulid,
    pub user_id: Ulid,
    pub user_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price_cents: Cents,
    pub status: BookingStatus,
    pub created_at: Ms,
}

impl Booking {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}

/// A property plus every booking ever made on it (cancelled included),
/// sorted by `start_date`. One of these lives behind each per-property lock.
#[derive(Debug, Clone)]
pub struct PropertyState {
    pub id: Ulid,
    pub title: String,
    pub description: String,
    pub price_per_night_cents: Cents,
    pub available_from: NaiveDate,
    pub available_to: NaiveDate,
    pub created_at: Ms,
    /// All bookings, sorted by `start_date`.
    pub bookings: Vec<Booking>,
}

impl PropertyState {
    pub fn window(&self) -> DateRange {
        DateRange::new(self.available_from, self.available_to)
    }

    /// Insert maintaining sort order by start_date.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.start_date, |b| b.start_date)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        if let Some(pos) = self.bookings.iter().position(|b| b.id == id) {
            Some(self.bookings.remove(pos))
        } else {
            None
        }
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Confirmed bookings in start-date order — the only ones that occupy
    /// the calendar.
    pub fn confirmed(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().filter(|b| b.status.is_confirmed())
    }

    pub fn summary(&self) -> PropertySummary {
        PropertySummary {
            id: self.id,
            title: self.title.clone(),
            price_per_night_cents: self.price_per_night_cents,
        }
    }

    pub fn record(&self) -> PropertyRecord {
        PropertyRecord {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            price_per_night_cents: self.price_per_night_cents,
            available_from: self.available_from,
            available_to: self.available_to,
            created_at: self.created_at,
        }
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PropertyCreated {
        id: Ulid,
        title: String,
        description: String,
        price_per_night_cents: Cents,
        available_from: NaiveDate,
        available_to: NaiveDate,
        created_at: Ms,
    },
    /// Carries the full merged field set so replay needs no lookback.
    PropertyUpdated {
        id: Ulid,
        title: String,
        description: String,
        price_per_night_cents: Cents,
        available_from: NaiveDate,
        available_to: NaiveDate,
    },
    PropertyDeleted {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        property_id: Ulid,
        user_id: Ulid,
        user_name: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        total_price_cents: Cents,
        created_at: Ms,
    },
    BookingUpdated {
        id: Ulid,
        property_id: Ulid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        total_price_cents: Cents,
        status: BookingStatus,
    },
    BookingCancelled {
        id: Ulid,
        property_id: Ulid,
    },
    BookingDeleted {
        id: Ulid,
        property_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

/// Minimal projection joined onto booking responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertySummary {
    pub id: Ulid,
    pub title: String,
    pub price_per_night_cents: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyRecord {
    pub id: Ulid,
    pub title: String,
    pub description: String,
    pub price_per_night_cents: Cents,
    pub available_from: NaiveDate,
    pub available_to: NaiveDate,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingView {
    pub id: Ulid,
    pub property_id: Ulid,
    pub user_id: Ulid,
    pub user_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub nights: i64,
    pub total_price_cents: Cents,
    pub status: BookingStatus,
    pub created_at: Ms,
    pub property: PropertySummary,
}

impl BookingView {
    pub fn from_booking(b: &Booking, property: PropertySummary) -> Self {
        Self {
            id: b.id,
            property_id: b.property_id,
            user_id: b.user_id,
            user_name: b.user_name.clone(),
            start_date: b.start_date,
            end_date: b.end_date,
            nights: b.range().nights(),
            total_price_cents: b.total_price_cents,
            status: b.status,
            created_at: b.created_at,
            property,
        }
    }
}

/// Caller-facing shape for "my bookings": the raw status is replaced by
/// derived flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MyBookingView {
    pub id: Ulid,
    pub property_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub nights: i64,
    pub total_price_cents: Cents,
    pub is_confirmed: bool,
    pub is_cancelled: bool,
    pub created_at: Ms,
    pub property: PropertySummary,
}

impl MyBookingView {
    pub fn from_booking(b: &Booking, property: PropertySummary) -> Self {
        Self {
            id: b.id,
            property_id: b.property_id,
            start_date: b.start_date,
            end_date: b.end_date,
            nights: b.range().nights(),
            total_price_cents: b.total_price_cents,
            is_confirmed: b.status.is_confirmed(),
            is_cancelled: b.status.is_cancelled(),
            created_at: b.created_at,
            property,
        }
    }
}

/// A free range plus its inclusive day count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreeRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i64,
}

impl From<DateRange> for FreeRange {
    fn from(r: DateRange) -> Self {
        Self {
            start_date: r.start,
            end_date: r.end,
            days: r.days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupiedRange {
    pub booking_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityReport {
    pub property_id: Ulid,
    pub property_title: String,
    pub available_from: NaiveDate,
    pub available_to: NaiveDate,
    pub available_ranges: Vec<FreeRange>,
    pub occupied: Vec<OccupiedRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableProperty {
    #[serde(flatten)]
    pub property: PropertyRecord,
    pub is_fully_available: bool,
    pub available_ranges: Vec<FreeRange>,
    pub total_free_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub items_per_page: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Confirmed/cancelled counts over a returned page of bookings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub confirmed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingsPage {
    pub bookings: Vec<BookingView>,
    pub summary: StatusSummary,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn range_basics() {
        let r = DateRange::new(d(2025, 6, 10), d(2025, 6, 15));
        assert_eq!(r.nights(), 5);
        assert_eq!(r.days(), 6);
        assert!(r.contains_day(d(2025, 6, 10)));
        assert!(r.contains_day(d(2025, 6, 15))); // closed on both ends
        assert!(!r.contains_day(d(2025, 6, 16)));
    }

    #[test]
    fn range_overlap_touching_endpoints() {
        let a = DateRange::new(d(2025, 6, 10), d(2025, 6, 15));
        let b = DateRange::new(d(2025, 6, 15), d(2025, 6, 20));
        let c = DateRange::new(d(2025, 6, 16), d(2025, 6, 20));
        assert!(a.overlaps(&b)); // shared day counts as overlap
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent days do not
    }

    #[test]
    fn range_contains_range() {
        let outer = DateRange::new(d(2025, 1, 1), d(2025, 12, 31));
        let inner = DateRange::new(d(2025, 6, 1), d(2025, 6, 30));
        let partial = DateRange::new(d(2024, 12, 1), d(2025, 1, 10));
        assert!(outer.contains_range(&inner));
        assert!(outer.contains_range(&outer));
        assert!(!outer.contains_range(&partial));
    }

    #[test]
    fn gap_between_ranges() {
        // [.., 06-15] then [06-20, ..] leaves [06-16, 06-19] free
        let gap = DateRange::gap_between(d(2025, 6, 15), d(2025, 6, 20)).unwrap();
        assert_eq!(gap, DateRange::new(d(2025, 6, 16), d(2025, 6, 19)));

        // single free day
        let gap = DateRange::gap_between(d(2025, 6, 15), d(2025, 6, 17)).unwrap();
        assert_eq!(gap, DateRange::new(d(2025, 6, 16), d(2025, 6, 16)));

        // back-to-back days — no gap
        assert!(DateRange::gap_between(d(2025, 6, 15), d(2025, 6, 16)).is_none());

        // overlapping input — still no gap, no panic
        assert!(DateRange::gap_between(d(2025, 6, 15), d(2025, 6, 10)).is_none());
    }

    fn booking(start: NaiveDate, end: NaiveDate, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            property_id: Ulid::new(),
            user_id: Ulid::new(),
            user_name: "Ada Lovelace".into(),
            start_date: start,
            end_date: end,
            total_price_cents: 0,
            status,
            created_at: 0,
        }
    }

    fn empty_property() -> PropertyState {
        PropertyState {
            id: Ulid::new(),
            title: "Loft".into(),
            description: "A perfectly adequate loft".into(),
            price_per_night_cents: 10_000,
            available_from: d(2025, 1, 1),
            available_to: d(2025, 12, 31),
            created_at: 0,
            bookings: Vec::new(),
        }
    }

    #[test]
    fn booking_insert_keeps_sort_order() {
        let mut ps = empty_property();
        ps.insert_booking(booking(d(2025, 9, 1), d(2025, 9, 5), BookingStatus::Confirmed));
        ps.insert_booking(booking(d(2025, 3, 1), d(2025, 3, 5), BookingStatus::Confirmed));
        ps.insert_booking(booking(d(2025, 6, 1), d(2025, 6, 5), BookingStatus::Confirmed));
        let starts: Vec<_> = ps.bookings.iter().map(|b| b.start_date).collect();
        assert_eq!(starts, vec![d(2025, 3, 1), d(2025, 6, 1), d(2025, 9, 1)]);
    }

    #[test]
    fn booking_remove_middle_preserves_order() {
        let mut ps = empty_property();
        let b1 = booking(d(2025, 3, 1), d(2025, 3, 5), BookingStatus::Confirmed);
        let b2 = booking(d(2025, 6, 1), d(2025, 6, 5), BookingStatus::Confirmed);
        let b3 = booking(d(2025, 9, 1), d(2025, 9, 5), BookingStatus::Confirmed);
        let middle = b2.id;
        for b in [b1, b2, b3] {
            ps.insert_booking(b);
        }
        let removed = ps.remove_booking(middle).unwrap();
        assert_eq!(removed.id, middle);
        assert_eq!(ps.bookings.len(), 2);
        assert!(ps.bookings[0].start_date < ps.bookings[1].start_date);
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut ps = empty_property();
        ps.insert_booking(booking(d(2025, 3, 1), d(2025, 3, 5), BookingStatus::Confirmed));
        assert!(ps.remove_booking(Ulid::new()).is_none());
        assert_eq!(ps.bookings.len(), 1);
    }

    #[test]
    fn confirmed_skips_cancelled() {
        let mut ps = empty_property();
        ps.insert_booking(booking(d(2025, 3, 1), d(2025, 3, 5), BookingStatus::Cancelled));
        ps.insert_booking(booking(d(2025, 6, 1), d(2025, 6, 5), BookingStatus::Confirmed));
        let confirmed: Vec<_> = ps.confirmed().collect();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].start_date, d(2025, 6, 1));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            id: Ulid::new(),
            property_id: Ulid::new(),
            user_id: Ulid::new(),
            user_name: "Grace Hopper".into(),
            start_date: d(2025, 6, 10),
            end_date: d(2025, 6, 15),
            total_price_cents: 50_000,
            created_at: 1_700_000_000_000,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
