use chrono::NaiveDate;
use ulid::Ulid;

use crate::auth::Caller;
use crate::limits::*;
use crate::model::*;

use super::availability::{available_ranges, total_free_days};
use super::{Engine, EngineError};

/// Filters for property listings. Dates filter on "property window covers
/// the requested range"; both bounds are required for the date filter to
/// apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyFilter {
    pub available_from: Option<NaiveDate>,
    pub available_to: Option<NaiveDate>,
    pub min_price_cents: Option<Cents>,
    pub max_price_cents: Option<Cents>,
}

impl PropertyFilter {
    fn matches(&self, p: &PropertyState) -> bool {
        if let (Some(from), Some(to)) = (self.available_from, self.available_to)
            && !(p.available_from <= from && p.available_to >= to)
        {
            return false;
        }
        if let Some(min) = self.min_price_cents
            && p.price_per_night_cents < min
        {
            return false;
        }
        if let Some(max) = self.max_price_cents
            && p.price_per_night_cents > max
        {
            return false;
        }
        true
    }
}

/// Filters for the admin booking listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub property_id: Option<Ulid>,
}

fn clamp_paging(page: usize, limit: usize) -> (usize, usize) {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);
    (page, limit)
}

fn paginate<T>(mut items: Vec<T>, page: usize, limit: usize) -> (Vec<T>, Pagination) {
    let (page, limit) = clamp_paging(page, limit);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(limit);
    let start = (page - 1) * limit;

    let page_items = if start >= total_items {
        Vec::new()
    } else {
        items.drain(..).skip(start).take(limit).collect()
    };

    let pagination = Pagination {
        current_page: page,
        total_pages,
        total_items,
        items_per_page: limit,
        has_next_page: page < total_pages,
        has_prev_page: page > 1,
    };
    (page_items, pagination)
}

impl Engine {
    pub async fn get_property_record(&self, id: Ulid) -> Result<PropertyRecord, EngineError> {
        let arc = self.get_property(&id).ok_or(EngineError::NotFound(id))?;
        let guard = arc.read().await;
        Ok(guard.record())
    }

    /// Snapshot every property passing `filter`, newest first. Shared by the
    /// two listing paths.
    async fn collect_properties(&self, filter: &PropertyFilter) -> Vec<SnapshotEntry> {
        let arcs: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut snapshots = Vec::new();
        for arc in arcs {
            let guard = arc.read().await;
            if filter.matches(&guard) {
                let occupied: Vec<DateRange> = guard.confirmed().map(|b| b.range()).collect();
                snapshots.push(SnapshotEntry {
                    record: guard.record(),
                    occupied,
                    window: guard.window(),
                });
            }
        }
        snapshots.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.record.id.cmp(&a.record.id))
        });
        snapshots
    }

    /// Plain property listing — booking state does not affect membership.
    pub async fn list_properties(
        &self,
        filter: &PropertyFilter,
        page: usize,
        limit: usize,
    ) -> Page<PropertyRecord> {
        let snapshots = self.collect_properties(filter).await;
        let records: Vec<PropertyRecord> = snapshots.into_iter().map(|s| s.record).collect();
        let (items, pagination) = paginate(records, page, limit);
        Page { items, pagination }
    }

    /// Listing restricted to properties with at least one free range.
    /// Availability is derived for every match *before* pagination, so the
    /// page the client sees is already filtered.
    pub async fn list_available_properties(
        &self,
        filter: &PropertyFilter,
        page: usize,
        limit: usize,
    ) -> Page<AvailableProperty> {
        let snapshots = self.collect_properties(filter).await;
        let mut available = Vec::new();
        for snap in snapshots {
            let free = available_ranges(snap.window, &snap.occupied);
            if free.is_empty() {
                continue;
            }
            available.push(AvailableProperty {
                property: snap.record,
                is_fully_available: snap.occupied.is_empty(),
                total_free_days: total_free_days(&free),
                available_ranges: free.into_iter().map(FreeRange::from).collect(),
            });
        }
        let (items, pagination) = paginate(available, page, limit);
        Page { items, pagination }
    }

    /// Free ranges plus the confirmed bookings occupying the calendar.
    /// When `window` is given, only bookings overlapping it are considered —
    /// both in the occupied list and in the sweep that produces the free
    /// ranges.
    pub async fn property_availability(
        &self,
        property_id: Ulid,
        window: Option<DateRange>,
    ) -> Result<AvailabilityReport, EngineError> {
        let arc = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = arc.read().await;

        let relevant: Vec<&Booking> = guard
            .confirmed()
            .filter(|b| window.as_ref().is_none_or(|w| b.range().overlaps(w)))
            .collect();
        let occupied_ranges: Vec<DateRange> = relevant.iter().map(|b| b.range()).collect();
        let free = available_ranges(guard.window(), &occupied_ranges);

        Ok(AvailabilityReport {
            property_id,
            property_title: guard.title.clone(),
            available_from: guard.available_from,
            available_to: guard.available_to,
            available_ranges: free.into_iter().map(FreeRange::from).collect(),
            occupied: relevant
                .iter()
                .map(|b| OccupiedRange {
                    booking_id: b.id,
                    start_date: b.start_date,
                    end_date: b.end_date,
                })
                .collect(),
        })
    }

    /// All of the caller's bookings, newest-created first, with derived
    /// status flags instead of the raw status.
    pub async fn my_bookings(&self, caller: &Caller) -> Vec<MyBookingView> {
        let arcs: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut views = Vec::new();
        for arc in arcs {
            let guard = arc.read().await;
            let summary = guard.summary();
            for b in guard.bookings.iter().filter(|b| b.user_id == caller.user_id) {
                views.push(MyBookingView::from_booking(b, summary.clone()));
            }
        }
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        views
    }

    /// Admin-wide booking listing with a confirmed/cancelled summary over
    /// the returned page.
    pub async fn list_bookings(
        &self,
        caller: &Caller,
        filter: &BookingFilter,
        page: usize,
        limit: usize,
    ) -> Result<BookingsPage, EngineError> {
        if !caller.admin {
            return Err(EngineError::Forbidden);
        }

        let arcs: Vec<_> = match filter.property_id {
            Some(pid) => self.get_property(&pid).into_iter().collect(),
            None => self.state.iter().map(|e| e.value().clone()).collect(),
        };

        let mut views = Vec::new();
        for arc in arcs {
            let guard = arc.read().await;
            let summary = guard.summary();
            for b in &guard.bookings {
                if let Some(status) = filter.status
                    && b.status != status
                {
                    continue;
                }
                views.push(BookingView::from_booking(b, summary.clone()));
            }
        }
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let (bookings, pagination) = paginate(views, page, limit);
        let mut summary = StatusSummary::default();
        for b in &bookings {
            match b.status {
                BookingStatus::Confirmed => summary.confirmed += 1,
                BookingStatus::Cancelled => summary.cancelled += 1,
            }
        }
        Ok(BookingsPage {
            bookings,
            summary,
            pagination,
        })
    }

    pub async fn booking_by_id(
        &self,
        caller: &Caller,
        booking_id: Ulid,
    ) -> Result<BookingView, EngineError> {
        let property_id = self
            .property_of_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let arc = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = arc.read().await;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if !caller.may_act_on(booking.user_id) {
            return Err(EngineError::Forbidden);
        }
        Ok(BookingView::from_booking(booking, guard.summary()))
    }
}

struct SnapshotEntry {
    record: PropertyRecord,
    occupied: Vec<DateRange>,
    window: DateRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_splits_and_counts() {
        let items: Vec<i32> = (1..=25).collect();
        let (page2, p) = paginate(items.clone(), 2, 10);
        assert_eq!(page2, (11..=20).collect::<Vec<_>>());
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.total_items, 25);
        assert!(p.has_next_page);
        assert!(p.has_prev_page);

        let (page3, p) = paginate(items, 3, 10);
        assert_eq!(page3.len(), 5);
        assert!(!p.has_next_page);
    }

    #[test]
    fn paginate_past_end_is_empty() {
        let (items, p) = paginate(vec![1, 2, 3], 5, 10);
        assert!(items.is_empty());
        assert_eq!(p.total_pages, 1);
        assert!(!p.has_next_page);
    }

    #[test]
    fn paginate_clamps_page_and_limit() {
        let items: Vec<i32> = (1..=5).collect();
        // page 0 coerces to 1
        let (first, p) = paginate(items.clone(), 0, 2);
        assert_eq!(first, vec![1, 2]);
        assert_eq!(p.current_page, 1);
        // limit 0 coerces to 1
        let (one, p) = paginate(items, 1, 0);
        assert_eq!(one, vec![1]);
        assert_eq!(p.items_per_page, 1);
    }

    #[test]
    fn paginate_empty_input() {
        let (items, p) = paginate(Vec::<i32>::new(), 1, 10);
        assert!(items.is_empty());
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next_page);
        assert!(!p.has_prev_page);
    }
}
