use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::auth::Caller;
use crate::limits::*;
use crate::model::*;

use super::conflict::{
    check_no_conflict, now_ms, today, validate_stay, validate_window, validate_within_window,
};
use super::{Engine, EngineError};

/// Fields for creating a property. All required.
#[derive(Debug, Clone)]
pub struct PropertyDraft {
    pub title: String,
    pub description: String,
    pub price_per_night_cents: Cents,
    pub available_from: NaiveDate,
    pub available_to: NaiveDate,
}

/// Partial property update — absent fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct PropertyPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_per_night_cents: Option<Cents>,
    pub available_from: Option<NaiveDate>,
    pub available_to: Option<NaiveDate>,
}

/// Partial booking update.
#[derive(Debug, Clone, Default)]
pub struct BookingPatch {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
}

fn validate_title(title: &str) -> Result<(), EngineError> {
    if title.len() < MIN_TITLE_LEN || title.len() > MAX_TITLE_LEN {
        return Err(EngineError::Validation("title must be 3-200 characters"));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), EngineError> {
    if description.len() < MIN_DESCRIPTION_LEN || description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::Validation("description must be 10-2000 characters"));
    }
    Ok(())
}

fn validate_price(cents: Cents) -> Result<(), EngineError> {
    if cents <= 0 || cents > MAX_PRICE_CENTS {
        return Err(EngineError::Validation(
            "price_per_night must be between 1 and 10000000 cents",
        ));
    }
    Ok(())
}

fn validate_user_name(name: &str) -> Result<(), EngineError> {
    if name.len() < MIN_USER_NAME_LEN || name.len() > MAX_USER_NAME_LEN {
        return Err(EngineError::Validation("user name must be 2-100 characters"));
    }
    Ok(())
}

impl Engine {
    // ── Property lifecycle (admin) ───────────────────────────

    pub async fn create_property(
        &self,
        caller: &Caller,
        draft: PropertyDraft,
    ) -> Result<PropertyRecord, EngineError> {
        if !caller.admin {
            return Err(EngineError::Forbidden);
        }
        validate_title(&draft.title)?;
        validate_description(&draft.description)?;
        validate_price(draft.price_per_night_cents)?;
        validate_window(draft.available_from, draft.available_to)?;
        if self.state.len() >= MAX_PROPERTIES {
            return Err(EngineError::Validation("too many properties"));
        }

        let id = Ulid::new();
        let created_at = now_ms();
        let event = Event::PropertyCreated {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            price_per_night_cents: draft.price_per_night_cents,
            available_from: draft.available_from,
            available_to: draft.available_to,
            created_at,
        };
        self.wal_append(&event).await?;

        let ps = PropertyState {
            id,
            title: draft.title,
            description: draft.description,
            price_per_night_cents: draft.price_per_night_cents,
            available_from: draft.available_from,
            available_to: draft.available_to,
            created_at,
            bookings: Vec::new(),
        };
        let record = ps.record();
        self.state.insert(id, Arc::new(RwLock::new(ps)));
        Ok(record)
    }

    pub async fn update_property(
        &self,
        caller: &Caller,
        id: Ulid,
        patch: PropertyPatch,
    ) -> Result<PropertyRecord, EngineError> {
        if !caller.admin {
            return Err(EngineError::Forbidden);
        }
        let arc = self.get_property(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = arc.write().await;

        let title = patch.title.unwrap_or_else(|| guard.title.clone());
        let description = patch.description.unwrap_or_else(|| guard.description.clone());
        let price = patch.price_per_night_cents.unwrap_or(guard.price_per_night_cents);
        let from = patch.available_from.unwrap_or(guard.available_from);
        let to = patch.available_to.unwrap_or(guard.available_to);

        validate_title(&title)?;
        validate_description(&description)?;
        validate_price(price)?;
        validate_window(from, to)?;

        let event = Event::PropertyUpdated {
            id,
            title,
            description,
            price_per_night_cents: price,
            available_from: from,
            available_to: to,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.record())
    }

    /// Structural guard, not an authorization check: a property with a
    /// confirmed booking ending today or later cannot be deleted by anyone.
    pub async fn delete_property(&self, caller: &Caller, id: Ulid) -> Result<(), EngineError> {
        if !caller.admin {
            return Err(EngineError::Forbidden);
        }
        let arc = self.get_property(&id).ok_or(EngineError::NotFound(id))?;
        let guard = arc.write().await;

        let today = today();
        let active = guard.confirmed().any(|b| b.end_date >= today);
        if active {
            return Err(EngineError::InvalidState(
                "cannot delete property with active confirmed bookings",
            ));
        }

        let event = Event::PropertyDeleted { id };
        self.wal_append(&event).await?;
        for b in &guard.bookings {
            self.booking_index.remove(&b.id);
        }
        drop(guard);
        self.state.remove(&id);
        Ok(())
    }

    // ── Booking lifecycle ────────────────────────────────────

    /// Create a booking directly in Confirmed state. The overlap check and
    /// the insert happen under the same write guard, so two concurrent
    /// creates for overlapping dates cannot both succeed — the loser gets
    /// `Conflict`.
    pub async fn create_booking(
        &self,
        caller: &Caller,
        property_id: Ulid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<BookingView, EngineError> {
        validate_user_name(&caller.name)?;
        let arc = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let mut guard = arc.write().await;

        let range = validate_stay(start_date, end_date)?;
        validate_within_window(&guard, &range)?;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_PROPERTY {
            return Err(EngineError::Validation("too many bookings on property"));
        }
        check_no_conflict(&guard, &range, None)?;

        let nights = range.nights();
        let total_price_cents = nights * guard.price_per_night_cents;

        let id = Ulid::new();
        let event = Event::BookingCreated {
            id,
            property_id,
            user_id: caller.user_id,
            user_name: caller.name.clone(),
            start_date,
            end_date,
            total_price_cents,
            created_at: now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let summary = guard.summary();
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        Ok(BookingView::from_booking(booking, summary))
    }

    /// Cancellation is terminal for non-admins and never removes the record;
    /// the booking simply stops occupying the calendar.
    pub async fn cancel_booking(
        &self,
        caller: &Caller,
        booking_id: Ulid,
    ) -> Result<BookingView, EngineError> {
        let (property_id, mut guard) = self.resolve_booking_write(&booking_id).await?;

        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if !caller.may_act_on(booking.user_id) {
            return Err(EngineError::Forbidden);
        }
        if booking.status.is_cancelled() {
            return Err(EngineError::AlreadyCancelled(booking_id));
        }
        if booking.start_date < today() && !caller.admin {
            return Err(EngineError::InvalidState("cannot cancel past bookings"));
        }

        let event = Event::BookingCancelled {
            id: booking_id,
            property_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let summary = guard.summary();
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        Ok(BookingView::from_booking(booking, summary))
    }

    /// Partial update. Date changes re-run window validation and the overlap
    /// check against the *other* confirmed bookings, and reprice the stay.
    /// Reviving a cancelled booking re-runs the overlap check even with
    /// unchanged dates, since the calendar may have been re-booked meanwhile.
    pub async fn update_booking(
        &self,
        caller: &Caller,
        booking_id: Ulid,
        patch: BookingPatch,
    ) -> Result<BookingView, EngineError> {
        let (property_id, mut guard) = self.resolve_booking_write(&booking_id).await?;

        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if !caller.may_act_on(booking.user_id) {
            return Err(EngineError::Forbidden);
        }
        if booking.status.is_cancelled() && !caller.admin {
            return Err(EngineError::InvalidState(
                "cancelled bookings cannot be modified",
            ));
        }

        let dates_changed = patch.start_date.is_some() || patch.end_date.is_some();
        let start_date = patch.start_date.unwrap_or(booking.start_date);
        let end_date = patch.end_date.unwrap_or(booking.end_date);
        let status = patch.status.unwrap_or(booking.status);
        let reviving = booking.status.is_cancelled() && status.is_confirmed();
        let mut total_price_cents = booking.total_price_cents;

        if dates_changed {
            let range = validate_stay(start_date, end_date)?;
            validate_within_window(&guard, &range)?;
            check_no_conflict(&guard, &range, Some(booking_id))?;
            total_price_cents = range.nights() * guard.price_per_night_cents;
        } else if reviving {
            // The dates may have been re-booked while this one was cancelled.
            let range = DateRange::new(start_date, end_date);
            check_no_conflict(&guard, &range, Some(booking_id))?;
        }

        let event = Event::BookingUpdated {
            id: booking_id,
            property_id,
            start_date,
            end_date,
            total_price_cents,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let summary = guard.summary();
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        Ok(BookingView::from_booking(booking, summary))
    }

    /// Permanent removal — distinct from cancellation.
    pub async fn delete_booking(
        &self,
        caller: &Caller,
        booking_id: Ulid,
    ) -> Result<(), EngineError> {
        let (property_id, mut guard) = self.resolve_booking_write(&booking_id).await?;

        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if !caller.may_act_on(booking.user_id) {
            return Err(EngineError::Forbidden);
        }
        if booking.start_date < today() && !caller.admin {
            return Err(EngineError::InvalidState("cannot delete past bookings"));
        }

        let event = Event::BookingDeleted {
            id: booking_id,
            property_id,
        };
        self.persist_and_apply(&mut guard, &event).await
    }
}
