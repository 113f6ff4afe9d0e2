mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{available_ranges, has_availability, total_free_days};
pub use error::EngineError;
pub use mutations::{BookingPatch, PropertyDraft, PropertyPatch};
pub use queries::{BookingFilter, PropertyFilter};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedPropertyState = Arc<RwLock<PropertyState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine. All shared state lives here; requests never share
/// anything else. Each property sits behind its own `RwLock`, and every
/// check-then-persist sequence runs under that property's write guard.
pub struct Engine {
    pub state: DashMap<Ulid, SharedPropertyState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: booking id → property id.
    pub(super) booking_index: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to a PropertyState (no locking — caller holds the lock).
fn apply_to_property(ps: &mut PropertyState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BookingCreated {
            id,
            property_id,
            user_id,
            user_name,
            start_date,
            end_date,
            total_price_cents,
            created_at,
        } => {
            ps.insert_booking(Booking {
                id: *id,
                property_id: *property_id,
                user_id: *user_id,
                user_name: user_name.clone(),
                start_date: *start_date,
                end_date: *end_date,
                total_price_cents: *total_price_cents,
                status: BookingStatus::Confirmed,
                created_at: *created_at,
            });
            index.insert(*id, *property_id);
        }
        Event::BookingUpdated {
            id,
            start_date,
            end_date,
            total_price_cents,
            status,
            ..
        } => {
            // Remove and re-insert so the start-date sort order survives a
            // date change.
            if let Some(mut b) = ps.remove_booking(*id) {
                b.start_date = *start_date;
                b.end_date = *end_date;
                b.total_price_cents = *total_price_cents;
                b.status = *status;
                ps.insert_booking(b);
            }
        }
        Event::BookingCancelled { id, .. } => {
            if let Some(b) = ps.booking_mut(*id) {
                b.status = BookingStatus::Cancelled;
            }
        }
        Event::BookingDeleted { id, .. } => {
            ps.remove_booking(*id);
            index.remove(id);
        }
        Event::PropertyUpdated {
            title,
            description,
            price_per_night_cents,
            available_from,
            available_to,
            ..
        } => {
            ps.title = title.clone();
            ps.description = description.clone();
            ps.price_per_night_cents = *price_per_night_cents;
            ps.available_from = *available_from;
            ps.available_to = *available_to;
        }
        // PropertyCreated/Deleted are handled at the DashMap level, not here
        Event::PropertyCreated { .. } | Event::PropertyDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            booking_index: DashMap::new(),
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never block here: this may run inside an async
        // context.
        for event in &events {
            match event {
                Event::PropertyCreated {
                    id,
                    title,
                    description,
                    price_per_night_cents,
                    available_from,
                    available_to,
                    created_at,
                } => {
                    let ps = PropertyState {
                        id: *id,
                        title: title.clone(),
                        description: description.clone(),
                        price_per_night_cents: *price_per_night_cents,
                        available_from: *available_from,
                        available_to: *available_to,
                        created_at: *created_at,
                        bookings: Vec::new(),
                    };
                    engine.state.insert(*id, Arc::new(RwLock::new(ps)));
                }
                Event::PropertyDeleted { id } => {
                    if let Some((_, arc)) = engine.state.remove(id) {
                        let guard = arc.try_read().expect("replay: uncontended read");
                        for b in &guard.bookings {
                            engine.booking_index.remove(&b.id);
                        }
                    }
                }
                other => {
                    if let Some(property_id) = event_property_id(other)
                        && let Some(entry) = engine.state.get(&property_id)
                    {
                        let arc = entry.value().clone();
                        let mut guard = arc.try_write().expect("replay: uncontended write");
                        apply_to_property(&mut guard, other, &engine.booking_index);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_property(&self, id: &Ulid) -> Option<SharedPropertyState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn property_of_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_index.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call: the mutation becomes durable, then
    /// visible, while the caller still holds the property's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        ps: &mut PropertyState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_property(ps, event, &self.booking_index);
        Ok(())
    }

    /// Lookup booking → property, then take the property's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<PropertyState>), EngineError> {
        let property_id = self
            .property_of_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let ps = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = ps.write_owned().await;
        Ok((property_id, guard))
    }

    /// Rewrite the WAL with only the events needed to recreate current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let property_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in property_ids {
            let Some(arc) = self.get_property(&id) else { continue };
            let guard = arc.read().await;

            events.push(Event::PropertyCreated {
                id: guard.id,
                title: guard.title.clone(),
                description: guard.description.clone(),
                price_per_night_cents: guard.price_per_night_cents,
                available_from: guard.available_from,
                available_to: guard.available_to,
                created_at: guard.created_at,
            });

            for b in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: b.id,
                    property_id: b.property_id,
                    user_id: b.user_id,
                    user_name: b.user_name.clone(),
                    start_date: b.start_date,
                    end_date: b.end_date,
                    total_price_cents: b.total_price_cents,
                    created_at: b.created_at,
                });
                if b.status.is_cancelled() {
                    events.push(Event::BookingCancelled {
                        id: b.id,
                        property_id: b.property_id,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Extract the property_id from an event (for non-Create/Delete events).
fn event_property_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingCreated { property_id, .. }
        | Event::BookingUpdated { property_id, .. }
        | Event::BookingCancelled { property_id, .. }
        | Event::BookingDeleted { property_id, .. } => Some(*property_id),
        Event::PropertyUpdated { id, .. } => Some(*id),
        Event::PropertyCreated { .. } | Event::PropertyDeleted { .. } => None,
    }
}
