//! Newline-delimited JSON protocol. One request per line, one reply per
//! line. Success replies are `{success, message, data}`; failures are
//! `{success: false, code, error}` with an HTTP-equivalent code.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};
use ulid::Ulid;

use crate::auth::{Caller, TokenRegistry};
use crate::engine::{
    BookingFilter, BookingPatch, Engine, EngineError, PropertyDraft, PropertyFilter, PropertyPatch,
};
use crate::limits::{DEFAULT_PAGE_LIMIT, MAX_WIRE_LINE_LEN};
use crate::model::{BookingStatus, Cents, DateRange};
use crate::observability;

pub struct ServerContext {
    pub engine: Arc<Engine>,
    pub tokens: Arc<TokenRegistry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateProperty {
        token: Option<String>,
        title: String,
        description: String,
        price_per_night_cents: Cents,
        available_from: NaiveDate,
        available_to: NaiveDate,
    },
    UpdateProperty {
        token: Option<String>,
        id: Ulid,
        title: Option<String>,
        description: Option<String>,
        price_per_night_cents: Option<Cents>,
        available_from: Option<NaiveDate>,
        available_to: Option<NaiveDate>,
    },
    DeleteProperty {
        token: Option<String>,
        id: Ulid,
    },
    GetProperty {
        id: Ulid,
    },
    ListProperties {
        page: Option<usize>,
        limit: Option<usize>,
        available_from: Option<NaiveDate>,
        available_to: Option<NaiveDate>,
        min_price_cents: Option<Cents>,
        max_price_cents: Option<Cents>,
    },
    ListAvailableProperties {
        page: Option<usize>,
        limit: Option<usize>,
        available_from: Option<NaiveDate>,
        available_to: Option<NaiveDate>,
        min_price_cents: Option<Cents>,
        max_price_cents: Option<Cents>,
    },
    GetAvailability {
        property_id: Ulid,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    },
    CreateBooking {
        token: Option<String>,
        property_id: Ulid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    CancelBooking {
        token: Option<String>,
        id: Ulid,
    },
    UpdateBooking {
        token: Option<String>,
        id: Ulid,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        status: Option<BookingStatus>,
    },
    DeleteBooking {
        token: Option<String>,
        id: Ulid,
    },
    GetBooking {
        token: Option<String>,
        id: Ulid,
    },
    MyBookings {
        token: Option<String>,
    },
    ListBookings {
        token: Option<String>,
        status: Option<BookingStatus>,
        property_id: Option<Ulid>,
        page: Option<usize>,
        limit: Option<usize>,
    },
}

struct Failure {
    code: u16,
    message: String,
}

impl From<EngineError> for Failure {
    fn from(e: EngineError) -> Self {
        let code = match &e {
            EngineError::NotFound(_) => 404,
            EngineError::Forbidden => 403,
            EngineError::Conflict(_) => 409,
            EngineError::InvalidRange(_)
            | EngineError::AlreadyCancelled(_)
            | EngineError::InvalidState(_)
            | EngineError::Validation(_) => 400,
            EngineError::WalError(_) => 500,
        };
        // Persistence failures must not leak internals to clients.
        let message = if code == 500 {
            tracing::error!("internal error: {e}");
            "internal server error".to_string()
        } else {
            e.to_string()
        };
        Failure { code, message }
    }
}

fn ok(message: &str, data: Value) -> Value {
    json!({ "success": true, "message": message, "data": data })
}

fn fail(code: u16, message: impl std::fmt::Display) -> Value {
    json!({ "success": false, "code": code, "error": message.to_string() })
}

fn authenticate(ctx: &ServerContext, token: &Option<String>) -> Result<Caller, Failure> {
    let token = token.as_deref().ok_or(Failure {
        code: 401,
        message: "authentication required".into(),
    })?;
    ctx.tokens.authenticate(token).ok_or(Failure {
        code: 401,
        message: "invalid token".into(),
    })
}

fn date_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Option<DateRange>, Failure> {
    match (start, end) {
        (Some(s), Some(e)) if s <= e => Ok(Some(DateRange::new(s, e))),
        (Some(_), Some(_)) => Err(Failure {
            code: 400,
            message: "start_date must not be after end_date".into(),
        }),
        _ => Ok(None),
    }
}

/// Serve one connection until the peer hangs up.
pub async fn process_connection(socket: TcpStream, ctx: Arc<ServerContext>) -> io::Result<()> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_WIRE_LINE_LEN));

    while let Some(line) = framed.next().await {
        let line = line.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_line(&ctx, &line).await;
        framed
            .send(reply.to_string())
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))?;
    }

    Ok(())
}

async fn handle_line(ctx: &ServerContext, line: &str) -> Value {
    let req: Request = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => "malformed", "status" => "error")
                .increment(1);
            return fail(400, format!("malformed request: {e}"));
        }
    };

    let op = observability::op_label(&req);
    let started = Instant::now();
    let result = execute(ctx, req).await;
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());

    match result {
        Ok(reply) => {
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => "ok")
                .increment(1);
            reply
        }
        Err(failure) => {
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => "error")
                .increment(1);
            tracing::debug!("{op} failed: {} ({})", failure.message, failure.code);
            fail(failure.code, failure.message)
        }
    }
}

async fn execute(ctx: &ServerContext, req: Request) -> Result<Value, Failure> {
    let engine = &ctx.engine;
    match req {
        Request::CreateProperty {
            token,
            title,
            description,
            price_per_night_cents,
            available_from,
            available_to,
        } => {
            let caller = authenticate(ctx, &token)?;
            let record = engine
                .create_property(
                    &caller,
                    PropertyDraft {
                        title,
                        description,
                        price_per_night_cents,
                        available_from,
                        available_to,
                    },
                )
                .await?;
            Ok(ok("Property created successfully", json!({ "property": record })))
        }
        Request::UpdateProperty {
            token,
            id,
            title,
            description,
            price_per_night_cents,
            available_from,
            available_to,
        } => {
            let caller = authenticate(ctx, &token)?;
            let record = engine
                .update_property(
                    &caller,
                    id,
                    PropertyPatch {
                        title,
                        description,
                        price_per_night_cents,
                        available_from,
                        available_to,
                    },
                )
                .await?;
            Ok(ok("Property updated successfully", json!({ "property": record })))
        }
        Request::DeleteProperty { token, id } => {
            let caller = authenticate(ctx, &token)?;
            engine.delete_property(&caller, id).await?;
            Ok(ok("Property deleted successfully", Value::Null))
        }
        Request::GetProperty { id } => {
            let record = engine.get_property_record(id).await?;
            Ok(ok("Property retrieved successfully", json!({ "property": record })))
        }
        Request::ListProperties {
            page,
            limit,
            available_from,
            available_to,
            min_price_cents,
            max_price_cents,
        } => {
            let filter = PropertyFilter {
                available_from,
                available_to,
                min_price_cents,
                max_price_cents,
            };
            let result = engine
                .list_properties(
                    &filter,
                    page.unwrap_or(1),
                    limit.unwrap_or(DEFAULT_PAGE_LIMIT),
                )
                .await;
            Ok(ok(
                "Properties retrieved successfully",
                json!({ "properties": result.items, "pagination": result.pagination }),
            ))
        }
        Request::ListAvailableProperties {
            page,
            limit,
            available_from,
            available_to,
            min_price_cents,
            max_price_cents,
        } => {
            let filter = PropertyFilter {
                available_from,
                available_to,
                min_price_cents,
                max_price_cents,
            };
            let result = engine
                .list_available_properties(
                    &filter,
                    page.unwrap_or(1),
                    limit.unwrap_or(DEFAULT_PAGE_LIMIT),
                )
                .await;
            Ok(ok(
                "Available properties retrieved successfully",
                json!({ "properties": result.items, "pagination": result.pagination }),
            ))
        }
        Request::GetAvailability {
            property_id,
            start_date,
            end_date,
        } => {
            let window = date_window(start_date, end_date)?;
            let report = engine.property_availability(property_id, window).await?;
            Ok(ok("Property availability retrieved successfully", json!(report)))
        }
        Request::CreateBooking {
            token,
            property_id,
            start_date,
            end_date,
        } => {
            let caller = authenticate(ctx, &token)?;
            let view = engine
                .create_booking(&caller, property_id, start_date, end_date)
                .await?;
            Ok(ok(
                "Booking created successfully",
                json!({
                    "booking": view,
                    "booking_details": {
                        "nights": view.nights,
                        "price_per_night_cents": view.property.price_per_night_cents,
                        "total_price_cents": view.total_price_cents,
                    }
                }),
            ))
        }
        Request::CancelBooking { token, id } => {
            let caller = authenticate(ctx, &token)?;
            let view = engine.cancel_booking(&caller, id).await?;
            Ok(ok("Booking cancelled successfully", json!({ "booking": view })))
        }
        Request::UpdateBooking {
            token,
            id,
            start_date,
            end_date,
            status,
        } => {
            let caller = authenticate(ctx, &token)?;
            let view = engine
                .update_booking(
                    &caller,
                    id,
                    BookingPatch {
                        start_date,
                        end_date,
                        status,
                    },
                )
                .await?;
            Ok(ok("Booking updated successfully", json!({ "booking": view })))
        }
        Request::DeleteBooking { token, id } => {
            let caller = authenticate(ctx, &token)?;
            engine.delete_booking(&caller, id).await?;
            Ok(ok("Booking deleted successfully", Value::Null))
        }
        Request::GetBooking { token, id } => {
            let caller = authenticate(ctx, &token)?;
            let view = engine.booking_by_id(&caller, id).await?;
            Ok(ok("Booking retrieved successfully", json!({ "booking": view })))
        }
        Request::MyBookings { token } => {
            let caller = authenticate(ctx, &token)?;
            let bookings = engine.my_bookings(&caller).await;
            Ok(ok(
                "User bookings retrieved successfully",
                json!({ "bookings": bookings }),
            ))
        }
        Request::ListBookings {
            token,
            status,
            property_id,
            page,
            limit,
        } => {
            let caller = authenticate(ctx, &token)?;
            let result = engine
                .list_bookings(
                    &caller,
                    &BookingFilter { status, property_id },
                    page.unwrap_or(1),
                    limit.unwrap_or(DEFAULT_PAGE_LIMIT),
                )
                .await?;
            Ok(ok(
                "Bookings retrieved successfully",
                json!({
                    "bookings": result.bookings,
                    "summary": result.summary,
                    "pagination": result.pagination,
                }),
            ))
        }
    }
}
