use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::engine::{BookingDraft, BookingPatch, Engine, EngineError, RoomDraft};
use crate::model::{BookingRef, BookingStatus, DateRange};
use crate::observability::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};

/// Boundary error: translates engine failures into status codes and a JSON
/// body with a machine-readable `kind`, so the UI can tell "dates no longer
/// available" (conflict) from "fill in all fields" (validation). Internal
/// details never reach the caller.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self.0 {
            EngineError::Validation(_) | EngineError::LimitExceeded(_) => {
                (StatusCode::BAD_REQUEST, "validation", self.0.to_string())
            }
            EngineError::Conflict(_) => (
                StatusCode::CONFLICT,
                "conflict",
                "these dates are no longer available".to_string(),
            ),
            EngineError::RoomNotFound(_) | EngineError::BookingNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found", self.0.to_string())
            }
            EngineError::WalError(e) => {
                error!("storage failure: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message, "kind": kind }))).into_response()
    }
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rooms", get(list_rooms).post(create_room))
        .route(
            "/rooms/{id}",
            get(get_room).put(update_room).delete(delete_room),
        )
        .route("/booking", get(list_bookings).post(create_booking))
        .route(
            "/booking/{id}",
            get(get_booking).patch(patch_booking).delete(delete_booking),
        )
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let start = Instant::now();
    let resp = next.run(req).await;
    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "route" => route.clone(),
        "status" => resp.status().as_u16().to_string(),
    )
    .increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "route" => route)
        .record(start.elapsed().as_secs_f64());
    resp
}

async fn health() -> &'static str {
    "ok"
}

// ── Rooms ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RoomsQuery {
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    guests: Option<u32>,
}

/// Availability search when both dates are given, catalog browse otherwise.
async fn list_rooms(
    State(engine): State<Arc<Engine>>,
    Query(q): Query<RoomsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = match (q.check_in, q.check_out) {
        (Some(check_in), Some(check_out)) => Some(DateRange { check_in, check_out }),
        (None, None) => None,
        _ => {
            return Err(EngineError::Validation(
                "check_in and check_out must be supplied together",
            )
            .into());
        }
    };
    let rooms = engine.available_rooms(range, q.guests).await?;
    Ok(Json(rooms))
}

/// All fields optional at the wire so missing ones yield a 400, not a
/// deserialization rejection.
#[derive(Debug, Deserialize)]
struct RoomPayload {
    name: Option<String>,
    price_cents: Option<i64>,
    capacity: Option<u32>,
    amenities: Option<Vec<String>>,
    description: Option<String>,
    image_url: Option<String>,
}

impl RoomPayload {
    fn into_draft(self) -> Result<RoomDraft, ApiError> {
        let (Some(name), Some(price_cents), Some(capacity)) =
            (self.name, self.price_cents, self.capacity)
        else {
            return Err(EngineError::Validation(
                "name, price_cents and capacity are required",
            )
            .into());
        };
        Ok(RoomDraft {
            name,
            price_cents,
            capacity,
            amenities: self.amenities.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            image_url: self.image_url.unwrap_or_default(),
        })
    }
}

async fn create_room(
    State(engine): State<Arc<Engine>>,
    Json(payload): Json<RoomPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let room = engine.create_room(payload.into_draft()?).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

async fn get_room(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u32>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(engine.get_room(id)?))
}

async fn update_room(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u32>,
    Json(payload): Json<RoomPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let room = engine.update_room(id, payload.into_draft()?).await?;
    Ok(Json(room))
}

async fn delete_room(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u32>,
) -> Result<impl IntoResponse, ApiError> {
    engine.delete_room(id).await?;
    Ok(Json(json!({ "message": "room deleted" })))
}

// ── Bookings ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BookingsQuery {
    email: Option<String>,
}

async fn list_bookings(
    State(engine): State<Arc<Engine>>,
    Query(q): Query<BookingsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let bookings = engine.list_bookings(q.email.as_deref()).await;
    Ok(Json(bookings))
}

#[derive(Debug, Deserialize)]
struct BookingPayload {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    room_id: Option<u32>,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    guests: Option<u32>,
}

impl BookingPayload {
    fn into_draft(self) -> Result<BookingDraft, ApiError> {
        let (
            Some(first_name),
            Some(last_name),
            Some(email),
            Some(phone),
            Some(room_id),
            Some(check_in),
            Some(check_out),
            Some(guests),
        ) = (
            self.first_name,
            self.last_name,
            self.email,
            self.phone,
            self.room_id,
            self.check_in,
            self.check_out,
            self.guests,
        )
        else {
            return Err(EngineError::Validation("missing required booking fields").into());
        };
        Ok(BookingDraft {
            first_name,
            last_name,
            email,
            phone,
            room_id,
            check_in,
            check_out,
            guests,
        })
    }
}

async fn create_booking(
    State(engine): State<Arc<Engine>>,
    Json(payload): Json<BookingPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = engine.create_booking(payload.into_draft()?).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn get_booking(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = engine.get_booking(&BookingRef::parse(&id)).await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
struct BookingPatchPayload {
    status: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

async fn patch_booking(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
    Json(payload): Json<BookingPatchPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match payload.status.as_deref() {
        Some(s) => Some(
            BookingStatus::parse(s)
                .ok_or(EngineError::Validation("unknown booking status"))?,
        ),
        None => None,
    };
    let patch = BookingPatch {
        status,
        first_name: payload.first_name,
        last_name: payload.last_name,
        email: payload.email,
        phone: payload.phone,
    };
    let booking = engine.amend_booking(&BookingRef::parse(&id), patch).await?;
    Ok(Json(booking))
}

async fn delete_booking(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    engine.delete_booking(&BookingRef::parse(&id)).await?;
    Ok(Json(json!({ "message": "booking deleted" })))
}
