use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::auth::AuthUser;
use crate::handlers::{customer_view, BookingAction};
use crate::models::{
    BookingFilter, BookingStatus, BookingView, CustomerStats, ProviderCard, ProviderSearch, Role,
};
use crate::services::lifecycle::{self, NewBooking};
use crate::services::reviews::{self, NewReview};
use crate::services::{events, profiles, stats as stats_service};
use crate::state::AppState;

fn require_customer(auth: &AuthUser) -> Result<(), AppError> {
    if auth.user.role != Role::Customer {
        return Err(AppError::Forbidden("customer account required".into()));
    }
    Ok(())
}

// POST /dashboard/customer/create-booking
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<NewBooking>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let (transition, view) = {
        let conn = state.conn()?;
        let transition = lifecycle::create_booking(&conn, &state.config, &auth.user, body)?;
        let view = customer_view(&conn, transition.booking.clone())?;
        (transition, view)
    };

    events::dispatch(&state, &transition.booking, &transition.event);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Booking created",
            "booking": view,
        })),
    ))
}

// GET /dashboard/customer/bookings?status_filter=
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status_filter: Option<String>,
}

/// `all` or an empty filter lists every status.
pub(crate) fn parse_status_filter(raw: Option<&str>) -> Result<Option<BookingStatus>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all")) {
        None => Ok(None),
        Some(s) => BookingStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("unknown status filter: {s}"))),
    }
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    require_customer(&auth)?;
    let status = parse_status_filter(query.status_filter.as_deref())?;

    let conn = state.conn()?;
    let filter = BookingFilter::for_customer(&auth.user.phone).with_status(status);
    let views = queries::list_bookings(&conn, &filter)?
        .into_iter()
        .map(|booking| customer_view(&conn, booking))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(views))
}

// GET /dashboard/customer/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CustomerStats>, AppError> {
    require_customer(&auth)?;
    let conn = state.conn()?;
    Ok(Json(stats_service::customer_stats(&conn, &auth.user.phone)?))
}

// GET /dashboard/customer/providers
pub async fn search_providers(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(search): Query<ProviderSearch>,
) -> Result<Json<Vec<ProviderCard>>, AppError> {
    let conn = state.conn()?;
    Ok(Json(profiles::search_providers(&conn, &auth.user, &search)?))
}

// GET /dashboard/customer/saved-providers
pub async fn saved_providers(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<ProviderCard>>, AppError> {
    let conn = state.conn()?;
    Ok(Json(profiles::saved_providers(&conn, &auth.user)?))
}

// POST /dashboard/customer/save-provider
#[derive(Deserialize)]
pub struct SaveProviderRequest {
    pub provider_phone: String,
}

pub async fn save_provider(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<SaveProviderRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let conn = state.conn()?;
    profiles::save_provider(&conn, &auth.user, body.provider_phone.trim())?;
    Ok(Json(serde_json::json!({ "message": "Provider saved" })))
}

// POST /dashboard/customer/unsave-provider
pub async fn unsave_provider(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<SaveProviderRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let conn = state.conn()?;
    profiles::unsave_provider(&conn, &auth.user, body.provider_phone.trim())?;
    Ok(Json(serde_json::json!({ "message": "Provider removed from saved list" })))
}

// POST /dashboard/customer/verify-acceptance-code
#[derive(Deserialize)]
pub struct VerifyCodeRequest {
    pub booking_id: String,
    pub code: String,
}

pub async fn verify_acceptance_code(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<VerifyCodeRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (verification, provider_name, view) = {
        let conn = state.conn()?;
        let verification = lifecycle::verify_acceptance(
            &conn,
            &state.config,
            &auth.user,
            &body.booking_id,
            &body.code,
        )?;
        let provider_name = queries::get_user_name(&conn, &verification.booking.provider_phone)?;
        let view = customer_view(&conn, verification.booking.clone())?;
        (verification, provider_name, view)
    };

    if let Some(event) = &verification.event {
        events::dispatch(&state, &verification.booking, event);
    }

    Ok(Json(serde_json::json!({
        "message": "Code verified",
        "provider_name": provider_name,
        "booking": view,
    })))
}

// POST /dashboard/customer/create-review
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<NewReview>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let (outcome, view) = {
        let conn = state.conn()?;
        let outcome = reviews::submit_review(&conn, &state.config, &auth.user, body)?;
        let view = customer_view(&conn, outcome.transition.booking.clone())?;
        (outcome, view)
    };

    events::dispatch(&state, &outcome.transition.booking, &outcome.transition.event);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Review submitted",
            "review": outcome.review,
            "provider_rating": outcome.summary,
            "booking": view,
        })),
    ))
}

// POST /dashboard/customer/cancel-booking
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<BookingAction>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (transition, view) = {
        let conn = state.conn()?;
        let transition =
            lifecycle::cancel_booking(&conn, &state.config, &auth.user, &body.booking_id)?;
        let view = customer_view(&conn, transition.booking.clone())?;
        (transition, view)
    };

    events::dispatch(&state, &transition.booking, &transition.event);

    Ok(Json(serde_json::json!({
        "message": "Booking cancelled",
        "booking": view,
    })))
}
