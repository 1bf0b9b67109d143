use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::auth::AuthUser;
use crate::handlers::customer::{parse_status_filter, BookingsQuery};
use crate::handlers::{provider_view, BookingAction};
use crate::models::{BookingFilter, BookingStatus, BookingView, ProviderStats, Role};
use crate::services::lifecycle::{self, Transition};
use crate::services::{events, stats as stats_service};
use crate::state::AppState;

fn require_provider(auth: &AuthUser) -> Result<(), AppError> {
    if auth.user.role != Role::Provider {
        return Err(AppError::Forbidden("provider account required".into()));
    }
    Ok(())
}

fn bookings_with_status(
    state: &AppState,
    auth: &AuthUser,
    status: Option<BookingStatus>,
) -> Result<Vec<BookingView>, AppError> {
    require_provider(auth)?;
    let conn = state.conn()?;
    let filter = BookingFilter::for_provider(&auth.user.phone).with_status(status);
    let views = queries::list_bookings(&conn, &filter)?
        .into_iter()
        .map(|booking| provider_view(&conn, booking))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(views)
}

/// Runs a provider action under the lock, then fans out its event.
fn run_action(
    state: &Arc<AppState>,
    action: impl FnOnce(&rusqlite::Connection) -> Result<Transition, AppError>,
) -> Result<BookingView, AppError> {
    let (transition, view) = {
        let conn = state.conn()?;
        let transition = action(&*conn)?;
        let view = provider_view(&conn, transition.booking.clone())?;
        (transition, view)
    };
    events::dispatch(state, &transition.booking, &transition.event);
    Ok(view)
}

// GET /dashboard/provider/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ProviderStats>, AppError> {
    require_provider(&auth)?;
    let conn = state.conn()?;
    Ok(Json(stats_service::provider_stats(&conn, &auth.user.phone)?))
}

// GET /dashboard/provider/pending-requests
pub async fn pending_requests(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<BookingView>>, AppError> {
    Ok(Json(bookings_with_status(
        &state,
        &auth,
        Some(BookingStatus::Pending),
    )?))
}

// GET /dashboard/provider/accepted-jobs
pub async fn accepted_jobs(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<BookingView>>, AppError> {
    Ok(Json(bookings_with_status(
        &state,
        &auth,
        Some(BookingStatus::Accepted),
    )?))
}

// GET /dashboard/provider/bookings?status_filter=
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    let status = parse_status_filter(query.status_filter.as_deref())?;
    Ok(Json(bookings_with_status(&state, &auth, status)?))
}

// POST /dashboard/provider/accept-booking
pub async fn accept_booking(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<BookingAction>,
) -> Result<Json<serde_json::Value>, AppError> {
    let view = run_action(&state, |conn| {
        lifecycle::accept_booking(conn, &auth.user, &body.booking_id)
    })?;

    Ok(Json(serde_json::json!({
        "message": "Booking accepted",
        "acceptance_code": view.acceptance_code,
        "booking": view,
    })))
}

// POST /dashboard/provider/reject-booking
pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<BookingAction>,
) -> Result<Json<serde_json::Value>, AppError> {
    let view = run_action(&state, |conn| {
        lifecycle::reject_booking(conn, &auth.user, &body.booking_id)
    })?;

    Ok(Json(serde_json::json!({
        "message": "Booking rejected",
        "booking": view,
    })))
}

// POST /dashboard/provider/cancel-job
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<BookingAction>,
) -> Result<Json<serde_json::Value>, AppError> {
    let view = run_action(&state, |conn| {
        lifecycle::cancel_booking(conn, &state.config, &auth.user, &body.booking_id)
    })?;

    Ok(Json(serde_json::json!({
        "message": "Job cancelled",
        "booking": view,
    })))
}

// POST /dashboard/provider/complete-booking
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<BookingAction>,
) -> Result<Json<serde_json::Value>, AppError> {
    let view = run_action(&state, |conn| {
        lifecycle::complete_booking(conn, &auth.user, &body.booking_id)
    })?;

    Ok(Json(serde_json::json!({
        "message": "Completion code issued, share it with the customer",
        "completion_code": view.completion_code,
        "booking": view,
    })))
}

// POST /dashboard/provider/reissue-acceptance-code
pub async fn reissue_acceptance_code(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<BookingAction>,
) -> Result<Json<serde_json::Value>, AppError> {
    let view = run_action(&state, |conn| {
        lifecycle::reissue_acceptance_code(conn, &auth.user, &body.booking_id)
    })?;

    Ok(Json(serde_json::json!({
        "message": "Acceptance code reissued",
        "acceptance_code": view.acceptance_code,
        "booking": view,
    })))
}

// POST /dashboard/provider/reissue-completion-code
pub async fn reissue_completion_code(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<BookingAction>,
) -> Result<Json<serde_json::Value>, AppError> {
    let view = run_action(&state, |conn| {
        lifecycle::reissue_completion_code(conn, &auth.user, &body.booking_id)
    })?;

    Ok(Json(serde_json::json!({
        "message": "Completion code reissued",
        "completion_code": view.completion_code,
        "booking": view,
    })))
}
