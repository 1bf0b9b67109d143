pub mod auth;
pub mod customer;
pub mod events;
pub mod profiles;
pub mod provider;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::Connection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingView};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.config.cors_origin.as_deref());

    Router::new()
        .route("/health", get(health))
        // Accounts
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/send-otp", post(auth::send_login_code))
        .route("/auth/resend-otp", post(auth::send_login_code))
        .route("/auth/verify-otp", post(auth::verify_login_code))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        // Customer dashboard
        .route(
            "/dashboard/customer/create-booking",
            post(customer::create_booking),
        )
        .route("/dashboard/customer/bookings", get(customer::list_bookings))
        .route("/dashboard/customer/stats", get(customer::stats))
        .route("/dashboard/customer/providers", get(customer::search_providers))
        .route(
            "/dashboard/customer/saved-providers",
            get(customer::saved_providers),
        )
        .route("/dashboard/customer/save-provider", post(customer::save_provider))
        .route(
            "/dashboard/customer/unsave-provider",
            post(customer::unsave_provider),
        )
        .route(
            "/dashboard/customer/verify-acceptance-code",
            post(customer::verify_acceptance_code),
        )
        .route("/dashboard/customer/create-review", post(customer::create_review))
        .route("/dashboard/customer/cancel-booking", post(customer::cancel_booking))
        // Provider dashboard
        .route("/dashboard/provider/stats", get(provider::stats))
        .route(
            "/dashboard/provider/pending-requests",
            get(provider::pending_requests),
        )
        .route("/dashboard/provider/accepted-jobs", get(provider::accepted_jobs))
        .route("/dashboard/provider/bookings", get(provider::list_bookings))
        .route("/dashboard/provider/accept-booking", post(provider::accept_booking))
        .route("/dashboard/provider/reject-booking", post(provider::reject_booking))
        .route("/dashboard/provider/cancel-job", post(provider::cancel_job))
        .route(
            "/dashboard/provider/complete-booking",
            post(provider::complete_booking),
        )
        .route(
            "/dashboard/provider/reissue-acceptance-code",
            post(provider::reissue_acceptance_code),
        )
        .route(
            "/dashboard/provider/reissue-completion-code",
            post(provider::reissue_completion_code),
        )
        // Profiles
        .route(
            "/providers/profile",
            get(profiles::get_own_provider_profile)
                .post(profiles::create_provider_profile)
                .put(profiles::update_provider_profile)
                .delete(profiles::delete_provider_profile),
        )
        .route("/providers/profile/:phone", get(profiles::get_provider_profile))
        .route("/providers/:phone/reviews", get(profiles::provider_reviews))
        .route(
            "/customers/profile",
            get(profiles::get_customer_profile).put(profiles::update_customer_profile),
        )
        .route("/events", get(events::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(_)) => {
            tracing::warn!("CORS_ORIGIN is not a valid header value, allowing any origin");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Booking as its customer sees it: acceptance and completion codes withheld.
pub(crate) fn customer_view(conn: &Connection, booking: Booking) -> Result<BookingView, AppError> {
    let customer_name = queries::get_user_name(conn, &booking.customer_phone)?;
    let provider_name = queries::get_user_name(conn, &booking.provider_phone)?;
    Ok(BookingView::for_customer(booking, customer_name, provider_name))
}

pub(crate) fn provider_view(conn: &Connection, booking: Booking) -> Result<BookingView, AppError> {
    let customer_name = queries::get_user_name(conn, &booking.customer_phone)?;
    let provider_name = queries::get_user_name(conn, &booking.provider_phone)?;
    Ok(BookingView::for_provider(booking, customer_name, provider_name))
}

/// Body of every single-booking action.
#[derive(Debug, serde::Deserialize)]
pub struct BookingAction {
    pub booking_id: String,
}
