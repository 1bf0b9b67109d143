use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::errors::AppError;
use crate::handlers::auth::AuthUser;
use crate::models::{CustomerProfile, ProviderProfile, ProviderProfileInput, Review};
use crate::services::profiles::{self, CustomerProfileInput};
use crate::state::AppState;

// GET /providers/profile
pub async fn get_own_provider_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ProviderProfile>, AppError> {
    let conn = state.conn()?;
    Ok(Json(profiles::get_provider_profile(&conn, &auth.user.phone)?))
}

// POST /providers/profile
pub async fn create_provider_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ProviderProfileInput>,
) -> Result<(StatusCode, Json<ProviderProfile>), AppError> {
    let conn = state.conn()?;
    let profile = profiles::create_provider_profile(&conn, &state.config, &auth.user, &body)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

// PUT /providers/profile
pub async fn update_provider_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ProviderProfileInput>,
) -> Result<Json<ProviderProfile>, AppError> {
    let conn = state.conn()?;
    Ok(Json(profiles::update_provider_profile(&conn, &auth.user, &body)?))
}

// DELETE /providers/profile
pub async fn delete_provider_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    let conn = state.conn()?;
    profiles::delete_provider_profile(&conn, &auth.user)?;
    Ok(StatusCode::NO_CONTENT)
}

// GET /providers/profile/:phone
pub async fn get_provider_profile(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(phone): Path<String>,
) -> Result<Json<ProviderProfile>, AppError> {
    let conn = state.conn()?;
    Ok(Json(profiles::get_provider_profile(&conn, &phone)?))
}

// GET /providers/:phone/reviews
pub async fn provider_reviews(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(phone): Path<String>,
) -> Result<Json<Vec<Review>>, AppError> {
    let conn = state.conn()?;
    Ok(Json(profiles::list_reviews(&conn, &phone)?))
}

// GET /customers/profile
pub async fn get_customer_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CustomerProfile>, AppError> {
    let conn = state.conn()?;
    Ok(Json(profiles::get_customer_profile(&conn, &auth.user)?))
}

// PUT /customers/profile
pub async fn update_customer_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CustomerProfileInput>,
) -> Result<Json<CustomerProfile>, AppError> {
    let conn = state.conn()?;
    Ok(Json(profiles::save_customer_profile(&conn, &auth.user, body)?))
}
