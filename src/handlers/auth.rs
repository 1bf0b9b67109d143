use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;

use crate::errors::AppError;
use crate::models::User;
use crate::services::accounts::{
    self, AuthSession, LoginCodeRequest, LoginCodeSent, LoginCodeVerified, LoginCodeVerifyRequest,
    LoginRequest, SignupRequest,
};
use crate::state::AppState;

/// The user behind the request's bearer token.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth = headers.get("authorization")?.to_str().ok()?;
    let token = auth.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        let user = {
            let conn = state.conn()?;
            accounts::authenticate(&conn, &token)?
        };
        Ok(AuthUser { user, token })
    }
}

// POST /auth/signup
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignupRequest>,
) -> Result<Json<AuthSession>, AppError> {
    Ok(Json(accounts::signup(&state, body).await?))
}

// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthSession>, AppError> {
    Ok(Json(accounts::login(&state, body).await?))
}

// POST /auth/send-otp and /auth/resend-otp
pub async fn send_login_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginCodeRequest>,
) -> Result<Json<LoginCodeSent>, AppError> {
    Ok(Json(accounts::send_login_code(&state, body).await?))
}

// POST /auth/verify-otp
pub async fn verify_login_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginCodeVerifyRequest>,
) -> Result<Json<LoginCodeVerified>, AppError> {
    let conn = state.conn()?;
    Ok(Json(accounts::verify_login_code(&conn, &state.config, &body)?))
}

// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    {
        let conn = state.conn()?;
        accounts::logout(&conn, &auth.token)?;
    }
    tracing::info!(phone = %auth.user.phone, "logged out");
    Ok(Json(serde_json::json!({ "message": "Logged out" })))
}

// GET /auth/me
pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc123"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
