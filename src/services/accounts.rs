use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{ProviderProfileInput, Role, Session, User};
use crate::services::codes::{codes_match, generate_code};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub phone: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub location: Option<String>,
    pub service: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub expires_at: NaiveDateTime,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginCodeRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginCodeVerifyRequest {
    pub phone: String,
    pub otp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginCodeSent {
    pub phone: String,
    pub expires_in_minutes: i64,
}

/// A verified login code. Registered phones also get a session.
#[derive(Debug, Clone, Serialize)]
pub struct LoginCodeVerified {
    pub phone: String,
    pub verified: bool,
    pub session: Option<AuthSession>,
}

/// Phone numbers are 10 to 15 digits with an optional leading `+`.
pub fn normalize_phone(raw: &str) -> Result<String, AppError> {
    let phone = raw.trim();
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if !(10..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "phone must be 10 to 15 digits".into(),
        ));
    }
    Ok(phone.to_string())
}

fn validate_signup(request: &SignupRequest) -> Result<(String, String), AppError> {
    let phone = normalize_phone(&request.phone)?;

    let name = request.name.trim().to_string();
    if !(2..=100).contains(&name.chars().count()) {
        return Err(AppError::Validation(
            "name must be 2 to 100 characters".into(),
        ));
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    Ok((phone, name))
}

pub async fn signup(state: &Arc<AppState>, request: SignupRequest) -> Result<AuthSession, AppError> {
    let (phone, name) = validate_signup(&request)?;

    let taken = {
        let conn = state.conn()?;
        queries::get_user_by_phone(&conn, &phone)?.is_some()
    };
    if taken {
        return Err(AppError::AlreadyExists(format!("account for {phone}")));
    }

    let password_hash = hash_password(request.password, state.config.bcrypt_cost).await?;

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        phone,
        name,
        role: request.role,
        password_hash,
        created_at: Utc::now().naive_utc(),
    };

    let session = {
        let conn = state.conn()?;
        let tx = conn.unchecked_transaction()?;

        // A concurrent signup may have taken the phone since the check above.
        if queries::get_user_by_phone(&tx, &user.phone)?.is_some() {
            return Err(AppError::AlreadyExists(format!("account for {}", user.phone)));
        }
        queries::create_user(&tx, &user)?;

        if user.role == Role::Provider {
            let profile = provider_profile_for_signup(request.location, request.service);
            queries::create_provider_profile(
                &tx,
                &user.phone,
                &profile,
                &state.config.default_timezone,
            )?;
        }

        let session = open_session(&tx, &state.config, &user)?;
        tx.commit()?;
        session
    };

    tracing::info!(phone = %user.phone, role = user.role.as_str(), "account created");

    Ok(AuthSession {
        token: session.token,
        expires_at: session.expires_at,
        user,
    })
}

fn provider_profile_for_signup(
    location: Option<String>,
    service: Option<String>,
) -> ProviderProfileInput {
    let location = location.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
    let service = service.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let bio = match (&service, &location) {
        (Some(service), Some(location)) => Some(format!("Experienced {service} in {location}")),
        (Some(service), None) => Some(format!("Experienced {service}")),
        _ => None,
    };

    ProviderProfileInput {
        bio,
        location,
        service_category: service,
        ..Default::default()
    }
}

pub async fn login(state: &Arc<AppState>, request: LoginRequest) -> Result<AuthSession, AppError> {
    let phone = request.phone.trim().to_string();
    let user = {
        let conn = state.conn()?;
        queries::get_user_by_phone(&conn, &phone)?
    };

    // Unknown phone and wrong password look the same to the caller.
    let Some(user) = user else {
        tracing::warn!(phone = %phone, "login for unknown phone");
        return Err(AppError::Unauthorized);
    };
    if !verify_password(request.password, user.password_hash.clone()).await? {
        tracing::warn!(phone = %phone, "login with wrong password");
        return Err(AppError::Unauthorized);
    }

    let session = {
        let conn = state.conn()?;
        queries::delete_expired_sessions(&conn)?;
        open_session(&conn, &state.config, &user)?
    };

    tracing::info!(phone = %user.phone, "logged in");

    Ok(AuthSession {
        token: session.token,
        expires_at: session.expires_at,
        user,
    })
}

/// Resolves a bearer token to the user it was issued to.
pub fn authenticate(conn: &Connection, token: &str) -> Result<User, AppError> {
    queries::get_session_user(conn, token)?.ok_or(AppError::Unauthorized)
}

pub fn logout(conn: &Connection, token: &str) -> Result<(), AppError> {
    if !queries::delete_session(conn, token)? {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

/// Texts a fresh login code to `phone`. One code per phone per resend
/// window; a code that cannot be delivered is discarded.
pub async fn send_login_code(
    state: &Arc<AppState>,
    request: LoginCodeRequest,
) -> Result<LoginCodeSent, AppError> {
    let phone = normalize_phone(&request.phone)?;
    let config = &state.config;
    let code = generate_code();

    let id = {
        let conn = state.conn()?;
        let now = Utc::now().naive_utc();
        let window_start = now - Duration::seconds(config.otp_resend_seconds);
        if queries::login_code_sent_since(&conn, &phone, &window_start)? {
            return Err(AppError::TooManyRequests(format!(
                "wait {} seconds before requesting another login code",
                config.otp_resend_seconds
            )));
        }
        let expires_at = now + Duration::minutes(config.otp_ttl_minutes);
        queries::insert_login_code(&conn, &phone, &code, &expires_at)?
    };

    let body = format!(
        "Your DoMyService login code is {code}. It expires in {} minutes. Do not share it.",
        config.otp_ttl_minutes
    );
    if let Err(e) = state.notifier.notify(&phone, &body).await {
        tracing::warn!(
            error = %e,
            phone = %phone,
            notifier = state.notifier.name(),
            "login code delivery failed"
        );
        let conn = state.conn()?;
        queries::delete_login_code(&conn, id)?;
        return Err(AppError::Internal(e.context("failed to send login code")));
    }

    tracing::info!(phone = %phone, "login code sent");

    Ok(LoginCodeSent {
        phone,
        expires_in_minutes: config.otp_ttl_minutes,
    })
}

/// Checks the newest unused login code for the phone. Each miss counts; once
/// the cap is reached only a new code helps.
pub fn verify_login_code(
    conn: &Connection,
    config: &AppConfig,
    request: &LoginCodeVerifyRequest,
) -> Result<LoginCodeVerified, AppError> {
    let phone = normalize_phone(&request.phone)?;
    let Some(login_code) = queries::latest_login_code(conn, &phone)? else {
        return Err(AppError::InvalidCode("login code"));
    };

    if login_code.expires_at <= Utc::now().naive_utc() {
        return Err(AppError::CodeExpired("login code"));
    }
    if login_code.attempts >= config.otp_max_attempts {
        return Err(AppError::TooManyRequests(
            "too many failed attempts, request a new login code".into(),
        ));
    }
    if !codes_match(&login_code.code, &request.otp) {
        queries::record_login_code_attempt(conn, login_code.id)?;
        tracing::warn!(
            phone = %phone,
            attempts = login_code.attempts + 1,
            "login code mismatch"
        );
        return Err(AppError::InvalidCode("login code"));
    }
    if !queries::consume_login_code(conn, login_code.id)? {
        return Err(AppError::InvalidCode("login code"));
    }

    let session = match queries::get_user_by_phone(conn, &phone)? {
        Some(user) => {
            let session = open_session(conn, config, &user)?;
            Some(AuthSession {
                token: session.token,
                expires_at: session.expires_at,
                user,
            })
        }
        None => None,
    };

    tracing::info!(phone = %phone, registered = session.is_some(), "login code verified");

    Ok(LoginCodeVerified {
        phone,
        verified: true,
        session,
    })
}

fn open_session(conn: &Connection, config: &AppConfig, user: &User) -> Result<Session, AppError> {
    let session = Session {
        token: uuid::Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        expires_at: Utc::now().naive_utc() + Duration::hours(config.session_ttl_hours),
    };
    queries::create_session(conn, &session)?;
    Ok(session)
}

async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(hash)
}

async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::test_state;

    fn signup_request(phone: &str, role: Role) -> SignupRequest {
        SignupRequest {
            phone: phone.to_string(),
            name: "Alice".to_string(),
            password: "hunter22".to_string(),
            role,
            location: Some("Springfield".to_string()),
            service: Some("Plumber".to_string()),
        }
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone(" 5550001111 ").unwrap(), "5550001111");
        assert_eq!(normalize_phone("+445550001111").unwrap(), "+445550001111");
        assert!(normalize_phone("555").is_err());
        assert!(normalize_phone("555-000-1111").is_err());
        assert!(normalize_phone("1234567890123456").is_err());
    }

    #[test]
    fn test_signup_validation() {
        let mut request = signup_request("5550001111", Role::Customer);
        request.password = "short".to_string();
        assert!(matches!(validate_signup(&request), Err(AppError::Validation(_))));

        let mut request = signup_request("5550001111", Role::Customer);
        request.name = " A ".to_string();
        assert!(matches!(validate_signup(&request), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_provider_bio() {
        let profile =
            provider_profile_for_signup(Some("Springfield".into()), Some("Plumber".into()));
        assert_eq!(profile.bio.as_deref(), Some("Experienced Plumber in Springfield"));
        assert_eq!(profile.service_category.as_deref(), Some("Plumber"));

        let profile = provider_profile_for_signup(None, None);
        assert!(profile.bio.is_none());
    }

    #[tokio::test]
    async fn test_signup_login_logout() {
        let state = test_state();

        let created = signup(&state, signup_request("5550001111", Role::Customer))
            .await
            .unwrap();
        assert_eq!(created.user.role, Role::Customer);

        let user = authenticate(&state.conn().unwrap(), &created.token).unwrap();
        assert_eq!(user.phone, "5550001111");

        let session = login(
            &state,
            LoginRequest {
                phone: "5550001111".to_string(),
                password: "hunter22".to_string(),
            },
        )
        .await
        .unwrap();
        assert_ne!(session.token, created.token);

        logout(&state.conn().unwrap(), &session.token).unwrap();
        let result = authenticate(&state.conn().unwrap(), &session.token);
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_duplicate_signup_conflicts() {
        let state = test_state();
        signup(&state, signup_request("5550001111", Role::Customer))
            .await
            .unwrap();

        let result = signup(&state, signup_request("5550001111", Role::Provider)).await;
        assert!(matches!(result, Err(AppError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_provider_signup_creates_profile() {
        let state = test_state();
        signup(&state, signup_request("5550002222", Role::Provider))
            .await
            .unwrap();

        let conn = state.conn().unwrap();
        let profile = queries::get_provider_profile(&conn, "5550002222")
            .unwrap()
            .unwrap();
        assert_eq!(profile.bio.as_deref(), Some("Experienced Plumber in Springfield"));
        assert_eq!(profile.timezone, "UTC");
    }

    fn stored_login_code(state: &Arc<AppState>, phone: &str) -> String {
        queries::latest_login_code(&state.conn().unwrap(), phone)
            .unwrap()
            .unwrap()
            .code
    }

    fn verify_request(phone: &str, otp: &str) -> LoginCodeVerifyRequest {
        LoginCodeVerifyRequest {
            phone: phone.to_string(),
            otp: otp.to_string(),
        }
    }

    fn other_code(code: &str) -> &'static str {
        if code == "100000" {
            "100001"
        } else {
            "100000"
        }
    }

    #[tokio::test]
    async fn test_login_code_opens_session() {
        let state = test_state();
        signup(&state, signup_request("5550001111", Role::Customer))
            .await
            .unwrap();

        let sent = send_login_code(
            &state,
            LoginCodeRequest {
                phone: "5550001111".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(sent.expires_in_minutes, state.config.otp_ttl_minutes);

        let code = stored_login_code(&state, "5550001111");
        let conn = state.conn().unwrap();
        let verified =
            verify_login_code(&conn, &state.config, &verify_request("5550001111", &code)).unwrap();
        assert!(verified.verified);
        let session = verified.session.unwrap();
        assert_eq!(authenticate(&conn, &session.token).unwrap().phone, "5550001111");

        // Single use.
        let again = verify_login_code(&conn, &state.config, &verify_request("5550001111", &code));
        assert!(matches!(again, Err(AppError::InvalidCode(_))));
    }

    #[tokio::test]
    async fn test_login_code_resend_window() {
        let state = test_state();
        let request = LoginCodeRequest {
            phone: "5550003333".to_string(),
        };
        send_login_code(&state, request.clone()).await.unwrap();

        let result = send_login_code(&state, request).await;
        assert!(matches!(result, Err(AppError::TooManyRequests(_))));
    }

    #[tokio::test]
    async fn test_login_code_attempt_cap() {
        let state = test_state();
        send_login_code(
            &state,
            LoginCodeRequest {
                phone: "5550003333".to_string(),
            },
        )
        .await
        .unwrap();
        let code = stored_login_code(&state, "5550003333");
        let conn = state.conn().unwrap();

        for _ in 0..state.config.otp_max_attempts {
            let wrong = verify_request("5550003333", other_code(&code));
            let result = verify_login_code(&conn, &state.config, &wrong);
            assert!(matches!(result, Err(AppError::InvalidCode(_))));
        }
        let result = verify_login_code(&conn, &state.config, &verify_request("5550003333", &code));
        assert!(matches!(result, Err(AppError::TooManyRequests(_))));
    }

    #[test]
    fn test_login_code_expiry_and_unregistered_phone() {
        let state = test_state();
        let conn = state.conn().unwrap();
        let past = Utc::now().naive_utc() - Duration::minutes(1);
        queries::insert_login_code(&conn, "5550003333", "123456", &past).unwrap();
        let result = verify_login_code(&conn, &state.config, &verify_request("5550003333", "123456"));
        assert!(matches!(result, Err(AppError::CodeExpired(_))));

        let future = Utc::now().naive_utc() + Duration::minutes(5);
        queries::insert_login_code(&conn, "5550004444", "654321", &future).unwrap();
        let verified =
            verify_login_code(&conn, &state.config, &verify_request("5550004444", "654321"))
                .unwrap();
        assert!(verified.verified);
        assert!(verified.session.is_none());
    }

    #[tokio::test]
    async fn test_bad_credentials_are_unauthorized() {
        let state = test_state();
        signup(&state, signup_request("5550001111", Role::Customer))
            .await
            .unwrap();

        let wrong_password = login(
            &state,
            LoginRequest {
                phone: "5550001111".to_string(),
                password: "nope-nope".to_string(),
            },
        )
        .await;
        assert!(matches!(wrong_password, Err(AppError::Unauthorized)));

        let unknown = login(
            &state,
            LoginRequest {
                phone: "5559999999".to_string(),
                password: "hunter22".to_string(),
            },
        )
        .await;
        assert!(matches!(unknown, Err(AppError::Unauthorized)));
    }
}
