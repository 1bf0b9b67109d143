use std::env;

/// Who may cancel an accepted booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancellationPolicy {
    Provider,
    Customer,
    Either,
}

impl CancellationPolicy {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "customer" => CancellationPolicy::Customer,
            "either" | "both" => CancellationPolicy::Either,
            _ => CancellationPolicy::Provider,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub session_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub max_code_attempts: i64,
    pub otp_ttl_minutes: i64,
    pub otp_max_attempts: i64,
    pub otp_resend_seconds: i64,
    pub cancellation_policy: CancellationPolicy,
    pub default_timezone: String,
    pub cors_origin: Option<String>,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "domyservice.db".to_string()),
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            bcrypt_cost: env::var("BCRYPT_COST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(bcrypt::DEFAULT_COST),
            max_code_attempts: env::var("MAX_CODE_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            otp_ttl_minutes: env::var("OTP_EXPIRY_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            otp_max_attempts: env::var("MAX_OTP_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            otp_resend_seconds: env::var("OTP_RESEND_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            cancellation_policy: env::var("CANCELLATION_POLICY")
                .map(|v| CancellationPolicy::parse(&v))
                .unwrap_or(CancellationPolicy::Provider),
            default_timezone: env::var("DEFAULT_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
            cors_origin: env::var("CORS_ORIGIN").ok().filter(|v| !v.is_empty()),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
        }
    }

    pub fn twilio_configured(&self) -> bool {
        !self.twilio_account_sid.is_empty()
            && !self.twilio_auth_token.is_empty()
            && !self.twilio_phone_number.is_empty()
    }
}
