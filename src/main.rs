use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use domyservice::config::AppConfig;
use domyservice::db;
use domyservice::handlers;
use domyservice::services::notify::twilio::TwilioSmsNotifier;
use domyservice::services::notify::{LogNotifier, Notifier};
use domyservice::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    let purged = db::queries::delete_expired_sessions(&conn)?;
    if purged > 0 {
        tracing::info!(purged, "removed expired sessions");
    }

    let notifier: Box<dyn Notifier> = if config.twilio_configured() {
        tracing::info!("sending notifications through Twilio");
        Box::new(TwilioSmsNotifier::new(
            config.twilio_account_sid.clone(),
            config.twilio_auth_token.clone(),
            config.twilio_phone_number.clone(),
        ))
    } else {
        tracing::info!("Twilio not configured, notifications go to the log");
        Box::new(LogNotifier)
    };

    tracing::info!(
        cancellation_policy = ?config.cancellation_policy,
        max_code_attempts = config.max_code_attempts,
        "booking rules loaded"
    );

    let state = Arc::new(AppState::new(conn, config.clone(), notifier));
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
