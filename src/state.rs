use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::BookingEvent;
use crate::services::notify::Notifier;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub notifier: Box<dyn Notifier>,
    pub events_tx: broadcast::Sender<BookingEvent>,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig, notifier: Box<dyn Notifier>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            notifier,
            events_tx,
        }
    }

    /// Locks the connection. Callers must drop the guard before awaiting.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("database lock poisoned")))
    }
}
