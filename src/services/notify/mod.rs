pub mod twilio;

use async_trait::async_trait;

use crate::models::{Booking, EventKind};

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, to: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to, body, "notification");
        Ok(())
    }
}

/// Recipients and texts for an event, usually the party who did not cause it.
///
/// Codes are handed over in person, so no message ever contains one.
pub fn messages_for(kind: EventKind, booking: &Booking) -> Vec<(String, String)> {
    let service = &booking.service;
    let to_customer = |body: String| vec![(booking.customer_phone.clone(), body)];
    let to_provider = |body: String| vec![(booking.provider_phone.clone(), body)];

    match kind {
        EventKind::Created => {
            let when = match (&booking.scheduled_date, &booking.scheduled_time) {
                (Some(date), Some(time)) => format!(" for {date} at {time}"),
                _ => " (immediate)".to_string(),
            };
            to_provider(format!("New {service} booking request{when}."))
        }
        EventKind::Accepted => to_customer(format!(
            "Your {service} booking was accepted. Ask the provider for the acceptance code when they arrive."
        )),
        EventKind::Rejected => to_customer(format!("Your {service} booking was declined.")),
        EventKind::AcceptanceVerified => {
            to_provider(format!("The customer verified your arrival for {service}."))
        }
        EventKind::CompletionTriggered => to_customer(format!(
            "Your {service} job is marked finished. Ask the provider for the completion code to leave a review."
        )),
        EventKind::Completed => to_provider(format!("Your {service} job was reviewed and closed.")),
        EventKind::Cancelled => {
            let body = format!("The {service} booking was cancelled.");
            vec![
                (booking.customer_phone.clone(), body.clone()),
                (booking.provider_phone.clone(), body),
            ]
        }
        EventKind::CodeReissued => vec![],
    }
}
