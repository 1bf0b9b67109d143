use std::sync::Arc;

use crate::models::{Booking, BookingEvent};
use crate::services::notify;
use crate::state::AppState;

/// Fans a recorded event out to SSE subscribers and notifies the other
/// party in the background.
pub fn dispatch(state: &Arc<AppState>, booking: &Booking, event: &BookingEvent) {
    // No receivers is fine.
    let _ = state.events_tx.send(event.clone());

    let messages = notify::messages_for(event.kind, booking);
    if messages.is_empty() {
        return;
    }
    let state = Arc::clone(state);
    let booking_id = booking.id.clone();
    tokio::spawn(async move {
        for (to, body) in messages {
            if let Err(e) = state.notifier.notify(&to, &body).await {
                tracing::warn!(
                    error = %e,
                    booking_id = %booking_id,
                    notifier = state.notifier.name(),
                    "notification failed"
                );
            }
        }
    });
}
