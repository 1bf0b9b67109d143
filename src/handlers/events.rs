use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::auth::bearer_token;
use crate::models::BookingEvent;
use crate::services::accounts;
use crate::state::AppState;

// GET /events (SSE stream of the caller's booking events)
#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
    pub last_id: Option<i64>,
}

fn to_sse(event: &BookingEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default()
        .id(event.id.to_string())
        .event("booking_event")
        .data(data)
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // EventSource cannot set headers, so the token may come in the query.
    let token = bearer_token(&headers)
        .or(query.token)
        .ok_or(AppError::Unauthorized)?;

    let last_id = query.last_id.unwrap_or(0);

    // Subscribe before the catch-up read so nothing falls in between.
    let rx = state.events_tx.subscribe();

    let (phone, catchup_events) = {
        let conn = state.conn()?;
        let user = accounts::authenticate(&conn, &token)?;
        let events = queries::get_booking_events_since(&conn, &user.phone, last_id)?;
        (user.phone, events)
    };

    let seen_up_to = catchup_events.last().map(|e| e.id).unwrap_or(last_id);
    let catchup_stream =
        tokio_stream::iter(catchup_events.into_iter().map(|e| Ok::<_, Infallible>(to_sse(&e))));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.id > seen_up_to && event.involves(&phone) => Some(Ok(to_sse(&event))),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "event stream lagged");
            None
        }
    });

    let keepalive_stream = IntervalStream::new(tokio::time::interval(Duration::from_secs(30)))
        .map(|_| Ok(Event::default().comment("keepalive")));

    let combined = catchup_stream.chain(live_stream);
    let merged = StreamExt::merge(combined, keepalive_stream);

    Ok(Sse::new(merged))
}
