use rusqlite::Connection;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BookingPatch, BookingStatus, EventKind, RatingSummary, Review, User};
use crate::services::codes::codes_match;
use crate::services::lifecycle::{load_booking, require_customer, Transition};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;
const MAX_COMMENT_LEN: usize = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub booking_id: String,
    pub completion_code: String,
    pub rating: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub review: Review,
    pub summary: RatingSummary,
    pub transition: Transition,
}

/// Records the customer's review and closes the booking.
///
/// The completion code gates the write. The review row, the move to
/// `completed` and the provider's rating refresh commit together or not at
/// all.
pub fn submit_review(
    conn: &Connection,
    config: &AppConfig,
    actor: &User,
    request: NewReview,
) -> Result<ReviewOutcome, AppError> {
    let booking = load_booking(conn, &request.booking_id)?;
    require_customer(&booking, actor)?;

    if !(MIN_RATING..=MAX_RATING).contains(&request.rating) {
        return Err(AppError::Validation(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}"
        )));
    }
    let comment = request
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if comment.as_ref().is_some_and(|c| c.chars().count() > MAX_COMMENT_LEN) {
        return Err(AppError::Validation(format!(
            "comment must be at most {MAX_COMMENT_LEN} characters"
        )));
    }

    if booking.status == BookingStatus::Completed || queries::review_exists(conn, &booking.id)? {
        return Err(AppError::AlreadyExists(format!(
            "review for booking {}",
            booking.id
        )));
    }
    if !booking.awaiting_review() || !booking.status.can_transition_to(BookingStatus::Completed) {
        return Err(AppError::StateConflict {
            current: booking.status,
            action: "review before completion is triggered",
        });
    }
    if booking.completion_attempts >= config.max_code_attempts {
        return Err(AppError::CodeLocked("completion code"));
    }

    let stored = booking.completion_code.as_deref().unwrap_or_default();
    if !codes_match(stored, &request.completion_code) {
        let patch = BookingPatch {
            completion_attempts: Some(booking.completion_attempts + 1),
            ..Default::default()
        };
        queries::update_booking(conn, &booking.id, &patch, Some(BookingStatus::Accepted))?;
        tracing::warn!(
            booking_id = %booking.id,
            attempts = booking.completion_attempts + 1,
            "completion code mismatch"
        );
        return Err(AppError::InvalidCode("completion code"));
    }

    let review = Review {
        id: uuid::Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        provider_phone: booking.provider_phone.clone(),
        customer_phone: booking.customer_phone.clone(),
        rating: request.rating,
        comment,
        created_at: queries::format_ts(&chrono::Utc::now().naive_utc()),
    };

    let tx = conn.unchecked_transaction()?;

    queries::insert_review(&tx, &review)?;
    let patch = BookingPatch {
        status: Some(BookingStatus::Completed),
        ..Default::default()
    };
    if !queries::update_booking(&tx, &booking.id, &patch, Some(BookingStatus::Accepted))? {
        // Dropping the transaction rolls the review back.
        let current = queries::get_booking(&tx, &booking.id)?
            .map(|b| b.status)
            .unwrap_or(booking.status);
        return Err(AppError::StateConflict {
            current,
            action: "complete",
        });
    }
    let summary = queries::refresh_provider_rating(&tx, &booking.provider_phone)?;
    let completed = load_booking(&tx, &booking.id)?;
    let event = queries::insert_booking_event(&tx, &completed, EventKind::Completed)?;

    tx.commit()?;

    tracing::info!(
        booking_id = %completed.id,
        provider = %completed.provider_phone,
        rating = review.rating,
        "review recorded, booking completed"
    );

    Ok(ReviewOutcome {
        review,
        summary,
        transition: Transition {
            booking: completed,
            event,
        },
    })
}
