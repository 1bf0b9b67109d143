//! Booking state machine.
//!
//! `pending → {accepted, rejected}`, `accepted → {completed, cancelled}`.
//! Every transition is a single guarded row update: the write only lands if
//! the booking is still in the status the caller observed, so of two racing
//! writers the second gets a conflict naming the status the first one set.
//! The move to `completed` lives in [`crate::services::reviews`].

use chrono::{NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;
use serde::Deserialize;

use crate::config::{AppConfig, CancellationPolicy};
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Booking, BookingEvent, BookingPatch, BookingStatus, BookingType, EventKind, Role, User,
};
use crate::services::codes::{codes_match, generate_code, generate_code_excluding};

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub provider_phone: String,
    pub service: String,
    pub booking_type: BookingType,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub description: Option<String>,
}

/// Result of a state change: the booking as stored afterwards and the event
/// recorded for it.
#[derive(Debug, Clone)]
pub struct Transition {
    pub booking: Booking,
    pub event: BookingEvent,
}

#[derive(Debug, Clone)]
pub struct Verification {
    pub booking: Booking,
    /// Set on the first successful verification only.
    pub event: Option<BookingEvent>,
}

pub fn create_booking(
    conn: &Connection,
    config: &AppConfig,
    actor: &User,
    request: NewBooking,
) -> Result<Transition, AppError> {
    if actor.role != Role::Customer {
        return Err(AppError::Forbidden("only customers can create bookings".into()));
    }

    let provider_phone = request.provider_phone.trim().to_string();
    match queries::get_user_by_phone(conn, &provider_phone)? {
        Some(user) if user.role == Role::Provider => {}
        _ => return Err(AppError::NotFound("provider".into())),
    }

    let service = request.service.trim().to_string();
    if service.is_empty() {
        return Err(AppError::Validation("service is required".into()));
    }

    let profile = queries::get_provider_profile(conn, &provider_phone)?;
    let timezone = profile
        .as_ref()
        .map(|p| p.timezone.as_str())
        .unwrap_or(config.default_timezone.as_str());

    let (scheduled_date, scheduled_time) = validate_schedule(
        request.booking_type,
        request.scheduled_date.as_deref(),
        request.scheduled_time.as_deref(),
        provider_today(timezone),
    )?;

    let now = Utc::now().naive_utc();
    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        customer_phone: actor.phone.clone(),
        provider_phone,
        service,
        description: request
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        location: profile.and_then(|p| p.location),
        booking_type: request.booking_type,
        scheduled_date,
        scheduled_time,
        status: BookingStatus::Pending,
        one_time_code: generate_code(),
        acceptance_code: None,
        completion_code: None,
        acceptance_verified: false,
        acceptance_attempts: 0,
        completion_attempts: 0,
        created_at: now,
        updated_at: now,
    };

    queries::create_booking(conn, &booking)?;
    let event = queries::insert_booking_event(conn, &booking, EventKind::Created)?;

    tracing::info!(
        booking_id = %booking.id,
        customer = %booking.customer_phone,
        provider = %booking.provider_phone,
        booking_type = booking.booking_type.as_str(),
        "booking created"
    );

    Ok(Transition { booking, event })
}

/// Checks that scheduled bookings carry a date no earlier than `today` and a
/// time, and that immediate bookings carry neither. Blank strings count as
/// absent. Returns the trimmed values to store.
pub fn validate_schedule(
    booking_type: BookingType,
    date: Option<&str>,
    time: Option<&str>,
    today: NaiveDate,
) -> Result<(Option<String>, Option<String>), AppError> {
    let date = date.map(str::trim).filter(|d| !d.is_empty());
    let time = time.map(str::trim).filter(|t| !t.is_empty());

    match booking_type {
        BookingType::Immediate => {
            if date.is_some() || time.is_some() {
                return Err(AppError::Validation(
                    "immediate bookings cannot carry a scheduled date or time".into(),
                ));
            }
            Ok((None, None))
        }
        BookingType::Scheduled => {
            let (Some(date), Some(time)) = (date, time) else {
                return Err(AppError::Validation(
                    "scheduled bookings require both a date and a time".into(),
                ));
            };

            let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                AppError::Validation(format!("invalid scheduled date: {date} (expected YYYY-MM-DD)"))
            })?;
            if day < today {
                return Err(AppError::Validation(format!(
                    "scheduled date {date} is in the past"
                )));
            }
            if parse_time(time).is_none() {
                return Err(AppError::Validation(format!(
                    "invalid scheduled time: {time} (expected HH:MM or HH:MM AM/PM)"
                )));
            }

            Ok((Some(date.to_string()), Some(time.to_string())))
        }
    }
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let upper = s.to_uppercase();
    ["%I:%M %p", "%I:%M%p", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&upper, fmt).ok())
}

/// Calendar day in the provider's time zone. Unknown zones fall back to UTC.
pub fn provider_today(timezone: &str) -> NaiveDate {
    let tz: Tz = timezone.parse().unwrap_or_else(|_| {
        tracing::warn!(timezone, "unknown provider timezone, using UTC");
        Tz::UTC
    });
    Utc::now().with_timezone(&tz).date_naive()
}

pub fn accept_booking(
    conn: &Connection,
    actor: &User,
    booking_id: &str,
) -> Result<Transition, AppError> {
    let booking = load_booking(conn, booking_id)?;
    require_provider(&booking, actor)?;
    require_status(&booking, BookingStatus::Pending, "accept")?;

    let code = generate_code_excluding(&[booking.one_time_code.as_str()]);
    let patch = BookingPatch {
        status: Some(BookingStatus::Accepted),
        acceptance_code: Some(Some(code)),
        acceptance_verified: Some(false),
        acceptance_attempts: Some(0),
        ..Default::default()
    };

    let transition = apply(conn, booking, &patch, "accept", EventKind::Accepted)?;
    tracing::info!(booking_id = %transition.booking.id, "booking accepted");
    Ok(transition)
}

pub fn reject_booking(
    conn: &Connection,
    actor: &User,
    booking_id: &str,
) -> Result<Transition, AppError> {
    let booking = load_booking(conn, booking_id)?;
    require_provider(&booking, actor)?;
    require_status(&booking, BookingStatus::Pending, "reject")?;

    let patch = BookingPatch {
        status: Some(BookingStatus::Rejected),
        ..Default::default()
    };

    let transition = apply(conn, booking, &patch, "reject", EventKind::Rejected)?;
    tracing::info!(booking_id = %transition.booking.id, "booking rejected");
    Ok(transition)
}

/// Customer confirms the provider's identity with the acceptance code they
/// were shown in person. Re-verifying with the right code is a no-op.
pub fn verify_acceptance(
    conn: &Connection,
    config: &AppConfig,
    actor: &User,
    booking_id: &str,
    submitted_code: &str,
) -> Result<Verification, AppError> {
    let booking = load_booking(conn, booking_id)?;
    require_customer(&booking, actor)?;
    require_status(&booking, BookingStatus::Accepted, "verify the acceptance code")?;

    let stored = booking
        .acceptance_code
        .as_deref()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("accepted booking has no acceptance code")))?;

    // Once verified, a miss neither counts toward the lockout nor undoes it.
    if booking.acceptance_verified {
        if !codes_match(stored, submitted_code) {
            return Err(AppError::InvalidCode("acceptance code"));
        }
        return Ok(Verification {
            booking,
            event: None,
        });
    }

    if booking.acceptance_attempts >= config.max_code_attempts {
        return Err(AppError::CodeLocked("acceptance code"));
    }

    if !codes_match(stored, submitted_code) {
        let patch = BookingPatch {
            acceptance_attempts: Some(booking.acceptance_attempts + 1),
            ..Default::default()
        };
        queries::update_booking(conn, &booking.id, &patch, Some(BookingStatus::Accepted))?;
        tracing::warn!(
            booking_id = %booking.id,
            attempts = booking.acceptance_attempts + 1,
            "acceptance code mismatch"
        );
        return Err(AppError::InvalidCode("acceptance code"));
    }

    let patch = BookingPatch {
        acceptance_verified: Some(true),
        acceptance_attempts: Some(0),
        ..Default::default()
    };
    let transition = apply(
        conn,
        booking,
        &patch,
        "verify the acceptance code",
        EventKind::AcceptanceVerified,
    )?;
    tracing::info!(booking_id = %transition.booking.id, "acceptance code verified");

    Ok(Verification {
        booking: transition.booking,
        event: Some(transition.event),
    })
}

/// Provider marks the work finished. Mints the completion code; the booking
/// stays `accepted` until the customer reviews with that code.
pub fn complete_booking(
    conn: &Connection,
    actor: &User,
    booking_id: &str,
) -> Result<Transition, AppError> {
    let booking = load_booking(conn, booking_id)?;
    require_provider(&booking, actor)?;
    require_status(&booking, BookingStatus::Accepted, "complete")?;
    if booking.completion_code.is_some() {
        return Err(AppError::StateConflict {
            current: booking.status,
            action: "trigger completion again",
        });
    }

    let taken = taken_codes(&booking);
    let code = generate_code_excluding(&taken);
    let patch = BookingPatch {
        completion_code: Some(Some(code)),
        completion_attempts: Some(0),
        ..Default::default()
    };

    let transition = apply(
        conn,
        booking,
        &patch,
        "complete",
        EventKind::CompletionTriggered,
    )?;
    tracing::info!(booking_id = %transition.booking.id, "completion code minted");
    Ok(transition)
}

/// Cancels an accepted booking before completion is triggered. Which party
/// may do so is decided by the configured policy.
pub fn cancel_booking(
    conn: &Connection,
    config: &AppConfig,
    actor: &User,
    booking_id: &str,
) -> Result<Transition, AppError> {
    let booking = load_booking(conn, booking_id)?;

    let is_provider = actor.role == Role::Provider && booking.provider_phone == actor.phone;
    let is_customer = actor.role == Role::Customer && booking.customer_phone == actor.phone;
    if !is_provider && !is_customer {
        return Err(AppError::Forbidden("booking belongs to another user".into()));
    }
    let allowed = match config.cancellation_policy {
        CancellationPolicy::Provider => is_provider,
        CancellationPolicy::Customer => is_customer,
        CancellationPolicy::Either => true,
    };
    if !allowed {
        return Err(AppError::Forbidden(format!(
            "{} cannot cancel accepted bookings",
            actor.role
        )));
    }

    require_status(&booking, BookingStatus::Accepted, "cancel")?;
    if booking.completion_code.is_some() {
        return Err(AppError::StateConflict {
            current: booking.status,
            action: "cancel after completion was triggered",
        });
    }

    let patch = BookingPatch {
        status: Some(BookingStatus::Cancelled),
        acceptance_code: Some(None),
        completion_code: Some(None),
        ..Default::default()
    };

    let transition = apply(conn, booking, &patch, "cancel", EventKind::Cancelled)?;
    tracing::info!(
        booking_id = %transition.booking.id,
        by = actor.role.as_str(),
        "booking cancelled"
    );
    Ok(transition)
}

/// Replaces an unverified acceptance code and lifts its lockout.
pub fn reissue_acceptance_code(
    conn: &Connection,
    actor: &User,
    booking_id: &str,
) -> Result<Transition, AppError> {
    let booking = load_booking(conn, booking_id)?;
    require_provider(&booking, actor)?;
    require_status(&booking, BookingStatus::Accepted, "reissue the acceptance code")?;
    if booking.acceptance_verified {
        return Err(AppError::StateConflict {
            current: booking.status,
            action: "reissue an already verified acceptance code",
        });
    }

    let taken = taken_codes(&booking);
    let patch = BookingPatch {
        acceptance_code: Some(Some(generate_code_excluding(&taken))),
        acceptance_attempts: Some(0),
        ..Default::default()
    };

    let transition = apply(
        conn,
        booking,
        &patch,
        "reissue the acceptance code",
        EventKind::CodeReissued,
    )?;
    tracing::info!(booking_id = %transition.booking.id, "acceptance code reissued");
    Ok(transition)
}

/// Replaces the completion code of a booking awaiting review and lifts its
/// lockout.
pub fn reissue_completion_code(
    conn: &Connection,
    actor: &User,
    booking_id: &str,
) -> Result<Transition, AppError> {
    let booking = load_booking(conn, booking_id)?;
    require_provider(&booking, actor)?;
    if !booking.awaiting_review() {
        return Err(AppError::StateConflict {
            current: booking.status,
            action: "reissue a completion code before completion is triggered",
        });
    }

    let taken = taken_codes(&booking);
    let patch = BookingPatch {
        completion_code: Some(Some(generate_code_excluding(&taken))),
        completion_attempts: Some(0),
        ..Default::default()
    };

    let transition = apply(
        conn,
        booking,
        &patch,
        "reissue the completion code",
        EventKind::CodeReissued,
    )?;
    tracing::info!(booking_id = %transition.booking.id, "completion code reissued");
    Ok(transition)
}

// ── Guards ──

pub(crate) fn load_booking(conn: &Connection, booking_id: &str) -> Result<Booking, AppError> {
    queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

pub(crate) fn require_provider(booking: &Booking, actor: &User) -> Result<(), AppError> {
    if actor.role != Role::Provider || booking.provider_phone != actor.phone {
        return Err(AppError::Forbidden(
            "only the booking's provider can do this".into(),
        ));
    }
    Ok(())
}

pub(crate) fn require_customer(booking: &Booking, actor: &User) -> Result<(), AppError> {
    if actor.role != Role::Customer || booking.customer_phone != actor.phone {
        return Err(AppError::Forbidden(
            "only the booking's customer can do this".into(),
        ));
    }
    Ok(())
}

pub(crate) fn require_status(
    booking: &Booking,
    expected: BookingStatus,
    action: &'static str,
) -> Result<(), AppError> {
    if booking.status != expected {
        return Err(AppError::StateConflict {
            current: booking.status,
            action,
        });
    }
    Ok(())
}

fn taken_codes(booking: &Booking) -> Vec<&str> {
    [
        Some(booking.one_time_code.as_str()),
        booking.acceptance_code.as_deref(),
        booking.completion_code.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Writes `patch` guarded on the booking's current status, reloads it and
/// records `kind`. Status changes must be edges of the transition table.
fn apply(
    conn: &Connection,
    booking: Booking,
    patch: &BookingPatch,
    action: &'static str,
    kind: EventKind,
) -> Result<Transition, AppError> {
    if let Some(next) = patch.status {
        if !booking.status.can_transition_to(next) {
            return Err(AppError::StateConflict {
                current: booking.status,
                action,
            });
        }
    }
    if !queries::update_booking(conn, &booking.id, patch, Some(booking.status))? {
        let current = queries::get_booking(conn, &booking.id)?
            .map(|b| b.status)
            .unwrap_or(booking.status);
        return Err(AppError::StateConflict { current, action });
    }

    let booking = load_booking(conn, &booking.id)?;
    let event = queries::insert_booking_event(conn, &booking, kind)?;
    Ok(Transition { booking, event })
}
