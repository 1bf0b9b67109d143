use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub customer_phone: String,
    pub provider_phone: String,
    pub service: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub booking_type: BookingType,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub status: BookingStatus,
    pub one_time_code: String,
    pub acceptance_code: Option<String>,
    pub completion_code: Option<String>,
    pub acceptance_verified: bool,
    pub acceptance_attempts: i64,
    pub completion_attempts: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// A completion code has been minted and the booking waits for the review.
    pub fn awaiting_review(&self) -> bool {
        self.status == BookingStatus::Accepted && self.completion_code.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "accepted" => Some(BookingStatus::Accepted),
            "rejected" => Some(BookingStatus::Rejected),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" | "canceled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Edges of the booking state machine. Rejected, completed and cancelled
    /// have no way out.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Accepted)
                | (BookingStatus::Pending, BookingStatus::Rejected)
                | (BookingStatus::Accepted, BookingStatus::Completed)
                | (BookingStatus::Accepted, BookingStatus::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingType {
    Immediate,
    Scheduled,
}

impl BookingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingType::Immediate => "immediate",
            BookingType::Scheduled => "scheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "immediate" => Some(BookingType::Immediate),
            "scheduled" => Some(BookingType::Scheduled),
            _ => None,
        }
    }
}

/// Query filter for the booking store. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub customer_phone: Option<String>,
    pub provider_phone: Option<String>,
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    pub fn for_customer(phone: &str) -> Self {
        Self {
            customer_phone: Some(phone.to_string()),
            ..Self::default()
        }
    }

    pub fn for_provider(phone: &str) -> Self {
        Self {
            provider_phone: Some(phone.to_string()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Option<BookingStatus>) -> Self {
        self.status = status;
        self
    }
}

/// Partial update applied to a single booking row.
///
/// `Some(None)` on a code field clears the stored code.
#[derive(Debug, Clone, Default)]
pub struct BookingPatch {
    pub status: Option<BookingStatus>,
    pub acceptance_code: Option<Option<String>>,
    pub completion_code: Option<Option<String>>,
    pub acceptance_verified: Option<bool>,
    pub acceptance_attempts: Option<i64>,
    pub completion_attempts: Option<i64>,
}

/// Booking as shown to one of its parties.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub id: String,
    pub customer_phone: String,
    pub customer_name: String,
    pub provider_phone: String,
    pub provider_name: String,
    pub service: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: BookingStatus,
    pub booking_type: BookingType,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub one_time_code: String,
    pub acceptance_code: Option<String>,
    pub completion_code: Option<String>,
    pub acceptance_verified: bool,
    pub awaiting_review: bool,
    pub created_at: String,
}

impl BookingView {
    /// Codes the provider hands over in person are withheld from the customer.
    pub fn for_customer(booking: Booking, customer_name: String, provider_name: String) -> Self {
        let mut view = Self::build(booking, customer_name, provider_name);
        view.acceptance_code = None;
        view.completion_code = None;
        view
    }

    pub fn for_provider(booking: Booking, customer_name: String, provider_name: String) -> Self {
        Self::build(booking, customer_name, provider_name)
    }

    fn build(booking: Booking, customer_name: String, provider_name: String) -> Self {
        let awaiting_review = booking.awaiting_review();
        Self {
            id: booking.id,
            customer_phone: booking.customer_phone,
            customer_name,
            provider_phone: booking.provider_phone,
            provider_name,
            service: booking.service,
            description: booking.description,
            location: booking.location,
            status: booking.status,
            booking_type: booking.booking_type,
            scheduled_date: booking.scheduled_date,
            scheduled_time: booking.scheduled_time,
            one_time_code: booking.one_time_code,
            acceptance_code: booking.acceptance_code,
            completion_code: booking.completion_code,
            acceptance_verified: booking.acceptance_verified,
            awaiting_review,
            created_at: booking.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        use BookingStatus::*;
        for status in [Pending, Accepted, Rejected, Completed, Cancelled] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("Canceled"), Some(BookingStatus::Cancelled));
        assert_eq!(BookingStatus::parse("done"), None);
    }

    #[test]
    fn test_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Accepted.can_transition_to(Completed));
        assert!(Accepted.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Cancelled));
        assert!(!Accepted.can_transition_to(Rejected));
        for terminal in [Completed, Rejected, Cancelled] {
            for next in [Pending, Accepted, Rejected, Completed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_customer_view_hides_codes() {
        let now = chrono::Utc::now().naive_utc();
        let booking = Booking {
            id: "b1".to_string(),
            customer_phone: "5550001111".to_string(),
            provider_phone: "5550002222".to_string(),
            service: "Plumbing".to_string(),
            description: None,
            location: None,
            booking_type: BookingType::Immediate,
            scheduled_date: None,
            scheduled_time: None,
            status: BookingStatus::Accepted,
            one_time_code: "111111".to_string(),
            acceptance_code: Some("222222".to_string()),
            completion_code: Some("333333".to_string()),
            acceptance_verified: true,
            acceptance_attempts: 0,
            completion_attempts: 0,
            created_at: now,
            updated_at: now,
        };

        let customer = BookingView::for_customer(booking.clone(), "C".into(), "P".into());
        assert_eq!(customer.one_time_code, "111111");
        assert!(customer.acceptance_code.is_none());
        assert!(customer.completion_code.is_none());
        assert!(customer.awaiting_review);

        let provider = BookingView::for_provider(booking, "C".into(), "P".into());
        assert_eq!(provider.acceptance_code.as_deref(), Some("222222"));
        assert_eq!(provider.completion_code.as_deref(), Some("333333"));
    }
}
