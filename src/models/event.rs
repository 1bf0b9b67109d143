use serde::{Deserialize, Serialize};

use super::BookingStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Accepted,
    Rejected,
    AcceptanceVerified,
    CompletionTriggered,
    Completed,
    Cancelled,
    CodeReissued,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Accepted => "accepted",
            EventKind::Rejected => "rejected",
            EventKind::AcceptanceVerified => "acceptance_verified",
            EventKind::CompletionTriggered => "completion_triggered",
            EventKind::Completed => "completed",
            EventKind::Cancelled => "cancelled",
            EventKind::CodeReissued => "code_reissued",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(EventKind::Created),
            "accepted" => Some(EventKind::Accepted),
            "rejected" => Some(EventKind::Rejected),
            "acceptance_verified" => Some(EventKind::AcceptanceVerified),
            "completion_triggered" => Some(EventKind::CompletionTriggered),
            "completed" => Some(EventKind::Completed),
            "cancelled" => Some(EventKind::Cancelled),
            "code_reissued" => Some(EventKind::CodeReissued),
            _ => None,
        }
    }
}

/// A lifecycle change, persisted and fanned out to both parties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingEvent {
    pub id: i64,
    pub booking_id: String,
    pub customer_phone: String,
    pub provider_phone: String,
    pub kind: EventKind,
    pub status: BookingStatus,
    pub created_at: String,
}

impl BookingEvent {
    pub fn involves(&self, phone: &str) -> bool {
        self.customer_phone == phone || self.provider_phone == phone
    }
}
