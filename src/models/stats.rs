use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub completed: i64,
    pub cancelled: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.accepted + self.rejected + self.completed + self.cancelled
    }

    pub fn active(&self) -> i64 {
        self.pending + self.accepted
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerStats {
    pub by_status: StatusCounts,
    pub active_bookings: i64,
    pub booking_history: i64,
    pub saved_providers: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub by_status: StatusCounts,
    pub avg_rating: f64,
    pub total_reviews: i64,
    pub customers_served: i64,
    pub active_bookings: i64,
    pub pending_requests: i64,
    pub accepted_jobs: i64,
}
