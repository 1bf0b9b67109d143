use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: String,
    pub booking_id: String,
    pub provider_phone: String,
    pub customer_phone: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: String,
}

/// Aggregate over every review a provider has received.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct RatingSummary {
    pub rating: f64,
    pub reviews_count: i64,
}
