use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub phone: String,
    pub name: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub years_of_experience: Option<i64>,
    pub service_category: Option<String>,
    pub timezone: String,
    pub rating: f64,
    pub reviews_count: i64,
    pub jobs_completed: i64,
}

/// Fields a provider may set on their own profile. Ratings are derived.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderProfileInput {
    pub bio: Option<String>,
    pub location: Option<String>,
    pub years_of_experience: Option<i64>,
    pub service_category: Option<String>,
    pub timezone: Option<String>,
}

/// Provider as listed to a browsing customer.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCard {
    pub phone: String,
    pub name: String,
    pub service: String,
    pub description: String,
    pub rating: f64,
    pub location: String,
    pub reviews_count: i64,
    pub is_saved: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSearch {
    pub search: Option<String>,
    pub service: Option<String>,
    pub location: Option<String>,
    pub min_rating: Option<f64>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}
