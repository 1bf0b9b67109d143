use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub phone: String,
    pub address: Option<String>,
    pub location: Option<String>,
    pub preferences: Option<String>,
}
