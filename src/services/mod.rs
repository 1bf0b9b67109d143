pub mod accounts;
pub mod codes;
pub mod events;
pub mod lifecycle;
pub mod notify;
pub mod profiles;
pub mod reviews;
pub mod stats;
