pub mod booking;
pub mod customer;
pub mod event;
pub mod provider;
pub mod review;
pub mod stats;
pub mod user;

pub use booking::{Booking, BookingFilter, BookingPatch, BookingStatus, BookingType, BookingView};
pub use customer::CustomerProfile;
pub use event::{BookingEvent, EventKind};
pub use provider::{ProviderCard, ProviderProfile, ProviderProfileInput, ProviderSearch};
pub use review::{RatingSummary, Review};
pub use stats::{CustomerStats, ProviderStats, StatusCounts};
pub use user::{LoginCode, Role, Session, User};
