use rusqlite::Connection;

use crate::db::queries::{self, Party};
use crate::errors::AppError;
use crate::models::{CustomerStats, ProviderStats};

pub fn customer_stats(conn: &Connection, phone: &str) -> Result<CustomerStats, AppError> {
    let by_status = queries::count_bookings_by_status(conn, Party::Customer, phone)?;
    let saved_providers = queries::count_saved_providers(conn, phone)?;

    Ok(CustomerStats {
        active_bookings: by_status.active(),
        booking_history: by_status.total(),
        saved_providers,
        by_status,
    })
}

pub fn provider_stats(conn: &Connection, phone: &str) -> Result<ProviderStats, AppError> {
    let by_status = queries::count_bookings_by_status(conn, Party::Provider, phone)?;
    let summary = queries::rating_summary(conn, phone)?;
    let customers_served = queries::count_customers_served(conn, phone)?;

    Ok(ProviderStats {
        avg_rating: round_rating(summary.rating),
        total_reviews: summary.reviews_count,
        customers_served,
        active_bookings: by_status.active(),
        pending_requests: by_status.pending,
        accepted_jobs: by_status.accepted,
        by_status,
    })
}

/// One decimal place, as shown on dashboards.
fn round_rating(rating: f64) -> f64 {
    (rating * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{BookingType, StatusCounts};
    use crate::services::lifecycle::{self, NewBooking};
    use crate::services::reviews::{self, NewReview};
    use crate::services::testing::{customer, provider, test_config};

    #[test]
    fn test_round_rating() {
        assert_eq!(round_rating(4.333), 4.3);
        assert_eq!(round_rating(4.25), 4.3);
        assert_eq!(round_rating(0.0), 0.0);
    }

    #[test]
    fn test_stats_for_empty_accounts() {
        let conn = db::init_db(":memory:").unwrap();
        let alice = customer(&conn, "5550001111", "Alice");
        let bob = provider(&conn, "5550002222", "Bob");

        let stats = customer_stats(&conn, &alice.phone).unwrap();
        assert_eq!(stats.by_status, StatusCounts::default());
        assert_eq!(stats.booking_history, 0);

        let stats = provider_stats(&conn, &bob.phone).unwrap();
        assert_eq!(stats.avg_rating, 0.0);
        assert_eq!(stats.total_reviews, 0);
    }

    #[test]
    fn test_stats_follow_lifecycle() {
        let conn = db::init_db(":memory:").unwrap();
        let config = test_config();
        let alice = customer(&conn, "5550001111", "Alice");
        let bob = provider(&conn, "5550002222", "Bob");

        let request = || NewBooking {
            provider_phone: bob.phone.clone(),
            service: "Plumbing".to_string(),
            booking_type: BookingType::Immediate,
            scheduled_date: None,
            scheduled_time: None,
            description: None,
        };

        // One completed, one rejected, one still pending.
        let done = lifecycle::create_booking(&conn, &config, &alice, request()).unwrap();
        lifecycle::accept_booking(&conn, &bob, &done.booking.id).unwrap();
        let triggered = lifecycle::complete_booking(&conn, &bob, &done.booking.id).unwrap();
        reviews::submit_review(
            &conn,
            &config,
            &alice,
            NewReview {
                booking_id: done.booking.id.clone(),
                completion_code: triggered.booking.completion_code.unwrap(),
                rating: 4,
                comment: None,
            },
        )
        .unwrap();

        let rejected = lifecycle::create_booking(&conn, &config, &alice, request()).unwrap();
        lifecycle::reject_booking(&conn, &bob, &rejected.booking.id).unwrap();
        lifecycle::create_booking(&conn, &config, &alice, request()).unwrap();

        queries::save_provider(&conn, &alice.phone, &bob.phone).unwrap();

        let stats = customer_stats(&conn, &alice.phone).unwrap();
        assert_eq!(stats.by_status.completed, 1);
        assert_eq!(stats.by_status.rejected, 1);
        assert_eq!(stats.by_status.pending, 1);
        assert_eq!(stats.active_bookings, 1);
        assert_eq!(stats.booking_history, 3);
        assert_eq!(stats.saved_providers, 1);

        let stats = provider_stats(&conn, &bob.phone).unwrap();
        assert_eq!(stats.avg_rating, 4.0);
        assert_eq!(stats.total_reviews, 1);
        assert_eq!(stats.customers_served, 1);
        assert_eq!(stats.pending_requests, 1);
        assert_eq!(stats.accepted_jobs, 0);
    }
}
