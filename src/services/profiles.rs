use chrono_tz::Tz;
use rusqlite::Connection;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    CustomerProfile, ProviderCard, ProviderProfile, ProviderProfileInput, ProviderSearch, Review,
    Role, User,
};

const MAX_REVIEWS: i64 = 50;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerProfileInput {
    pub address: Option<String>,
    pub location: Option<String>,
    pub preferences: Option<String>,
}

fn require_role(actor: &User, role: Role) -> Result<(), AppError> {
    if actor.role != role {
        return Err(AppError::Forbidden(format!("{role} account required")));
    }
    Ok(())
}

fn validate_provider_input(input: &ProviderProfileInput) -> Result<(), AppError> {
    if let Some(years) = input.years_of_experience {
        if !(0..=80).contains(&years) {
            return Err(AppError::Validation(
                "years_of_experience must be between 0 and 80".into(),
            ));
        }
    }
    if let Some(tz) = &input.timezone {
        if tz.parse::<Tz>().is_err() {
            return Err(AppError::Validation(format!("unknown timezone: {tz}")));
        }
    }
    Ok(())
}

// ── Provider profiles ──

pub fn create_provider_profile(
    conn: &Connection,
    config: &AppConfig,
    actor: &User,
    input: &ProviderProfileInput,
) -> Result<ProviderProfile, AppError> {
    require_role(actor, Role::Provider)?;
    validate_provider_input(input)?;

    if queries::get_provider_profile(conn, &actor.phone)?.is_some() {
        return Err(AppError::AlreadyExists("provider profile".into()));
    }
    queries::create_provider_profile(conn, &actor.phone, input, &config.default_timezone)?;
    get_provider_profile(conn, &actor.phone)
}

pub fn update_provider_profile(
    conn: &Connection,
    actor: &User,
    input: &ProviderProfileInput,
) -> Result<ProviderProfile, AppError> {
    require_role(actor, Role::Provider)?;
    validate_provider_input(input)?;

    if !queries::update_provider_profile(conn, &actor.phone, input)? {
        return Err(AppError::NotFound("provider profile".into()));
    }
    get_provider_profile(conn, &actor.phone)
}

pub fn get_provider_profile(conn: &Connection, phone: &str) -> Result<ProviderProfile, AppError> {
    queries::get_provider_profile(conn, phone)?
        .ok_or_else(|| AppError::NotFound(format!("provider profile {phone}")))
}

pub fn delete_provider_profile(conn: &Connection, actor: &User) -> Result<(), AppError> {
    require_role(actor, Role::Provider)?;
    if !queries::delete_provider_profile(conn, &actor.phone)? {
        return Err(AppError::NotFound("provider profile".into()));
    }
    tracing::info!(phone = %actor.phone, "provider profile deleted");
    Ok(())
}

pub fn list_reviews(conn: &Connection, provider_phone: &str) -> Result<Vec<Review>, AppError> {
    Ok(queries::list_reviews_for_provider(conn, provider_phone, MAX_REVIEWS)?)
}

pub fn search_providers(
    conn: &Connection,
    actor: &User,
    search: &ProviderSearch,
) -> Result<Vec<ProviderCard>, AppError> {
    require_role(actor, Role::Customer)?;
    Ok(queries::search_providers(conn, &actor.phone, search)?)
}

// ── Customer profiles ──

/// A customer who never saved a profile gets an empty one.
pub fn get_customer_profile(conn: &Connection, actor: &User) -> Result<CustomerProfile, AppError> {
    require_role(actor, Role::Customer)?;
    Ok(queries::get_customer_profile(conn, &actor.phone)?.unwrap_or_else(|| CustomerProfile {
        phone: actor.phone.clone(),
        ..Default::default()
    }))
}

pub fn save_customer_profile(
    conn: &Connection,
    actor: &User,
    input: CustomerProfileInput,
) -> Result<CustomerProfile, AppError> {
    require_role(actor, Role::Customer)?;
    let profile = CustomerProfile {
        phone: actor.phone.clone(),
        address: input.address,
        location: input.location,
        preferences: input.preferences,
    };
    queries::save_customer_profile(conn, &profile)?;
    Ok(profile)
}

// ── Saved providers ──

pub fn save_provider(conn: &Connection, actor: &User, provider_phone: &str) -> Result<(), AppError> {
    require_role(actor, Role::Customer)?;
    match queries::get_user_by_phone(conn, provider_phone)? {
        Some(user) if user.role == Role::Provider => {}
        _ => return Err(AppError::NotFound(format!("provider {provider_phone}"))),
    }
    if !queries::save_provider(conn, &actor.phone, provider_phone)? {
        return Err(AppError::AlreadyExists("provider already saved".into()));
    }
    Ok(())
}

pub fn unsave_provider(
    conn: &Connection,
    actor: &User,
    provider_phone: &str,
) -> Result<(), AppError> {
    require_role(actor, Role::Customer)?;
    if !queries::unsave_provider(conn, &actor.phone, provider_phone)? {
        return Err(AppError::NotFound("provider not in saved list".into()));
    }
    Ok(())
}

pub fn saved_providers(conn: &Connection, actor: &User) -> Result<Vec<ProviderCard>, AppError> {
    require_role(actor, Role::Customer)?;

    let mut cards = vec![];
    for phone in queries::list_saved_provider_phones(conn, &actor.phone)? {
        // Providers may delete their profile after being saved.
        if let Some(profile) = queries::get_provider_profile(conn, &phone)? {
            cards.push(saved_card(profile));
        }
    }
    Ok(cards)
}

fn saved_card(profile: ProviderProfile) -> ProviderCard {
    let service = profile
        .service_category
        .clone()
        .or_else(|| profile.bio.as_deref().and_then(queries::service_from_bio))
        .unwrap_or_else(|| "General Services".to_string());
    ProviderCard {
        phone: profile.phone,
        name: profile.name,
        service,
        description: profile
            .bio
            .unwrap_or_else(|| "No description available".to_string()),
        rating: (profile.rating * 10.0).round() / 10.0,
        location: profile
            .location
            .unwrap_or_else(|| "Location not specified".to_string()),
        reviews_count: profile.reviews_count,
        is_saved: true,
    }
}
