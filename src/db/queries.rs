use chrono::{NaiveDateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Booking, BookingEvent, BookingFilter, BookingPatch, BookingStatus, BookingType,
    CustomerProfile, EventKind, ProviderCard, ProviderProfile, ProviderProfileInput,
    LoginCode, ProviderSearch, RatingSummary, Review, Role, Session, StatusCounts, User,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

fn now_str() -> String {
    format_ts(&Utc::now().naive_utc())
}

// ── Users ──

pub fn create_user(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, phone, name, role, password_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id,
            user.phone,
            user.name,
            user.role.as_str(),
            user.password_hash,
            format_ts(&user.created_at),
        ],
    )?;
    Ok(())
}

const USER_COLUMNS: &str = "id, phone, name, role, password_hash, created_at";

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let role_str: String = row.get(3)?;
    let created_at_str: String = row.get(5)?;
    let role = Role::parse(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown role in database: {role_str}").into(),
        )
    })?;
    Ok(User {
        id: row.get(0)?,
        phone: row.get(1)?,
        name: row.get(2)?,
        role,
        password_hash: row.get(4)?,
        created_at: parse_ts(&created_at_str),
    })
}

pub fn get_user_by_phone(conn: &Connection, phone: &str) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE phone = ?1"),
            params![phone],
            parse_user_row,
        )
        .optional()?;
    Ok(user)
}

/// Display name for a phone number, or "Unknown" for unregistered numbers.
pub fn get_user_name(conn: &Connection, phone: &str) -> anyhow::Result<String> {
    let name: Option<String> = conn
        .query_row(
            "SELECT name FROM users WHERE phone = ?1",
            params![phone],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name.unwrap_or_else(|| "Unknown".to_string()))
}

// ── Sessions ──

pub fn create_session(conn: &Connection, session: &Session) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![session.token, session.user_id, format_ts(&session.expires_at)],
    )?;
    Ok(())
}

/// Resolves a live session to its user. Expired sessions are ignored.
pub fn get_session_user(conn: &Connection, token: &str) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT u.id, u.phone, u.name, u.role, u.password_hash, u.created_at
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token = ?1 AND s.expires_at > ?2",
            params![token, now_str()],
            parse_user_row,
        )
        .optional()?;
    Ok(user)
}

pub fn delete_session(conn: &Connection, token: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(count > 0)
}

pub fn delete_expired_sessions(conn: &Connection) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![now_str()],
    )?;
    Ok(count)
}

// ── Login Codes ──

pub fn insert_login_code(
    conn: &Connection,
    phone: &str,
    code: &str,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO login_codes (phone, code, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![phone, code, format_ts(expires_at), now_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Whether a code was sent to `phone` after `since`.
pub fn login_code_sent_since(
    conn: &Connection,
    phone: &str,
    since: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let recent: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM login_codes WHERE phone = ?1 AND created_at > ?2)",
        params![phone, format_ts(since)],
        |row| row.get(0),
    )?;
    Ok(recent)
}

/// Newest unused code for `phone`, expired or not.
pub fn latest_login_code(conn: &Connection, phone: &str) -> anyhow::Result<Option<LoginCode>> {
    let code = conn
        .query_row(
            "SELECT id, code, attempts, expires_at FROM login_codes
             WHERE phone = ?1 AND used = 0
             ORDER BY id DESC LIMIT 1",
            params![phone],
            |row| {
                let expires_at: String = row.get(3)?;
                Ok(LoginCode {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    attempts: row.get(2)?,
                    expires_at: parse_ts(&expires_at),
                })
            },
        )
        .optional()?;
    Ok(code)
}

pub fn record_login_code_attempt(conn: &Connection, id: i64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE login_codes SET attempts = attempts + 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Marks a code used. False if it was already used.
pub fn consume_login_code(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE login_codes SET used = 1 WHERE id = ?1 AND used = 0",
        params![id],
    )?;
    Ok(count > 0)
}

pub fn delete_login_code(conn: &Connection, id: i64) -> anyhow::Result<()> {
    conn.execute("DELETE FROM login_codes WHERE id = ?1", params![id])?;
    Ok(())
}

// ── Provider Profiles ──

const PROFILE_SELECT: &str = "SELECT p.phone, u.name, p.bio, p.location, p.years_of_experience,
        p.service_category, p.timezone, p.rating, p.reviews_count, p.jobs_completed
     FROM provider_profiles p JOIN users u ON u.phone = p.phone";

fn parse_profile_row(row: &rusqlite::Row) -> rusqlite::Result<ProviderProfile> {
    Ok(ProviderProfile {
        phone: row.get(0)?,
        name: row.get(1)?,
        bio: row.get(2)?,
        location: row.get(3)?,
        years_of_experience: row.get(4)?,
        service_category: row.get(5)?,
        timezone: row.get(6)?,
        rating: row.get(7)?,
        reviews_count: row.get(8)?,
        jobs_completed: row.get(9)?,
    })
}

pub fn create_provider_profile(
    conn: &Connection,
    phone: &str,
    input: &ProviderProfileInput,
    default_timezone: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO provider_profiles (phone, bio, location, years_of_experience, service_category, timezone)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            phone,
            input.bio,
            input.location,
            input.years_of_experience,
            input.service_category,
            input.timezone.as_deref().unwrap_or(default_timezone),
        ],
    )?;
    Ok(())
}

/// Applies only the fields present in `input`.
pub fn update_provider_profile(
    conn: &Connection,
    phone: &str,
    input: &ProviderProfileInput,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE provider_profiles SET
           bio = COALESCE(?2, bio),
           location = COALESCE(?3, location),
           years_of_experience = COALESCE(?4, years_of_experience),
           service_category = COALESCE(?5, service_category),
           timezone = COALESCE(?6, timezone)
         WHERE phone = ?1",
        params![
            phone,
            input.bio,
            input.location,
            input.years_of_experience,
            input.service_category,
            input.timezone,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_provider_profile(
    conn: &Connection,
    phone: &str,
) -> anyhow::Result<Option<ProviderProfile>> {
    let profile = conn
        .query_row(
            &format!("{PROFILE_SELECT} WHERE p.phone = ?1"),
            params![phone],
            parse_profile_row,
        )
        .optional()?;
    Ok(profile)
}

pub fn delete_provider_profile(conn: &Connection, phone: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM provider_profiles WHERE phone = ?1",
        params![phone],
    )?;
    Ok(count > 0)
}

/// Substring pattern for `LIKE ... ESCAPE '\'` with wildcards in `text`
/// matched literally.
fn like_pattern(text: &str) -> String {
    let mut pattern = String::from("%");
    for c in text.trim().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Provider cards for a browsing customer, best rated first.
pub fn search_providers(
    conn: &Connection,
    customer_phone: &str,
    search: &ProviderSearch,
) -> anyhow::Result<Vec<ProviderCard>> {
    let mut sql = String::from(
        "SELECT u.phone, u.name, p.bio, p.location, p.service_category,
                COALESCE(p.rating, 0.0), COALESCE(p.reviews_count, 0),
                EXISTS(SELECT 1 FROM saved_providers s
                       WHERE s.customer_phone = ?1 AND s.provider_phone = u.phone)
         FROM users u LEFT JOIN provider_profiles p ON p.phone = u.phone
         WHERE u.role = 'provider'",
    );
    let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(customer_phone.to_string())];

    if let Some(text) = search.search.as_deref().filter(|s| !s.trim().is_empty()) {
        values.push(Box::new(like_pattern(text)));
        let n = values.len();
        sql.push_str(&format!(
            " AND (u.name LIKE ?{n} ESCAPE '\\' OR p.bio LIKE ?{n} ESCAPE '\\'
                  OR p.location LIKE ?{n} ESCAPE '\\')"
        ));
    }
    if let Some(service) = search
        .service
        .as_deref()
        .filter(|s| !s.trim().is_empty() && !s.eq_ignore_ascii_case("all"))
    {
        values.push(Box::new(like_pattern(service)));
        let n = values.len();
        sql.push_str(&format!(
            " AND (p.service_category LIKE ?{n} ESCAPE '\\' OR p.bio LIKE ?{n} ESCAPE '\\')"
        ));
    }
    if let Some(location) = search
        .location
        .as_deref()
        .filter(|s| !s.trim().is_empty() && !s.eq_ignore_ascii_case("all"))
    {
        values.push(Box::new(like_pattern(location)));
        sql.push_str(&format!(" AND p.location LIKE ?{} ESCAPE '\\'", values.len()));
    }
    if let Some(min_rating) = search.min_rating {
        values.push(Box::new(min_rating));
        sql.push_str(&format!(" AND COALESCE(p.rating, 0.0) >= ?{}", values.len()));
    }

    let limit = search.limit.unwrap_or(100).clamp(1, 100);
    let skip = search.skip.unwrap_or(0).max(0);
    values.push(Box::new(limit));
    values.push(Box::new(skip));
    sql.push_str(&format!(
        " ORDER BY COALESCE(p.rating, 0.0) DESC, u.name ASC LIMIT ?{} OFFSET ?{}",
        values.len() - 1,
        values.len()
    ));

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        let bio: Option<String> = row.get(2)?;
        let location: Option<String> = row.get(3)?;
        let category: Option<String> = row.get(4)?;
        let rating: f64 = row.get(5)?;
        Ok(ProviderCard {
            phone: row.get(0)?,
            name: row.get(1)?,
            service: category
                .or_else(|| bio.as_deref().and_then(service_from_bio))
                .unwrap_or_else(|| "General Services".to_string()),
            description: bio.unwrap_or_else(|| "No description available".to_string()),
            rating: (rating * 10.0).round() / 10.0,
            location: location.unwrap_or_else(|| "Location not specified".to_string()),
            reviews_count: row.get(6)?,
            is_saved: row.get(7)?,
        })
    })?;

    let mut cards = vec![];
    for row in rows {
        cards.push(row?);
    }
    Ok(cards)
}

/// Signup writes bios as "Experienced {service} in {location}".
pub fn service_from_bio(bio: &str) -> Option<String> {
    let rest = bio.split_once("Experienced ")?.1;
    let service = rest.split(" in ").next()?.trim();
    (!service.is_empty()).then(|| service.to_string())
}

// ── Customer Profiles ──

pub fn get_customer_profile(
    conn: &Connection,
    phone: &str,
) -> anyhow::Result<Option<CustomerProfile>> {
    let profile = conn
        .query_row(
            "SELECT phone, address, location, preferences FROM customer_profiles WHERE phone = ?1",
            params![phone],
            |row| {
                Ok(CustomerProfile {
                    phone: row.get(0)?,
                    address: row.get(1)?,
                    location: row.get(2)?,
                    preferences: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(profile)
}

pub fn save_customer_profile(conn: &Connection, profile: &CustomerProfile) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO customer_profiles (phone, address, location, preferences)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(phone) DO UPDATE SET
           address = excluded.address,
           location = excluded.location,
           preferences = excluded.preferences",
        params![
            profile.phone,
            profile.address,
            profile.location,
            profile.preferences,
        ],
    )?;
    Ok(())
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, customer_phone, provider_phone, service, description, location, \
     booking_type, scheduled_date, scheduled_time, status, one_time_code, acceptance_code, \
     completion_code, acceptance_verified, acceptance_attempts, completion_attempts, created_at, updated_at";

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ),
        params![
            booking.id,
            booking.customer_phone,
            booking.provider_phone,
            booking.service,
            booking.description,
            booking.location,
            booking.booking_type.as_str(),
            booking.scheduled_date,
            booking.scheduled_time,
            booking.status.as_str(),
            booking.one_time_code,
            booking.acceptance_code,
            booking.completion_code,
            booking.acceptance_verified as i32,
            booking.acceptance_attempts,
            booking.completion_attempts,
            format_ts(&booking.created_at),
            format_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Bookings matching `filter`, newest first.
pub fn list_bookings(conn: &Connection, filter: &BookingFilter) -> anyhow::Result<Vec<Booking>> {
    let mut clauses: Vec<String> = vec![];
    let mut values: Vec<Box<dyn ToSql>> = vec![];

    if let Some(phone) = &filter.customer_phone {
        values.push(Box::new(phone.clone()));
        clauses.push(format!("customer_phone = ?{}", values.len()));
    }
    if let Some(phone) = &filter.provider_phone {
        values.push(Box::new(phone.clone()));
        clauses.push(format!("provider_phone = ?{}", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(Box::new(status.as_str()));
        clauses.push(format!("status = ?{}", values.len()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings{where_sql} ORDER BY created_at DESC, rowid DESC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Applies `patch` to one booking. With `expected_status` the update only
/// lands if the row is still in that status; returns whether a row changed.
pub fn update_booking(
    conn: &Connection,
    id: &str,
    patch: &BookingPatch,
    expected_status: Option<BookingStatus>,
) -> anyhow::Result<bool> {
    let mut sets: Vec<String> = vec![];
    let mut values: Vec<Box<dyn ToSql>> = vec![];

    if let Some(status) = patch.status {
        values.push(Box::new(status.as_str()));
        sets.push(format!("status = ?{}", values.len()));
    }
    if let Some(code) = &patch.acceptance_code {
        values.push(Box::new(code.clone()));
        sets.push(format!("acceptance_code = ?{}", values.len()));
    }
    if let Some(code) = &patch.completion_code {
        values.push(Box::new(code.clone()));
        sets.push(format!("completion_code = ?{}", values.len()));
    }
    if let Some(verified) = patch.acceptance_verified {
        values.push(Box::new(verified as i32));
        sets.push(format!("acceptance_verified = ?{}", values.len()));
    }
    if let Some(attempts) = patch.acceptance_attempts {
        values.push(Box::new(attempts));
        sets.push(format!("acceptance_attempts = ?{}", values.len()));
    }
    if let Some(attempts) = patch.completion_attempts {
        values.push(Box::new(attempts));
        sets.push(format!("completion_attempts = ?{}", values.len()));
    }

    values.push(Box::new(now_str()));
    sets.push(format!("updated_at = ?{}", values.len()));

    values.push(Box::new(id.to_string()));
    let mut sql = format!(
        "UPDATE bookings SET {} WHERE id = ?{}",
        sets.join(", "),
        values.len()
    );
    if let Some(status) = expected_status {
        values.push(Box::new(status.as_str()));
        sql.push_str(&format!(" AND status = ?{}", values.len()));
    }

    let params_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let count = conn.execute(&sql, params_refs.as_slice())?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let booking_type_str: String = row.get(6)?;
    let status_str: String = row.get(9)?;
    let created_at_str: String = row.get(16)?;
    let updated_at_str: String = row.get(17)?;

    let booking_type = BookingType::parse(&booking_type_str)
        .ok_or_else(|| anyhow::anyhow!("unknown booking type in database: {booking_type_str}"))?;
    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown booking status in database: {status_str}"))?;

    Ok(Booking {
        id: row.get(0)?,
        customer_phone: row.get(1)?,
        provider_phone: row.get(2)?,
        service: row.get(3)?,
        description: row.get(4)?,
        location: row.get(5)?,
        booking_type,
        scheduled_date: row.get(7)?,
        scheduled_time: row.get(8)?,
        status,
        one_time_code: row.get(10)?,
        acceptance_code: row.get(11)?,
        completion_code: row.get(12)?,
        acceptance_verified: row.get::<_, i32>(13)? != 0,
        acceptance_attempts: row.get(14)?,
        completion_attempts: row.get(15)?,
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

// ── Reviews ──

pub fn insert_review(conn: &Connection, review: &Review) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO reviews (id, booking_id, provider_phone, customer_phone, rating, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            review.id,
            review.booking_id,
            review.provider_phone,
            review.customer_phone,
            review.rating,
            review.comment,
            review.created_at,
        ],
    )?;
    Ok(())
}

pub fn review_exists(conn: &Connection, booking_id: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM reviews WHERE booking_id = ?1",
        params![booking_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_reviews_for_provider(
    conn: &Connection,
    provider_phone: &str,
    limit: i64,
) -> anyhow::Result<Vec<Review>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, provider_phone, customer_phone, rating, comment, created_at
         FROM reviews WHERE provider_phone = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![provider_phone, limit], |row| {
        Ok(Review {
            id: row.get(0)?,
            booking_id: row.get(1)?,
            provider_phone: row.get(2)?,
            customer_phone: row.get(3)?,
            rating: row.get(4)?,
            comment: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;

    let mut reviews = vec![];
    for row in rows {
        reviews.push(row?);
    }
    Ok(reviews)
}

pub fn rating_summary(conn: &Connection, provider_phone: &str) -> anyhow::Result<RatingSummary> {
    let (avg, count): (Option<f64>, i64) = conn.query_row(
        "SELECT AVG(rating), COUNT(*) FROM reviews WHERE provider_phone = ?1",
        params![provider_phone],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(RatingSummary {
        rating: avg.unwrap_or(0.0),
        reviews_count: count,
    })
}

/// Recomputes the derived rating columns on the provider's profile.
pub fn refresh_provider_rating(
    conn: &Connection,
    provider_phone: &str,
) -> anyhow::Result<RatingSummary> {
    let summary = rating_summary(conn, provider_phone)?;
    conn.execute(
        "UPDATE provider_profiles SET
           rating = ?2,
           reviews_count = ?3,
           jobs_completed = (SELECT COUNT(*) FROM bookings
                             WHERE provider_phone = ?1 AND status = 'completed')
         WHERE phone = ?1",
        params![provider_phone, summary.rating, summary.reviews_count],
    )?;
    Ok(summary)
}

// ── Saved Providers ──

pub fn save_provider(
    conn: &Connection,
    customer_phone: &str,
    provider_phone: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "INSERT INTO saved_providers (customer_phone, provider_phone) VALUES (?1, ?2)
         ON CONFLICT(customer_phone, provider_phone) DO NOTHING",
        params![customer_phone, provider_phone],
    )?;
    Ok(count > 0)
}

pub fn unsave_provider(
    conn: &Connection,
    customer_phone: &str,
    provider_phone: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM saved_providers WHERE customer_phone = ?1 AND provider_phone = ?2",
        params![customer_phone, provider_phone],
    )?;
    Ok(count > 0)
}

pub fn list_saved_provider_phones(
    conn: &Connection,
    customer_phone: &str,
) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT provider_phone FROM saved_providers WHERE customer_phone = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![customer_phone], |row| row.get(0))?;

    let mut phones = vec![];
    for row in rows {
        phones.push(row?);
    }
    Ok(phones)
}

pub fn count_saved_providers(conn: &Connection, customer_phone: &str) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM saved_providers WHERE customer_phone = ?1",
        params![customer_phone],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Stats ──

pub enum Party {
    Customer,
    Provider,
}

pub fn count_bookings_by_status(
    conn: &Connection,
    party: Party,
    phone: &str,
) -> anyhow::Result<StatusCounts> {
    let column = match party {
        Party::Customer => "customer_phone",
        Party::Provider => "provider_phone",
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT status, COUNT(*) FROM bookings WHERE {column} = ?1 GROUP BY status"
    ))?;
    let rows = stmt.query_map(params![phone], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = StatusCounts::default();
    for row in rows {
        let (status, count) = row?;
        match BookingStatus::parse(&status) {
            Some(BookingStatus::Pending) => counts.pending = count,
            Some(BookingStatus::Accepted) => counts.accepted = count,
            Some(BookingStatus::Rejected) => counts.rejected = count,
            Some(BookingStatus::Completed) => counts.completed = count,
            Some(BookingStatus::Cancelled) => counts.cancelled = count,
            None => tracing::warn!(status = %status, "ignoring unknown booking status"),
        }
    }
    Ok(counts)
}

pub fn count_customers_served(conn: &Connection, provider_phone: &str) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT customer_phone) FROM bookings
         WHERE provider_phone = ?1 AND status = 'completed'",
        params![provider_phone],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Booking Events ──

pub fn insert_booking_event(
    conn: &Connection,
    booking: &Booking,
    kind: EventKind,
) -> anyhow::Result<BookingEvent> {
    let created_at = now_str();
    conn.execute(
        "INSERT INTO booking_events (booking_id, customer_phone, provider_phone, kind, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            booking.id,
            booking.customer_phone,
            booking.provider_phone,
            kind.as_str(),
            booking.status.as_str(),
            created_at,
        ],
    )?;
    Ok(BookingEvent {
        id: conn.last_insert_rowid(),
        booking_id: booking.id.clone(),
        customer_phone: booking.customer_phone.clone(),
        provider_phone: booking.provider_phone.clone(),
        kind,
        status: booking.status,
        created_at,
    })
}

/// Events involving `phone` with an id greater than `since_id`, oldest first.
pub fn get_booking_events_since(
    conn: &Connection,
    phone: &str,
    since_id: i64,
) -> anyhow::Result<Vec<BookingEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, customer_phone, provider_phone, kind, status, created_at
         FROM booking_events
         WHERE id > ?1 AND (customer_phone = ?2 OR provider_phone = ?2)
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![since_id, phone], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut events = vec![];
    for row in rows {
        let (id, booking_id, customer_phone, provider_phone, kind, status, created_at) = row?;
        let (Some(kind), Some(status)) = (EventKind::parse(&kind), BookingStatus::parse(&status))
        else {
            tracing::warn!(id, "skipping malformed booking event");
            continue;
        };
        events.push(BookingEvent {
            id,
            booking_id,
            customer_phone,
            provider_phone,
            kind,
            status,
            created_at,
        });
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn make_user(phone: &str, name: &str, role: Role) -> User {
        User {
            id: uuid::Uuid::new_v4().to_string(),
            phone: phone.to_string(),
            name: name.to_string(),
            role,
            password_hash: "x".to_string(),
            created_at: Utc::now().naive_utc(),
        }
    }

    fn make_booking(id: &str, customer: &str, provider: &str) -> Booking {
        let now = Utc::now().naive_utc();
        Booking {
            id: id.to_string(),
            customer_phone: customer.to_string(),
            provider_phone: provider.to_string(),
            service: "Plumbing".to_string(),
            description: None,
            location: None,
            booking_type: BookingType::Immediate,
            scheduled_date: None,
            scheduled_time: None,
            status: BookingStatus::Pending,
            one_time_code: "123456".to_string(),
            acceptance_code: None,
            completion_code: None,
            acceptance_verified: false,
            acceptance_attempts: 0,
            completion_attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_booking_create_get_roundtrip() {
        let conn = setup_db();
        let mut booking = make_booking("b1", "5550001111", "5550002222");
        booking.booking_type = BookingType::Scheduled;
        booking.scheduled_date = Some("2030-12-01".to_string());
        booking.scheduled_time = Some("10:00 AM".to_string());
        create_booking(&conn, &booking).unwrap();

        let loaded = get_booking(&conn, "b1").unwrap().unwrap();
        assert_eq!(loaded.booking_type, BookingType::Scheduled);
        assert_eq!(loaded.scheduled_time.as_deref(), Some("10:00 AM"));
        assert_eq!(loaded.status, BookingStatus::Pending);
        assert!(get_booking(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_list_bookings_filters() {
        let conn = setup_db();
        create_booking(&conn, &make_booking("b1", "c1", "p1")).unwrap();
        create_booking(&conn, &make_booking("b2", "c1", "p2")).unwrap();
        create_booking(&conn, &make_booking("b3", "c2", "p1")).unwrap();
        update_booking(
            &conn,
            "b2",
            &BookingPatch {
                status: Some(BookingStatus::Accepted),
                ..Default::default()
            },
            None,
        )
        .unwrap();

        assert_eq!(list_bookings(&conn, &BookingFilter::for_customer("c1")).unwrap().len(), 2);
        assert_eq!(list_bookings(&conn, &BookingFilter::for_provider("p1")).unwrap().len(), 2);
        let accepted = list_bookings(
            &conn,
            &BookingFilter::for_customer("c1").with_status(Some(BookingStatus::Accepted)),
        )
        .unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].id, "b2");
        assert_eq!(list_bookings(&conn, &BookingFilter::default()).unwrap().len(), 3);
    }

    #[test]
    fn test_guarded_update_first_writer_wins() {
        let conn = setup_db();
        create_booking(&conn, &make_booking("b1", "c1", "p1")).unwrap();

        let accept = BookingPatch {
            status: Some(BookingStatus::Accepted),
            acceptance_code: Some(Some("654321".to_string())),
            ..Default::default()
        };
        let reject = BookingPatch {
            status: Some(BookingStatus::Rejected),
            ..Default::default()
        };

        assert!(update_booking(&conn, "b1", &accept, Some(BookingStatus::Pending)).unwrap());
        assert!(!update_booking(&conn, "b1", &reject, Some(BookingStatus::Pending)).unwrap());

        let loaded = get_booking(&conn, "b1").unwrap().unwrap();
        assert_eq!(loaded.status, BookingStatus::Accepted);
        assert_eq!(loaded.acceptance_code.as_deref(), Some("654321"));
    }

    #[test]
    fn test_patch_can_clear_codes() {
        let conn = setup_db();
        let mut booking = make_booking("b1", "c1", "p1");
        booking.status = BookingStatus::Accepted;
        booking.acceptance_code = Some("654321".to_string());
        create_booking(&conn, &booking).unwrap();

        let patch = BookingPatch {
            status: Some(BookingStatus::Cancelled),
            acceptance_code: Some(None),
            completion_code: Some(None),
            ..Default::default()
        };
        assert!(update_booking(&conn, "b1", &patch, None).unwrap());
        let loaded = get_booking(&conn, "b1").unwrap().unwrap();
        assert!(loaded.acceptance_code.is_none());
        assert_eq!(loaded.status, BookingStatus::Cancelled);
    }

    #[test]
    fn test_sessions_expire() {
        let conn = setup_db();
        let user = make_user("5550001111", "Alice", Role::Customer);
        create_user(&conn, &user).unwrap();

        let live = Session {
            token: "live".to_string(),
            user_id: user.id.clone(),
            expires_at: Utc::now().naive_utc() + chrono::Duration::hours(1),
        };
        let stale = Session {
            token: "stale".to_string(),
            user_id: user.id.clone(),
            expires_at: Utc::now().naive_utc() - chrono::Duration::hours(1),
        };
        create_session(&conn, &live).unwrap();
        create_session(&conn, &stale).unwrap();

        assert_eq!(get_session_user(&conn, "live").unwrap().unwrap().phone, "5550001111");
        assert!(get_session_user(&conn, "stale").unwrap().is_none());
        assert_eq!(delete_expired_sessions(&conn).unwrap(), 1);
        assert!(delete_session(&conn, "live").unwrap());
        assert!(get_session_user(&conn, "live").unwrap().is_none());
    }

    #[test]
    fn test_search_providers_filters_and_saved_flag() {
        let conn = setup_db();
        for (phone, name, service, location) in [
            ("5550000001", "Bob", "Plumbing", "Springfield"),
            ("5550000002", "Carol", "Electrical", "Shelbyville"),
        ] {
            create_user(&conn, &make_user(phone, name, Role::Provider)).unwrap();
            let input = ProviderProfileInput {
                bio: Some(format!("Experienced {service} in {location}")),
                location: Some(location.to_string()),
                ..Default::default()
            };
            create_provider_profile(&conn, phone, &input, "UTC").unwrap();
        }
        create_user(&conn, &make_user("5559999999", "Cust", Role::Customer)).unwrap();
        save_provider(&conn, "5559999999", "5550000002").unwrap();

        let all = search_providers(&conn, "5559999999", &ProviderSearch::default()).unwrap();
        assert_eq!(all.len(), 2);

        let search = ProviderSearch {
            service: Some("electrical".to_string()),
            ..Default::default()
        };
        let electric = search_providers(&conn, "5559999999", &search).unwrap();
        assert_eq!(electric.len(), 1);
        assert_eq!(electric[0].name, "Carol");
        assert_eq!(electric[0].service, "Electrical");
        assert!(electric[0].is_saved);

        let search = ProviderSearch {
            location: Some("All".to_string()),
            search: Some("bob".to_string()),
            ..Default::default()
        };
        let bob = search_providers(&conn, "5559999999", &search).unwrap();
        assert_eq!(bob.len(), 1);
        assert!(!bob[0].is_saved);
    }

    #[test]
    fn test_search_wildcards_match_literally() {
        let conn = setup_db();
        create_user(&conn, &make_user("5550000001", "Bob", Role::Provider)).unwrap();
        create_user(&conn, &make_user("5550000002", "Sam_100%", Role::Provider)).unwrap();

        for (text, expected) in [("%", vec!["Sam_100%"]), ("_", vec!["Sam_100%"]), ("B%", vec![])] {
            let search = ProviderSearch {
                search: Some(text.to_string()),
                ..Default::default()
            };
            let names: Vec<String> = search_providers(&conn, "5559999999", &search)
                .unwrap()
                .into_iter()
                .map(|card| card.name)
                .collect();
            assert_eq!(names, expected, "search {text:?}");
        }
        assert_eq!(like_pattern(" a_b%\\ "), "%a\\_b\\%\\\\%");
    }

    #[test]
    fn test_unknown_role_is_an_error() {
        let conn = setup_db();
        create_user(&conn, &make_user("5550001111", "Alice", Role::Customer)).unwrap();
        conn.execute_batch(
            "PRAGMA ignore_check_constraints = ON;
             UPDATE users SET role = 'admin' WHERE phone = '5550001111';",
        )
        .unwrap();

        assert!(get_user_by_phone(&conn, "5550001111").is_err());
    }

    #[test]
    fn test_service_from_bio() {
        assert_eq!(
            service_from_bio("Experienced Plumbing in Springfield").as_deref(),
            Some("Plumbing")
        );
        assert_eq!(service_from_bio("Handy person"), None);
    }

    #[test]
    fn test_booking_events_filtered_by_party() {
        let conn = setup_db();
        let booking = make_booking("b1", "c1", "p1");
        let other = make_booking("b2", "c2", "p2");
        let first = insert_booking_event(&conn, &booking, EventKind::Created).unwrap();
        insert_booking_event(&conn, &other, EventKind::Created).unwrap();
        insert_booking_event(&conn, &booking, EventKind::Accepted).unwrap();

        let for_provider = get_booking_events_since(&conn, "p1", 0).unwrap();
        assert_eq!(for_provider.len(), 2);
        let after_first = get_booking_events_since(&conn, "c1", first.id).unwrap();
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].kind, EventKind::Accepted);
    }
}
