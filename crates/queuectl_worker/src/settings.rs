//! Read access to the persisted `settings` table.
//!
//! Settings are plain key/value strings. Workers read them once when they
//! start; changes only affect workers started afterwards.

use crate::errors::InvalidSetting;
use crate::job::DEFAULT_MAX_RETRIES;
use crate::retry::{DEFAULT_RETRY_BASE, RetryPolicy};
use crate::schema::settings;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::time::Duration;
use tracing::warn;

/// Base of the exponential backoff, in seconds.
pub const RETRY_BASE: &str = "retry_base";
/// Optional upper bound for a single backoff delay, in seconds.
pub const RETRY_MAX_DELAY: &str = "retry_max_delay";
/// Attempt budget for jobs enqueued without an explicit `max_retries`.
pub const MAX_RETRIES: &str = "max_retries";

/// Keys whose values must be positive integers.
pub const INTEGER_KEYS: [&str; 3] = [RETRY_BASE, RETRY_MAX_DELAY, MAX_RETRIES];

pub async fn get(conn: &mut AsyncPgConnection, key: &str) -> QueryResult<Option<String>> {
    settings::table
        .find(key)
        .select(settings::value)
        .first::<String>(conn)
        .await
        .optional()
}

/// Keys are case-insensitive and stored in lowercase.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

/// Stores `value` under the normalized `key`, replacing any previous value.
///
/// Values of the [`INTEGER_KEYS`] must be positive integers, other keys are
/// stored as they are.
pub async fn set(conn: &mut AsyncPgConnection, key: &str, value: &str) -> anyhow::Result<()> {
    validate(key, value)?;
    let key = normalize_key(key);

    diesel::insert_into(settings::table)
        .values((settings::key.eq(&key), settings::value.eq(value)))
        .on_conflict(settings::key)
        .do_update()
        .set(settings::value.eq(value))
        .execute(conn)
        .await?;

    Ok(())
}

pub fn validate(key: &str, value: &str) -> Result<(), InvalidSetting> {
    let key = normalize_key(key);
    let valid = !INTEGER_KEYS.contains(&key.as_str())
        || value.parse::<u64>().is_ok_and(|parsed| parsed >= 1);

    if valid {
        Ok(())
    } else {
        Err(InvalidSetting {
            key,
            value: value.to_string(),
        })
    }
}

/// All settings, ordered by key.
pub async fn all(conn: &mut AsyncPgConnection) -> QueryResult<Vec<(String, String)>> {
    settings::table
        .select((settings::key, settings::value))
        .order(settings::key)
        .load(conn)
        .await
}

/// Resolves the backoff policy from `retry_base` and `retry_max_delay`.
///
/// Invalid values are logged and replaced by the defaults.
pub async fn retry_policy(conn: &mut AsyncPgConnection) -> QueryResult<RetryPolicy> {
    let base = get(conn, RETRY_BASE).await?;
    let base = parse_positive(RETRY_BASE, base.as_deref()).unwrap_or(DEFAULT_RETRY_BASE);

    let max_delay = get(conn, RETRY_MAX_DELAY).await?;
    let max_delay = parse_positive::<u64>(RETRY_MAX_DELAY, max_delay.as_deref());

    let policy = RetryPolicy::new(base);
    Ok(match max_delay {
        Some(seconds) => policy.with_max_delay(Duration::from_secs(seconds)),
        None => policy,
    })
}

pub async fn default_max_retries(conn: &mut AsyncPgConnection) -> QueryResult<i64> {
    let value = get(conn, MAX_RETRIES).await?;
    Ok(parse_positive(MAX_RETRIES, value.as_deref()).unwrap_or(DEFAULT_MAX_RETRIES))
}

fn parse_positive<T>(key: &str, value: Option<&str>) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    let value = value?;
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed >= T::from(1) => Some(parsed),
        _ => {
            warn!(setting.key = key, setting.value = value, "Ignoring invalid setting");
            None
        }
    }
}
