#![doc = include_str!("../README.md")]

use anyhow::{Context, anyhow};
use std::error::Error;
use std::str::FromStr;
use std::time::Duration;

/// Reads an environment variable for the current process.
///
/// Compared to [std::env::var] there are a couple of differences:
///
/// - [var] uses [dotenvy] which loads the `.env` file from the current or
///   parent directories before returning the value.
///
/// - [var] returns `Ok(None)` (instead of `Err`) if an environment variable
///   wasn't set.
#[track_caller]
pub fn var(key: &str) -> anyhow::Result<Option<String>> {
    match dotenvy::var(key) {
        Ok(content) => Ok(Some(content)),
        Err(dotenvy::Error::EnvVar(std::env::VarError::NotPresent)) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Reads an environment variable for the current process, and fails if it was
/// not found.
#[track_caller]
pub fn required_var(key: &str) -> anyhow::Result<String> {
    var(key)?.ok_or_else(|| anyhow!("Failed to find required {key} environment variable"))
}

/// Reads an environment variable for the current process, and parses it if
/// it is set.
#[track_caller]
pub fn var_parsed<R>(key: &str) -> anyhow::Result<Option<R>>
where
    R: FromStr,
    R::Err: Error + Send + Sync + 'static,
{
    let Some(content) = var(key)? else {
        return Ok(None);
    };

    let value = content
        .parse()
        .with_context(|| format!("Failed to parse {key} environment variable"))?;

    Ok(Some(value))
}

/// Reads an environment variable holding a whole number of seconds.
#[track_caller]
pub fn var_secs(key: &str) -> anyhow::Result<Option<Duration>> {
    Ok(var_parsed(key)?.map(Duration::from_secs))
}

/// Reads an environment variable holding a whole number of milliseconds.
#[track_caller]
pub fn var_millis(key: &str) -> anyhow::Result<Option<Duration>> {
    Ok(var_parsed(key)?.map(Duration::from_millis))
}
