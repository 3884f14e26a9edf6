use crate::errors::InvalidJob;
use crate::schema::jobs;
use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of attempts a job gets when the enqueue payload does not say
/// otherwise.
pub const DEFAULT_MAX_RETRIES: i64 = 3;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    FromSqlRow,
    AsExpression,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Dead,
}

impl JobState {
    pub const VARIANTS: [JobState; 4] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Dead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown job state '{0}', expected one of pending, processing, completed, dead")]
pub struct ParseJobStateError(String);

impl FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::VARIANTS
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseJobStateError(s.to_string()))
    }
}

impl ToSql<Text, Pg> for JobState {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for JobState {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        Ok(value.parse()?)
    }
}

/// A row of the `jobs` table.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = jobs, check_for_backend(Pg))]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set only while the job waits for its next attempt after a failure.
    pub retry_after_time: Option<DateTime<Utc>>,
}

/// The enqueue payload, e.g. `{"id": "job1", "command": "sleep 2"}`.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub max_retries: Option<i64>,
}

impl EnqueueRequest {
    /// Parses a JSON enqueue payload and validates every field it carries.
    ///
    /// A missing `max_retries` is left as `None`, so that callers only need
    /// to look up their default once the payload is known to be valid.
    pub fn from_json(json: &str) -> Result<Self, InvalidJob> {
        let request: Self = serde_json::from_str(json)?;

        check_id(&request.id)?;
        check_command(&request.command)?;
        if let Some(max_retries) = request.max_retries {
            check_max_retries(max_retries)?;
        }

        Ok(request)
    }
}

/// A validated job that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub(crate) id: String,
    pub(crate) command: String,
    pub(crate) max_retries: i32,
}

impl NewJob {
    pub fn new(
        id: impl Into<String>,
        command: impl Into<String>,
        max_retries: i64,
    ) -> Result<Self, InvalidJob> {
        let id = id.into();
        check_id(&id)?;

        let command = command.into();
        check_command(&command)?;

        Ok(Self {
            id,
            command,
            max_retries: check_max_retries(max_retries)?,
        })
    }

    /// `default_max_retries` is used when the payload has no `max_retries`
    /// field.
    pub fn try_from_request(
        request: EnqueueRequest,
        default_max_retries: i64,
    ) -> Result<Self, InvalidJob> {
        let max_retries = request.max_retries.unwrap_or(default_max_retries);
        Self::new(request.id, request.command, max_retries)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }
}

fn check_id(id: &str) -> Result<(), InvalidJob> {
    if id.trim().is_empty() {
        return Err(InvalidJob::EmptyId);
    }
    Ok(())
}

fn check_command(command: &str) -> Result<(), InvalidJob> {
    if command.trim().is_empty() {
        return Err(InvalidJob::EmptyCommand);
    }
    Ok(())
}

fn check_max_retries(max_retries: i64) -> Result<i32, InvalidJob> {
    i32::try_from(max_retries)
        .ok()
        .filter(|max_retries| *max_retries >= 1)
        .ok_or(InvalidJob::InvalidMaxRetries(max_retries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_matches, assert_none, assert_ok, assert_some_eq};

    #[test]
    fn state_round_trips_through_str() {
        for state in JobState::VARIANTS {
            assert_eq!(assert_ok!(state.as_str().parse::<JobState>()), state);
        }

        assert_eq!(assert_ok!("DEAD".parse::<JobState>()), JobState::Dead);

        let error = assert_err!("failed".parse::<JobState>());
        assert_eq!(
            error.to_string(),
            "unknown job state 'failed', expected one of pending, processing, completed, dead"
        );
    }

    #[test]
    fn state_pads_in_tables() {
        assert_eq!(format!("[{:<10}]", JobState::Dead), "[dead      ]");
    }

    #[test]
    fn new_job_from_request() {
        let request = assert_ok!(EnqueueRequest::from_json(
            r#"{"id": "job1", "command": "echo hello"}"#
        ));
        assert_none!(request.max_retries);

        let job = assert_ok!(NewJob::try_from_request(request, DEFAULT_MAX_RETRIES));
        assert_eq!(job.id(), "job1");
        assert_eq!(job.command(), "echo hello");
        assert_eq!(job.max_retries(), 3);

        let request = assert_ok!(EnqueueRequest::from_json(
            r#"{"id": "job2", "command": "false", "max_retries": 5}"#
        ));
        assert_some_eq!(request.max_retries, 5);
        let job = assert_ok!(NewJob::try_from_request(request, 7));
        assert_eq!(job.max_retries(), 5);

        let request = assert_ok!(EnqueueRequest::from_json(
            r#"{"id": "job3", "command": "false"}"#
        ));
        let job = assert_ok!(NewJob::try_from_request(request, 7));
        assert_eq!(job.max_retries(), 7);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let error = assert_err!(EnqueueRequest::from_json(r#"{"id": "job1"}"#));
        assert_matches!(error, InvalidJob::Json(_));

        let error = assert_err!(EnqueueRequest::from_json(r#"{"command": "true"}"#));
        assert_matches!(error, InvalidJob::Json(_));

        let error = assert_err!(EnqueueRequest::from_json("not json"));
        assert_matches!(error, InvalidJob::Json(_));

        let error = assert_err!(EnqueueRequest::from_json(r#"{"id": " ", "command": "true"}"#));
        assert_matches!(error, InvalidJob::EmptyId);

        let error = assert_err!(EnqueueRequest::from_json(r#"{"id": "job1", "command": ""}"#));
        assert_matches!(error, InvalidJob::EmptyCommand);

        let json = r#"{"id": "job1", "command": "true", "max_retries": 0}"#;
        let error = assert_err!(EnqueueRequest::from_json(json));
        assert_matches!(error, InvalidJob::InvalidMaxRetries(0));

        let error = assert_err!(NewJob::new("job1", "true", i64::from(i32::MAX) + 1));
        assert_matches!(error, InvalidJob::InvalidMaxRetries(_));
    }

    #[test]
    fn invalid_default_max_retries_is_rejected() {
        let request = assert_ok!(EnqueueRequest::from_json(r#"{"id": "job1", "command": "true"}"#));
        let error = assert_err!(NewJob::try_from_request(request, 0));
        assert_matches!(error, InvalidJob::InvalidMaxRetries(0));
    }
}
