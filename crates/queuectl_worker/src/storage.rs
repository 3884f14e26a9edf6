use crate::errors::{EnqueueError, RequeueError};
use crate::job::{Job, JobState, NewJob};
use crate::schema::jobs;
use chrono::{DateTime, SubsecRound, Utc};
use diesel::dsl::count;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error};
use diesel::sql_types::{Bool, SingleValue};
use diesel::{insert_into, sql_query, update};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// How long a claim waits for a row or table lock before giving up for this
/// poll cycle.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

define_sql_function!(fn greatest<T: SingleValue>(x: T, y: T) -> T);

/// Number of jobs in each state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub dead: i64,
}

impl StateCounts {
    pub fn get(&self, state: JobState) -> i64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Dead => self.dead,
        }
    }

    pub fn total(&self) -> i64 {
        JobState::VARIANTS.into_iter().map(|state| self.get(state)).sum()
    }

    fn set(&mut self, state: JobState, value: i64) {
        match state {
            JobState::Pending => self.pending = value,
            JobState::Processing => self.processing = value,
            JobState::Completed => self.completed = value,
            JobState::Dead => self.dead = value,
        }
    }
}

/// Inserts a new `pending` job.
///
/// Fails with [`EnqueueError::Conflict`] if a job with the same id exists, in
/// which case nothing is written.
#[instrument(name = "queuectl.enqueue", skip_all, fields(job.id = %job.id))]
pub async fn enqueue(conn: &mut AsyncPgConnection, job: &NewJob) -> Result<Job, EnqueueError> {
    let now = Utc::now();

    let inserted = insert_into(jobs::table)
        .values((
            jobs::id.eq(job.id.as_str()),
            jobs::command.eq(job.command.as_str()),
            jobs::state.eq(JobState::Pending),
            jobs::attempts.eq(0),
            jobs::max_retries.eq(job.max_retries),
            jobs::created_at.eq(now),
            jobs::updated_at.eq(now),
        ))
        .on_conflict_do_nothing()
        .returning(Job::as_returning())
        .get_result(conn)
        .await
        .optional()?;

    inserted.ok_or_else(|| EnqueueError::Conflict(job.id.clone()))
}

fn eligible(
    now: DateTime<Utc>,
) -> Box<dyn BoxableExpression<jobs::table, Pg, SqlType = diesel::sql_types::Nullable<Bool>>> {
    Box::new(
        jobs::state.eq(JobState::Pending).nullable().and(
            jobs::retry_after_time
                .is_null()
                .nullable()
                .or(jobs::retry_after_time.le(now)),
        ),
    )
}

/// Claims the oldest eligible job, see [`claim_next_at`].
pub async fn claim_next(conn: &mut AsyncPgConnection) -> QueryResult<Option<Job>> {
    claim_next_at(conn, Utc::now()).await
}

/// Atomically moves the oldest `pending` job whose backoff has elapsed at
/// `now` into `processing` and returns it.
///
/// Rows locked by a concurrent claim are skipped, so two callers can never
/// claim the same job. Lock timeouts and serialization failures count as "no
/// job available" for this cycle and are not returned as errors.
pub async fn claim_next_at(
    conn: &mut AsyncPgConnection,
    now: DateTime<Utc>,
) -> QueryResult<Option<Job>> {
    let result: QueryResult<Option<Job>> = conn
        .transaction(|conn| {
            async move {
                sql_query(format!(
                    "SET LOCAL lock_timeout = '{}ms'",
                    LOCK_TIMEOUT.as_millis()
                ))
                .execute(conn)
                .await?;

                let Some(id) = jobs::table
                    .select(jobs::id)
                    .filter(eligible(now))
                    .order((jobs::created_at, jobs::id))
                    .for_update()
                    .skip_locked()
                    .first::<String>(conn)
                    .await
                    .optional()?
                else {
                    return Ok(None);
                };

                update(jobs::table.find(id.as_str()))
                    .set((
                        jobs::state.eq(JobState::Processing),
                        jobs::retry_after_time.eq(None::<DateTime<Utc>>),
                        jobs::updated_at.eq(greatest(jobs::updated_at, now)),
                    ))
                    .returning(Job::as_returning())
                    .get_result(conn)
                    .await
                    .map(Some)
            }
            .scope_boxed()
        })
        .await;

    match result {
        Err(error) if is_contention(&error) => {
            debug!(%error, "Contention while claiming a job, retrying next cycle");
            Ok(None)
        }
        result => result,
    }
}

fn is_contention(error: &Error) -> bool {
    match error {
        Error::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => true,
        Error::DatabaseError(_, info) => {
            let message = info.message();
            message.contains("lock timeout") || message.contains("deadlock detected")
        }
        _ => false,
    }
}

/// Persists `state`, `attempts` and `retry_after_time` of a job the caller
/// owns and refreshes its `updated_at`.
#[instrument(name = "queuectl.update_state", skip_all, fields(job.id = %job.id, job.state = %job.state))]
pub async fn update_state(conn: &mut AsyncPgConnection, job: &mut Job) -> QueryResult<()> {
    // Postgres only keeps microseconds.
    let now = Utc::now().max(job.updated_at).trunc_subsecs(6);
    let retry_after_time = job.retry_after_time.map(|time| time.trunc_subsecs(6));

    update(jobs::table.find(job.id.as_str()))
        .set((
            jobs::state.eq(job.state),
            jobs::attempts.eq(job.attempts),
            jobs::retry_after_time.eq(retry_after_time),
            jobs::updated_at.eq(now),
        ))
        .execute(conn)
        .await?;

    job.updated_at = now;
    job.retry_after_time = retry_after_time;
    Ok(())
}

/// Lists jobs, optionally only those in `state`, most recently updated first.
pub async fn query(
    conn: &mut AsyncPgConnection,
    state: Option<JobState>,
) -> QueryResult<Vec<Job>> {
    let mut query = jobs::table
        .select(Job::as_select())
        .order((jobs::updated_at.desc(), jobs::id))
        .into_boxed();

    if let Some(state) = state {
        query = query.filter(jobs::state.eq(state));
    }

    query.load(conn).await
}

pub async fn get_by_id(conn: &mut AsyncPgConnection, id: &str) -> QueryResult<Option<Job>> {
    jobs::table
        .find(id)
        .select(Job::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn counts_by_state(conn: &mut AsyncPgConnection) -> QueryResult<StateCounts> {
    let rows: Vec<(JobState, i64)> = jobs::table
        .group_by(jobs::state)
        .select((jobs::state, count(jobs::id)))
        .load(conn)
        .await?;

    let mut counts = StateCounts::default();
    for (state, count) in rows {
        counts.set(state, count);
    }

    Ok(counts)
}

/// Moves a job from the dead letter queue back to `pending` with its attempt
/// counter reset.
#[instrument(name = "queuectl.requeue", skip(conn))]
pub async fn requeue(conn: &mut AsyncPgConnection, id: &str) -> Result<Job, RequeueError> {
    conn.transaction(|conn| {
        async move {
            let mut job = jobs::table
                .find(id)
                .select(Job::as_select())
                .for_update()
                .first(conn)
                .await
                .optional()?
                .ok_or_else(|| RequeueError::NotFound(id.to_string()))?;

            job.requeue(Utc::now().max(job.updated_at))
                .map_err(|error| RequeueError::NotDead {
                    id: error.id,
                    state: error.actual,
                })?;

            update_state(conn, &mut job).await?;
            Ok(job)
        }
        .scope_boxed()
    })
    .await
}
