use chrono::{TimeDelta, Utc};
use claims::{assert_none, assert_some};
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use queuectl_test_db::TestDatabase;
use queuectl_worker::schema::{jobs, settings};
use queuectl_worker::{Job, JobState, NewJob, RetryPolicy, Runner, storage};
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};

fn runner(pool: Pool<AsyncPgConnection>) -> Runner {
    Runner::new(pool)
        .num_workers(2)
        .poll_interval(Duration::from_millis(100))
        .shutdown_when_queue_empty()
}

async fn enqueue(conn: &mut AsyncPgConnection, id: &str, command: &str, max_retries: i64) {
    let job = NewJob::new(id, command, max_retries).unwrap();
    storage::enqueue(conn, &job).await.unwrap();
}

async fn get(conn: &mut AsyncPgConnection, id: &str) -> Job {
    storage::get_by_id(conn, id).await.unwrap().unwrap()
}

async fn wait_for_state(conn: &mut AsyncPgConnection, id: &str, state: JobState) {
    let result = timeout(Duration::from_secs(10), async move {
        while get(conn, id).await.state != state {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    assert!(result.is_ok(), "job {id} never reached state {state}");
}

/// Makes a waiting job eligible right away instead of sleeping through its
/// backoff.
async fn expire_backoff(conn: &mut AsyncPgConnection, id: &str) {
    diesel::update(jobs::table.find(id))
        .set(jobs::retry_after_time.eq(Utc::now() - TimeDelta::seconds(1)))
        .execute(conn)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_job_is_completed() {
    let test_database = TestDatabase::new();
    let mut conn = test_database.async_connect().await;

    enqueue(&mut conn, "job1", "echo hello", 3).await;

    let runner = runner(test_database.async_pool());
    runner.start().wait_for_shutdown().await;

    let job = get(&mut conn, "job1").await;
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 0);
    assert_none!(job.retry_after_time);
}

#[tokio::test(flavor = "multi_thread")]
async fn single_attempt_failure_goes_to_dead_letter_queue() {
    let test_database = TestDatabase::new();
    let mut conn = test_database.async_connect().await;

    enqueue(&mut conn, "job1", "exit 1", 1).await;

    let runner = runner(test_database.async_pool());
    runner.start().wait_for_shutdown().await;

    let job = get(&mut conn, "job1").await;
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 1);
    assert_none!(job.retry_after_time);

    let dead = storage::query(&mut conn, Some(JobState::Dead)).await.unwrap();
    assert_eq!(dead.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_job_backs_off_exponentially() {
    let test_database = TestDatabase::new();
    let mut conn = test_database.async_connect().await;

    enqueue(&mut conn, "job1", "false", 3).await;
    let runner = runner(test_database.async_pool());

    // First failure waits base^1 seconds.
    let before = Utc::now();
    runner.start().wait_for_shutdown().await;
    let after = Utc::now();

    let job = get(&mut conn, "job1").await;
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 1);
    let retry_after = assert_some!(job.retry_after_time);
    assert!(retry_after >= before + TimeDelta::seconds(2) - TimeDelta::milliseconds(1));
    assert!(retry_after <= after + TimeDelta::seconds(2));

    // Still backing off, so nothing is claimed.
    runner.start().wait_for_shutdown().await;
    assert_eq!(get(&mut conn, "job1").await, job);

    // Once the backoff has elapsed the second failure waits base^2 seconds.
    while Utc::now() < retry_after {
        sleep(Duration::from_millis(100)).await;
    }

    let before = Utc::now();
    runner.start().wait_for_shutdown().await;
    let after = Utc::now();

    let job = get(&mut conn, "job1").await;
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 2);
    let retry_after = assert_some!(job.retry_after_time);
    assert!(retry_after >= before + TimeDelta::seconds(4) - TimeDelta::milliseconds(1));
    assert!(retry_after <= after + TimeDelta::seconds(4));

    // The third failure exhausts the attempts.
    expire_backoff(&mut conn, "job1").await;
    runner.start().wait_for_shutdown().await;

    let job = get(&mut conn, "job1").await;
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 3);
    assert_none!(job.retry_after_time);
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_base_is_read_from_settings() {
    let test_database = TestDatabase::new();
    let mut conn = test_database.async_connect().await;

    diesel::insert_into(settings::table)
        .values((settings::key.eq("retry_base"), settings::value.eq("5")))
        .execute(&mut conn)
        .await
        .unwrap();

    enqueue(&mut conn, "job1", "false", 3).await;

    let before = Utc::now();
    runner(test_database.async_pool())
        .start()
        .wait_for_shutdown()
        .await;
    let after = Utc::now();

    let retry_after = assert_some!(get(&mut conn, "job1").await.retry_after_time);
    assert!(retry_after >= before + TimeDelta::seconds(5) - TimeDelta::milliseconds(1));
    assert!(retry_after <= after + TimeDelta::seconds(5));
}

#[tokio::test(flavor = "multi_thread")]
async fn explicit_retry_policy_overrides_settings() {
    let test_database = TestDatabase::new();
    let mut conn = test_database.async_connect().await;

    diesel::insert_into(settings::table)
        .values((settings::key.eq("retry_base"), settings::value.eq("5")))
        .execute(&mut conn)
        .await
        .unwrap();

    enqueue(&mut conn, "job1", "false", 3).await;

    let policy = RetryPolicy::new(10).with_max_delay(Duration::from_secs(3));
    let before = Utc::now();
    runner(test_database.async_pool())
        .retry_policy(policy)
        .start()
        .wait_for_shutdown()
        .await;
    let after = Utc::now();

    let retry_after = assert_some!(get(&mut conn, "job1").await.retry_after_time);
    assert!(retry_after >= before + TimeDelta::seconds(3) - TimeDelta::milliseconds(1));
    assert!(retry_after <= after + TimeDelta::seconds(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn every_job_runs_exactly_once() {
    const JOBS: usize = 12;

    let test_database = TestDatabase::new();
    let mut conn = test_database.async_connect().await;

    for i in 0..JOBS {
        enqueue(&mut conn, &format!("job{i}"), "true", 3).await;
    }

    runner(test_database.async_pool())
        .num_workers(4)
        .start()
        .wait_for_shutdown()
        .await;

    let counts = storage::counts_by_state(&mut conn).await.unwrap();
    assert_eq!(counts.completed, JOBS as i64);
    assert_eq!(counts.total(), JOBS as i64);

    let jobs = storage::query(&mut conn, None).await.unwrap();
    assert!(jobs.iter().all(|job| job.attempts == 0));
}

#[tokio::test(flavor = "multi_thread")]
async fn running_job_is_marked_processing() {
    let test_database = TestDatabase::new();
    let mut conn = test_database.async_connect().await;

    enqueue(&mut conn, "job1", "sleep 1", 3).await;

    let handle = runner(test_database.async_pool()).start();
    wait_for_state(&mut conn, "job1", JobState::Processing).await;

    // A second claim must not see the job while it runs.
    assert_none!(storage::claim_next(&mut conn).await.unwrap());

    handle.wait_for_shutdown().await;
    assert_eq!(get(&mut conn, "job1").await.state, JobState::Completed);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_waits_for_running_job() {
    let test_database = TestDatabase::new();
    let mut conn = test_database.async_connect().await;

    enqueue(&mut conn, "job1", "sleep 1", 3).await;
    enqueue(&mut conn, "job2", "true", 3).await;

    let handle = Runner::new(test_database.async_pool())
        .poll_interval(Duration::from_millis(100))
        .start();
    wait_for_state(&mut conn, "job1", JobState::Processing).await;

    let aborted = handle.shutdown(Duration::from_secs(10)).await;
    assert_eq!(aborted, 0);

    assert_eq!(get(&mut conn, "job1").await.state, JobState::Completed);
    // No new job is claimed after shutdown was requested.
    assert_eq!(get(&mut conn, "job2").await.state, JobState::Pending);
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_workers_stop_promptly() {
    let test_database = TestDatabase::new();

    let handle = Runner::new(test_database.async_pool())
        .num_workers(3)
        .poll_interval(Duration::from_secs(60))
        .start();

    // Let the workers reach their idle sleep.
    sleep(Duration::from_millis(500)).await;

    let started = Instant::now();
    let aborted = handle.shutdown(Duration::from_secs(10)).await;
    assert_eq!(aborted, 0);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_workers_finish_their_job_and_exit() {
    let test_database = TestDatabase::new();
    let mut conn = test_database.async_connect().await;

    enqueue(&mut conn, "job1", "sleep 1", 3).await;
    enqueue(&mut conn, "job2", "true", 3).await;

    let handle = Runner::new(test_database.async_pool())
        .num_workers(1)
        .poll_interval(Duration::from_secs(60))
        .start();
    wait_for_state(&mut conn, "job1", JobState::Processing).await;

    handle.cancellation_token().cancel();

    let result = timeout(Duration::from_secs(10), handle.wait_for_shutdown()).await;
    assert!(result.is_ok(), "workers kept running after cancellation");

    assert_eq!(get(&mut conn, "job1").await.state, JobState::Completed);
    assert_eq!(get(&mut conn, "job2").await.state, JobState::Pending);
}

#[tokio::test(flavor = "multi_thread")]
async fn workers_exceeding_grace_period_are_aborted() {
    let test_database = TestDatabase::new();
    let mut conn = test_database.async_connect().await;

    enqueue(&mut conn, "job1", "sleep 30", 3).await;

    let handle = Runner::new(test_database.async_pool())
        .num_workers(2)
        .poll_interval(Duration::from_millis(100))
        .start();
    wait_for_state(&mut conn, "job1", JobState::Processing).await;

    let started = Instant::now();
    let aborted = handle.shutdown(Duration::from_millis(500)).await;
    assert_eq!(aborted, 1);
    assert!(started.elapsed() < Duration::from_secs(5));

    // The aborted job is left behind as `processing`.
    let job = get(&mut conn, "job1").await;
    assert_eq!(job.state, JobState::Processing);
    assert_eq!(job.attempts, 0);
}
