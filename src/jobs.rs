//! Durable background jobs stored in the `jobs` table.
//!
//! A job moves `queued -> running -> done | failed`. Retries put it back to
//! `queued` with a later `run_after`. Jobs left `running` by a crashed worker
//! are requeued by [`recover_stale_jobs`].

use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Job, NewJob};
use crate::schema::jobs;

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_DONE: &str = "done";
pub const STATUS_FAILED: &str = "failed";

pub const JOB_ANALYZE_DOCUMENT: &str = "analyze-document";

/// Attempts a job gets before handlers give up on it.
pub const MAX_ATTEMPTS: i32 = 3;

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

pub fn enqueue_job(
    conn: &mut PgConnection,
    job_type: &str,
    payload: Value,
    run_after: Option<NaiveDateTime>,
) -> JobQueueResult<Job> {
    let new_job = NewJob {
        id: Uuid::new_v4(),
        job_type: job_type.to_string(),
        payload,
        status: STATUS_QUEUED.to_string(),
        run_after: run_after.unwrap_or_else(|| Utc::now().naive_utc()),
    };

    let job = diesel::insert_into(jobs::table)
        .values(&new_job)
        .get_result(conn)?;
    Ok(job)
}

/// Claims the oldest runnable job of the given types. Concurrent workers skip
/// rows another worker has locked.
pub fn reserve_job(conn: &mut PgConnection, job_types: &[&str]) -> JobQueueResult<Option<Job>> {
    let now = Utc::now().naive_utc();

    let reserved = conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let candidate = jobs::table
            .filter(jobs::status.eq(STATUS_QUEUED))
            .filter(jobs::run_after.le(now))
            .filter(jobs::job_type.eq_any(job_types))
            .order(jobs::run_after.asc())
            .for_update()
            .skip_locked()
            .first::<Job>(conn)
            .optional()?;

        let Some(job) = candidate else {
            return Ok(None);
        };

        let running = diesel::update(jobs::table.find(job.id))
            .set((
                jobs::status.eq(STATUS_RUNNING),
                jobs::attempts.eq(job.attempts + 1),
                jobs::updated_at.eq(now),
            ))
            .get_result::<Job>(conn)?;
        Ok(Some(running))
    })?;

    Ok(reserved)
}

pub fn mark_job_done(conn: &mut PgConnection, job_id: Uuid) -> JobQueueResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_DONE),
            jobs::last_error.eq::<Option<String>>(None),
            jobs::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn retry_job_after(
    conn: &mut PgConnection,
    job_id: Uuid,
    delay: Duration,
    error_message: &str,
) -> JobQueueResult<()> {
    let now = Utc::now();
    let next_run = now + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(30));

    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_QUEUED),
            jobs::run_after.eq(next_run.naive_utc()),
            jobs::last_error.eq(Some(error_message.to_string())),
            jobs::updated_at.eq(now.naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn mark_job_failed(
    conn: &mut PgConnection,
    job_id: Uuid,
    error_message: &str,
) -> JobQueueResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_FAILED),
            jobs::last_error.eq(Some(error_message.to_string())),
            jobs::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

/// Requeues `running` jobs untouched for longer than `stale_after`. Returns
/// how many were requeued.
pub fn recover_stale_jobs(conn: &mut PgConnection, stale_after: Duration) -> JobQueueResult<usize> {
    let now = Utc::now().naive_utc();
    let cutoff = now - ChronoDuration::from_std(stale_after).unwrap_or_else(|_| ChronoDuration::minutes(10));

    let recovered = diesel::update(
        jobs::table
            .filter(jobs::status.eq(STATUS_RUNNING))
            .filter(jobs::updated_at.lt(cutoff)),
    )
    .set((
        jobs::status.eq(STATUS_QUEUED),
        jobs::run_after.eq(now),
        jobs::last_error.eq(Some("requeued after worker timeout".to_string())),
        jobs::updated_at.eq(now),
    ))
    .execute(conn)?;
    Ok(recovered)
}
