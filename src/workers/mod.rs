use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    task,
    time::{sleep, Instant},
};
use tracing::{error, info, warn};

use crate::{
    jobs::{
        mark_job_done, mark_job_failed, recover_stale_jobs, reserve_job, retry_job_after,
        JobQueueError,
    },
    models::Job,
    state::AppState,
};

pub mod analyze;

#[derive(Debug)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
    stale_after: Duration,
}

impl Worker {
    pub fn new(state: Arc<AppState>, handlers: Vec<Arc<dyn JobHandler>>) -> Self {
        let poll_interval = Duration::from_secs(state.config.worker_poll_interval_secs.max(1));
        let stale_after = Duration::from_secs(state.config.job_stale_after_secs);
        let map = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers: map,
            poll_interval,
            stale_after,
        }
    }

    pub async fn run(&self) {
        info!(
            job_types = ?self.handlers.keys().collect::<Vec<_>>(),
            poll_interval_secs = self.poll_interval.as_secs(),
            "worker started"
        );

        let sweep_every = (self.stale_after / 2).max(self.poll_interval);
        let mut next_sweep = Instant::now();

        loop {
            if Instant::now() >= next_sweep {
                if let Err(err) = self.sweep().await {
                    error!(error = %err, "stale job sweep failed");
                }
                next_sweep = Instant::now() + sweep_every;
            }

            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Requeues jobs a crashed worker left running.
    pub async fn sweep(&self) -> Result<usize, JobQueueError> {
        let state = self.state.clone();
        let stale_after = self.stale_after;
        let recovered = task::spawn_blocking(move || match state.db() {
            Ok(mut conn) => recover_stale_jobs(&mut conn, stale_after),
            Err(err) => {
                error!(?err, "failed to obtain database connection for sweep");
                Ok(0)
            }
        })
        .await
        .unwrap_or_else(|join_err| {
            error!(error = %join_err, "stale job sweep panicked");
            Ok(0)
        })?;

        if recovered > 0 {
            warn!(recovered, "requeued stale jobs");
        }
        Ok(recovered)
    }

    /// Reserves and runs at most one job. Returns whether a job was found.
    pub async fn run_once(&self) -> Result<bool, JobQueueError> {
        let job_types: Vec<&str> = self.handlers.keys().copied().collect();
        if job_types.is_empty() {
            return Ok(false);
        }

        let mut conn = match self.state.db() {
            Ok(conn) => conn,
            Err(err) => {
                error!(?err, "failed to obtain database connection in worker");
                return Ok(false);
            }
        };

        let Some(job) = reserve_job(&mut conn, &job_types)? else {
            return Ok(false);
        };
        drop(conn);

        let Some(handler) = self.handlers.get(job.job_type.as_str()) else {
            error!(job_type = %job.job_type, "no handler registered for job type");
            match self.state.db() {
                Ok(mut conn) => mark_job_failed(&mut conn, job.id, "no handler registered")?,
                Err(err) => error!(?err, "failed to mark unhandled job failed"),
            }
            return Ok(true);
        };

        let execution = handler.handle(self.state.clone(), job.clone()).await;
        let Ok(mut conn) = self.state.db() else {
            error!(job_id = %job.id, "failed to record job outcome due to pool error");
            return Ok(true);
        };

        match execution {
            JobExecution::Success => {
                mark_job_done(&mut conn, job.id)?;
                info!(job_id = %job.id, job_type = %job.job_type, "job completed");
            }
            JobExecution::Retry { delay, error } => {
                warn!(job_id = %job.id, job_type = %job.job_type, attempts = job.attempts, %error, "job will retry");
                retry_job_after(&mut conn, job.id, delay, &error)?;
            }
            JobExecution::Failed { error } => {
                error!(job_id = %job.id, job_type = %job.job_type, %error, "job failed");
                mark_job_failed(&mut conn, job.id, &error)?;
            }
        }
        Ok(true)
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![Arc::new(analyze::AnalyzeDocumentJob::new())]
}
