//! Run-lock shared by the cron jobs.
//!
//! Every job run first takes the `job_leases` row for its job. A second
//! invocation while the lease is held and unexpired is refused, so overlapping
//! scheduler triggers cannot double-send. The body runs under a timeout and
//! the lease records how the run ended.
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{self, Pool};
use crate::model::JobKind;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{} is already running", .0.as_str())]
    AlreadyRunning(JobKind),
    #[error("{} timed out after {}s", .job.as_str(), .timeout.as_secs())]
    TimedOut { job: JobKind, timeout: Duration },
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Count stored on the lease when a run completes.
pub trait JobOutcome {
    fn processed_count(&self) -> i64;
}

#[derive(Debug, Clone, Copy)]
pub struct LeaseSettings {
    pub ttl: Duration,
    pub timeout: Duration,
}

impl LeaseSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            ttl: Duration::from_secs(cfg.cron.lease_ttl_seconds),
            timeout: Duration::from_secs(cfg.cron.job_timeout_seconds),
        }
    }
}

/// Run `body` while holding the lease for `job`. `body` receives the run id.
#[instrument(skip_all, fields(job = job.as_str()))]
pub async fn run_exclusive<T, F, Fut>(
    pool: &Pool,
    job: JobKind,
    settings: LeaseSettings,
    now: DateTime<Utc>,
    body: F,
) -> Result<T, JobError>
where
    T: JobOutcome,
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let run_id = Uuid::new_v4().to_string();
    let ttl = chrono::Duration::from_std(settings.ttl)
        .map_err(|e| anyhow::anyhow!("lease ttl out of range: {e}"))?;
    if !db::acquire_lease(pool, job, &run_id, now, ttl).await? {
        warn!(job = job.as_str(), "lease held by another run");
        return Err(JobError::AlreadyRunning(job));
    }
    info!(run_id = %run_id, "lease acquired");

    match tokio::time::timeout(settings.timeout, body(run_id.clone())).await {
        Ok(Ok(outcome)) => {
            let count = outcome.processed_count();
            db::complete_lease(pool, job, &run_id, count).await?;
            info!(run_id = %run_id, processed = count, "job completed");
            Ok(outcome)
        }
        Ok(Err(err)) => {
            release_failed(pool, job, &run_id, &format!("{err:#}")).await;
            Err(JobError::Failed(err))
        }
        Err(_) => {
            let err = JobError::TimedOut {
                job,
                timeout: settings.timeout,
            };
            release_failed(pool, job, &run_id, &err.to_string()).await;
            Err(err)
        }
    }
}

async fn release_failed(pool: &Pool, job: JobKind, run_id: &str, reason: &str) {
    if let Err(err) = db::fail_lease(pool, job, run_id, reason).await {
        warn!(?err, run_id, "failed to mark lease as failed");
    }
}
