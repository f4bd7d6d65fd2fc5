//! Background jobs: scheduled link cleanup and rate-limit counter sweeps

use std::sync::Arc;

use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::magic_link::MagicLinkService;
use crate::middleware::RateLimiter;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

/// Start the in-process cleanup job on `schedule`.
///
/// The expression uses the six-field form with seconds, e.g. `0 0 3 * * *`.
pub async fn start_cleanup_scheduler(
    schedule: &str,
    service: Arc<MagicLinkService>,
) -> Result<JobScheduler, JobError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_id, _scheduler| {
        let service = service.clone();
        Box::pin(async move {
            if let Err(e) = service.cleanup().await {
                tracing::error!(error = %e, "Scheduled magic link cleanup failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(schedule = %schedule, "Magic link cleanup scheduled");
    Ok(scheduler)
}

/// Discard elapsed rate-limit windows once per window
pub async fn rate_limit_sweeper(rate_limiter: RateLimiter) {
    let period = rate_limiter
        .window()
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(60));

    tracing::info!(period_secs = period.as_secs(), "Starting rate limit sweeper");

    loop {
        tokio::time::sleep(period).await;

        let dropped = rate_limiter.sweep().await;
        if dropped > 0 {
            tracing::debug!(dropped, "Expired rate limit windows dropped");
        }
    }
}
