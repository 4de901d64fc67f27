//! Recovery sweep for extraction jobs abandoned in `processing`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::db::DbPool;
use crate::error::AppResult;

/// A job in `processing` without an update for longer than this is presumed
/// orphaned by a dead worker.
pub const STUCK_JOB_TIMEOUT_MINUTES: i64 = 5;

/// Reset jobs stuck since before `now - 5 minutes`. Returns the count.
pub async fn recover_stuck_jobs(pool: &DbPool, now: DateTime<Utc>) -> AppResult<u64> {
    let cutoff = now - chrono::Duration::minutes(STUCK_JOB_TIMEOUT_MINUTES);
    let reset = pool.reset_stuck_jobs(cutoff, now).await?;
    if reset > 0 {
        warn!("Recovered {} extraction jobs stuck in processing", reset);
    }
    Ok(reset)
}

/// Start the stuck-job sweep background task.
pub fn start_stuck_job_sweep(pool: DbPool, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting stuck-job sweep (timeout: {} minutes, interval: {} seconds)",
            STUCK_JOB_TIMEOUT_MINUTES,
            interval_secs
        );

        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

        loop {
            ticker.tick().await;

            if let Err(e) = recover_stuck_jobs(&pool, Utc::now()).await {
                error!("Stuck-job sweep error: {}", e);
            }
        }
    })
}
