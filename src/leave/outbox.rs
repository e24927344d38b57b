use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::store::{LeaveStore, StoreError};

const BATCH_SIZE: u32 = 100;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub failed: usize,
    /// Entries that used their last attempt in this pass.
    pub exhausted: usize,
}

/// Re-applies balance increments that failed right after an approval.
///
/// Each entry is removed in the same commit that applies it, so an entry is
/// charged once no matter how many passes see it.
pub struct BalanceRetryWorker {
    store: Arc<dyn LeaveStore>,
    max_attempts: u32,
    interval: Duration,
}

impl BalanceRetryWorker {
    pub fn new(store: Arc<dyn LeaveStore>, max_attempts: u32, interval: Duration) -> Self {
        Self {
            store,
            max_attempts,
            interval,
        }
    }

    pub async fn drain_once(&self) -> Result<DrainReport, StoreError> {
        let due = self
            .store
            .due_balance_retries(self.max_attempts, BATCH_SIZE)
            .await?;

        let mut report = DrainReport::default();
        for entry in due {
            let pending = &entry.pending;
            match self.store.apply_balance_increment(&entry).await {
                Ok(()) => {
                    info!(
                        leave_id = pending.request_id,
                        attempts = entry.attempts + 1,
                        "Deferred balance increment applied"
                    );
                    report.applied += 1;
                }
                Err(err) => {
                    self.store
                        .fail_balance_retry(entry.id, &err.to_string())
                        .await?;
                    report.failed += 1;

                    if entry.attempts + 1 >= self.max_attempts {
                        report.exhausted += 1;
                        warn!(
                            error = %err,
                            leave_id = pending.request_id,
                            requester_id = pending.key.requester_id,
                            year = pending.key.year,
                            days = pending.days,
                            "Giving up on balance increment"
                        );
                    } else {
                        debug!(error = %err, leave_id = pending.request_id, "Balance retry failed");
                    }
                }
            }
        }
        Ok(report)
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.drain_once().await {
                Ok(report) if report != DrainReport::default() => {
                    info!(?report, "Balance retry pass finished");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Balance retry pass failed"),
            }
        }
    }
}
