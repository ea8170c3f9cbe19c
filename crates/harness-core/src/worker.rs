use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::rate_limiter::RateLimiter;
use crate::stats::{StatsAggregate, StatusTally};
use crate::transport::Transport;

/// Exclusive lock held across one batch of requests. Every worker handed a
/// clone of the same gate is serialized at batch granularity, so the scope
/// of serialization is whoever shares the gate.
#[derive(Debug, Clone, Default)]
pub struct BatchGate {
    lock: Arc<Mutex<()>>,
}

impl BatchGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enter(&self) -> OwnedMutexGuard<()> {
        self.lock.clone().lock_owned().await
    }
}

/// What a worker observed locally.
#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    pub tally: StatusTally,
    /// Iterations abandoned on a limiter, build or transport error
    pub failures: u64,
}

pub struct Worker {
    pub id: usize,
    pub client: String,
    pub requests: usize,
    pub batch_size: usize,
    pub limiter: Arc<RateLimiter>,
    pub gate: BatchGate,
    pub transport: Arc<dyn Transport>,
    pub stats: Arc<StatsAggregate>,
    pub cancel: CancellationToken,
}

impl Worker {
    /// Issue the fixed number of requests in gated batches. Failures are
    /// logged and skipped, never escalated.
    pub async fn run(self) -> WorkerReport {
        let mut report = WorkerReport::default();
        let batch_size = self.batch_size.max(1);
        let mut issued = 0;

        while issued < self.requests {
            let batch_len = batch_size.min(self.requests - issued);
            // Released after the last slot of the batch on every path
            let _batch = self.gate.enter().await;
            debug!(actor = %self.client, worker = self.id, issued, "batch started");

            for _ in 0..batch_len {
                issued += 1;
                match self.request().await {
                    Ok(status) => {
                        report.tally.record(status);
                        self.stats.record_client(&self.client, status).await;
                    }
                    Err(e) => {
                        warn!(actor = %self.client, worker = self.id, "Request failed: {}", e);
                        report.failures += 1;
                    }
                }
            }
        }

        report
    }

    async fn request(&self) -> Result<axum::http::StatusCode> {
        self.limiter.wait(&self.cancel).await?;
        self.transport.submit(&self.client).await
    }
}
