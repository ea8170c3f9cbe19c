use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::latch::CompletionLatch;
use crate::rate_limiter::RateLimiter;
use crate::stats::{StatsAggregate, StatusTally};
use crate::transport::Transport;
use crate::worker::{BatchGate, Worker};

/// Aggregated view of one client's workers, built from their local tallies.
#[derive(Debug, Clone)]
pub struct ClientReport {
    pub name: String,
    pub tally: StatusTally,
    pub failures: u64,
}

impl fmt::Display for ClientReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== {} statistics ===", self.name)?;
        for (status, count) in self.tally.iter() {
            writeln!(f, "Status {}: {} requests", status, count)?;
        }
        write!(f, "Total Requests: {}", self.tally.total())
    }
}

/// Runs a fixed set of workers for one logical client. All of them share
/// one rate limiter instance.
pub struct ClientSupervisor {
    pub name: String,
    pub workers: usize,
    pub requests_per_worker: usize,
    pub batch_size: usize,
    pub limiter: Arc<RateLimiter>,
    pub gate: BatchGate,
    pub transport: Arc<dyn Transport>,
    pub stats: Arc<StatsAggregate>,
    pub latch: Arc<CompletionLatch>,
    pub cancel: CancellationToken,
}

impl ClientSupervisor {
    /// Wait for every worker, print the summary to stdout, then signal
    /// completion exactly once.
    pub async fn run(self) -> Result<ClientReport> {
        self.run_with_output(io::stdout()).await
    }

    /// Same as [`ClientSupervisor::run`] with the summary written to `out`.
    /// The summary is written before the latch is signalled on every path,
    /// including a failed worker join.
    pub async fn run_with_output<W: Write>(self, mut out: W) -> Result<ClientReport> {
        info!(actor = %self.name, workers = self.workers, "Starting client");

        let mut handles = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let worker = Worker {
                id,
                client: self.name.clone(),
                requests: self.requests_per_worker,
                batch_size: self.batch_size,
                limiter: self.limiter.clone(),
                gate: self.gate.clone(),
                transport: self.transport.clone(),
                stats: self.stats.clone(),
                cancel: self.cancel.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        let mut report = ClientReport {
            name: self.name.clone(),
            tally: StatusTally::new(),
            failures: 0,
        };
        let mut join_error = None;
        for h in handles {
            match h.await {
                Ok(worker) => {
                    report.tally.merge(&worker.tally);
                    report.failures += worker.failures;
                }
                Err(e) => {
                    warn!(actor = %self.name, "Worker task failed: {}", e);
                    join_error = Some(e);
                }
            }
        }

        if let Err(e) = writeln!(out, "{}", report) {
            warn!(actor = %self.name, "Failed to write summary: {}", e);
        }

        let done = self.latch.signal();
        info!(
            actor = %self.name,
            "Client finished ({}/{} clients done)",
            done,
            self.latch.total()
        );

        match join_error {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }
}
