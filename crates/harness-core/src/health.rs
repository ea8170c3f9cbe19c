use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::latch::CompletionLatch;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Clients still running; no self-timeout
    Polling,
    /// Every client finished; counts ticks since the transition
    Draining { ticks: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub probes: u64,
    pub failures: u64,
    pub drain_ticks: u32,
}

/// Polls the liveness endpoint on a fixed interval until every client has
/// finished and `drain_ticks` further intervals have elapsed.
pub struct HealthSupervisor {
    pub name: String,
    pub interval: Duration,
    pub drain_ticks: u32,
    pub transport: Arc<dyn Transport>,
    pub latch: Arc<CompletionLatch>,
}

impl HealthSupervisor {
    pub async fn run(self) -> HealthReport {
        let mut report = HealthReport::default();
        let mut phase = Phase::Polling;
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            phase = match phase {
                Phase::Polling if self.latch.is_complete() => {
                    info!(
                        actor = %self.name,
                        "All {} clients finished, draining for {} ticks",
                        self.latch.total(),
                        self.drain_ticks
                    );
                    Phase::Draining { ticks: 0 }
                }
                Phase::Polling => Phase::Polling,
                Phase::Draining { ticks } => Phase::Draining { ticks: ticks + 1 },
            };

            if let Phase::Draining { ticks } = phase {
                report.drain_ticks = ticks;
                if ticks >= self.drain_ticks {
                    self.latch.close();
                    info!(actor = %self.name, "Health supervisor stopping");
                    return report;
                }
            }

            report.probes += 1;
            if !self.probe().await {
                report.failures += 1;
            }
        }
    }

    async fn probe(&self) -> bool {
        match self.transport.health(&self.name).await {
            Ok(StatusCode::OK) => {
                info!(actor = %self.name, "Server available");
                true
            }
            Ok(status) => {
                warn!(
                    actor = %self.name,
                    "Server available but returned non-OK status: {}",
                    status.as_u16()
                );
                false
            }
            Err(e) => {
                warn!(actor = %self.name, "Server unavailable: {}", e);
                false
            }
        }
    }
}
