use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::{ClientReport, ClientSupervisor};
use crate::config::Config;
use crate::error::Result;
use crate::health::{HealthReport, HealthSupervisor};
use crate::latch::CompletionLatch;
use crate::rate_limiter::RateLimiter;
use crate::server::{router, AppState, BoundServer};
use crate::stats::{StatsAggregate, StatsSnapshot};
use crate::transport::{HttpTransport, Transport};
use crate::worker::BatchGate;

/// Everything a finished run observed.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub clients: Vec<ClientReport>,
    pub health: HealthReport,
    /// Final `/stats` snapshot
    pub stats: StatsSnapshot,
}

/// Serve the endpoint, drive it with the client supervisors, supervise
/// liveness until every client finished plus the drain period, then read
/// the stats once and shut the server down.
///
/// Cancelling `cancel` aborts pending rate-limiter waits; the workers log
/// and skip the affected iterations.
pub async fn run(config: Config, cancel: CancellationToken) -> Result<RunReport> {
    let topology = config.topology;
    topology.validate()?;

    let stats = Arc::new(StatsAggregate::new());
    let ingress = Arc::new(RateLimiter::from_config(topology.server_limiter));
    let app = router(AppState::new(stats.clone(), ingress));

    let server = BoundServer::bind(config.addr, app).await?;
    let shutdown = CancellationToken::new();
    let mut handle = server.spawn(shutdown.clone());
    let addr = handle.ready().await?;

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(format!("http://{addr}"))?);
    info!("Using transport: {}", transport.name());
    let latch = Arc::new(CompletionLatch::new(topology.clients.len()));
    // One gate for the whole process: batches are serialized across clients
    let gate = BatchGate::new();

    let health = tokio::spawn(
        HealthSupervisor {
            name: "health".to_string(),
            interval: topology.health_interval,
            drain_ticks: topology.drain_ticks,
            transport: transport.clone(),
            latch: latch.clone(),
        }
        .run(),
    );

    let mut handles = Vec::with_capacity(topology.clients.len());
    for name in &topology.clients {
        let supervisor = ClientSupervisor {
            name: name.clone(),
            workers: topology.workers_per_client,
            requests_per_worker: topology.requests_per_worker,
            batch_size: topology.batch_size,
            limiter: Arc::new(RateLimiter::from_config(topology.client_limiter)),
            gate: gate.clone(),
            transport: transport.clone(),
            stats: stats.clone(),
            latch: latch.clone(),
            cancel: cancel.clone(),
        };
        handles.push(tokio::spawn(supervisor.run()));
    }

    let mut clients = Vec::with_capacity(handles.len());
    for h in handles {
        clients.push(h.await??);
    }

    let health = health.await?;
    info!(
        probes = health.probes,
        failures = health.failures,
        "Health supervision finished"
    );

    let stats = transport.stats().await?;

    shutdown.cancel();
    handle.join().await?;

    Ok(RunReport {
        clients,
        health,
        stats,
    })
}
