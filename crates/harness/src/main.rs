use anyhow::{Context, Result};
use clap::Parser;
use harness_core::{Config, RunReport};
use std::net::IpAddr;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "harness")]
#[command(about = "Rate-limited load harness driving a simulated endpoint with two clients")]
struct Args {
    /// Port to listen on and target
    #[arg(long, env = "PORT", value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::new(args.host, args.port);

    info!(
        "Starting harness on {} ({} clients, {} workers each, {} requests per worker)",
        config.addr,
        config.topology.clients.len(),
        config.topology.workers_per_client,
        config.topology.requests_per_worker
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling pending rate limiter waits");
                cancel.cancel();
            }
        });
    }

    let report = harness_core::run(config, cancel)
        .await
        .context("Harness run failed")?;

    print_summary(&report)?;
    Ok(())
}

fn print_summary(report: &RunReport) -> Result<()> {
    let failures: u64 = report.clients.iter().map(|c| c.failures).sum();
    let received: u64 = report.clients.iter().map(|c| c.tally.total()).sum();

    println!("\n=== Run Summary ===");
    println!("Responses received: {}", received);
    println!("Failed iterations: {}", failures);
    println!(
        "Health probes: {} ({} failed)",
        report.health.probes, report.health.failures
    );
    println!("Final stats:");
    println!("{}", serde_json::to_string_pretty(&report.stats)?);
    println!();
    Ok(())
}
