//! chia-exporter: Prometheus exporter for a Chia farm.
//!
//! Polls the full node, wallet, harvester and farmer RPC services on a fixed
//! interval and serves the collected values at `/metrics`.
//!
//! # Usage
//!
//! ```text
//! chia-exporter --fullnode-host 10.0.0.2 --farmer-host 10.0.0.3 --listen-port 9825
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chia_collector::{
    ChiaMetrics, CollectionCycle, CommitMode, CycleConfig, DnsHostnameResolver, Hosts,
    HostnamePolicy, Scheduler,
};
use chia_metrics::MetricRegistry;
use chia_rpc::{RpcConnector, default_root_path, expand_home};
use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "chia-exporter", about = "Prometheus exporter for the Chia blockchain")]
struct Cli {
    /// Host machine for the Chia full node RPC server.
    #[arg(short = 'f', long, visible_alias = "fullnode", default_value = "localhost")]
    fullnode_host: String,

    /// Host machine for the Chia wallet RPC server.
    #[arg(short = 'w', long, visible_alias = "wallet", default_value = "localhost")]
    wallet_host: String,

    /// Host machine for the Chia harvester RPC server.
    #[arg(short = 'a', long, visible_alias = "harvester", default_value = "localhost")]
    harvester_host: String,

    /// Host machine for the Chia farmer RPC server.
    #[arg(short = 'r', long, visible_alias = "farmer", default_value = "localhost")]
    farmer_host: String,

    /// Port to listen on for the exporter.
    #[arg(short = 'p', long, visible_alias = "port", default_value = "9825")]
    listen_port: u16,

    /// Chia root directory holding config/config.yaml. A leading `~` is
    /// expanded.
    #[arg(long, env = "CHIA_ROOT")]
    chia_root: Option<PathBuf>,

    /// Seconds to wait between collection cycles.
    #[arg(long, default_value = "15")]
    interval: u64,

    /// Timeout in seconds for each backend connect, call and reverse lookup.
    #[arg(long, default_value = "10")]
    rpc_timeout: u64,

    /// When a cycle's writes become visible to scrapes.
    #[arg(long, value_enum, default_value = "streaming")]
    commit: Commit,

    /// Abort the cycle when a harvester address cannot be resolved.
    #[arg(long)]
    strict_hostnames: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Commit {
    /// Publish each value as soon as it is retrieved.
    Streaming,
    /// Publish a cycle's values together once it completes.
    Atomic,
}

impl From<Commit> for CommitMode {
    fn from(commit: Commit) -> Self {
        match commit {
            Commit::Streaming => CommitMode::Streaming,
            Commit::Atomic => CommitMode::Atomic,
        }
    }
}

impl Cli {
    fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            root_path: self
                .chia_root
                .as_deref()
                .map(expand_home)
                .unwrap_or_else(default_root_path),
            hosts: Hosts {
                full_node: self.fullnode_host.clone(),
                wallet: self.wallet_host.clone(),
                harvester: self.harvester_host.clone(),
                farmer: self.farmer_host.clone(),
            },
            commit: self.commit.into(),
            hostnames: if self.strict_hostnames {
                HostnamePolicy::Abort
            } else {
                HostnamePolicy::Skip
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,chia_exporter=debug,chia_collector=debug")
            }),
        )
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.cycle_config();
    let timeout = Duration::from_secs(cli.rpc_timeout);
    info!(
        root = %config.root_path.display(),
        full_node = %config.hosts.full_node,
        wallet = %config.hosts.wallet,
        harvester = %config.hosts.harvester,
        farmer = %config.hosts.farmer,
        commit = ?config.commit,
        hostnames = ?config.hostnames,
        "chia exporter starting"
    );

    // ── Registry and collection cycle ──────────────────────────
    let registry = MetricRegistry::new();
    let metrics = ChiaMetrics::register(&registry).context("declaring metrics")?;
    let resolver = DnsHostnameResolver::system_or_default(timeout);
    let cycle = CollectionCycle::new(
        config,
        Arc::new(RpcConnector::new(timeout)),
        Arc::new(resolver),
        registry.clone(),
        metrics,
    );
    let scheduler = Scheduler::new(cycle, Duration::from_secs(cli.interval));

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    // ── HTTP server ────────────────────────────────────────────
    let router = chia_exporter::build_router(registry);
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.listen_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "metrics server listening");

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    if let Err(e) = server.await {
        error!(error = %e, "metrics server failed");
        return Err(e.into());
    }

    // The scheduler stops once its current cycle finishes.
    let _ = scheduler_handle.await;
    info!("chia exporter stopped");
    Ok(())
}
