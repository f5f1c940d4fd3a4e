//! One collection cycle: connect, query, derive, write, close.
//!
//! Steps run in a fixed order and the first failure aborts the cycle. In
//! streaming mode every value is written as soon as it is known, so an
//! aborted cycle leaves the earlier writes of that cycle in place; atomic
//! mode stages everything and commits once at the end.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chia_metrics::{MetricRegistry, MetricsError, Update};
use chia_rpc::{
    ChiaConfig, Connector, FarmerApi, FullNodeApi, HarvesterApi, RpcError, RpcResult, Service,
    WalletApi,
};
use tracing::{debug, info, warn};

use crate::catalogue::ChiaMetrics;
use crate::derived::{average_block_time, expected_time_to_win};
use crate::error::CycleError;
use crate::resolver::HostnameResolver;

/// When cycle writes become visible to readers of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Each value is written as soon as it is retrieved.
    #[default]
    Streaming,
    /// Values are staged and committed together when the cycle completes.
    Atomic,
}

/// What to do when a harvester address cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostnamePolicy {
    /// Skip that harvester's per-hostname metrics; its plots still count.
    #[default]
    Skip,
    /// Abort the cycle.
    Abort,
}

/// Operator-supplied host overrides, one per backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hosts {
    pub full_node: String,
    pub wallet: String,
    pub harvester: String,
    pub farmer: String,
}

impl Default for Hosts {
    fn default() -> Self {
        Self {
            full_node: "localhost".to_string(),
            wallet: "localhost".to_string(),
            harvester: "localhost".to_string(),
            farmer: "localhost".to_string(),
        }
    }
}

impl Hosts {
    pub fn get(&self, service: Service) -> &str {
        match service {
            Service::FullNode => &self.full_node,
            Service::Wallet => &self.wallet,
            Service::Harvester => &self.harvester,
            Service::Farmer => &self.farmer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Chia root holding `config/config.yaml` and the TLS material.
    pub root_path: PathBuf,
    pub hosts: Hosts,
    pub commit: CommitMode,
    pub hostnames: HostnamePolicy,
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub wallets: usize,
    pub connection_types: usize,
    pub harvesters: usize,
    /// Harvesters whose per-hostname metrics were skipped.
    pub unresolved_harvesters: usize,
    pub fleet_plot_count: usize,
    pub fleet_plot_size: u64,
    pub time_to_win: f64,
    /// Metric writes performed (or committed) by the cycle.
    pub writes: usize,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Aborted(CycleError),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }
}

/// Open sessions to all four backends.
struct Clients {
    full_node: Box<dyn FullNodeApi>,
    wallet: Box<dyn WalletApi>,
    harvester: Box<dyn HarvesterApi>,
    farmer: Box<dyn FarmerApi>,
}

impl Clients {
    fn close(&self) {
        self.full_node.close();
        self.wallet.close();
        self.harvester.close();
        self.farmer.close();
    }
}

/// Routes cycle writes to the registry according to the commit mode.
enum Writer<'r> {
    Streaming {
        registry: &'r MetricRegistry,
        writes: usize,
    },
    Atomic {
        registry: &'r MetricRegistry,
        staged: Vec<Update>,
    },
}

impl<'r> Writer<'r> {
    fn new(mode: CommitMode, registry: &'r MetricRegistry) -> Self {
        match mode {
            CommitMode::Streaming => Writer::Streaming { registry, writes: 0 },
            CommitMode::Atomic => Writer::Atomic {
                registry,
                staged: Vec::new(),
            },
        }
    }

    fn write(&mut self, update: Update) -> Result<(), MetricsError> {
        match self {
            Writer::Streaming { registry, writes } => {
                registry.apply(update)?;
                *writes += 1;
                Ok(())
            }
            Writer::Atomic { staged, .. } => {
                staged.push(update);
                Ok(())
            }
        }
    }

    fn writes(&self) -> usize {
        match self {
            Writer::Streaming { writes, .. } => *writes,
            Writer::Atomic { staged, .. } => staged.len(),
        }
    }

    /// Publish staged writes. A no-op when streaming.
    fn commit(self) -> Result<usize, MetricsError> {
        match self {
            Writer::Streaming { writes, .. } => Ok(writes),
            Writer::Atomic { registry, staged } => registry.apply_all(staged),
        }
    }
}

fn rpc(step: &'static str) -> impl FnOnce(RpcError) -> CycleError {
    move |source| CycleError::RpcCall { step, source }
}

/// Polls the four backends and merges their state into the registry.
pub struct CollectionCycle {
    config: CycleConfig,
    connector: Arc<dyn Connector>,
    resolver: Arc<dyn HostnameResolver>,
    registry: MetricRegistry,
    metrics: ChiaMetrics,
}

impl CollectionCycle {
    pub fn new(
        config: CycleConfig,
        connector: Arc<dyn Connector>,
        resolver: Arc<dyn HostnameResolver>,
        registry: MetricRegistry,
        metrics: ChiaMetrics,
    ) -> Self {
        Self {
            config,
            connector,
            resolver,
            registry,
            metrics,
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Run one cycle to completion. Failures are logged and returned as
    /// [`CycleOutcome::Aborted`]; they never escape as errors.
    pub async fn run(&self) -> CycleOutcome {
        let started = Instant::now();
        match self.collect().await {
            Ok(report) => {
                info!(
                    wallets = report.wallets,
                    harvesters = report.harvesters,
                    plots = report.fleet_plot_count,
                    writes = report.writes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "collection cycle completed"
                );
                CycleOutcome::Completed(report)
            }
            Err(e) => {
                warn!(error = %e, "collection cycle aborted");
                CycleOutcome::Aborted(e)
            }
        }
    }

    /// Record the exporter's own health metrics for a finished cycle.
    pub fn record_outcome(&self, outcome: &CycleOutcome, elapsed: Duration) {
        let success = if outcome.is_completed() { 1.0 } else { 0.0 };
        let updates = vec![
            self.metrics.last_cycle_success.set(success),
            self.metrics.cycle_duration.set(elapsed.as_secs_f64()),
        ];
        if let Err(e) = self.registry.apply_all(updates) {
            warn!(error = %e, "failed to record cycle outcome");
        }
    }

    async fn collect(&self) -> Result<CycleReport, CycleError> {
        let config = ChiaConfig::load(&self.config.root_path)?;
        let clients = self.connect(&config).await?;

        let mut writer = Writer::new(self.config.commit, &self.registry);
        let gathered = self.gather(&clients, &mut writer).await;
        clients.close();

        let mut report = gathered?;
        report.writes = writer.commit()?;
        Ok(report)
    }

    /// Connect to all four backends concurrently. If any fails, the ones
    /// that succeeded are closed and every failure is reported.
    async fn connect(&self, config: &ChiaConfig) -> Result<Clients, CycleError> {
        let endpoint = |service: Service| config.endpoint(service, Some(self.config.hosts.get(service)));
        let full_node = endpoint(Service::FullNode);
        let wallet = endpoint(Service::Wallet);
        let harvester = endpoint(Service::Harvester);
        let farmer = endpoint(Service::Farmer);

        let connected = tokio::join!(
            self.connector.connect_full_node(&full_node),
            self.connector.connect_wallet(&wallet),
            self.connector.connect_harvester(&harvester),
            self.connector.connect_farmer(&farmer),
        );

        match connected {
            (Ok(full_node), Ok(wallet), Ok(harvester), Ok(farmer)) => {
                debug!("all backends connected");
                Ok(Clients {
                    full_node,
                    wallet,
                    harvester,
                    farmer,
                })
            }
            (full_node, wallet, harvester, farmer) => {
                let mut failures = Vec::new();
                release(Service::FullNode, full_node, &mut failures, |c| c.close());
                release(Service::Wallet, wallet, &mut failures, |c| c.close());
                release(Service::Harvester, harvester, &mut failures, |c| c.close());
                release(Service::Farmer, farmer, &mut failures, |c| c.close());
                Err(CycleError::Connection { failures })
            }
        }
    }

    async fn gather(&self, clients: &Clients, writer: &mut Writer<'_>) -> Result<CycleReport, CycleError> {
        let m = &self.metrics;
        let node = &*clients.full_node;
        let wallet = &*clients.wallet;

        // Wallet balances.
        let wallets = wallet.get_wallets().await.map_err(rpc("get_wallets"))?;
        for w in &wallets {
            let balance = wallet
                .get_wallet_balance(w.id)
                .await
                .map_err(rpc("get_wallet_balance"))?;
            let id = w.id.to_string();
            writer.write(
                m.wallet_balance
                    .set(&[w.name.as_str(), id.as_str()], balance.confirmed_wallet_balance as f64),
            )?;
        }
        debug!(wallets = wallets.len(), "wallet balances collected");

        // Chain state.
        let chain = node
            .get_blockchain_state()
            .await
            .map_err(rpc("get_blockchain_state"))?;
        let netspace = chain.space as f64;
        writer.write(m.netspace.set(netspace))?;
        writer.write(m.difficulty.set(chain.difficulty as f64))?;
        let block_time = average_block_time(node, chain.peak.as_ref())
            .await
            .map_err(rpc("average_block_time"))?;
        writer.write(m.average_block_time.set(block_time))?;
        let sync = if chain.sync.synced { "synced" } else { "syncing" };
        writer.write(m.sync_state.state(sync))?;
        let height = wallet.get_height_info().await.map_err(rpc("get_height_info"))?;
        writer.write(m.block_height.set(f64::from(height)))?;
        debug!(height, block_time, sync, "chain state collected");

        // Peer connections by node type. Types absent this cycle keep their
        // previous value.
        let connections = node.get_connections().await.map_err(rpc("get_connections"))?;
        let by_type = count_by_type(connections.iter().map(|c| c.node_type));
        for (node_type, count) in &by_type {
            writer.write(m.node_connections.set(&[node_type.to_string().as_str()], *count as f64))?;
        }

        // Local harvester, overwritten by the fleet totals below.
        let plots = clients.harvester.get_plots().await.map_err(rpc("get_plots"))?;
        let local_size: u64 = plots.iter().map(|p| p.file_size).sum();
        writer.write(m.plots_count.set(plots.len() as f64))?;
        writer.write(m.plots_size.set(local_size as f64))?;
        let farmed = wallet.get_farmed_amount().await.map_err(rpc("get_farmed_amount"))?;
        writer.write(m.farmed_amount.set(farmed.farmed_amount as f64))?;
        writer.write(m.farmed_last_block.set(f64::from(farmed.last_height_farmed)))?;

        // Farmer fleet.
        let harvesters = clients
            .farmer
            .get_harvesters()
            .await
            .map_err(rpc("get_harvesters"))?;
        let mut fleet_plot_count = 0usize;
        let mut fleet_plot_size = 0u64;
        let mut unresolved = 0usize;
        for harvester in &harvesters {
            let host = harvester.connection.host.as_str();
            let (count, size) = (harvester.plot_count(), harvester.plot_size());
            match self.resolver.resolve(host).await {
                Ok(hostname) => {
                    writer.write(m.plots_count_by_hostname.set(&[hostname.as_str()], count as f64))?;
                    writer.write(m.plots_size_by_hostname.set(&[hostname.as_str()], size as f64))?;
                }
                Err(e) => match self.config.hostnames {
                    HostnamePolicy::Abort => return Err(e.into()),
                    HostnamePolicy::Skip => {
                        warn!(%host, error = %e, "skipping per-hostname metrics for harvester");
                        unresolved += 1;
                    }
                },
            }
            fleet_plot_count += count;
            fleet_plot_size = fleet_plot_size.saturating_add(size);
        }
        writer.write(m.plots_count.set(fleet_plot_count as f64))?;
        writer.write(m.plots_size.set(fleet_plot_size as f64))?;

        let time_to_win = expected_time_to_win(fleet_plot_size as f64, netspace, block_time);
        writer.write(m.time_to_win.set(time_to_win))?;
        debug!(
            harvesters = harvesters.len(),
            plots = fleet_plot_count,
            time_to_win,
            "farm totals collected"
        );

        // Reward addresses.
        let targets = clients
            .farmer
            .get_reward_targets()
            .await
            .map_err(rpc("get_reward_targets"))?;
        writer.write(m.reward_address.info([
            ("farmer_target", targets.farmer_target),
            ("pool_target", targets.pool_target),
        ]))?;

        Ok(CycleReport {
            wallets: wallets.len(),
            connection_types: by_type.len(),
            harvesters: harvesters.len(),
            unresolved_harvesters: unresolved,
            fleet_plot_count,
            fleet_plot_size,
            time_to_win,
            writes: writer.writes(),
        })
    }
}

/// Close a client that connected, or record why it did not.
fn release<C: ?Sized>(
    service: Service,
    result: RpcResult<Box<C>>,
    failures: &mut Vec<(Service, RpcError)>,
    close: impl FnOnce(&C),
) {
    match result {
        Ok(client) => close(&*client),
        Err(e) => {
            warn!(%service, error = %e, "backend connect failed");
            failures.push((service, e));
        }
    }
}

fn count_by_type(node_types: impl Iterator<Item = u8>) -> BTreeMap<u8, usize> {
    let mut counts = BTreeMap::new();
    for node_type in node_types {
        *counts.entry(node_type).or_insert(0) += 1;
    }
    counts
}
