//! In-memory backends for exercising the collection cycle.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chia_rpc::{
    BackendEndpoint, BlockRecord, BlockchainState, Connection, Connector, FarmedAmount, FarmerApi,
    FullNodeApi, HarvesterApi, HarvesterConnection, HarvesterSummary, PlotInfo, RewardTargets,
    RpcError, RpcFuture, RpcResult, Service, SyncState, WalletApi, WalletBalance, WalletInfo,
};
use tempfile::TempDir;
use tokio::sync::Barrier;

use crate::error::ResolveError;
use crate::resolver::{HostnameResolver, ResolveFuture};

pub fn hash(height: u32) -> String {
    format!("0x{height:064x}")
}

pub fn block(height: u32, timestamp: Option<u64>) -> BlockRecord {
    BlockRecord {
        header_hash: hash(height),
        prev_hash: hash(height.saturating_sub(1)),
        height,
        timestamp,
    }
}

/// A Chia root holding only `config/config.yaml`.
pub fn chia_root() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("config")).unwrap();
    std::fs::write(
        dir.path().join("config/config.yaml"),
        r#"
self_hostname: localhost
private_ssl_ca:
  crt: config/ssl/ca/private_ca.crt
daemon_ssl:
  private_crt: config/ssl/daemon/private_daemon.crt
  private_key: config/ssl/daemon/private_daemon.key
full_node:
  rpc_port: 8555
wallet:
  rpc_port: 9256
harvester:
  rpc_port: 8560
farmer:
  rpc_port: 8559
"#,
    )
    .unwrap();
    dir
}

#[derive(Default)]
struct State {
    wallets: Vec<(WalletInfo, u128)>,
    space: u128,
    difficulty: u64,
    synced: bool,
    peak: Option<BlockRecord>,
    blocks: HashMap<String, BlockRecord>,
    heights: HashMap<u32, BlockRecord>,
    height: u32,
    connections: Vec<u8>,
    plots: Vec<u64>,
    farmed: (u128, u32),
    harvesters: Vec<HarvesterSummary>,
    targets: (String, String),
    unreachable: HashSet<Service>,
    failing: HashSet<&'static str>,
    calls: Vec<&'static str>,
    endpoints: Vec<BackendEndpoint>,
    closed: Vec<Service>,
    connect_gate: Option<Arc<Barrier>>,
}

/// Scriptable stand-in for all four backend services.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn set_wallets(&self, wallets: &[(u32, &str, u128)]) {
        self.lock().wallets = wallets
            .iter()
            .map(|(id, name, balance)| {
                (
                    WalletInfo {
                        id: *id,
                        name: name.to_string(),
                    },
                    *balance,
                )
            })
            .collect();
    }

    pub fn set_chain(&self, space: u128, difficulty: u64, synced: bool, peak: Option<BlockRecord>) {
        let mut state = self.lock();
        state.space = space;
        state.difficulty = difficulty;
        state.synced = synced;
        state.peak = peak;
    }

    pub fn add_block(&self, record: BlockRecord) {
        let mut state = self.lock();
        state.heights.insert(record.height, record.clone());
        state.blocks.insert(record.header_hash.clone(), record);
    }

    pub fn set_height(&self, height: u32) {
        self.lock().height = height;
    }

    pub fn set_connections(&self, node_types: &[u8]) {
        self.lock().connections = node_types.to_vec();
    }

    pub fn set_plots(&self, sizes: &[u64]) {
        self.lock().plots = sizes.to_vec();
    }

    pub fn set_farmed(&self, amount: u128, last_height: u32) {
        self.lock().farmed = (amount, last_height);
    }

    pub fn set_harvesters(&self, harvesters: &[(&str, &[u64])]) {
        self.lock().harvesters = harvesters
            .iter()
            .map(|(host, sizes)| HarvesterSummary {
                connection: HarvesterConnection {
                    host: host.to_string(),
                },
                plots: sizes.iter().map(|&file_size| PlotInfo { file_size }).collect(),
            })
            .collect();
    }

    pub fn set_reward_targets(&self, farmer: &str, pool: &str) {
        self.lock().targets = (farmer.to_string(), pool.to_string());
    }

    /// Refuse connections to `service`.
    pub fn unreachable(&self, service: Service) {
        self.lock().unreachable.insert(service);
    }

    /// Fail every call to the named RPC endpoint.
    pub fn fail_call(&self, call: &'static str) {
        self.lock().failing.insert(call);
    }

    /// Hold every connect until `parties` connects are in flight at once.
    pub fn gate_connects(&self, parties: usize) {
        self.lock().connect_gate = Some(Arc::new(Barrier::new(parties)));
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn endpoints(&self) -> Vec<BackendEndpoint> {
        self.lock().endpoints.clone()
    }

    pub fn closed(&self) -> Vec<Service> {
        let mut closed = self.lock().closed.clone();
        closed.sort_by_key(|s| s.config_key());
        closed
    }

    pub fn full_node(&self) -> FakeClient {
        self.client(Service::FullNode)
    }

    fn client(&self, service: Service) -> FakeClient {
        FakeClient {
            service,
            state: Arc::clone(&self.state),
        }
    }

    fn open(&self, endpoint: &BackendEndpoint) -> RpcResult<FakeClient> {
        let mut state = self.lock();
        state.endpoints.push(endpoint.clone());
        if state.unreachable.contains(&endpoint.service) {
            return Err(RpcError::Connect {
                address: endpoint.authority(),
                reason: "tcp: connection refused".to_string(),
            });
        }
        Ok(self.client(endpoint.service))
    }
}

impl FakeBackend {
    fn connected<T: Send + 'static>(&self, result: RpcResult<T>) -> RpcFuture<'static, T> {
        let gate = self.lock().connect_gate.clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.wait().await;
            }
            result
        })
    }
}

impl Connector for FakeBackend {
    fn connect_full_node<'a>(&'a self, endpoint: &'a BackendEndpoint) -> RpcFuture<'a, Box<dyn FullNodeApi>> {
        self.connected(self.open(endpoint).map(|c| Box::new(c) as Box<dyn FullNodeApi>))
    }

    fn connect_wallet<'a>(&'a self, endpoint: &'a BackendEndpoint) -> RpcFuture<'a, Box<dyn WalletApi>> {
        self.connected(self.open(endpoint).map(|c| Box::new(c) as Box<dyn WalletApi>))
    }

    fn connect_harvester<'a>(&'a self, endpoint: &'a BackendEndpoint) -> RpcFuture<'a, Box<dyn HarvesterApi>> {
        self.connected(self.open(endpoint).map(|c| Box::new(c) as Box<dyn HarvesterApi>))
    }

    fn connect_farmer<'a>(&'a self, endpoint: &'a BackendEndpoint) -> RpcFuture<'a, Box<dyn FarmerApi>> {
        self.connected(self.open(endpoint).map(|c| Box::new(c) as Box<dyn FarmerApi>))
    }
}

/// One fake session; implements every service trait over the shared state.
pub struct FakeClient {
    service: Service,
    state: Arc<Mutex<State>>,
}

impl FakeClient {
    fn respond<T: Send + 'static>(
        &self,
        call: &'static str,
        answer: impl FnOnce(&State) -> RpcResult<T>,
    ) -> RpcFuture<'static, T> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        let result = if state.failing.contains(call) {
            Err(RpcError::Transport {
                endpoint: call.to_string(),
                reason: "connection reset".to_string(),
            })
        } else {
            answer(&*state)
        };
        Box::pin(async move { result })
    }

    fn release(&self) {
        self.state.lock().unwrap().closed.push(self.service);
    }
}

impl FullNodeApi for FakeClient {
    fn get_blockchain_state(&self) -> RpcFuture<'_, BlockchainState> {
        self.respond("get_blockchain_state", |s| {
            Ok(BlockchainState {
                space: s.space,
                difficulty: s.difficulty,
                sync: SyncState { synced: s.synced },
                peak: s.peak.clone(),
            })
        })
    }

    fn get_connections(&self) -> RpcFuture<'_, Vec<Connection>> {
        self.respond("get_connections", |s| {
            Ok(s.connections
                .iter()
                .map(|&node_type| Connection { node_type })
                .collect())
        })
    }

    fn get_block_record<'a>(&'a self, header_hash: &'a str) -> RpcFuture<'a, BlockRecord> {
        let header_hash = header_hash.to_string();
        self.respond("get_block_record", move |s| {
            s.blocks.get(&header_hash).cloned().ok_or(RpcError::Rejected {
                endpoint: "get_block_record".to_string(),
                message: format!("block {header_hash} not found"),
            })
        })
    }

    fn get_block_record_by_height(&self, height: u32) -> RpcFuture<'_, BlockRecord> {
        self.respond("get_block_record_by_height", move |s| {
            s.heights.get(&height).cloned().ok_or(RpcError::Rejected {
                endpoint: "get_block_record_by_height".to_string(),
                message: format!("height {height} not found"),
            })
        })
    }

    fn close(&self) {
        self.release();
    }
}

impl WalletApi for FakeClient {
    fn get_wallets(&self) -> RpcFuture<'_, Vec<WalletInfo>> {
        self.respond("get_wallets", |s| Ok(s.wallets.iter().map(|(w, _)| w.clone()).collect()))
    }

    fn get_wallet_balance(&self, wallet_id: u32) -> RpcFuture<'_, WalletBalance> {
        self.respond("get_wallet_balance", move |s| {
            s.wallets
                .iter()
                .find(|(w, _)| w.id == wallet_id)
                .map(|(_, balance)| WalletBalance {
                    confirmed_wallet_balance: *balance,
                })
                .ok_or(RpcError::Rejected {
                    endpoint: "get_wallet_balance".to_string(),
                    message: format!("wallet {wallet_id} not found"),
                })
        })
    }

    fn get_height_info(&self) -> RpcFuture<'_, u32> {
        self.respond("get_height_info", |s| Ok(s.height))
    }

    fn get_farmed_amount(&self) -> RpcFuture<'_, FarmedAmount> {
        self.respond("get_farmed_amount", |s| {
            Ok(FarmedAmount {
                farmed_amount: s.farmed.0,
                last_height_farmed: s.farmed.1,
            })
        })
    }

    fn close(&self) {
        self.release();
    }
}

impl HarvesterApi for FakeClient {
    fn get_plots(&self) -> RpcFuture<'_, Vec<PlotInfo>> {
        self.respond("get_plots", |s| {
            Ok(s.plots.iter().map(|&file_size| PlotInfo { file_size }).collect())
        })
    }

    fn close(&self) {
        self.release();
    }
}

impl FarmerApi for FakeClient {
    fn get_harvesters(&self) -> RpcFuture<'_, Vec<HarvesterSummary>> {
        self.respond("get_harvesters", |s| Ok(s.harvesters.clone()))
    }

    fn get_reward_targets(&self) -> RpcFuture<'_, RewardTargets> {
        self.respond("get_reward_targets", |s| {
            Ok(RewardTargets {
                farmer_target: s.targets.0.clone(),
                pool_target: s.targets.1.clone(),
            })
        })
    }

    fn close(&self) {
        self.release();
    }
}

/// Resolver backed by a fixed table; unknown hosts fail.
#[derive(Default)]
pub struct FakeResolver {
    names: HashMap<String, String>,
}

impl FakeResolver {
    pub fn with(names: &[(&str, &str)]) -> Self {
        Self {
            names: names
                .iter()
                .map(|(ip, name)| (ip.to_string(), name.to_string()))
                .collect(),
        }
    }
}

impl HostnameResolver for FakeResolver {
    fn resolve<'a>(&'a self, host: &'a str) -> ResolveFuture<'a> {
        let result = self.names.get(host).cloned().ok_or_else(|| ResolveError {
            host: host.to_string(),
            reason: "no PTR record".to_string(),
        });
        Box::pin(async move { result })
    }
}
