//! Response types for the Chia RPC endpoints used by the exporter.
//!
//! Only the fields the exporter reads are modelled; serde ignores the rest.
//! Mojo amounts and netspace use `u128` since they can exceed `u64`.

use serde::Deserialize;

// ── Wallet ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WalletInfo {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletsResponse {
    pub wallets: Vec<WalletInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WalletBalance {
    pub confirmed_wallet_balance: u128,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletBalanceResponse {
    pub wallet_balance: WalletBalance,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeightInfoResponse {
    pub height: u32,
}

/// Farming rewards credited to this wallet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FarmedAmount {
    pub farmed_amount: u128,
    pub last_height_farmed: u32,
}

// ── Full node ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncState {
    pub synced: bool,
}

/// Header-level record of one block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockRecord {
    pub header_hash: String,
    pub prev_hash: String,
    pub height: u32,
    /// Only transaction blocks carry a timestamp.
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl BlockRecord {
    pub fn is_transaction_block(&self) -> bool {
        self.timestamp.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockchainState {
    /// Estimated total network storage in bytes.
    pub space: u128,
    pub difficulty: u64,
    pub sync: SyncState,
    #[serde(default)]
    pub peak: Option<BlockRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainStateResponse {
    pub blockchain_state: BlockchainState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockRecordResponse {
    pub block_record: BlockRecord,
}

/// An open peer connection. `node_type` is the numeric Chia node type
/// (1 full node, 2 harvester, 3 farmer, 4 timelord, 5 introducer, 6 wallet,
/// 7 data layer).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Connection {
    #[serde(rename = "type")]
    pub node_type: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<Connection>,
}

// ── Harvester ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlotInfo {
    pub file_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlotsResponse {
    pub plots: Vec<PlotInfo>,
}

// ── Farmer ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HarvesterConnection {
    pub host: String,
}

/// One harvester as reported by the farmer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HarvesterSummary {
    pub connection: HarvesterConnection,
    #[serde(default)]
    pub plots: Vec<PlotInfo>,
}

impl HarvesterSummary {
    pub fn plot_count(&self) -> usize {
        self.plots.len()
    }

    pub fn plot_size(&self) -> u64 {
        self.plots.iter().map(|p| p.file_size).sum()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarvestersResponse {
    pub harvesters: Vec<HarvesterSummary>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RewardTargets {
    pub farmer_target: String,
    pub pool_target: String,
}
