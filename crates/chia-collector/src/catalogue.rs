//! The exporter's metric catalogue.

use chia_metrics::{EnumState, Gauge, GaugeVec, Info, MetricRegistry, MetricsResult};

pub const NETSPACE: &str = "chia_netspace_total";
pub const AVERAGE_BLOCK_TIME: &str = "chia_average_block_time";
pub const BLOCK_HEIGHT: &str = "chia_block_height";
pub const SYNC_STATE: &str = "chia_sync_state";
pub const WALLET_BALANCE: &str = "chia_wallet_balance";
pub const NODE_CONNECTIONS: &str = "chia_node_connections";
pub const PLOTS_COUNT: &str = "chia_plots_count";
pub const PLOTS_SIZE: &str = "chia_plots_size";
pub const FARMED_AMOUNT: &str = "chia_farmed_amount";
pub const FARMED_LAST_BLOCK: &str = "chia_farmed_last_block";
pub const TIME_TO_WIN: &str = "chia_time_to_win";
pub const REWARD_ADDRESS: &str = "chia_reward_address";
pub const DIFFICULTY: &str = "chia_difficulty";
pub const PLOTS_COUNT_BY_HOSTNAME: &str = "chia_plots_count_by_hostname";
pub const PLOTS_SIZE_BY_HOSTNAME: &str = "chia_plots_size_by_hostname";
pub const LAST_CYCLE_SUCCESS: &str = "chia_exporter_last_cycle_success";
pub const CYCLE_DURATION: &str = "chia_exporter_cycle_duration_seconds";

/// Sync states in declaration order.
pub const SYNC_STATES: [&str; 2] = ["synced", "syncing"];

/// Handles for every metric the exporter publishes.
#[derive(Debug, Clone, Copy)]
pub struct ChiaMetrics {
    pub netspace: Gauge,
    pub average_block_time: Gauge,
    pub block_height: Gauge,
    pub sync_state: EnumState,
    pub wallet_balance: GaugeVec,
    pub node_connections: GaugeVec,
    /// Local harvester plots until the farmer totals overwrite them.
    pub plots_count: Gauge,
    pub plots_size: Gauge,
    pub farmed_amount: Gauge,
    pub farmed_last_block: Gauge,
    pub time_to_win: Gauge,
    pub reward_address: Info,
    pub difficulty: Gauge,
    pub plots_count_by_hostname: GaugeVec,
    pub plots_size_by_hostname: GaugeVec,
    pub last_cycle_success: Gauge,
    pub cycle_duration: Gauge,
}

impl ChiaMetrics {
    /// Declare the whole catalogue. Fails if any name is already taken.
    pub fn register(registry: &MetricRegistry) -> MetricsResult<Self> {
        Ok(Self {
            netspace: registry.gauge(NETSPACE, "Current total netspace")?,
            average_block_time: registry.gauge(AVERAGE_BLOCK_TIME, "Average time between blocks")?,
            block_height: registry.gauge(BLOCK_HEIGHT, "Current highest block")?,
            sync_state: registry.enum_state(SYNC_STATE, "Current sync state", &SYNC_STATES)?,
            wallet_balance: registry.gauge_vec(WALLET_BALANCE, "Balance of wallets", &["name", "id"])?,
            node_connections: registry.gauge_vec(
                NODE_CONNECTIONS,
                "Currently open connections to node",
                &["type"],
            )?,
            plots_count: registry.gauge(PLOTS_COUNT, "Total plots farmed by harvester")?,
            plots_size: registry.gauge(PLOTS_SIZE, "Total plot size farmed by harvester")?,
            farmed_amount: registry.gauge(FARMED_AMOUNT, "Total XCH farmed by harvester")?,
            farmed_last_block: registry
                .gauge(FARMED_LAST_BLOCK, "Last height a farm reward was farmed")?,
            time_to_win: registry.gauge(TIME_TO_WIN, "Expected time to win")?,
            reward_address: registry.info(REWARD_ADDRESS, "Farming rewards go to this address")?,
            difficulty: registry.gauge(DIFFICULTY, "Current blockchain difficulty")?,
            plots_count_by_hostname: registry.gauge_vec(
                PLOTS_COUNT_BY_HOSTNAME,
                "Total plots by hostname",
                &["hostname"],
            )?,
            plots_size_by_hostname: registry.gauge_vec(
                PLOTS_SIZE_BY_HOSTNAME,
                "Total plot size by hostname",
                &["hostname"],
            )?,
            last_cycle_success: registry.gauge(
                LAST_CYCLE_SUCCESS,
                "Whether the most recent collection cycle completed (1) or aborted (0)",
            )?,
            cycle_duration: registry
                .gauge(CYCLE_DURATION, "Wall-clock duration of the most recent collection cycle")?,
        })
    }
}
