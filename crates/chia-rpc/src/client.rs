//! Per-service RPC clients.
//!
//! Each backend service is exposed behind a small object-safe trait so the
//! collector can hold `Box<dyn FullNodeApi>` and tests can substitute
//! in-memory fakes. Futures are boxed by hand to keep the traits dyn-safe.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::config::BackendEndpoint;
use crate::error::RpcResult;
use crate::transport::{RpcClient, TlsIdentity};
use crate::types::*;

/// Boxed future returned by every RPC operation.
pub type RpcFuture<'a, T> = Pin<Box<dyn Future<Output = RpcResult<T>> + Send + 'a>>;

/// Chain-state service.
pub trait FullNodeApi: Send + Sync {
    fn get_blockchain_state(&self) -> RpcFuture<'_, BlockchainState>;

    fn get_connections(&self) -> RpcFuture<'_, Vec<Connection>>;

    /// Look up a block record by header hash.
    fn get_block_record<'a>(&'a self, header_hash: &'a str) -> RpcFuture<'a, BlockRecord>;

    fn get_block_record_by_height(&self, height: u32) -> RpcFuture<'_, BlockRecord>;

    /// Release the session. Best-effort; never fails.
    fn close(&self);
}

/// Wallet service.
pub trait WalletApi: Send + Sync {
    fn get_wallets(&self) -> RpcFuture<'_, Vec<WalletInfo>>;

    fn get_wallet_balance(&self, wallet_id: u32) -> RpcFuture<'_, WalletBalance>;

    fn get_height_info(&self) -> RpcFuture<'_, u32>;

    fn get_farmed_amount(&self) -> RpcFuture<'_, FarmedAmount>;

    fn close(&self);
}

/// Harvester service (the local harvester only).
pub trait HarvesterApi: Send + Sync {
    fn get_plots(&self) -> RpcFuture<'_, Vec<PlotInfo>>;

    fn close(&self);
}

/// Farmer service.
pub trait FarmerApi: Send + Sync {
    /// Every harvester connected to this farmer.
    fn get_harvesters(&self) -> RpcFuture<'_, Vec<HarvesterSummary>>;

    /// Reward addresses, without deriving keys to search for them.
    fn get_reward_targets(&self) -> RpcFuture<'_, RewardTargets>;

    fn close(&self);
}

/// Opens sessions to the four backend services.
pub trait Connector: Send + Sync {
    fn connect_full_node<'a>(
        &'a self,
        endpoint: &'a BackendEndpoint,
    ) -> RpcFuture<'a, Box<dyn FullNodeApi>>;

    fn connect_wallet<'a>(&'a self, endpoint: &'a BackendEndpoint) -> RpcFuture<'a, Box<dyn WalletApi>>;

    fn connect_harvester<'a>(
        &'a self,
        endpoint: &'a BackendEndpoint,
    ) -> RpcFuture<'a, Box<dyn HarvesterApi>>;

    fn connect_farmer<'a>(&'a self, endpoint: &'a BackendEndpoint) -> RpcFuture<'a, Box<dyn FarmerApi>>;
}

// ── Production clients ───────────────────────────────────────────────

#[derive(Debug)]
pub struct FullNodeRpcClient {
    rpc: RpcClient,
}

impl FullNodeApi for FullNodeRpcClient {
    fn get_blockchain_state(&self) -> RpcFuture<'_, BlockchainState> {
        Box::pin(async move {
            let resp: BlockchainStateResponse =
                self.rpc.call("get_blockchain_state", json!({})).await?;
            Ok(resp.blockchain_state)
        })
    }

    fn get_connections(&self) -> RpcFuture<'_, Vec<Connection>> {
        Box::pin(async move {
            let resp: ConnectionsResponse = self.rpc.call("get_connections", json!({})).await?;
            Ok(resp.connections)
        })
    }

    fn get_block_record<'a>(&'a self, header_hash: &'a str) -> RpcFuture<'a, BlockRecord> {
        Box::pin(async move {
            let resp: BlockRecordResponse = self
                .rpc
                .call("get_block_record", json!({ "header_hash": header_hash }))
                .await?;
            Ok(resp.block_record)
        })
    }

    fn get_block_record_by_height(&self, height: u32) -> RpcFuture<'_, BlockRecord> {
        Box::pin(async move {
            let resp: BlockRecordResponse = self
                .rpc
                .call("get_block_record_by_height", json!({ "height": height }))
                .await?;
            Ok(resp.block_record)
        })
    }

    fn close(&self) {
        self.rpc.close();
    }
}

#[derive(Debug)]
pub struct WalletRpcClient {
    rpc: RpcClient,
}

impl WalletApi for WalletRpcClient {
    fn get_wallets(&self) -> RpcFuture<'_, Vec<WalletInfo>> {
        Box::pin(async move {
            let resp: WalletsResponse = self.rpc.call("get_wallets", json!({})).await?;
            Ok(resp.wallets)
        })
    }

    fn get_wallet_balance(&self, wallet_id: u32) -> RpcFuture<'_, WalletBalance> {
        Box::pin(async move {
            let resp: WalletBalanceResponse = self
                .rpc
                .call("get_wallet_balance", json!({ "wallet_id": wallet_id }))
                .await?;
            Ok(resp.wallet_balance)
        })
    }

    fn get_height_info(&self) -> RpcFuture<'_, u32> {
        Box::pin(async move {
            let resp: HeightInfoResponse = self.rpc.call("get_height_info", json!({})).await?;
            Ok(resp.height)
        })
    }

    fn get_farmed_amount(&self) -> RpcFuture<'_, FarmedAmount> {
        Box::pin(async move { self.rpc.call("get_farmed_amount", json!({})).await })
    }

    fn close(&self) {
        self.rpc.close();
    }
}

#[derive(Debug)]
pub struct HarvesterRpcClient {
    rpc: RpcClient,
}

impl HarvesterApi for HarvesterRpcClient {
    fn get_plots(&self) -> RpcFuture<'_, Vec<PlotInfo>> {
        Box::pin(async move {
            let resp: PlotsResponse = self.rpc.call("get_plots", json!({})).await?;
            Ok(resp.plots)
        })
    }

    fn close(&self) {
        self.rpc.close();
    }
}

#[derive(Debug)]
pub struct FarmerRpcClient {
    rpc: RpcClient,
}

impl FarmerApi for FarmerRpcClient {
    fn get_harvesters(&self) -> RpcFuture<'_, Vec<HarvesterSummary>> {
        Box::pin(async move {
            let resp: HarvestersResponse = self.rpc.call("get_harvesters", json!({})).await?;
            Ok(resp.harvesters)
        })
    }

    fn get_reward_targets(&self) -> RpcFuture<'_, RewardTargets> {
        Box::pin(async move {
            self.rpc
                .call(
                    "get_reward_targets",
                    json!({ "search_for_private_key": false }),
                )
                .await
        })
    }

    fn close(&self) {
        self.rpc.close();
    }
}

/// [`Connector`] that opens real mTLS sessions.
///
/// TLS material is re-read on every connect so rotated certificates are
/// picked up by the next cycle.
#[derive(Debug, Clone)]
pub struct RpcConnector {
    timeout: Duration,
}

impl RpcConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn open(&self, endpoint: &BackendEndpoint) -> RpcResult<RpcClient> {
        let identity = TlsIdentity::load(&endpoint.tls)?;
        let rpc = RpcClient::connect(endpoint, &identity, self.timeout).await?;
        debug!(service = %endpoint.service, host = %endpoint.host, port = endpoint.port, "backend connected");
        Ok(rpc)
    }
}

impl Connector for RpcConnector {
    fn connect_full_node<'a>(
        &'a self,
        endpoint: &'a BackendEndpoint,
    ) -> RpcFuture<'a, Box<dyn FullNodeApi>> {
        Box::pin(async move {
            let rpc = self.open(endpoint).await?;
            Ok(Box::new(FullNodeRpcClient { rpc }) as Box<dyn FullNodeApi>)
        })
    }

    fn connect_wallet<'a>(&'a self, endpoint: &'a BackendEndpoint) -> RpcFuture<'a, Box<dyn WalletApi>> {
        Box::pin(async move {
            let rpc = self.open(endpoint).await?;
            Ok(Box::new(WalletRpcClient { rpc }) as Box<dyn WalletApi>)
        })
    }

    fn connect_harvester<'a>(
        &'a self,
        endpoint: &'a BackendEndpoint,
    ) -> RpcFuture<'a, Box<dyn HarvesterApi>> {
        Box::pin(async move {
            let rpc = self.open(endpoint).await?;
            Ok(Box::new(HarvesterRpcClient { rpc }) as Box<dyn HarvesterApi>)
        })
    }

    fn connect_farmer<'a>(&'a self, endpoint: &'a BackendEndpoint) -> RpcFuture<'a, Box<dyn FarmerApi>> {
        Box::pin(async move {
            let rpc = self.open(endpoint).await?;
            Ok(Box::new(FarmerRpcClient { rpc }) as Box<dyn FarmerApi>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Service, TlsPaths};
    use crate::error::RpcError;
    use std::path::PathBuf;

    #[tokio::test]
    async fn connector_reports_missing_tls_material() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = BackendEndpoint {
            service: Service::FullNode,
            host: "127.0.0.1".to_string(),
            port: 8555,
            tls: TlsPaths {
                ca_crt: dir.path().join("missing_ca.crt"),
                client_crt: PathBuf::from("missing.crt"),
                client_key: PathBuf::from("missing.key"),
            },
        };

        let connector = RpcConnector::new(Duration::from_secs(1));
        let err = connector.connect_full_node(&endpoint).await.err().unwrap();
        assert!(matches!(err, RpcError::Tls(msg) if msg.contains("missing_ca.crt")));
    }
}
