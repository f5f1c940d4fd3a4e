//! chia-rpc: clients for the Chia backend RPC services.
//!
//! Each Chia service (full node, wallet, harvester, farmer) exposes a JSON
//! RPC API over HTTPS with mutual TLS. This crate loads the node's
//! `config.yaml` to find ports and certificates, opens one persistent
//! connection per service, and exposes each service behind a small
//! object-safe trait so the collector can be driven by in-memory fakes.
//!
//! # Architecture
//!
//! ```text
//! ChiaConfig::load(root)
//!   └── endpoint(service, host) → BackendEndpoint
//!
//! RpcConnector (Connector)
//!   ├── TlsIdentity::load() → rustls ClientConfig (client cert + private CA)
//!   ├── RpcClient::connect() → TCP → TLS → HTTP/1.1
//!   └── FullNodeRpcClient / WalletRpcClient / HarvesterRpcClient / FarmerRpcClient
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod transport;
pub mod types;

pub use client::{
    Connector, FarmerApi, FarmerRpcClient, FullNodeApi, FullNodeRpcClient, HarvesterApi,
    HarvesterRpcClient, RpcConnector, RpcFuture, WalletApi, WalletRpcClient,
};
pub use config::{default_root_path, expand_home, BackendEndpoint, ChiaConfig, Service, TlsPaths};
pub use error::{ConfigError, RpcError, RpcResult};
pub use transport::{RpcClient, TlsIdentity};
pub use types::*;
