//! Error types for the collection cycle.

use chia_metrics::MetricsError;
use chia_rpc::{ConfigError, RpcError, Service};
use thiserror::Error;

/// Why a collection cycle was abandoned.
#[derive(Debug, Error)]
pub enum CycleError {
    /// The node configuration could not be loaded; nothing was attempted.
    #[error("loading node config: {0}")]
    Config(#[from] ConfigError),

    /// At least one backend could not be reached; no metric was written.
    #[error("could not connect to {}", describe(.failures))]
    Connection { failures: Vec<(Service, RpcError)> },

    /// A connected backend failed a call; earlier writes may have landed.
    #[error("{step} failed: {source}")]
    RpcCall {
        step: &'static str,
        #[source]
        source: RpcError,
    },

    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error("metric write rejected: {0}")]
    Metrics(#[from] MetricsError),
}

impl CycleError {
    /// Services that failed to connect, if this is a connection failure.
    pub fn failed_services(&self) -> Vec<Service> {
        match self {
            CycleError::Connection { failures } => failures.iter().map(|(s, _)| *s).collect(),
            _ => Vec::new(),
        }
    }
}

fn describe(failures: &[(Service, RpcError)]) -> String {
    failures
        .iter()
        .map(|(service, err)| format!("{service} ({err})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reverse lookup of a harvester address failed.
#[derive(Debug, Error, PartialEq)]
#[error("reverse lookup of {host} failed: {reason}")]
pub struct ResolveError {
    pub host: String,
    pub reason: String,
}
