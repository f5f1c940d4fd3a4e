//! Reverse lookup of harvester addresses for the per-hostname metrics.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use tracing::{debug, warn};

use crate::error::ResolveError;

pub type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ResolveError>> + Send + 'a>>;

/// Maps a harvester's connection host to the hostname used as a label.
pub trait HostnameResolver: Send + Sync {
    fn resolve<'a>(&'a self, host: &'a str) -> ResolveFuture<'a>;
}

/// PTR lookups through the system's DNS configuration.
///
/// Hosts that are not IP literals are returned unchanged.
pub struct DnsHostnameResolver {
    resolver: TokioResolver,
    timeout: Duration,
}

impl DnsHostnameResolver {
    /// Build from `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system_conf(timeout: Duration) -> Result<Self, ResolveError> {
        let resolver = TokioResolver::builder_tokio()
            .map_err(|e| ResolveError {
                host: "system resolver".to_string(),
                reason: e.to_string(),
            })?
            .build();
        Ok(Self { resolver, timeout })
    }

    /// Build from an explicit resolver configuration.
    pub fn with_config(config: ResolverConfig, timeout: Duration) -> Self {
        let resolver =
            TokioResolver::builder_with_config(config, TokioConnectionProvider::default()).build();
        Self { resolver, timeout }
    }

    /// The system configuration if it can be read, otherwise hickory's
    /// default upstream servers.
    pub fn system_or_default(timeout: Duration) -> Self {
        Self::from_system_conf(timeout).unwrap_or_else(|e| {
            warn!(error = %e, "system DNS configuration unavailable, using default resolvers");
            Self::with_config(ResolverConfig::default(), timeout)
        })
    }

    async fn lookup(&self, host: &str) -> Result<String, ResolveError> {
        let Ok(ip) = host.parse::<IpAddr>() else {
            return Ok(host.to_string());
        };
        let failed = |reason: String| ResolveError {
            host: host.to_string(),
            reason,
        };

        let answer = tokio::time::timeout(self.timeout, self.resolver.reverse_lookup(ip))
            .await
            .map_err(|_| failed(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| failed(e.to_string()))?;

        let name = answer
            .iter()
            .next()
            .map(|ptr| ptr.to_string().trim_end_matches('.').to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| failed("no PTR record".to_string()))?;
        debug!(%ip, hostname = %name, "harvester address resolved");
        Ok(name)
    }
}

impl HostnameResolver for DnsHostnameResolver {
    fn resolve<'a>(&'a self, host: &'a str) -> ResolveFuture<'a> {
        Box::pin(self.lookup(host))
    }
}

impl std::fmt::Debug for DnsHostnameResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsHostnameResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
