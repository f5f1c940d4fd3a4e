//! Chia node `config.yaml` parser.
//!
//! Only the handful of keys needed to reach the RPC services are read;
//! everything else in the file is ignored.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Default root when `CHIA_ROOT` is unset, relative to the home directory.
const DEFAULT_ROOT: &str = ".chia/mainnet";

/// One of the four backend services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    FullNode,
    Wallet,
    Harvester,
    Farmer,
}

impl Service {
    /// Section name in `config.yaml`.
    pub fn config_key(&self) -> &'static str {
        match self {
            Service::FullNode => "full_node",
            Service::Wallet => "wallet",
            Service::Harvester => "harvester",
            Service::Farmer => "farmer",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub rpc_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrivateCaConfig {
    pub crt: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSslConfig {
    pub private_crt: PathBuf,
    pub private_key: PathBuf,
}

/// The subset of a Chia node's `config.yaml` used to reach its services.
#[derive(Debug, Clone, Deserialize)]
pub struct ChiaConfig {
    #[serde(default = "default_self_hostname")]
    pub self_hostname: String,
    pub private_ssl_ca: PrivateCaConfig,
    pub daemon_ssl: DaemonSslConfig,
    pub full_node: ServiceConfig,
    pub wallet: ServiceConfig,
    pub harvester: ServiceConfig,
    pub farmer: ServiceConfig,
    /// Directory the file was loaded from; relative paths resolve against it.
    #[serde(skip)]
    pub root_path: PathBuf,
}

fn default_self_hostname() -> String {
    "localhost".to_string()
}

/// Paths to the TLS material used when connecting to a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    /// Private CA certificate that signs every service certificate.
    pub ca_crt: PathBuf,
    /// Client certificate presented to the service.
    pub client_crt: PathBuf,
    /// Private key for `client_crt`.
    pub client_key: PathBuf,
}

/// Where and how to reach one backend service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    pub service: Service,
    pub host: String,
    pub port: u16,
    pub tls: TlsPaths,
}

impl BackendEndpoint {
    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl ChiaConfig {
    /// Load `<root>/config/config.yaml`.
    pub fn load(root_path: &Path) -> Result<Self, ConfigError> {
        let path = root_path.join("config").join("config.yaml");
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(&content, root_path).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Parse config content as if it were loaded from `root_path`.
    pub fn from_yaml(content: &str, root_path: &Path) -> Result<Self, serde_yaml::Error> {
        let mut config: ChiaConfig = serde_yaml::from_str(content)?;
        config.root_path = root_path.to_path_buf();
        Ok(config)
    }

    pub fn service(&self, service: Service) -> &ServiceConfig {
        match service {
            Service::FullNode => &self.full_node,
            Service::Wallet => &self.wallet,
            Service::Harvester => &self.harvester,
            Service::Farmer => &self.farmer,
        }
    }

    /// Resolve the endpoint for a service.
    ///
    /// A non-empty `host` takes precedence over `self_hostname`; the port
    /// always comes from the file.
    pub fn endpoint(&self, service: Service, host: Option<&str>) -> BackendEndpoint {
        let host = match host {
            Some(h) if !h.trim().is_empty() => h.trim().to_string(),
            _ => self.self_hostname.clone(),
        };
        BackendEndpoint {
            service,
            host,
            port: self.service(service).rpc_port,
            tls: TlsPaths {
                ca_crt: self.root_path.join(&self.private_ssl_ca.crt),
                client_crt: self.root_path.join(&self.daemon_ssl.private_crt),
                client_key: self.root_path.join(&self.daemon_ssl.private_key),
            },
        }
    }
}

/// `$CHIA_ROOT` if set (with `~` expanded), otherwise `~/.chia/mainnet`.
pub fn default_root_path() -> PathBuf {
    match std::env::var_os("CHIA_ROOT") {
        Some(root) if !root.is_empty() => expand_home(Path::new(&root)),
        _ => home().join(DEFAULT_ROOT),
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Replace a leading `~` component with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home(),
        Ok(rest) => home().join(rest),
        Err(_) => path.to_path_buf(),
    }
}
