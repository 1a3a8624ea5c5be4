//! TOML configuration for the ringleader daemon.
//!
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration for a slave listening on the default port.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Role, address and ring directory.
    pub node: NodeSection,
    /// Master-only settings.
    pub master: MasterSection,
    /// Transport security.
    pub tls: TlsSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// Which service a daemon runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    #[default]
    Slave,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub role: Role,
    /// Address the RPC listener binds to.
    pub listen_addr: String,
    /// Directory holding versioned ring and builder files.
    pub ring_dir: PathBuf,
    /// Number of ring versions kept on disk (at least 2).
    pub retain_versions: usize,
}

impl Default for NodeSection {
    fn default() -> Self {
        let ring_dir = dirs::home_dir()
            .map(|h| h.join(".ringleader"))
            .unwrap_or_else(|| PathBuf::from(".ringleader"));
        Self {
            role: Role::default(),
            listen_addr: "0.0.0.0:8443".to_string(),
            ring_dir,
            retain_versions: 8,
        }
    }
}

/// `[master]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MasterSection {
    /// Static slave endpoints (`host:port`).
    pub slaves: Vec<String>,
    /// CIDR ranges node addresses must fall in. Empty admits any address.
    pub net_filter: Vec<String>,
    /// Tiers a node must carry at least one of. Empty admits any tier.
    pub tier_filter: Vec<String>,
    /// Per-slave call timeout.
    pub slave_timeout_ms: u64,
    /// Vnodes for a node of base capacity, used by `init`.
    pub vnodes_per_node: u16,
    /// Replica count recorded in the ring, used by `init`.
    pub replicas: u8,
}

impl Default for MasterSection {
    fn default() -> Self {
        Self {
            slaves: Vec::new(),
            net_filter: Vec::new(),
            tier_filter: Vec::new(),
            slave_timeout_ms: 5000,
            vnodes_per_node: 128,
            replicas: 3,
        }
    }
}

/// `[tls]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TlsSection {
    pub enabled: bool,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn slave_timeout(&self) -> Duration {
        Duration::from_millis(self.master.slave_timeout_ms)
    }

    /// Reject settings the daemon cannot honor.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.tls.enabled,
            "tls.enabled is set but this build serves plain TCP only; \
             terminate TLS in front of the daemon or disable it"
        );
        anyhow::ensure!(
            self.master.slave_timeout_ms > 0,
            "master.slave_timeout_ms must be positive"
        );
        anyhow::ensure!(self.master.replicas > 0, "master.replicas must be positive");
        anyhow::ensure!(
            self.master.vnodes_per_node > 0,
            "master.vnodes_per_node must be positive"
        );
        Ok(())
    }
}
