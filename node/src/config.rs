//! Node configuration with TOML file support.
//!
//! Raw amounts are decimal strings in the file: TOML integers are 64-bit
//! and balances are 128-bit.

use raze_types::{Amount, NetworkId, RAZE_RATIO};
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Configuration for a raze node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to participate in.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// UDP peering port. Zero picks an ephemeral port (tests).
    #[serde(default = "default_peering_port")]
    pub peering_port: u16,

    /// Hosts to keepalive at startup ("host:port").
    #[serde(default)]
    pub preconfigured_peers: Vec<String>,

    /// Hex seeds of representative keys this node votes with. Stands in for
    /// the wallet store, which lives outside the node core.
    #[serde(default)]
    pub representative_seeds: Vec<String>,

    /// Whether this node votes at all.
    #[serde(default = "default_true")]
    pub enable_voting: bool,

    /// Scales the gap-cache bootstrap threshold `(supply / 256) × numerator`.
    #[serde(default = "default_bootstrap_fraction_numerator")]
    pub bootstrap_fraction_numerator: u64,

    /// Smallest send the wallet layer will auto-receive, in raw (decimal).
    #[serde(default = "default_receive_minimum")]
    pub receive_minimum: String,

    /// Raw amount excluded from the supply when scaling thresholds (decimal).
    #[serde(default = "default_inactive_supply")]
    pub inactive_supply: String,

    /// Host to POST confirmation callbacks to; empty disables the callback.
    #[serde(default)]
    pub callback_address: String,

    #[serde(default)]
    pub callback_port: u16,

    #[serde(default = "default_callback_target")]
    pub callback_target: String,

    /// Work servers ("host:port") to offload proof-of-work to.
    #[serde(default)]
    pub work_peers: Vec<String>,

    /// Threads mining proof-of-work.
    #[serde(default = "default_thread_count")]
    pub work_threads: usize,

    /// Threads running network completions and alarm tasks.
    #[serde(default = "default_thread_count")]
    pub io_threads: usize,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Live
}

fn default_peering_port() -> u16 {
    NetworkId::Live.default_port()
}

fn default_true() -> bool {
    true
}

fn default_bootstrap_fraction_numerator() -> u64 {
    1
}

fn default_receive_minimum() -> String {
    RAZE_RATIO.to_string()
}

fn default_inactive_supply() -> String {
    "0".to_string()
}

fn default_callback_target() -> String {
    "/".to_string()
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(4)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn parse_raw(name: &str, value: &str) -> Result<Amount, NodeError> {
    value
        .parse::<u128>()
        .map(Amount::new)
        .map_err(|_| NodeError::Config(format!("{name} is not a raw amount: {value}")))
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// A config for one test-network node on an ephemeral port.
    pub fn test_default() -> Self {
        Self {
            network: NetworkId::Test,
            peering_port: 0,
            work_threads: 1,
            io_threads: 1,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    /// Whether the confirmation callback is configured.
    pub fn callback_enabled(&self) -> bool {
        !self.callback_address.is_empty()
    }

    pub fn receive_minimum_raw(&self) -> Result<Amount, NodeError> {
        parse_raw("receive_minimum", &self.receive_minimum)
    }

    pub fn inactive_supply_raw(&self) -> Result<Amount, NodeError> {
        parse_raw("inactive_supply", &self.inactive_supply)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            peering_port: default_peering_port(),
            preconfigured_peers: Vec::new(),
            representative_seeds: Vec::new(),
            enable_voting: default_true(),
            bootstrap_fraction_numerator: default_bootstrap_fraction_numerator(),
            receive_minimum: default_receive_minimum(),
            inactive_supply: default_inactive_supply(),
            callback_address: String::new(),
            callback_port: 0,
            callback_target: default_callback_target(),
            work_peers: Vec::new(),
            work_threads: default_thread_count(),
            io_threads: default_thread_count(),
            log_level: default_log_level(),
        }
    }
}
