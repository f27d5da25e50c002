//! Node configuration with TOML file support.

use chratos_ledger::{DEV_WORK_THRESHOLD, WORK_THRESHOLD};
use serde::{Deserialize, Serialize};

use crate::NodeError;

/// Which network the node joins. Selects the work threshold and whether
/// loopback senders are screened out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Live,
    Dev,
}

impl NetworkKind {
    pub fn work_threshold(&self) -> u64 {
        match self {
            NetworkKind::Live => WORK_THRESHOLD,
            NetworkKind::Dev => DEV_WORK_THRESHOLD,
        }
    }

    /// Loopback senders are only dropped on the live network.
    pub fn blacklist_loopback(&self) -> bool {
        matches!(self, NetworkKind::Live)
    }
}

/// Configuration for the consensus and propagation core.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_network")]
    pub network: NetworkKind,

    /// UDP peering port.
    #[serde(default = "default_peering_port")]
    pub peering_port: u16,

    /// I/O executor threads.
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,

    /// Work generation threads (passed to the work collaborator).
    #[serde(default = "default_work_threads")]
    pub work_threads: usize,

    /// Whether to generate confirm_acks as a representative.
    #[serde(default)]
    pub enable_voting: bool,

    /// Floor for `online_stake()` and broadcast thresholds, in raw units.
    /// Serialized as text: raw amounts exceed TOML's integer range.
    #[serde(default = "default_online_weight_minimum", with = "amount_text")]
    pub online_weight_minimum: u128,

    /// Percentage (0–100) used for the quorum delta.
    #[serde(default = "default_online_weight_quorum")]
    pub online_weight_quorum: u8,

    /// Multiplier on `online_stake / 256` for the gap-cache bootstrap
    /// threshold.
    #[serde(default = "default_bootstrap_fraction_numerator")]
    pub bootstrap_fraction_numerator: u32,

    /// Smallest send the wallet auto-receives, in raw units.
    #[serde(default = "default_receive_minimum", with = "amount_text")]
    pub receive_minimum: u128,

    /// Smallest dividend the wallet auto-claims, in raw units.
    #[serde(default = "default_receive_minimum", with = "amount_text")]
    pub dividend_minimum: u128,

    /// Initial keepalive targets (`host:port`).
    #[serde(default)]
    pub preconfigured_peers: Vec<String>,

    /// Fallback representative addresses.
    #[serde(default)]
    pub preconfigured_representatives: Vec<String>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Raw amounts are carried as decimal text in TOML.
mod amount_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkKind {
    NetworkKind::Dev
}

fn default_peering_port() -> u16 {
    7075
}

fn default_io_threads() -> usize {
    4
}

fn default_work_threads() -> usize {
    1
}

fn default_online_weight_minimum() -> u128 {
    60_000_000
}

fn default_online_weight_quorum() -> u8 {
    50
}

fn default_bootstrap_fraction_numerator() -> u32 {
    1
}

fn default_receive_minimum() -> u128 {
    1
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    fn validate(&self) -> Result<(), NodeError> {
        if self.online_weight_quorum > 100 {
            return Err(NodeError::Config(
                "online_weight_quorum must be 0-100".to_string(),
            ));
        }
        Ok(())
    }

    /// Decode the fallback representative addresses, dropping (and logging)
    /// malformed entries. Consumed by the wallet collaborator when picking a
    /// default representative.
    pub fn decoded_preconfigured_representatives(&self) -> Vec<chratos_types::Account> {
        self.preconfigured_representatives
            .iter()
            .filter_map(|address| {
                let decoded = chratos_crypto::decode_address(address);
                if decoded.is_none() {
                    tracing::warn!(%address, "ignoring malformed preconfigured representative");
                }
                decoded
            })
            .collect()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            peering_port: default_peering_port(),
            io_threads: default_io_threads(),
            work_threads: default_work_threads(),
            enable_voting: false,
            online_weight_minimum: default_online_weight_minimum(),
            online_weight_quorum: default_online_weight_quorum(),
            bootstrap_fraction_numerator: default_bootstrap_fraction_numerator(),
            receive_minimum: default_receive_minimum(),
            dividend_minimum: default_receive_minimum(),
            preconfigured_peers: Vec::new(),
            preconfigured_representatives: Vec::new(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
