//! Configuration types

use crate::telemetry::LogConfig;
use serde::Deserialize;

/// Snapshot length used when the config leaves it out
pub const DEFAULT_SNAPLEN: u32 = 65_535;

/// Contents of config.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// `[network]`: where to capture and which port to receive on
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkConfig {
    pub interface: String,
    pub port: u16,
    pub promiscuous: Option<bool>,
    pub snaplen: Option<u32>,
}

impl NetworkConfig {
    pub fn new(interface: impl Into<String>, port: u16) -> Self {
        Self {
            interface: interface.into(),
            port,
            promiscuous: None,
            snaplen: None,
        }
    }

    /// Defaults to true
    pub fn promiscuous(&self) -> bool {
        self.promiscuous.unwrap_or(true)
    }

    pub fn snaplen(&self) -> u32 {
        self.snaplen.unwrap_or(DEFAULT_SNAPLEN)
    }
}
