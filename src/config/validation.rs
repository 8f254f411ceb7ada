//! Configuration validation

use super::{Config, DEFAULT_SNAPLEN};
use crate::capture::filter::MAX_SNAPLEN;
use crate::protocol::{ethernet, ipv6, tcp};

/// Smallest snaplen that still captures a full Ethernet/IPv6/TCP header stack
pub const MIN_SNAPLEN: u32 =
    (ethernet::VLAN_HEADER_SIZE + ipv6::HEADER_SIZE + tcp::MIN_HEADER_SIZE) as u32;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_network(config, &mut result);
    validate_log(config, &mut result);

    result
}

fn validate_network(config: &Config, result: &mut ValidationResult) {
    let network = &config.network;

    if network.interface.trim().is_empty() {
        result.error("network.interface: must not be empty");
    }

    if network.port == 0 {
        result.error("network.port: must be between 1 and 65535");
    }

    if network.promiscuous.is_none() {
        result.warn("network.promiscuous not specified, using default true");
    }

    match network.snaplen {
        None => result.warn(format!(
            "network.snaplen not specified, using default {}",
            DEFAULT_SNAPLEN
        )),
        Some(snaplen) if snaplen < MIN_SNAPLEN => result.error(format!(
            "network.snaplen: {} is too small to hold the headers, need at least {}",
            snaplen, MIN_SNAPLEN
        )),
        Some(snaplen) if snaplen > MAX_SNAPLEN => result.error(format!(
            "network.snaplen: {} exceeds the maximum of {}",
            snaplen, MAX_SNAPLEN
        )),
        Some(_) => {}
    }
}

fn validate_log(config: &Config, result: &mut ValidationResult) {
    if !config.log.has_known_level() {
        result.warn(format!(
            "log.level: unknown level '{}', using info",
            config.log.level
        ));
    }

    if !config.log.has_known_format() {
        result.warn(format!(
            "log.format: unknown format '{}', using pretty",
            config.log.format
        ));
    }
}
