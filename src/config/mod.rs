//! Configuration management
//!
//! A single config.toml with a `[network]` table (required) and an optional
//! `[log]` table.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult, MIN_SNAPLEN};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    parse(&content)
}

/// Parse configuration from TOML text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}
