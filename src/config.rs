//! Server configuration, read from `HOLDFAST_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::model::Resource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub max_connections: usize,
    pub metrics_port: Option<u16>,
    /// JSON array of resources registered at startup.
    pub inventory: Option<PathBuf>,
    /// Hold ttl used when a hold request carries none.
    pub default_hold: Duration,
    /// `flat`, `per_day` or `per_hour`.
    pub range_pricing: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 7878,
            max_connections: 256,
            metrics_port: None,
            inventory: None,
            default_hold: Duration::from_secs(300),
            range_pricing: "per_day".into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}: cannot parse {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("reading inventory {path}: {source}")]
    InventoryIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing inventory {path}: {source}")]
    InventoryJson {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their
    /// defaults, malformed ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Config::default();
        if let Some(v) = lookup("HOLDFAST_BIND") {
            cfg.bind = v;
        }
        if let Some(v) = lookup("HOLDFAST_PORT") {
            cfg.port = parse("HOLDFAST_PORT", v)?;
        }
        if let Some(v) = lookup("HOLDFAST_MAX_CONNECTIONS") {
            cfg.max_connections = parse("HOLDFAST_MAX_CONNECTIONS", v)?;
        }
        if let Some(v) = lookup("HOLDFAST_METRICS_PORT") {
            cfg.metrics_port = Some(parse("HOLDFAST_METRICS_PORT", v)?);
        }
        if let Some(v) = lookup("HOLDFAST_INVENTORY") {
            cfg.inventory = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("HOLDFAST_DEFAULT_HOLD_SECS") {
            let secs: u64 = parse("HOLDFAST_DEFAULT_HOLD_SECS", v)?;
            cfg.default_hold = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("HOLDFAST_RANGE_PRICING") {
            if crate::pricing::from_name(&v).is_none() {
                return Err(ConfigError::Invalid {
                    name: "HOLDFAST_RANGE_PRICING",
                    value: v,
                });
            }
            cfg.range_pricing = v;
        }
        Ok(cfg)
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|_| ConfigError::Invalid { name, value })
}

/// Read a JSON array of resources, e.g.
/// `[{"id":"SEAT-A1","kind":"discrete","base_rate":120}]`.
pub fn load_inventory(path: &Path) -> Result<Vec<Resource>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::InventoryIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::InventoryJson {
        path: path.to_path_buf(),
        source,
    })
}
