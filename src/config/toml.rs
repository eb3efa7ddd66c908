//! TOML configuration file parsing

use crate::config::{parse_bridge_address, AppConfig};
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// TOML configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub candidates: Option<Vec<String>>,
    pub bridge: Option<BridgeConfig>,
    pub firewall: Option<FirewallConfig>,
    pub run: Option<RunConfig>,
    pub logging: Option<LoggingConfig>,
}

/// Bridge configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Firewall configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallConfig {
    pub chain_prefix: Option<String>,
    pub iptables: Option<String>,
}

/// Per-run settings
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub lock_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub ip_forward_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

/// Load configuration from TOML file
pub fn load_toml_config(path: &str) -> Result<TomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|_| ConfigError::FileNotFound { path: path.to_string() })?;

    parse_toml_config(&content)
}

/// Parse TOML configuration text
pub fn parse_toml_config(content: &str) -> Result<TomlConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))
}

/// Apply file configuration over base configuration
pub fn apply_toml_config(mut base_config: AppConfig, file: TomlConfig) -> Result<AppConfig, ConfigError> {
    if let Some(candidates) = file.candidates {
        base_config.candidates = candidates;
    }

    if let Some(bridge) = file.bridge {
        if let Some(name) = bridge.name {
            base_config.bridge = name;
        }
        if let Some(address) = bridge.address {
            base_config.bridge_address = parse_bridge_address(&address)?;
        }
    }

    if let Some(firewall) = file.firewall {
        if let Some(prefix) = firewall.chain_prefix {
            base_config.chain_prefix = prefix;
        }
        if let Some(iptables) = firewall.iptables {
            base_config.iptables_path = iptables;
        }
    }

    if let Some(run) = file.run {
        if let Some(lock_file) = run.lock_file {
            base_config.lock_file = lock_file;
        }
        if let Some(secs) = run.timeout_secs {
            base_config.run_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = run.ip_forward_path {
            base_config.ip_forward_path = path;
        }
    }

    if let Some(logging) = file.logging {
        if let Some(level) = logging.level {
            base_config.log_level = level;
        }
        if let Some(file) = logging.file {
            base_config.log_file = Some(file);
        }
    }

    Ok(base_config)
}
