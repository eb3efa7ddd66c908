//! Configuration management module
//!
//! Handles loading configuration from multiple sources with proper precedence:
//! CLI arguments > environment variables > TOML files > defaults

use crate::error::ConfigError;
use ipnetwork::Ipv4Network;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

pub mod cli;
pub mod env;
pub mod toml;

use self::cli::CliArgs;

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Candidate uplinks, highest priority first.
    pub candidates: Vec<String>,
    pub bridge: String,
    pub bridge_address: Ipv4Network,
    pub chain_prefix: String,
    pub iptables_path: String,
    pub ip_forward_path: PathBuf,
    pub lock_file: PathBuf,
    pub run_timeout: Duration,
    pub log_level: String,
    /// `None` logs to stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            candidates: vec!["eth0".to_string(), "wlan1".to_string(), "usb0".to_string()],
            bridge: "br0".to_string(),
            bridge_address: Ipv4Network::new([10, 3, 141, 1].into(), 24)
                .expect("static bridge network is valid"),
            chain_prefix: "UPLINK".to_string(),
            iptables_path: "iptables".to_string(),
            ip_forward_path: PathBuf::from("/proc/sys/net/ipv4/ip_forward"),
            lock_file: PathBuf::from("/run/uplink-nat.lock"),
            run_timeout: Duration::from_secs(20),
            log_level: "info".to_string(),
            log_file: Some(PathBuf::from("/var/log/uplink-nat.log")),
        }
    }
}

impl AppConfig {
    /// Build the effective configuration from every layer and validate it.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(ref path) = cli.config {
            let file = toml::load_toml_config(path)?;
            config = toml::apply_toml_config(config, file)?;
        }

        config = env::apply_env_config(config)?;
        config = cli.apply_to_config(config)?;
        config.validate()?;

        Ok(config)
    }

    /// Check cross-field constraints that no single layer can enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.candidates.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "candidates".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for name in &self.candidates {
            validate_interface_name(name)?;
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Candidate '{}' is listed more than once",
                    name
                )));
            }
        }

        validate_interface_name(&self.bridge)?;
        if seen.contains(self.bridge.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Bridge '{}' cannot also be an uplink candidate",
                self.bridge
            )));
        }

        let prefix_re = Regex::new(r"^[A-Z][A-Z0-9_]{0,19}$").expect("static regex");
        if !prefix_re.is_match(&self.chain_prefix) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid chain prefix '{}': use 1-20 uppercase letters, digits or '_'",
                self.chain_prefix
            )));
        }

        if self.run_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "Run timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Linux interface names are at most 15 bytes and never contain '/' or whitespace.
/// A leading '-' or '.' is refused so a name can never read as an iptables option.
pub fn validate_interface_name(name: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.:@-]{0,14}$").expect("static regex");
    if re.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "Invalid interface name '{}'",
            name
        )))
    }
}

/// Split a comma separated interface list, dropping empty entries.
pub fn parse_interface_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse an `a.b.c.d/len` bridge address.
pub fn parse_bridge_address(value: &str) -> Result<Ipv4Network, ConfigError> {
    let value = value.trim();
    if !value.contains('/') {
        return Err(ConfigError::InvalidFormat(format!(
            "Bridge address '{}' must include a prefix length (e.g. '10.3.141.1/24')",
            value
        )));
    }

    value
        .parse::<Ipv4Network>()
        .map_err(|e| ConfigError::InvalidFormat(format!("Invalid bridge address '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bridge_address.to_string(), "10.3.141.1/24");
    }

    #[test]
    fn test_validate_rejects_empty_candidates() {
        let config = AppConfig {
            candidates: vec![],
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bridge_as_candidate() {
        let config = AppConfig {
            candidates: vec!["eth0".to_string(), "br0".to_string()],
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let config = AppConfig {
            candidates: vec!["eth0".to_string(), "eth0".to_string()],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_chain_prefix() {
        let config = AppConfig {
            chain_prefix: "uplink-nat".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = AppConfig {
            run_timeout: Duration::ZERO,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_interface_name() {
        assert!(validate_interface_name("eth0").is_ok());
        assert!(validate_interface_name("wlx00c0ca123456").is_ok());
        assert!(validate_interface_name("eth0.100").is_ok());

        assert!(validate_interface_name("").is_err());
        assert!(validate_interface_name("this-name-is-too-long").is_err());
        assert!(validate_interface_name("eth 0").is_err());
        assert!(validate_interface_name("../eth0").is_err());
        assert!(validate_interface_name("-j").is_err());
        assert!(validate_interface_name("--jump").is_err());
        assert!(validate_interface_name(".").is_err());
        assert!(validate_interface_name("..").is_err());
        assert!(validate_interface_name("_tap0").is_ok());
    }

    #[test]
    fn test_parse_interface_list() {
        assert_eq!(
            parse_interface_list(" eth0, wlan1 ,,usb0 "),
            vec!["eth0", "wlan1", "usb0"]
        );
        assert!(parse_interface_list("  ").is_empty());
    }

    #[test]
    fn test_parse_bridge_address() {
        let net = parse_bridge_address("192.168.50.1/24").unwrap();
        assert_eq!(net.ip().to_string(), "192.168.50.1");
        assert_eq!(net.prefix(), 24);

        assert!(matches!(
            parse_bridge_address("192.168.50.1"),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(parse_bridge_address("192.168.50.1/33").is_err());
        assert!(parse_bridge_address("fd00::1/64").is_err());
    }
}
