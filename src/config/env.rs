//! Environment variable configuration handling

use crate::config::{parse_bridge_address, parse_interface_list, AppConfig};
use crate::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "UPLINK_NAT_";

/// Apply environment variable configuration over base configuration
pub fn apply_env_config(base_config: AppConfig) -> Result<AppConfig, ConfigError> {
    apply_env_from(base_config, |key| env::var(key).ok())
}

/// Apply configuration from an arbitrary variable lookup.
///
/// `lookup` receives the full variable name including [`ENV_PREFIX`].
pub fn apply_env_from<F>(mut base_config: AppConfig, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

    // Format: UPLINK_NAT_CANDIDATES="eth0,wlan1,usb0"
    if let Some(list) = var("CANDIDATES") {
        base_config.candidates = parse_interface_list(&list);
    }

    if let Some(bridge) = var("BRIDGE") {
        base_config.bridge = bridge.trim().to_string();
    }

    if let Some(address) = var("BRIDGE_ADDRESS") {
        base_config.bridge_address = parse_bridge_address(&address)?;
    }

    if let Some(prefix) = var("CHAIN_PREFIX") {
        base_config.chain_prefix = prefix;
    }

    if let Some(path) = var("IPTABLES") {
        base_config.iptables_path = path;
    }

    if let Some(path) = var("IP_FORWARD_PATH") {
        base_config.ip_forward_path = PathBuf::from(path);
    }

    if let Some(path) = var("LOCK_FILE") {
        base_config.lock_file = PathBuf::from(path);
    }

    if let Some(secs) = var("TIMEOUT_SECS") {
        base_config.run_timeout = parse_timeout_secs(&secs)?;
    }

    if let Some(level) = var("LOG_LEVEL") {
        base_config.log_level = level;
    }

    // An empty value switches file logging off.
    if let Some(path) = var("LOG_FILE") {
        base_config.log_file = if path.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        };
    }

    Ok(base_config)
}

/// Parse a whole number of seconds.
pub fn parse_timeout_secs(value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidFormat(format!("Invalid timeout seconds: '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_apply_env_config() {
        let lookup = lookup_from(&[
            ("UPLINK_NAT_CANDIDATES", "wwan0, eth1"),
            ("UPLINK_NAT_BRIDGE", "br-lan"),
            ("UPLINK_NAT_BRIDGE_ADDRESS", "192.168.8.1/24"),
            ("UPLINK_NAT_CHAIN_PREFIX", "RVNET"),
            ("UPLINK_NAT_IPTABLES", "/usr/sbin/iptables-legacy"),
            ("UPLINK_NAT_LOCK_FILE", "/tmp/uplink.lock"),
            ("UPLINK_NAT_TIMEOUT_SECS", "15"),
            ("UPLINK_NAT_LOG_LEVEL", "debug"),
            ("UPLINK_NAT_LOG_FILE", "/tmp/uplink.log"),
        ]);

        let config = apply_env_from(AppConfig::default(), lookup).unwrap();

        assert_eq!(config.candidates, vec!["wwan0", "eth1"]);
        assert_eq!(config.bridge, "br-lan");
        assert_eq!(config.bridge_address.to_string(), "192.168.8.1/24");
        assert_eq!(config.chain_prefix, "RVNET");
        assert_eq!(config.iptables_path, "/usr/sbin/iptables-legacy");
        assert_eq!(config.lock_file, PathBuf::from("/tmp/uplink.lock"));
        assert_eq!(config.run_timeout, Duration::from_secs(15));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/uplink.log")));
    }

    #[test]
    fn test_apply_env_config_no_vars() {
        let base_config = AppConfig::default();
        let config = apply_env_from(base_config.clone(), |_| None).unwrap();

        assert_eq!(config.candidates, base_config.candidates);
        assert_eq!(config.bridge, base_config.bridge);
        assert_eq!(config.bridge_address, base_config.bridge_address);
        assert_eq!(config.lock_file, base_config.lock_file);
        assert_eq!(config.run_timeout, base_config.run_timeout);
        assert_eq!(config.log_file, base_config.log_file);
    }

    #[test]
    fn test_empty_log_file_means_stderr() {
        let lookup = lookup_from(&[("UPLINK_NAT_LOG_FILE", "")]);
        let config = apply_env_from(AppConfig::default(), lookup).unwrap();
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_invalid_bridge_address() {
        let lookup = lookup_from(&[("UPLINK_NAT_BRIDGE_ADDRESS", "10.3.141.1")]);
        let result = apply_env_from(AppConfig::default(), lookup);
        assert!(matches!(result, Err(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_invalid_timeout() {
        let lookup = lookup_from(&[("UPLINK_NAT_TIMEOUT_SECS", "soon")]);
        let result = apply_env_from(AppConfig::default(), lookup);
        assert!(matches!(result, Err(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_parse_timeout_secs() {
        assert_eq!(parse_timeout_secs("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_timeout_secs(" 5 ").unwrap(), Duration::from_secs(5));
        assert!(parse_timeout_secs("-1").is_err());
        assert!(parse_timeout_secs("1.5").is_err());
    }
}
