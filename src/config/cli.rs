//! Command-line argument parsing

use crate::config::{parse_bridge_address, parse_interface_list, AppConfig};
use crate::error::ConfigError;
use crate::reconcile::Trigger;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments structure
#[derive(Parser, Debug)]
#[command(name = "uplink-nat")]
#[command(about = "Select the live uplink and reconcile bridge NAT rules")]
#[command(version)]
pub struct CliArgs {
    /// Interface named by the network event dispatcher (logged only)
    pub interface: Option<String>,

    /// Event reported by the dispatcher, e.g. "up" or "routable" (logged only)
    pub event: Option<String>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, help = "Set the logging level")]
    pub log_level: Option<String>,

    /// Log file path
    #[arg(long, help = "Append logs to this file (empty string logs to stderr)")]
    pub log_file: Option<String>,

    /// Candidate uplinks in priority order
    #[arg(long, help = "Comma separated candidate uplinks, highest priority first")]
    pub candidates: Option<String>,

    /// Bridge interface name
    #[arg(long, help = "Bridge interface that clients are attached to")]
    pub bridge: Option<String>,

    /// Bridge address in CIDR notation
    #[arg(long, help = "Static IPv4 address/prefix required on the bridge")]
    pub bridge_address: Option<String>,

    /// Owned iptables chain prefix
    #[arg(long, help = "Prefix for the iptables chains owned by this tool")]
    pub chain_prefix: Option<String>,

    /// Lock file path
    #[arg(long, help = "Lock file guarding against overlapping runs")]
    pub lock_file: Option<String>,

    /// Run timeout in seconds
    #[arg(long, help = "Abort the run after this many seconds")]
    pub timeout_secs: Option<u64>,

    /// Log intended changes without touching the system
    #[arg(long, help = "Inspect state and log planned changes without applying them")]
    pub dry_run: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit without reconciling")]
    pub validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    pub print_default_config: bool,
}

impl CliArgs {
    /// Apply CLI arguments over base configuration
    pub fn apply_to_config(&self, mut base_config: AppConfig) -> Result<AppConfig, ConfigError> {
        if let Some(ref list) = self.candidates {
            base_config.candidates = parse_interface_list(list);
        }

        if let Some(ref bridge) = self.bridge {
            base_config.bridge = bridge.clone();
        }

        if let Some(ref address) = self.bridge_address {
            base_config.bridge_address = parse_bridge_address(address)?;
        }

        if let Some(ref prefix) = self.chain_prefix {
            base_config.chain_prefix = prefix.clone();
        }

        if let Some(ref path) = self.lock_file {
            base_config.lock_file = PathBuf::from(path);
        }

        if let Some(secs) = self.timeout_secs {
            base_config.run_timeout = Duration::from_secs(secs);
        }

        if let Some(ref level) = self.log_level {
            base_config.log_level = level.clone();
        }

        if let Some(ref path) = self.log_file {
            base_config.log_file = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        Ok(base_config)
    }

    /// Dispatcher context for this invocation
    pub fn trigger(&self) -> Trigger {
        Trigger {
            interface: self.interface.clone(),
            event: self.event.clone(),
        }
    }
}

/// Print default configuration in TOML format
pub fn print_default_config() {
    let default_config = AppConfig::default();

    println!("# Uplink NAT Configuration");
    println!("# This is the default configuration with all available options");
    println!();
    println!("# Candidate uplinks, highest priority first");
    let quoted: Vec<String> = default_config
        .candidates
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect();
    println!("candidates = [{}]", quoted.join(", "));
    println!();
    println!("[bridge]");
    println!("# Bridge interface and the static address it must carry");
    println!("name = \"{}\"", default_config.bridge);
    println!("address = \"{}\"", default_config.bridge_address);
    println!();
    println!("[firewall]");
    println!("# Owned chains are <prefix>_POSTROUTING (nat) and <prefix>_FORWARD (filter)");
    println!("chain_prefix = \"{}\"", default_config.chain_prefix);
    println!("iptables = \"{}\"", default_config.iptables_path);
    println!();
    println!("[run]");
    println!("lock_file = \"{}\"", default_config.lock_file.display());
    println!("timeout_secs = {}", default_config.run_timeout.as_secs());
    println!(
        "ip_forward_path = \"{}\"",
        default_config.ip_forward_path.display()
    );
    println!();
    println!("[logging]");
    println!("# Log level: trace, debug, info, warn, error");
    println!("level = \"{}\"", default_config.log_level);
    if let Some(ref file) = default_config.log_file {
        println!("file = \"{}\"", file.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::try_parse_from([
            "uplink-nat",
            "wlan1",
            "up",
            "--config",
            "/etc/uplink-nat.toml",
            "--log-level",
            "debug",
            "--candidates",
            "wlan1,eth0",
            "--bridge",
            "br0",
            "--bridge-address",
            "10.3.141.1/24",
            "--lock-file",
            "/tmp/test.lock",
            "--timeout-secs",
            "5",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(args.interface, Some("wlan1".to_string()));
        assert_eq!(args.event, Some("up".to_string()));
        assert_eq!(args.config, Some("/etc/uplink-nat.toml".to_string()));
        assert_eq!(args.log_level, Some("debug".to_string()));
        assert_eq!(args.candidates, Some("wlan1,eth0".to_string()));
        assert_eq!(args.bridge, Some("br0".to_string()));
        assert_eq!(args.bridge_address, Some("10.3.141.1/24".to_string()));
        assert_eq!(args.lock_file, Some("/tmp/test.lock".to_string()));
        assert_eq!(args.timeout_secs, Some(5));
        assert!(args.dry_run);
        assert!(!args.validate_config);
        assert!(!args.print_default_config);
    }

    #[test]
    fn test_cli_args_minimal() {
        let args = CliArgs::try_parse_from(["uplink-nat"]).unwrap();

        assert_eq!(args.interface, None);
        assert_eq!(args.event, None);
        assert_eq!(args.config, None);
        assert_eq!(args.candidates, None);
        assert!(!args.dry_run);
        assert!(!args.validate_config);

        let trigger = args.trigger();
        assert!(trigger.interface.is_none());
        assert!(trigger.event.is_none());
    }

    #[test]
    fn test_trigger_from_positionals() {
        let args = CliArgs::try_parse_from(["uplink-nat", "eth0", "down"]).unwrap();
        let trigger = args.trigger();
        assert_eq!(trigger.interface.as_deref(), Some("eth0"));
        assert_eq!(trigger.event.as_deref(), Some("down"));
    }

    #[test]
    fn test_apply_cli_to_config() {
        let args = CliArgs::try_parse_from([
            "uplink-nat",
            "--candidates",
            "usb0,eth0",
            "--bridge-address",
            "192.168.4.1/24",
            "--chain-prefix",
            "RV",
            "--timeout-secs",
            "7",
            "--log-file",
            "",
        ])
        .unwrap();

        let config = args.apply_to_config(AppConfig::default()).unwrap();

        assert_eq!(config.candidates, vec!["usb0", "eth0"]);
        assert_eq!(config.bridge_address.to_string(), "192.168.4.1/24");
        assert_eq!(config.chain_prefix, "RV");
        assert_eq!(config.run_timeout, Duration::from_secs(7));
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_apply_cli_to_config_no_overrides() {
        let args = CliArgs::try_parse_from(["uplink-nat"]).unwrap();

        let base_config = AppConfig::default();
        let original_config = base_config.clone();
        let config = args.apply_to_config(base_config).unwrap();

        assert_eq!(config.candidates, original_config.candidates);
        assert_eq!(config.bridge, original_config.bridge);
        assert_eq!(config.bridge_address, original_config.bridge_address);
        assert_eq!(config.log_level, original_config.log_level);
        assert_eq!(config.log_file, original_config.log_file);
    }

    #[test]
    fn test_invalid_timeout_rejected_by_parser() {
        assert!(CliArgs::try_parse_from(["uplink-nat", "--timeout-secs", "abc"]).is_err());
        assert!(CliArgs::try_parse_from(["uplink-nat", "--timeout-secs", "-3"]).is_err());
    }

    #[test]
    fn test_zero_timeout_fails_validation() {
        let args = CliArgs::try_parse_from(["uplink-nat", "--timeout-secs", "0"]).unwrap();
        let config = args.apply_to_config(AppConfig::default()).unwrap();
        assert!(config.validate().is_err());
    }
}
