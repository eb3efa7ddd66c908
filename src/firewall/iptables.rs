//! iptables command backend

use crate::error::FirewallError;
use crate::firewall::rules::OwnedChains;
use crate::firewall::{Firewall, Rule, Table};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Seconds iptables waits for the xtables lock before giving up
const XTABLES_WAIT_SECS: &str = "5";

/// [`Firewall`] that shells out to the iptables binary
pub struct IptablesFirewall {
    binary: String,
    chains: OwnedChains,
}

impl IptablesFirewall {
    pub fn new(binary: impl Into<String>, chain_prefix: &str) -> Self {
        Self {
            binary: binary.into(),
            chains: OwnedChains::new(chain_prefix),
        }
    }

    /// Run one iptables command. The child is killed if the future is dropped,
    /// so an enclosing timeout also ends a hung command.
    async fn execute(&self, args: &[String]) -> Result<String, FirewallError> {
        debug!("Executing: {} -w {} {}", self.binary, XTABLES_WAIT_SECS, args.join(" "));

        let output = Command::new(&self.binary)
            .arg("-w")
            .arg(XTABLES_WAIT_SECS)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FirewallError::Spawn(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FirewallError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn owned(&self) -> [(Table, &str); 2] {
        [
            (Table::Nat, self.chains.nat.as_str()),
            (Table::Filter, self.chains.forward.as_str()),
        ]
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl Firewall for IptablesFirewall {
    async fn ensure_owned_chains(&self) -> Result<(), FirewallError> {
        for (table, chain) in self.owned() {
            match self.execute(&args(&["-t", table.as_str(), "-N", chain])).await {
                Ok(_) => info!(table = table.as_str(), chain, "owned chain created"),
                Err(FirewallError::CommandFailed(msg)) if is_chain_exists(&msg) => {}
                Err(e) => return Err(e),
            }
        }

        for rule in self.chains.jump_rules() {
            match self.execute(&rule.to_args("-C")).await {
                Ok(_) => {}
                Err(FirewallError::CommandFailed(_)) => {
                    let mut insert = rule.to_args("-I");
                    // Insert at the head so earlier rules from other tools cannot shadow it
                    insert.insert(4, "1".to_string());
                    self.execute(&insert).await?;
                    info!(rule = %rule, "jump rule installed");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn flush_owned(&self) -> Result<(), FirewallError> {
        for (table, chain) in self.owned() {
            match self.execute(&args(&["-t", table.as_str(), "-F", chain])).await {
                Ok(_) => debug!(table = table.as_str(), chain, "owned chain flushed"),
                Err(FirewallError::CommandFailed(msg)) if is_missing_chain(&msg) => {
                    debug!(table = table.as_str(), chain, "owned chain absent, nothing to flush");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn append(&self, rule: &Rule) -> Result<(), FirewallError> {
        self.execute(&rule.to_args("-A")).await?;
        debug!(rule = %rule, "rule appended");
        Ok(())
    }

    async fn owned_rules(&self) -> Result<Vec<String>, FirewallError> {
        let mut rules = Vec::new();
        for (table, chain) in self.owned() {
            match self.execute(&args(&["-t", table.as_str(), "-S", chain])).await {
                Ok(out) => rules.extend(rule_lines(&out, chain)),
                Err(FirewallError::CommandFailed(msg)) if is_missing_chain(&msg) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(rules)
    }
}

/// Keep the `-A <chain> ...` lines of `iptables -S` output.
fn rule_lines(output: &str, chain: &str) -> Vec<String> {
    let prefix = format!("-A {} ", chain);
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(&prefix))
        .map(str::to_string)
        .collect()
}

fn is_chain_exists(stderr: &str) -> bool {
    stderr.contains("Chain already exists")
}

fn is_missing_chain(stderr: &str) -> bool {
    stderr.contains("No chain/target/match by that name") || stderr.contains("does not exist")
}
