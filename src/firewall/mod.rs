//! Firewall rule management module
//!
//! The reconciler owns two chains, `<PREFIX>_POSTROUTING` in the nat table and
//! `<PREFIX>_FORWARD` in the filter table. Each is reached through one jump rule
//! at the head of the matching built-in chain. Rules outside those chains belong
//! to other tools and are never touched.

use crate::error::FirewallError;
use std::fmt;
use std::future::Future;

pub mod iptables;
pub mod rules;

/// Netfilter table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Filter,
    Nat,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Filter => "filter",
            Table::Nat => "nat",
        }
    }
}

/// Chain a rule lives in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Chain {
    Forward,
    Postrouting,
    Custom(String),
}

impl Chain {
    pub fn as_str(&self) -> &str {
        match self {
            Chain::Forward => "FORWARD",
            Chain::Postrouting => "POSTROUTING",
            Chain::Custom(name) => name,
        }
    }
}

/// Rule target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Accept,
    Masquerade,
    Jump(String),
}

impl Target {
    fn as_str(&self) -> &str {
        match self {
            Target::Accept => "ACCEPT",
            Target::Masquerade => "MASQUERADE",
            Target::Jump(chain) => chain,
        }
    }
}

/// Single iptables rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub table: Table,
    pub chain: Chain,
    pub in_interface: Option<String>,
    pub out_interface: Option<String>,
    /// Conntrack states, e.g. "RELATED,ESTABLISHED"
    pub ct_state: Option<String>,
    pub target: Target,
}

impl Rule {
    pub fn new(table: Table, chain: Chain, target: Target) -> Self {
        Self {
            table,
            chain,
            in_interface: None,
            out_interface: None,
            ct_state: None,
            target,
        }
    }

    pub fn in_interface(mut self, iface: &str) -> Self {
        self.in_interface = Some(iface.to_string());
        self
    }

    pub fn out_interface(mut self, iface: &str) -> Self {
        self.out_interface = Some(iface.to_string());
        self
    }

    pub fn ct_state(mut self, state: &str) -> Self {
        self.ct_state = Some(state.to_string());
        self
    }

    /// Match and target arguments, without table, action or chain.
    pub fn match_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(iface) = &self.in_interface {
            args.push("-i".to_string());
            args.push(iface.clone());
        }

        if let Some(iface) = &self.out_interface {
            args.push("-o".to_string());
            args.push(iface.clone());
        }

        if let Some(state) = &self.ct_state {
            args.push("-m".to_string());
            args.push("conntrack".to_string());
            args.push("--ctstate".to_string());
            args.push(state.clone());
        }

        args.push("-j".to_string());
        args.push(self.target.as_str().to_string());

        args
    }

    /// Full iptables argument list for `action` ("-A", "-C", "-D", "-I").
    pub fn to_args(&self, action: &str) -> Vec<String> {
        let mut args = vec![
            "-t".to_string(),
            self.table.as_str().to_string(),
            action.to_string(),
            self.chain.as_str().to_string(),
        ];
        args.extend(self.match_args());
        args
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "-t {} -A {} {}",
            self.table.as_str(),
            self.chain.as_str(),
            self.match_args().join(" ")
        )
    }
}

/// Operations on the owned chains
pub trait Firewall: Send + Sync {
    /// Create the owned chains and their jump rules if missing.
    fn ensure_owned_chains(&self) -> impl Future<Output = Result<(), FirewallError>> + Send;

    /// Remove every rule from the owned chains.
    fn flush_owned(&self) -> impl Future<Output = Result<(), FirewallError>> + Send;

    fn append(&self, rule: &Rule) -> impl Future<Output = Result<(), FirewallError>> + Send;

    /// Current contents of the owned chains in `iptables -S` form.
    fn owned_rules(&self) -> impl Future<Output = Result<Vec<String>, FirewallError>> + Send;
}
