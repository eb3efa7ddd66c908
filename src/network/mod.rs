//! Network state module
//!
//! Typed view of the links, addresses and routes the reconciler reads, plus the
//! narrow set of mutations it is allowed to perform.

use crate::error::NetworkError;
use ipnetwork::Ipv4Network;
use std::fmt;
use std::future::Future;
use std::net::Ipv4Addr;

pub mod dry_run;
pub mod netlink;
pub mod sysctl;

/// RFC 2863 operational state as reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperState {
    Up,
    Down,
    Dormant,
    LowerLayerDown,
    NotPresent,
    Testing,
    Unknown,
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperState::Up => "up",
            OperState::Down => "down",
            OperState::Dormant => "dormant",
            OperState::LowerLayerDown => "lowerlayerdown",
            OperState::NotPresent => "notpresent",
            OperState::Testing => "testing",
            OperState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Link attributes read from the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    pub name: String,
    pub index: u32,
    /// IFF_UP
    pub admin_up: bool,
    pub oper_state: OperState,
    pub carrier: Option<bool>,
}

/// IPv4 default route (0.0.0.0/0)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRoute {
    pub interface_index: Option<u32>,
    pub gateway: Option<Ipv4Addr>,
    pub metric: Option<u32>,
}

/// Point-in-time view of one candidate interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSnapshot {
    pub link: LinkState,
    pub ipv4: Vec<Ipv4Network>,
}

impl InterfaceSnapshot {
    /// Administratively up and carrying at least one IPv4 address.
    pub fn is_uplink_capable(&self) -> bool {
        self.link.admin_up && !self.ipv4.is_empty()
    }
}

/// Query and mutation interface over the host network stack
pub trait NetworkState: Send + Sync {
    /// Look up a link by name. `Ok(None)` when the interface does not exist.
    fn link(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<LinkState>, NetworkError>> + Send;

    fn ipv4_addresses(
        &self,
        index: u32,
    ) -> impl Future<Output = Result<Vec<Ipv4Network>, NetworkError>> + Send;

    fn default_routes(&self) -> impl Future<Output = Result<Vec<DefaultRoute>, NetworkError>> + Send;

    fn set_link_up(&self, index: u32) -> impl Future<Output = Result<(), NetworkError>> + Send;

    fn add_ipv4_address(
        &self,
        index: u32,
        address: Ipv4Network,
    ) -> impl Future<Output = Result<(), NetworkError>> + Send;

    /// Remove the IPv4 default routes of the main table, one by one. A failed
    /// removal is logged and skipped; the result counts the routes removed.
    fn delete_default_routes(&self) -> impl Future<Output = Result<usize, NetworkError>> + Send;

    /// Toggle the process-wide IPv4 forwarding switch.
    fn set_ipv4_forwarding(
        &self,
        enabled: bool,
    ) -> impl Future<Output = Result<(), NetworkError>> + Send;
}

/// Default gateway published for the given link, if any.
pub fn gateway_for(routes: &[DefaultRoute], index: u32) -> Option<Ipv4Addr> {
    routes
        .iter()
        .filter(|r| r.interface_index == Some(index))
        .filter_map(|r| r.gateway.map(|gw| (r.metric.unwrap_or(0), gw)))
        .min_by_key(|(metric, _)| *metric)
        .map(|(_, gw)| gw)
}
