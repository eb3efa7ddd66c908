//! Uplink selection and NAT reconciliation
//!
//! One pass per invocation:
//!
//! ```text
//! SCANNING -> NO_UPLINK         -> DONE   clear default route, flush owned rules
//!          -> UPLINK_NO_GATEWAY -> DONE   log only, wait for the next event
//!          -> UPLINK_READY      -> DONE   enable forwarding, flush and reinstall
//! ```
//!
//! Every OS mutation is best effort except the forwarding switch.

use crate::config::AppConfig;
use crate::error::{AppError, ReconcileError};
use crate::firewall::rules::OwnedChains;
use crate::firewall::Firewall;
use crate::network::{gateway_for, InterfaceSnapshot, NetworkState};
use ipnetwork::Ipv4Network;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::{debug, error, info, warn};

pub mod lock;

use self::lock::RunLock;

/// Dispatcher context. Logged, never used for control flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    pub interface: Option<String>,
    pub event: Option<String>,
}

/// Result of scanning one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub name: String,
    /// `None` when the interface is absent or could not be read
    pub snapshot: Option<InterfaceSnapshot>,
}

/// Outcome of the selection step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    NoUplink,
    UplinkNoGateway { uplink: String },
    UplinkReady { uplink: String, gateway: Ipv4Addr },
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::NoUplink => write!(f, "no uplink"),
            Selection::UplinkNoGateway { uplink } => write!(f, "uplink {} without gateway", uplink),
            Selection::UplinkReady { uplink, gateway } => {
                write!(f, "uplink {} via {}", uplink, gateway)
            }
        }
    }
}

/// Result of a locked run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(Selection),
    /// Another run held the lock; its re-scan covers this trigger.
    Superseded,
}

/// First candidate, in priority order, that is up and addressed.
pub fn select_uplink(entries: &[ScanEntry]) -> Option<&InterfaceSnapshot> {
    entries
        .iter()
        .filter_map(|entry| entry.snapshot.as_ref())
        .find(|snapshot| snapshot.is_uplink_capable())
}

/// Reconciles bridge address, forwarding and owned firewall rules
pub struct Reconciler<N, F> {
    network: N,
    firewall: F,
    candidates: Vec<String>,
    bridge: String,
    bridge_address: Ipv4Network,
    chains: OwnedChains,
}

impl<N: NetworkState, F: Firewall> Reconciler<N, F> {
    pub fn new(network: N, firewall: F, config: &AppConfig) -> Self {
        Self {
            network,
            firewall,
            candidates: config.candidates.clone(),
            bridge: config.bridge.clone(),
            bridge_address: config.bridge_address,
            chains: OwnedChains::new(&config.chain_prefix),
        }
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn firewall(&self) -> &F {
        &self.firewall
    }

    /// Run one pass while holding the lock at `lock_path`.
    pub async fn run_exclusive(
        &self,
        lock_path: &Path,
        trigger: &Trigger,
    ) -> Result<RunOutcome, AppError> {
        let Some(_lock) = RunLock::try_acquire(lock_path)? else {
            info!(
                lock = %lock_path.display(),
                interface = ?trigger.interface,
                event = ?trigger.event,
                "another reconciliation is running, exiting"
            );
            return Ok(RunOutcome::Superseded);
        };

        let selection = self.run(trigger).await?;
        Ok(RunOutcome::Completed(selection))
    }

    /// Run one reconciliation pass.
    pub async fn run(&self, trigger: &Trigger) -> Result<Selection, ReconcileError> {
        info!(
            interface = ?trigger.interface,
            event = ?trigger.event,
            candidates = ?self.candidates,
            "reconciliation triggered"
        );

        self.ensure_bridge().await;

        let entries = self.scan().await;
        let selection = self.select(&entries).await;
        info!(outcome = %selection, "uplink selection");

        match &selection {
            Selection::NoUplink => self.clear_uplink().await,
            Selection::UplinkNoGateway { uplink } => {
                info!(
                    uplink = %uplink,
                    "uplink has an address but no default gateway yet, leaving rules unchanged"
                );
            }
            Selection::UplinkReady { uplink, .. } => self.install_uplink(uplink).await?,
        }

        Ok(selection)
    }

    async fn ensure_bridge(&self) {
        let link = match self.network.link(&self.bridge).await {
            Ok(Some(link)) => link,
            Ok(None) => {
                warn!(bridge = %self.bridge, "bridge interface not present");
                return;
            }
            Err(e) => {
                warn!(bridge = %self.bridge, error = %e, "failed to read bridge state");
                return;
            }
        };

        if !link.admin_up {
            match self.network.set_link_up(link.index).await {
                Ok(()) => info!(bridge = %self.bridge, "bridge brought up"),
                Err(e) => warn!(bridge = %self.bridge, error = %e, "failed to bring bridge up"),
            }
        }

        let addresses = match self.network.ipv4_addresses(link.index).await {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!(bridge = %self.bridge, error = %e, "failed to read bridge addresses");
                return;
            }
        };

        if addresses.contains(&self.bridge_address) {
            debug!(bridge = %self.bridge, address = %self.bridge_address, "bridge address present");
            return;
        }

        match self
            .network
            .add_ipv4_address(link.index, self.bridge_address)
            .await
        {
            Ok(()) => info!(bridge = %self.bridge, address = %self.bridge_address, "bridge address assigned"),
            Err(e) => warn!(
                bridge = %self.bridge,
                address = %self.bridge_address,
                error = %e,
                "failed to assign bridge address"
            ),
        }
    }

    async fn scan(&self) -> Vec<ScanEntry> {
        let mut entries = Vec::with_capacity(self.candidates.len());

        for name in &self.candidates {
            let snapshot = self.snapshot(name).await;
            match &snapshot {
                Some(s) => info!(
                    candidate = %name,
                    admin_up = s.link.admin_up,
                    oper_state = %s.link.oper_state,
                    carrier = ?s.link.carrier,
                    addresses = ?s.ipv4.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
                    capable = s.is_uplink_capable(),
                    "candidate scanned"
                ),
                None => info!(candidate = %name, "candidate absent"),
            }
            entries.push(ScanEntry {
                name: name.clone(),
                snapshot,
            });
        }

        entries
    }

    async fn snapshot(&self, name: &str) -> Option<InterfaceSnapshot> {
        let link = match self.network.link(name).await {
            Ok(link) => link?,
            Err(e) => {
                warn!(candidate = %name, error = %e, "failed to read link state");
                return None;
            }
        };

        let ipv4 = match self.network.ipv4_addresses(link.index).await {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!(candidate = %name, error = %e, "failed to read addresses");
                Vec::new()
            }
        };

        Some(InterfaceSnapshot { link, ipv4 })
    }

    async fn select(&self, entries: &[ScanEntry]) -> Selection {
        let Some(uplink) = select_uplink(entries) else {
            return Selection::NoUplink;
        };

        let routes = match self.network.default_routes().await {
            Ok(routes) => routes,
            Err(e) => {
                warn!(error = %e, "failed to read default routes");
                Vec::new()
            }
        };

        match gateway_for(&routes, uplink.link.index) {
            Some(gateway) => Selection::UplinkReady {
                uplink: uplink.link.name.clone(),
                gateway,
            },
            None => Selection::UplinkNoGateway {
                uplink: uplink.link.name.clone(),
            },
        }
    }

    async fn clear_uplink(&self) {
        match self.network.delete_default_routes().await {
            Ok(0) => debug!("no default route to remove"),
            Ok(count) => info!(count, "default routes removed"),
            Err(e) => warn!(error = %e, "failed to remove default routes"),
        }

        match self.firewall.flush_owned().await {
            Ok(()) => info!(action = "flush", "owned NAT/forward rules cleared"),
            Err(e) => warn!(error = %e, "failed to flush owned rules"),
        }
    }

    async fn install_uplink(&self, uplink: &str) -> Result<(), ReconcileError> {
        if let Err(e) = self.network.set_ipv4_forwarding(true).await {
            error!(error = %e, "failed to enable IPv4 forwarding, NAT would be inert");
            return Err(ReconcileError::ForwardingFailed(e));
        }
        debug!("IPv4 forwarding enabled");

        if let Err(e) = self.firewall.ensure_owned_chains().await {
            warn!(error = %e, "failed to prepare owned chains");
        }
        if let Err(e) = self.firewall.flush_owned().await {
            warn!(error = %e, "failed to flush owned rules");
        }

        let rules = self.chains.uplink_rules(&self.bridge, uplink);
        let mut installed = 0;
        for rule in &rules {
            match self.firewall.append(rule).await {
                Ok(()) => installed += 1,
                Err(e) => warn!(rule = %rule, error = %e, "failed to append rule"),
            }
        }

        info!(
            action = "replace",
            uplink = %uplink,
            bridge = %self.bridge,
            installed,
            expected = rules.len(),
            "owned NAT/forward rules installed"
        );

        if let Ok(current) = self.firewall.owned_rules().await {
            for line in current {
                debug!(rule = %line, "owned rule");
            }
        }

        Ok(())
    }
}
