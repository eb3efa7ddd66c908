//! Read-only wrapper used by `--dry-run`
//!
//! Queries go to the wrapped backend. Mutations are logged and skipped.

use crate::error::{FirewallError, NetworkError};
use crate::firewall::{Firewall, Rule};
use crate::network::{DefaultRoute, LinkState, NetworkState};
use ipnetwork::Ipv4Network;
use tracing::info;

pub struct DryRun<T> {
    inner: T,
}

impl<T> DryRun<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<N: NetworkState> NetworkState for DryRun<N> {
    async fn link(&self, name: &str) -> Result<Option<LinkState>, NetworkError> {
        self.inner.link(name).await
    }

    async fn ipv4_addresses(&self, index: u32) -> Result<Vec<Ipv4Network>, NetworkError> {
        self.inner.ipv4_addresses(index).await
    }

    async fn default_routes(&self) -> Result<Vec<DefaultRoute>, NetworkError> {
        self.inner.default_routes().await
    }

    async fn set_link_up(&self, index: u32) -> Result<(), NetworkError> {
        info!(index, "dry run: would set link up");
        Ok(())
    }

    async fn add_ipv4_address(&self, index: u32, address: Ipv4Network) -> Result<(), NetworkError> {
        info!(index, %address, "dry run: would add address");
        Ok(())
    }

    async fn delete_default_routes(&self) -> Result<usize, NetworkError> {
        let routes = self.inner.default_routes().await?;
        info!(count = routes.len(), "dry run: would delete default routes");
        Ok(routes.len())
    }

    async fn set_ipv4_forwarding(&self, enabled: bool) -> Result<(), NetworkError> {
        info!(enabled, "dry run: would set IPv4 forwarding");
        Ok(())
    }
}

impl<F: Firewall> Firewall for DryRun<F> {
    async fn ensure_owned_chains(&self) -> Result<(), FirewallError> {
        info!("dry run: would ensure owned chains");
        Ok(())
    }

    async fn flush_owned(&self) -> Result<(), FirewallError> {
        for rule in self.inner.owned_rules().await? {
            info!(rule = %rule, "dry run: would flush");
        }
        Ok(())
    }

    async fn append(&self, rule: &Rule) -> Result<(), FirewallError> {
        info!(rule = %rule, "dry run: would append");
        Ok(())
    }

    async fn owned_rules(&self) -> Result<Vec<String>, FirewallError> {
        self.inner.owned_rules().await
    }
}
