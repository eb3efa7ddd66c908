//! Network state access using rtnetlink

use crate::error::NetworkError;
use crate::network::{sysctl, DefaultRoute, LinkState, NetworkState, OperState};
use futures_util::stream::TryStreamExt;
use ipnetwork::Ipv4Network;
use rtnetlink::packet_route::address::AddressAttribute;
use rtnetlink::packet_route::link::{LinkAttribute, LinkFlags, LinkMessage, State};
use rtnetlink::packet_route::route::{
    RouteAddress, RouteAttribute, RouteHeader, RouteMessage, RouteType,
};
use rtnetlink::packet_route::AddressFamily;
use rtnetlink::{new_connection, Handle, LinkUnspec, RouteMessageBuilder};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// [`NetworkState`] backed by a netlink socket and the proc forwarding switch
pub struct NetlinkNetwork {
    handle: Handle,
    ip_forward_path: PathBuf,
}

impl NetlinkNetwork {
    /// Open a netlink connection. Must be called inside a tokio runtime.
    pub fn new(ip_forward_path: PathBuf) -> Result<Self, NetworkError> {
        let (connection, handle, _) =
            new_connection().map_err(|e| NetworkError::Connection(e.to_string()))?;

        // Spawn the connection handler
        tokio::spawn(connection);

        Ok(Self {
            handle,
            ip_forward_path,
        })
    }

    async fn default_route_messages(&self) -> Result<Vec<RouteMessage>, NetworkError> {
        let request = RouteMessageBuilder::<Ipv4Addr>::default().build();
        let mut routes = self.handle.route().get(request).execute();
        let mut defaults = Vec::new();

        while let Some(route) = routes
            .try_next()
            .await
            .map_err(|e| NetworkError::Query(format!("listing routes: {}", e)))?
        {
            if is_main_default(&route) {
                defaults.push(route);
            }
        }

        Ok(defaults)
    }
}

impl NetworkState for NetlinkNetwork {
    async fn link(&self, name: &str) -> Result<Option<LinkState>, NetworkError> {
        let mut links = self.handle.link().get().execute();

        while let Some(msg) = links
            .try_next()
            .await
            .map_err(|e| NetworkError::Query(format!("listing links: {}", e)))?
        {
            if link_name(&msg).as_deref() == Some(name) {
                return Ok(Some(link_state(name, &msg)));
            }
        }

        Ok(None)
    }

    async fn ipv4_addresses(&self, index: u32) -> Result<Vec<Ipv4Network>, NetworkError> {
        let mut addresses = self
            .handle
            .address()
            .get()
            .set_link_index_filter(index)
            .execute();
        let mut result = Vec::new();

        while let Some(msg) = addresses
            .try_next()
            .await
            .map_err(|e| NetworkError::Query(format!("listing addresses: {}", e)))?
        {
            if msg.header.family != AddressFamily::Inet || msg.header.index != index {
                continue;
            }

            // IFA_LOCAL is the interface's own address on point-to-point links
            let mut local = None;
            let mut address = None;
            for attr in &msg.attributes {
                match attr {
                    AddressAttribute::Local(IpAddr::V4(v4)) => local = Some(*v4),
                    AddressAttribute::Address(IpAddr::V4(v4)) => address = Some(*v4),
                    _ => {}
                }
            }

            if let Some(ip) = local.or(address) {
                let net = Ipv4Network::new(ip, msg.header.prefix_len)
                    .map_err(|e| NetworkError::Query(e.to_string()))?;
                result.push(net);
            }
        }

        Ok(result)
    }

    async fn default_routes(&self) -> Result<Vec<DefaultRoute>, NetworkError> {
        let messages = self.default_route_messages().await?;
        Ok(messages.iter().map(default_route).collect())
    }

    async fn set_link_up(&self, index: u32) -> Result<(), NetworkError> {
        self.handle
            .link()
            .set(LinkUnspec::new_with_index(index).up().build())
            .execute()
            .await
            .map_err(|e| NetworkError::OperationFailed(format!("setting link {} up: {}", index, e)))?;

        debug!(index, "link set up");
        Ok(())
    }

    async fn add_ipv4_address(&self, index: u32, address: Ipv4Network) -> Result<(), NetworkError> {
        self.handle
            .address()
            .add(index, IpAddr::V4(address.ip()), address.prefix())
            .execute()
            .await
            .map_err(|e| {
                NetworkError::OperationFailed(format!("adding {} to link {}: {}", address, index, e))
            })?;

        info!(index, %address, "address added");
        Ok(())
    }

    async fn delete_default_routes(&self) -> Result<usize, NetworkError> {
        let routes = self.default_route_messages().await?;

        let removed = delete_each(routes, |route| async move {
            self.handle
                .route()
                .del(route)
                .execute()
                .await
                .map_err(|e| NetworkError::OperationFailed(format!("deleting default route: {}", e)))
        })
        .await;

        Ok(removed)
    }

    async fn set_ipv4_forwarding(&self, enabled: bool) -> Result<(), NetworkError> {
        sysctl::write_ipv4_forwarding(&self.ip_forward_path, enabled)
    }
}

/// Delete every route, logging failures and carrying on. Returns the number removed.
async fn delete_each<F, Fut>(routes: Vec<RouteMessage>, mut delete: F) -> usize
where
    F: FnMut(RouteMessage) -> Fut,
    Fut: Future<Output = Result<(), NetworkError>>,
{
    let mut removed = 0;

    for route in routes {
        let summary = default_route(&route);
        match delete(route).await {
            Ok(()) => {
                info!(
                    gateway = ?summary.gateway,
                    interface_index = ?summary.interface_index,
                    "default route deleted"
                );
                removed += 1;
            }
            Err(e) => warn!(
                gateway = ?summary.gateway,
                interface_index = ?summary.interface_index,
                error = %e,
                "failed to delete default route"
            ),
        }
    }

    removed
}

/// Unicast default route in the main table. Policy tables belong to other tools.
fn is_main_default(msg: &RouteMessage) -> bool {
    // Table ids above 255 only travel in the attribute
    let table = msg
        .attributes
        .iter()
        .find_map(|attr| match attr {
            RouteAttribute::Table(id) => Some(*id),
            _ => None,
        })
        .unwrap_or(u32::from(msg.header.table));

    msg.header.destination_prefix_length == 0
        && msg.header.kind == RouteType::Unicast
        && table == u32::from(RouteHeader::RT_TABLE_MAIN)
}

fn link_name(msg: &LinkMessage) -> Option<String> {
    msg.attributes.iter().find_map(|attr| match attr {
        LinkAttribute::IfName(name) => Some(name.clone()),
        _ => None,
    })
}

fn link_state(name: &str, msg: &LinkMessage) -> LinkState {
    let mut oper_state = OperState::Unknown;
    let mut carrier = None;

    for attr in &msg.attributes {
        match attr {
            LinkAttribute::OperState(state) => oper_state = oper_state_from(state),
            LinkAttribute::Carrier(c) => carrier = Some(*c != 0),
            _ => {}
        }
    }

    LinkState {
        name: name.to_string(),
        index: msg.header.index,
        admin_up: msg.header.flags.contains(LinkFlags::Up),
        oper_state,
        carrier,
    }
}

fn oper_state_from(state: &State) -> OperState {
    match state {
        State::Up => OperState::Up,
        State::Down => OperState::Down,
        State::Dormant => OperState::Dormant,
        State::LowerLayerDown => OperState::LowerLayerDown,
        State::NotPresent => OperState::NotPresent,
        State::Testing => OperState::Testing,
        _ => OperState::Unknown,
    }
}

fn default_route(msg: &RouteMessage) -> DefaultRoute {
    let mut route = DefaultRoute {
        interface_index: None,
        gateway: None,
        metric: None,
    };

    for attr in &msg.attributes {
        match attr {
            RouteAttribute::Oif(index) => route.interface_index = Some(*index),
            RouteAttribute::Gateway(RouteAddress::Inet(v4)) => route.gateway = Some(*v4),
            RouteAttribute::Priority(metric) => route.metric = Some(*metric),
            _ => {}
        }
    }

    route
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_via(gateway: [u8; 4], oif: u32) -> RouteMessageBuilder<Ipv4Addr> {
        RouteMessageBuilder::<Ipv4Addr>::new()
            .output_interface(oif)
            .gateway(Ipv4Addr::from(gateway))
    }

    #[test]
    fn test_main_table_default_is_kept() {
        let route = default_via([192, 168, 1, 1], 2).build();
        assert!(is_main_default(&route));

        let parsed = default_route(&route);
        assert_eq!(parsed.interface_index, Some(2));
        assert_eq!(parsed.gateway, Some(Ipv4Addr::new(192, 168, 1, 1)));
    }

    #[test]
    fn test_policy_table_default_is_ignored() {
        assert!(!is_main_default(&default_via([10, 8, 0, 1], 5).table_id(100).build()));
        assert!(!is_main_default(&default_via([10, 8, 0, 1], 5).table_id(1000).build()));
    }

    #[test]
    fn test_non_unicast_and_prefixed_routes_are_ignored() {
        let blackhole = RouteMessageBuilder::<Ipv4Addr>::new()
            .kind(RouteType::BlackHole)
            .build();
        assert!(!is_main_default(&blackhole));

        let subnet = RouteMessageBuilder::<Ipv4Addr>::new()
            .destination_prefix(Ipv4Addr::new(192, 168, 1, 0), 24)
            .output_interface(2)
            .build();
        assert!(!is_main_default(&subnet));
    }

    #[tokio::test]
    async fn test_delete_continues_after_failure() {
        let routes = vec![
            default_via([192, 168, 1, 1], 2).build(),
            default_via([10, 0, 0, 1], 3).build(),
            default_via([172, 20, 10, 1], 4).build(),
        ];
        let mut attempted = Vec::new();

        let removed = delete_each(routes, |route| {
            let oif = default_route(&route).interface_index;
            attempted.push(oif);
            async move {
                if oif == Some(2) {
                    Err(NetworkError::OperationFailed("Operation not permitted".to_string()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(removed, 2);
        assert_eq!(attempted, vec![Some(2), Some(3), Some(4)]);
    }
}
