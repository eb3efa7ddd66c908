//! Owned rule set calculation

use crate::firewall::{Chain, Rule, Table, Target};

/// Connection states allowed back from the uplink
pub const RETURN_STATES: &str = "RELATED,ESTABLISHED";

/// Names of the chains owned under a prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedChains {
    pub nat: String,
    pub forward: String,
}

impl OwnedChains {
    pub fn new(prefix: &str) -> Self {
        Self {
            nat: format!("{}_POSTROUTING", prefix),
            forward: format!("{}_FORWARD", prefix),
        }
    }

    /// Jump rules that hook the owned chains into the built-in ones.
    pub fn jump_rules(&self) -> [Rule; 2] {
        [
            Rule::new(Table::Nat, Chain::Postrouting, Target::Jump(self.nat.clone())),
            Rule::new(Table::Filter, Chain::Forward, Target::Jump(self.forward.clone())),
        ]
    }

    /// The three rules that route bridge traffic out through `uplink`.
    pub fn uplink_rules(&self, bridge: &str, uplink: &str) -> Vec<Rule> {
        vec![
            Rule::new(Table::Nat, Chain::Custom(self.nat.clone()), Target::Masquerade)
                .out_interface(uplink),
            Rule::new(Table::Filter, Chain::Custom(self.forward.clone()), Target::Accept)
                .in_interface(bridge)
                .out_interface(uplink),
            Rule::new(Table::Filter, Chain::Custom(self.forward.clone()), Target::Accept)
                .in_interface(uplink)
                .out_interface(bridge)
                .ct_state(RETURN_STATES),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_names() {
        let chains = OwnedChains::new("UPLINK");
        assert_eq!(chains.nat, "UPLINK_POSTROUTING");
        assert_eq!(chains.forward, "UPLINK_FORWARD");
    }

    #[test]
    fn test_uplink_rules() {
        let rules = OwnedChains::new("UPLINK").uplink_rules("br0", "wlan1");
        assert_eq!(rules.len(), 3);

        let masquerade = &rules[0];
        assert_eq!(masquerade.table, Table::Nat);
        assert_eq!(masquerade.target, Target::Masquerade);
        assert_eq!(masquerade.out_interface.as_deref(), Some("wlan1"));
        assert_eq!(masquerade.in_interface, None);

        let outbound = &rules[1];
        assert_eq!(outbound.in_interface.as_deref(), Some("br0"));
        assert_eq!(outbound.out_interface.as_deref(), Some("wlan1"));
        assert_eq!(outbound.ct_state, None);

        let inbound = &rules[2];
        assert_eq!(inbound.in_interface.as_deref(), Some("wlan1"));
        assert_eq!(inbound.out_interface.as_deref(), Some("br0"));
        assert_eq!(inbound.ct_state.as_deref(), Some(RETURN_STATES));
    }

    #[test]
    fn test_jump_rules_target_owned_chains() {
        let [nat, forward] = OwnedChains::new("RV").jump_rules();
        assert_eq!(nat.chain, Chain::Postrouting);
        assert_eq!(nat.target, Target::Jump("RV_POSTROUTING".to_string()));
        assert_eq!(forward.chain, Chain::Forward);
        assert_eq!(forward.target, Target::Jump("RV_FORWARD".to_string()));
    }
}
