//! Shared state of a simulated network and its gossip model.

use std::{
    collections::{BTreeMap, BTreeSet},
    net::{IpAddr, Ipv4Addr},
    sync::{Mutex, MutexGuard, PoisonError},
};

use meshcheck_services::{NodeIdentity, NodeService, Peer, RpcError, ServiceId, Validator};

/// Identity reported by every node that uses the image's built-in
/// certificate.
pub const STATIC_CERT_NODE_ID: &str = "NodeID-7Xhw2mDxuDS44j42TCB6U5579esbSt3Lg";

/// Stake every genesis validator starts with.
pub(crate) const GENESIS_STAKE: u64 = 2_000_000_000_000;

/// Containers are handed addresses from here up.
const FIRST_NODE_IP: Ipv4Addr = Ipv4Addr::new(172, 23, 0, 2);

#[derive(Clone, Debug)]
pub(crate) struct SimNode {
    pub service: NodeService,
    pub identity: NodeIdentity,
    pub boot: bool,
    /// Start order; older nodes win identity collisions.
    pub seq: u64,
    pub command: Vec<String>,
    /// Calls that fail with [`RpcError::NotReady`] before the node answers.
    pub warmup_remaining: u32,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub nodes: BTreeMap<ServiceId, SimNode>,
    pub rogue_peers: BTreeMap<ServiceId, Vec<NodeIdentity>>,
    next_ip: u32,
    next_seq: u64,
    next_cert: u32,
}

impl State {
    pub fn next_ip(&mut self) -> IpAddr {
        let ip = u32::from(FIRST_NODE_IP).saturating_add(self.next_ip);
        self.next_ip += 1;
        IpAddr::V4(Ipv4Addr::from(ip))
    }

    pub fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Mints the identity of a fresh staking certificate.
    pub fn unique_identity(&mut self) -> NodeIdentity {
        self.next_cert += 1;
        NodeIdentity::new(format!("NodeID-sim{:08x}", self.next_cert))
    }

    /// Boot members sorted by start order.
    pub fn boot_services(&self) -> Vec<NodeService> {
        let mut boot = self
            .nodes
            .values()
            .filter(|n| n.boot)
            .collect::<Vec<_>>();
        boot.sort_by_key(|n| n.seq);
        boot.into_iter().map(|n| n.service).collect()
    }

    /// Runs one RPC against `service_id`, honoring its warm-up.
    pub fn call<T>(
        &mut self,
        service_id: ServiceId,
        f: impl FnOnce(&Self, &SimNode) -> T,
    ) -> Result<T, RpcError> {
        let node = self
            .nodes
            .get_mut(&service_id)
            .ok_or_else(|| RpcError::Unreachable(format!("service {service_id} is not running")))?;
        if node.warmup_remaining > 0 {
            node.warmup_remaining -= 1;
            return Err(RpcError::NotReady(format!(
                "service {service_id} is still bootstrapping"
            )));
        }
        let node = &self.nodes[&service_id];
        Ok(f(self, node))
    }

    /// The peers `node` currently gossips with.
    ///
    /// Boot members are fully meshed and accept every node that bootstraps
    /// from them. Other nodes only know the boot members. A node keeps at
    /// most one connection per identity, to the holder that started first.
    pub fn peers_of(&self, service_id: ServiceId, node: &SimNode) -> Vec<Peer> {
        let mut others = self
            .nodes
            .iter()
            .filter(|(id, _)| **id != service_id)
            .map(|(_, n)| n)
            .collect::<Vec<_>>();
        others.sort_by_key(|n| n.seq);

        let mut seen = BTreeSet::from([node.identity.clone()]);
        let mut peers = others
            .into_iter()
            .filter(|other| node.boot || other.boot)
            .filter(|other| seen.insert(other.identity.clone()))
            .map(|other| Peer {
                id: other.identity.clone(),
            })
            .collect::<Vec<_>>();

        if let Some(rogue) = self.rogue_peers.get(&service_id) {
            peers.extend(rogue.iter().cloned().map(|id| Peer { id }));
        }
        peers
    }

    /// Genesis validators: every live boot member.
    pub fn validators(&self) -> Vec<Validator> {
        let mut boot = self
            .nodes
            .values()
            .filter(|n| n.boot)
            .collect::<Vec<_>>();
        boot.sort_by_key(|n| n.seq);
        boot.into_iter()
            .map(|n| Validator {
                id: n.identity.clone(),
                stake_amount: GENESIS_STAKE,
            })
            .collect()
    }
}

/// Locks `state`, ignoring poisoning.
///
/// No operation leaves the state half-updated when it panics.
pub(crate) fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn node(state: &mut State, boot: bool, identity: &str) -> SimNode {
        let ip = state.next_ip();
        SimNode {
            service: NodeService::new(ip, 9650, 9651),
            identity: identity.into(),
            boot,
            seq: state.next_seq(),
            command: Vec::new(),
            warmup_remaining: 0,
        }
    }

    fn ids(peers: &[Peer]) -> Vec<&str> {
        peers.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_gossip_model() {
        let mut state = State::default();
        for (id, boot, identity) in [
            (1, true, "b1"),
            (2, true, "b2"),
            (3, false, "dup"),
            (4, false, "dup"),
        ] {
            let n = node(&mut state, boot, identity);
            state.nodes.insert(ServiceId(id), n);
        }

        let b1 = state.nodes[&ServiceId(1)].clone();
        assert_eq!(ids(&state.peers_of(ServiceId(1), &b1)), ["b2", "dup"]);

        let added = state.nodes[&ServiceId(4)].clone();
        assert_eq!(ids(&state.peers_of(ServiceId(4), &added)), ["b1", "b2"]);

        state.nodes.remove(&ServiceId(3));
        assert_eq!(ids(&state.peers_of(ServiceId(1), &b1)), ["b2", "dup"]);
    }

    #[test]
    fn test_call_warmup() {
        let mut state = State::default();
        let mut n = node(&mut state, true, "b1");
        n.warmup_remaining = 2;
        state.nodes.insert(ServiceId(1), n);

        for _ in 0..2 {
            let err = state.call(ServiceId(1), |_, n| n.identity.clone()).unwrap_err();
            assert!(matches!(err, RpcError::NotReady(_)));
        }
        let got = state.call(ServiceId(1), |_, n| n.identity.clone()).unwrap();
        assert_eq!(got.as_str(), "b1");

        let err = state.call(ServiceId(9), |_, _| ()).unwrap_err();
        assert!(matches!(err, RpcError::Unreachable(_)));
    }

    #[test]
    fn test_ip_assignment() {
        let mut state = State::default();
        assert_eq!(state.next_ip().to_string(), "172.23.0.2");
        assert_eq!(state.next_ip().to_string(), "172.23.0.3");
    }
}
