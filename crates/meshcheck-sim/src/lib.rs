//! An in-memory node network.
//!
//! [`SimNetwork`] implements the orchestration and RPC interfaces from
//! `meshcheck-services` without containers or sockets. Nodes are plain
//! records behind a mutex. Their peer lists are derived from who is running,
//! following the bootstrap behavior of the real network:
//!
//! - boot members are fully meshed,
//! - every other node bootstraps from, and only peers with, the boot members,
//! - a node keeps one connection per identity, so of several nodes sharing
//!   an identity only the oldest is seen.
//!
//! Freshly started nodes can be configured to answer "not ready" for a
//! number of calls, and tests can inject peers nobody knows about.

mod state;

use std::{
    collections::BTreeSet,
    future::{self, Future},
    sync::{Arc, Mutex},
    time::Duration,
};

use meshcheck_services::{
    ConfigId, Network, NetworkBuilder, NetworkError, NetworkLoader, NodeClient, NodeIdentity,
    Peer, RpcError, ServiceId, StartupChecker, Validator,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

pub use crate::state::STATIC_CERT_NODE_ID;
use crate::state::{lock, SimNode, State};

/// Tunables of the simulated network.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimOptions {
    /// RPC calls each new node fails as "not ready" before answering.
    pub warmup_failures: u32,
    /// How long a new node takes to become responsive, in milliseconds.
    pub startup_delay_ms: u64,
}

/// Builds [`SimNetwork`]s.
#[derive(Clone, Debug, Default)]
pub struct SimNetworkBuilder {
    options: SimOptions,
}

impl SimNetworkBuilder {
    /// Creates a builder with the given options.
    pub fn new(options: SimOptions) -> Self {
        Self { options }
    }
}

impl NetworkBuilder for SimNetworkBuilder {
    type Network = SimNetwork;

    fn build(
        &self,
        loader: &NetworkLoader,
    ) -> impl Future<Output = Result<SimNetwork, NetworkError>> + Send {
        SimNetwork::load(loader.clone(), self.options.clone())
    }
}

/// A simulated network.
#[derive(Debug)]
pub struct SimNetwork {
    loader: NetworkLoader,
    options: SimOptions,
    boot: BTreeSet<ServiceId>,
    state: Arc<Mutex<State>>,
}

impl SimNetwork {
    /// Starts the loader's boot members and desired services.
    #[instrument(skip_all, fields(boot_count = loader.boot_count()))]
    pub async fn load(loader: NetworkLoader, options: SimOptions) -> Result<Self, NetworkError> {
        let mut state = State::default();
        for (index, service_id) in loader.boot_service_ids().into_iter().enumerate() {
            let ip = state.next_ip();
            // Each boot member bootstraps from the ones started before it.
            let deps = state.boot_services();
            let factory = loader.boot_factory();
            let service = factory.service_from_ip(ip);
            let node = SimNode {
                service,
                identity: state.unique_identity(),
                boot: true,
                seq: state.next_seq(),
                command: factory.start_command(ip, &deps),
                warmup_remaining: options.warmup_failures,
            };
            debug!(index, %service_id, identity = %node.identity, "started boot member");
            state.nodes.insert(service_id, node);
        }

        let mut network = Self {
            boot: loader.boot_service_ids(),
            loader,
            options,
            state: Arc::new(Mutex::new(state)),
        };

        let desired = network.loader.desired_services().clone();
        for (service_id, config_id) in desired {
            network
                .add_service(config_id, service_id)
                .await?
                .wait_for_startup()
                .await?;
        }

        info!(services = lock(&network.state).nodes.len(), "network loaded");
        Ok(network)
    }

    /// The launch command `service_id` was started with.
    pub fn start_command(&self, service_id: ServiceId) -> Option<Vec<String>> {
        lock(&self.state)
            .nodes
            .get(&service_id)
            .map(|n| n.command.clone())
    }

    /// The identity `service_id` reports, bypassing warm-up.
    pub fn identity(&self, service_id: ServiceId) -> Option<NodeIdentity> {
        lock(&self.state)
            .nodes
            .get(&service_id)
            .map(|n| n.identity.clone())
    }

    /// Makes `service_id` report `identity` as a peer from now on.
    pub fn inject_rogue_peer(&self, service_id: ServiceId, identity: NodeIdentity) {
        lock(&self.state)
            .rogue_peers
            .entry(service_id)
            .or_default()
            .push(identity);
    }

    /// Makes the next `calls` RPCs to `service_id` fail as "not ready".
    pub fn stall(&self, service_id: ServiceId, calls: u32) -> Result<(), NetworkError> {
        let mut state = lock(&self.state);
        let node = state
            .nodes
            .get_mut(&service_id)
            .ok_or(NetworkError::UnknownService(service_id))?;
        node.warmup_remaining = calls;
        Ok(())
    }
}

impl Network for SimNetwork {
    type Client = SimClient;
    type Checker = SimStartupChecker;

    fn boot_service_ids(&self) -> BTreeSet<ServiceId> {
        self.boot.clone()
    }

    fn client(&self, service_id: ServiceId) -> Result<SimClient, NetworkError> {
        if !lock(&self.state).nodes.contains_key(&service_id) {
            return Err(NetworkError::UnknownService(service_id));
        }
        Ok(SimClient {
            service_id,
            state: Arc::clone(&self.state),
        })
    }

    fn add_service(
        &mut self,
        config_id: ConfigId,
        service_id: ServiceId,
    ) -> impl Future<Output = Result<SimStartupChecker, NetworkError>> + Send {
        future::ready(self.start_node(config_id, service_id))
    }

    fn remove_service(
        &mut self,
        service_id: ServiceId,
    ) -> impl Future<Output = Result<(), NetworkError>> + Send {
        let mut state = lock(&self.state);
        let result = match state.nodes.remove(&service_id) {
            Some(node) => {
                state.rogue_peers.remove(&service_id);
                info!(%service_id, identity = %node.identity, "removed service");
                Ok(())
            }
            None => Err(NetworkError::UnknownService(service_id)),
        };
        future::ready(result)
    }
}

impl SimNetwork {
    fn start_node(
        &mut self,
        config_id: ConfigId,
        service_id: ServiceId,
    ) -> Result<SimStartupChecker, NetworkError> {
        let svc = *self.loader.service_config(config_id)?;
        let factory = self.loader.factory_for(config_id)?;

        let mut state = lock(&self.state);
        if state.nodes.contains_key(&service_id) {
            return Err(NetworkError::ServiceIdInUse(service_id));
        }

        let ip = state.next_ip();
        let deps = state.boot_services();
        let identity = if svc.vary_certs {
            state.unique_identity()
        } else {
            NodeIdentity::new(STATIC_CERT_NODE_ID)
        };
        let node = SimNode {
            service: factory.service_from_ip(ip),
            identity,
            boot: false,
            seq: state.next_seq(),
            command: factory.start_command(ip, &deps),
            warmup_remaining: self.options.warmup_failures,
        };
        info!(%service_id, %config_id, identity = %node.identity, %ip, "added service");
        state.nodes.insert(service_id, node);

        Ok(SimStartupChecker {
            delay: Duration::from_millis(self.options.startup_delay_ms),
        })
    }
}

/// RPC client for one simulated node.
#[derive(Clone, Debug)]
pub struct SimClient {
    service_id: ServiceId,
    state: Arc<Mutex<State>>,
}

impl SimClient {
    fn call<T>(&self, f: impl FnOnce(&State, &SimNode) -> T) -> Result<T, RpcError> {
        lock(&self.state).call(self.service_id, f)
    }
}

impl NodeClient for SimClient {
    fn node_id(&self) -> impl Future<Output = Result<NodeIdentity, RpcError>> + Send {
        future::ready(self.call(|_, node| node.identity.clone()))
    }

    fn peers(&self) -> impl Future<Output = Result<Vec<Peer>, RpcError>> + Send {
        let service_id = self.service_id;
        future::ready(self.call(|state, node| state.peers_of(service_id, node)))
    }

    fn current_validators(&self) -> impl Future<Output = Result<Vec<Validator>, RpcError>> + Send {
        future::ready(self.call(|state, _| state.validators()))
    }
}

/// Waits out a simulated node's startup delay.
#[derive(Clone, Debug)]
pub struct SimStartupChecker {
    delay: Duration,
}

impl StartupChecker for SimStartupChecker {
    fn wait_for_startup(&self) -> impl Future<Output = Result<(), NetworkError>> + Send {
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anyhow::Result;
    use meshcheck_services::{FactoryConfig, LogLevel, ServiceConfig};
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;

    fn loader() -> NetworkLoader {
        NetworkLoader::new(
            FactoryConfig::default(),
            true,
            BTreeMap::from([
                (ConfigId(0), ServiceConfig::new(true, LogLevel::Debug)),
                (ConfigId(1), ServiceConfig::new(false, LogLevel::Debug)),
            ]),
            BTreeMap::from([(ServiceId(0), ConfigId(0))]),
        )
        .expect("valid loader")
    }

    #[test(tokio::test)]
    async fn test_load_starts_boot_and_desired() -> Result<()> {
        let net = SimNetworkBuilder::default().build(&loader()).await?;
        assert_eq!(net.boot_service_ids().len(), 5);

        let first = net.start_command(ServiceId::boot(0)).expect("boot 0");
        assert!(!first.iter().any(|arg| arg.starts_with("--bootstrap-ips")));

        let third = net.start_command(ServiceId::boot(2)).expect("boot 2");
        assert_eq!(
            third.last().map(String::as_str),
            Some("--bootstrap-ips=172.23.0.2:9651,172.23.0.3:9651")
        );

        let normal = net.start_command(ServiceId(0)).expect("normal node");
        assert_eq!(
            normal.last().map(String::as_str),
            Some("--bootstrap-ips=172.23.0.2:9651,172.23.0.3:9651,172.23.0.4:9651,172.23.0.5:9651,172.23.0.6:9651")
        );

        let peers = net.client(ServiceId(0))?.peers().await?;
        assert_eq!(peers.len(), 5);
        Ok(())
    }

    #[test(tokio::test)]
    async fn test_static_cert_nodes_share_identity() -> Result<()> {
        let mut net = SimNetworkBuilder::default().build(&loader()).await?;
        net.add_service(ConfigId(1), ServiceId(1)).await?;
        net.add_service(ConfigId(1), ServiceId(2)).await?;

        let a = net.client(ServiceId(1))?.node_id().await?;
        let b = net.client(ServiceId(2))?.node_id().await?;
        assert_eq!(a, b);
        assert_eq!(a.as_str(), STATIC_CERT_NODE_ID);

        let err = net.add_service(ConfigId(1), ServiceId(2)).await.unwrap_err();
        assert_eq!(err, NetworkError::ServiceIdInUse(ServiceId(2)));
        Ok(())
    }

    #[test(tokio::test)]
    async fn test_remove_service() -> Result<()> {
        let mut net = SimNetworkBuilder::default().build(&loader()).await?;
        let client = net.client(ServiceId(0))?;
        net.remove_service(ServiceId(0)).await?;

        assert!(matches!(client.node_id().await, Err(RpcError::Unreachable(_))));
        assert_eq!(
            net.client(ServiceId(0)).unwrap_err(),
            NetworkError::UnknownService(ServiceId(0))
        );
        assert_eq!(
            net.remove_service(ServiceId(0)).await.unwrap_err(),
            NetworkError::UnknownService(ServiceId(0))
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn test_warmup_and_rogue_peers() -> Result<()> {
        let options = SimOptions {
            warmup_failures: 1,
            startup_delay_ms: 0,
        };
        let net = SimNetworkBuilder::new(options).build(&loader()).await?;
        let client = net.client(ServiceId::boot(0))?;
        assert!(matches!(client.peers().await, Err(RpcError::NotReady(_))));
        assert_eq!(client.peers().await?.len(), 5);

        net.inject_rogue_peer(ServiceId::boot(0), "NodeID-rogue".into());
        let peers = client.peers().await?;
        assert_eq!(peers.len(), 6);
        assert_eq!(peers.last().map(|p| p.id.as_str()), Some("NodeID-rogue"));

        net.stall(ServiceId::boot(0), 2)?;
        assert!(client.current_validators().await.is_err());
        assert!(client.current_validators().await.is_err());
        assert_eq!(client.current_validators().await?.len(), 5);
        Ok(())
    }

    #[test(tokio::test(start_paused = true))]
    async fn test_startup_delay() -> Result<()> {
        let options = SimOptions {
            warmup_failures: 0,
            startup_delay_ms: 1500,
        };
        let start = tokio::time::Instant::now();
        let _net = SimNetworkBuilder::new(options).build(&loader()).await?;
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        Ok(())
    }
}
