//! Test scenarios and the harness they drive the network with.

mod duplicate_id;
mod fully_connected;
mod validators;

use std::{collections::BTreeMap, fmt};

use buggy::BugExt as _;
use futures_util::future::try_join_all;
use meshcheck_services::{ConfigId, Network, NetworkError, ServiceId, StartupChecker as _};
use tracing::{debug, info, instrument};

pub use self::duplicate_id::DuplicateIdScenario;
use crate::{
    error::{ScenarioError, StageError},
    expect::{expected_for_all, Expectation},
    membership::{MembershipState, MembershipTracker},
    observe::Observer,
    verify::verify_peers,
};

/// The logic of one registered test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScenarioKind {
    /// Every node sees exactly the peers it should.
    FullyConnected,
    /// The validator set is non-empty and made of members.
    GetValidators {
        /// The service whose view is checked.
        reference: ServiceId,
    },
    /// Peers stay correct while two nodes share an identity.
    DuplicateNodeId(DuplicateIdScenario),
}

impl ScenarioKind {
    /// Runs the scenario against a freshly loaded `network`.
    ///
    /// `desired` lists the non-boot services the network was loaded with.
    pub async fn run<N: Network>(
        &self,
        network: N,
        desired: impl IntoIterator<Item = ServiceId>,
        observer: &Observer,
    ) -> Result<(), StageError> {
        let harness = Harness::new(network, observer.clone());
        match self {
            Self::FullyConnected => fully_connected::run(harness, desired).await,
            Self::GetValidators { reference } => {
                validators::run(harness, desired, *reference).await
            }
            Self::DuplicateNodeId(scenario) => scenario.run(harness, desired).await,
        }
    }
}

/// Drives a network while tracking its membership.
pub struct Harness<N: Network> {
    network: N,
    observer: Observer,
    tracker: MembershipTracker,
    clients: BTreeMap<ServiceId, N::Client>,
}

impl<N: Network> fmt::Debug for Harness<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("observer", &self.observer)
            .field("tracker", &self.tracker)
            .field("clients", &self.clients.keys())
            .finish_non_exhaustive()
    }
}

impl<N: Network> Harness<N> {
    /// Creates a harness with no registered members.
    pub fn new(network: N, observer: Observer) -> Self {
        Self {
            network,
            observer,
            tracker: MembershipTracker::new(),
            clients: BTreeMap::new(),
        }
    }

    /// The current membership.
    pub fn membership(&self) -> MembershipState {
        self.tracker.snapshot()
    }

    /// The observer used for every query.
    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    /// Returns the client of live service `service_id`.
    pub fn client(&self, service_id: ServiceId) -> Result<&N::Client, ScenarioError> {
        self.clients
            .get(&service_id)
            .ok_or(NetworkError::UnknownService(service_id).into())
    }

    /// Registers the boot members and the already running `desired`
    /// services.
    #[instrument(skip_all)]
    pub async fn register_network(
        &mut self,
        desired: impl IntoIterator<Item = ServiceId>,
    ) -> Result<(), ScenarioError> {
        let boot = self.network.boot_service_ids();
        let mut clients = Vec::with_capacity(boot.len());
        for id in &boot {
            clients.push((*id, self.network.client(*id)?));
        }
        let identities = try_join_all(
            clients
                .iter()
                .map(|(id, client)| self.observer.node_id(*id, client)),
        )
        .await?;

        for ((id, client), identity) in clients.into_iter().zip(identities) {
            info!(service_id = %id, %identity, "registered boot member");
            self.tracker.register_boot(id, identity)?;
            self.clients.insert(id, client);
        }

        for id in desired {
            self.register_added(id).await?;
        }
        Ok(())
    }

    async fn register_added(&mut self, service_id: ServiceId) -> Result<(), ScenarioError> {
        let client = self.network.client(service_id)?;
        let identity = self.observer.node_id(service_id, &client).await?;
        info!(%service_id, %identity, "registered service");
        self.tracker.register_added(service_id, identity)?;
        self.clients.insert(service_id, client);
        Ok(())
    }

    /// Starts `service_id` with `config_id`, waits for it and registers it.
    #[instrument(skip(self))]
    pub async fn add_service(
        &mut self,
        config_id: ConfigId,
        service_id: ServiceId,
    ) -> Result<(), ScenarioError> {
        let checker = self.network.add_service(config_id, service_id).await?;
        checker.wait_for_startup().await?;
        self.register_added(service_id).await
    }

    /// Stops `service_id` and forgets it.
    #[instrument(skip(self))]
    pub async fn remove_service(&mut self, service_id: ServiceId) -> Result<(), ScenarioError> {
        self.network.remove_service(service_id).await?;
        self.tracker.remove(service_id)?;
        self.clients.remove(&service_id);
        info!(%service_id, "removed service");
        Ok(())
    }

    /// Checks the peers of every live service that is not exempt.
    ///
    /// All peer lists are fetched before any is checked.
    #[instrument(skip(self))]
    pub async fn verify_all(&self) -> Result<(), ScenarioError> {
        let state = self.tracker.snapshot();
        let mut targets = Vec::new();
        for (id, expectation) in expected_for_all(&state)? {
            match expectation {
                Expectation::Verify(expected) => {
                    let client = self.clients.get(&id).assume("live service has a client")?;
                    targets.push((id, expected, client));
                }
                Expectation::Exempt => debug!(service_id = %id, "skipping exempt service"),
            }
        }

        let observed = try_join_all(
            targets
                .iter()
                .map(|(id, _, client)| self.observer.peers(*id, *client)),
        )
        .await?;

        for ((id, expected, _), peers) in targets.iter().zip(&observed) {
            verify_peers(*id, expected, peers)?;
            debug!(service_id = %id, peers = peers.len(), mode = %expected.mode, "peers verified");
        }
        info!(checked = targets.len(), live = state.len(), "all peers verified");
        Ok(())
    }
}
