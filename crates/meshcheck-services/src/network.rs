//! The orchestration surface: which nodes run and how to reach them.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    future::Future,
};

use serde::{Deserialize, Serialize};

use crate::{
    api::NodeClient,
    config::{ConfigError, FactoryConfig, ServiceConfig},
};

/// Number of boot members a staking network starts with.
pub const STAKING_BOOT_COUNT: usize = 5;

/// Boot members are numbered from here so they never collide with the ids
/// scenarios pick for the services they add.
const BOOT_SERVICE_ID_BASE: u32 = 1000;

/// Handle of one running node within a scenario.
///
/// No two live services share an id. An id is released when its service is
/// removed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub u32);

impl ServiceId {
    /// The id of the `index`th boot member.
    pub fn boot(index: usize) -> Self {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        Self(BOOT_SERVICE_ID_BASE.saturating_add(index))
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Selects one of a loader's [`ServiceConfig`]s.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(pub u32);

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An orchestration request failed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum NetworkError {
    /// No live service has this id.
    #[error("no service with ID {0}")]
    UnknownService(ServiceId),

    /// A live service already has this id.
    #[error("service ID {0} is already in use")]
    ServiceIdInUse(ServiceId),

    /// The loader has no configuration with this id.
    #[error("no service configuration with ID {0}")]
    UnknownConfig(ConfigId),

    /// The node never became responsive.
    #[error("service {service_id} failed to start: {reason}")]
    Startup {
        /// The service that failed.
        service_id: ServiceId,
        /// Why it failed.
        reason: String,
    },

    /// The loader itself is invalid.
    #[error("invalid network configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Waits until a freshly added node is minimally responsive.
///
/// Responsive does not mean converged: the node may still be bootstrapping.
pub trait StartupChecker: Send {
    /// Blocks until the node is up.
    fn wait_for_startup(&self) -> impl Future<Output = Result<(), NetworkError>> + Send;
}

/// A running network of nodes.
pub trait Network: Send {
    /// RPC client for one node.
    type Client: NodeClient;
    /// Startup checker handed out by [`Network::add_service`].
    type Checker: StartupChecker;

    /// The boot members the network was loaded with.
    fn boot_service_ids(&self) -> BTreeSet<ServiceId>;

    /// Returns a client for the live service `service_id`.
    fn client(&self, service_id: ServiceId) -> Result<Self::Client, NetworkError>;

    /// Starts a new node with configuration `config_id` as `service_id`.
    fn add_service(
        &mut self,
        config_id: ConfigId,
        service_id: ServiceId,
    ) -> impl Future<Output = Result<Self::Checker, NetworkError>> + Send;

    /// Stops and forgets the node `service_id`.
    fn remove_service(
        &mut self,
        service_id: ServiceId,
    ) -> impl Future<Output = Result<(), NetworkError>> + Send;
}

/// Materializes a [`Network`] from a [`NetworkLoader`].
pub trait NetworkBuilder: Send + Sync {
    /// The network type produced.
    type Network: Network;

    /// Starts the boot members and the loader's desired services.
    fn build(
        &self,
        loader: &NetworkLoader,
    ) -> impl Future<Output = Result<Self::Network, NetworkError>> + Send;
}

/// Describes the network a test needs.
///
/// Immutable once built.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkLoader {
    factory: FactoryConfig,
    staking: bool,
    boot_count: usize,
    service_configs: BTreeMap<ConfigId, ServiceConfig>,
    desired_services: BTreeMap<ServiceId, ConfigId>,
}

impl NetworkLoader {
    /// Creates a loader.
    ///
    /// A staking network starts [`STAKING_BOOT_COUNT`] boot members, a
    /// non-staking network starts one.
    pub fn new(
        factory: FactoryConfig,
        staking: bool,
        service_configs: BTreeMap<ConfigId, ServiceConfig>,
        desired_services: BTreeMap<ServiceId, ConfigId>,
    ) -> Result<Self, ConfigError> {
        let boot_count = if staking { STAKING_BOOT_COUNT } else { 1 };
        Self {
            factory: factory.with_staking_tls(staking),
            staking,
            boot_count,
            service_configs,
            desired_services,
        }
        .validated()
    }

    /// Returns a copy that starts `boot_count` boot members instead.
    pub fn with_boot_count(self, boot_count: usize) -> Result<Self, ConfigError> {
        Self { boot_count, ..self }.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        self.factory.validate()?;
        if self.boot_count == 0 {
            return Err(ConfigError::Invalid {
                field: "boot_count",
                reason: "a network needs at least one boot member".into(),
            });
        }
        let boot = self.boot_service_ids();
        for (service_id, config_id) in &self.desired_services {
            if boot.contains(service_id) {
                return Err(ConfigError::Invalid {
                    field: "desired_services",
                    reason: format!("service ID {service_id} is reserved for a boot member"),
                });
            }
            if !self.service_configs.contains_key(config_id) {
                return Err(ConfigError::Invalid {
                    field: "desired_services",
                    reason: format!("service {service_id} uses unknown config {config_id}"),
                });
            }
        }
        Ok(self)
    }

    /// Is this a staking network?
    pub fn staking(&self) -> bool {
        self.staking
    }

    /// Number of boot members.
    pub fn boot_count(&self) -> usize {
        self.boot_count
    }

    /// Ids of the boot members, in start order.
    pub fn boot_service_ids(&self) -> BTreeSet<ServiceId> {
        (0..self.boot_count).map(ServiceId::boot).collect()
    }

    /// The non-boot services started with the network.
    pub fn desired_services(&self) -> &BTreeMap<ServiceId, ConfigId> {
        &self.desired_services
    }

    /// Returns the service configuration `config_id`.
    pub fn service_config(&self, config_id: ConfigId) -> Result<&ServiceConfig, NetworkError> {
        self.service_configs
            .get(&config_id)
            .ok_or(NetworkError::UnknownConfig(config_id))
    }

    /// The factory configuration for boot members.
    pub fn boot_factory(&self) -> &FactoryConfig {
        &self.factory
    }

    /// The factory configuration for a service started with `config_id`.
    pub fn factory_for(&self, config_id: ConfigId) -> Result<FactoryConfig, NetworkError> {
        let svc = self.service_config(config_id)?;
        Ok(self.factory.with_log_level(svc.log_level))
    }
}
