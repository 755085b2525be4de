//! The set of tests a run can choose from.

use std::{collections::BTreeMap, time::Duration};

use meshcheck_services::{
    ConfigError, ConfigId, FactoryConfig, LogLevel, NetworkLoader, ServiceConfig, ServiceId,
};

use crate::scenario::{DuplicateIdScenario, ScenarioKind};

/// The normal, uniquely certified node of the default network.
pub const NORMAL_SERVICE_ID: ServiceId = ServiceId(0);
/// Configuration of uniquely certified nodes.
pub const NORMAL_CONFIG_ID: ConfigId = ConfigId(0);
/// Configuration of nodes that share the static certificate.
pub const SAME_CERT_CONFIG_ID: ConfigId = ConfigId(1);

/// Registration failed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum RegistryError {
    /// A test with this name is already registered.
    #[error("duplicate test name `{0}`")]
    DuplicateName(String),

    /// A network description is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One registered test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestEntry {
    /// Unique name.
    pub name: String,
    /// What the test does.
    pub kind: ScenarioKind,
    /// The network it runs against.
    pub loader: NetworkLoader,
    /// How long it may take, network startup included.
    pub timeout: Duration,
}

/// Collects tests before they are frozen into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<TestEntry>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a test.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: ScenarioKind,
        loader: NetworkLoader,
        timeout: Duration,
    ) -> Result<&mut Self, RegistryError> {
        let name = name.into();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.entries.push(TestEntry {
            name,
            kind,
            loader,
            timeout,
        });
        Ok(self)
    }

    /// Freezes the registry.
    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

/// An immutable set of tests, in registration order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Registry {
    entries: Vec<TestEntry>,
}

impl Registry {
    /// All tests.
    pub fn entries(&self) -> &[TestEntry] {
        &self.entries
    }

    /// Looks up a test by name.
    pub fn get(&self, name: &str) -> Option<&TestEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Test names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

/// The five-member staking network with one normal node.
pub fn staking_loader(factory: &FactoryConfig) -> Result<NetworkLoader, ConfigError> {
    NetworkLoader::new(
        factory.clone(),
        true,
        BTreeMap::from([
            (NORMAL_CONFIG_ID, ServiceConfig::new(true, LogLevel::Debug)),
            (SAME_CERT_CONFIG_ID, ServiceConfig::new(false, LogLevel::Debug)),
        ]),
        BTreeMap::from([(NORMAL_SERVICE_ID, NORMAL_CONFIG_ID)]),
    )
}

/// A non-staking network of one boot member and nothing else.
pub fn single_node_loader(factory: &FactoryConfig) -> Result<NetworkLoader, ConfigError> {
    NetworkLoader::new(
        factory.clone(),
        false,
        BTreeMap::from([(NORMAL_CONFIG_ID, ServiceConfig::new(true, LogLevel::Debug))]),
        BTreeMap::new(),
    )
}

/// The standard suite.
pub fn default_registry(factory: &FactoryConfig) -> Result<Registry, RegistryError> {
    let loader = staking_loader(factory)?;
    let mut builder = RegistryBuilder::new();
    builder
        .register(
            "singleNodeGetValidatorsTest",
            ScenarioKind::GetValidators {
                reference: ServiceId::boot(0),
            },
            single_node_loader(factory)?,
            Duration::from_secs(30),
        )?
        .register(
            "fullyConnectedTest",
            ScenarioKind::FullyConnected,
            loader.clone(),
            Duration::from_secs(30),
        )?
        .register(
            "getValidatorsTest",
            ScenarioKind::GetValidators {
                reference: NORMAL_SERVICE_ID,
            },
            loader.clone(),
            Duration::from_secs(30),
        )?
        .register(
            "duplicateNodeIdTest",
            ScenarioKind::DuplicateNodeId(DuplicateIdScenario {
                same_cert_config: SAME_CERT_CONFIG_ID,
                first: ServiceId(1),
                second: ServiceId(2),
            }),
            loader,
            Duration::from_secs(120),
        )?;
    Ok(builder.build())
}
