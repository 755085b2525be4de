//! Node services and collaborator interfaces for meshcheck.
//!
//! This crate describes the nodes under test and the boundary to the systems
//! that run them. It includes modules for:
//!
//! - `endpoint`: how to reach a running node (gossip and API sockets).
//! - `config`: the validated factory configuration used to launch nodes.
//! - `command`: building the launch argument list for a node.
//! - `api`: the RPC surface exposed by a running node.
//! - `network`: the orchestration surface that adds and removes nodes.
//!
//! Nothing in here talks to a real container runtime or RPC transport; those
//! are provided by implementations of the traits in [`api`] and [`network`].

pub mod api;
pub mod command;
pub mod config;
pub mod endpoint;
pub mod network;

pub use api::{NodeClient, NodeIdentity, Peer, RpcError, Validator};
pub use config::{ConfigError, FactoryConfig, LogLevel, ServiceConfig};
pub use endpoint::{GossipEndpoint, NodeService};
pub use network::{
    ConfigId, Network, NetworkBuilder, NetworkError, NetworkLoader, ServiceId, StartupChecker,
};
