//! The RPC surface of a running node.

use std::{fmt, future::Future};

use serde::{Deserialize, Serialize};

/// A node's cryptographic peer identity.
///
/// Opaque to meshcheck. Two distinct services may report the same identity
/// if they were started with the same staking certificate.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    /// Wraps an identity reported by a node.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeIdentity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One entry of a node's peer list.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    /// The peer's identity.
    pub id: NodeIdentity,
}

/// One entry of the current validator set.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    /// The validator's identity.
    pub id: NodeIdentity,
    /// Amount staked, in nAVA.
    pub stake_amount: u64,
}

/// An RPC call to a node failed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum RpcError {
    /// The node answered but is still bootstrapping.
    #[error("node is not ready: {0}")]
    NotReady(String),

    /// The node could not be reached.
    #[error("node is unreachable: {0}")]
    Unreachable(String),

    /// The node rejected the request.
    #[error("node rejected request: {0}")]
    Rejected(String),
}

impl RpcError {
    /// Is it worth trying the call again?
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotReady(_) | Self::Unreachable(_))
    }
}

/// The subset of a node's admin and platform API used by meshcheck.
pub trait NodeClient: Send + Sync {
    /// Returns the node's own identity.
    fn node_id(&self) -> impl Future<Output = Result<NodeIdentity, RpcError>> + Send;

    /// Returns the peers the node is currently gossiping with.
    fn peers(&self) -> impl Future<Output = Result<Vec<Peer>, RpcError>> + Send;

    /// Returns the current validator set of the default subnet.
    fn current_validators(&self) -> impl Future<Output = Result<Vec<Validator>, RpcError>> + Send;
}
