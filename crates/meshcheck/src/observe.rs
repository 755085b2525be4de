//! Reads node state through RPC, tolerating nodes that are still
//! bootstrapping.

use std::{fmt, future::Future, time::Duration};

use backon::{ConstantBuilder, Retryable as _};
use meshcheck_services::{
    ConfigError, NodeClient, NodeIdentity, Peer, RpcError, ServiceId, Validator,
};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

/// How persistently an observation is retried.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause between attempts, in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// The pause between attempts.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Checks that the policy allows at least one attempt.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must allow at least one attempt".into(),
            });
        }
        Ok(())
    }
}

/// The thing being observed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Query {
    /// The node's own identity.
    NodeId,
    /// The node's peer list.
    Peers,
    /// The current validator set.
    Validators,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NodeId => "node ID",
            Self::Peers => "peers",
            Self::Validators => "current validators",
        };
        f.write_str(s)
    }
}

/// An observation could not be made.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ObserveError {
    /// Every attempt failed transiently.
    #[error("unable to get {query} of service {service_id} after {attempts} attempts: {last}")]
    Exhausted {
        /// The service observed.
        service_id: ServiceId,
        /// What was asked.
        query: Query,
        /// Attempts made.
        attempts: u32,
        /// The final error.
        #[source]
        last: RpcError,
    },

    /// The node refused the request.
    #[error("service {service_id} rejected {query} request: {source}")]
    Rejected {
        /// The service observed.
        service_id: ServiceId,
        /// What was asked.
        query: Query,
        /// The node's answer.
        source: RpcError,
    },
}

/// Makes retry-bounded observations.
#[derive(Clone, Debug, Default)]
pub struct Observer {
    policy: RetryPolicy,
}

impl Observer {
    /// Creates an observer that retries according to `policy`.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Reads the identity of `service_id`.
    #[instrument(skip_all, fields(%service_id))]
    pub async fn node_id<C: NodeClient>(
        &self,
        service_id: ServiceId,
        client: &C,
    ) -> Result<NodeIdentity, ObserveError> {
        self.observe(service_id, Query::NodeId, || client.node_id()).await
    }

    /// Reads the peer list of `service_id`.
    #[instrument(skip_all, fields(%service_id))]
    pub async fn peers<C: NodeClient>(
        &self,
        service_id: ServiceId,
        client: &C,
    ) -> Result<Vec<Peer>, ObserveError> {
        self.observe(service_id, Query::Peers, || client.peers()).await
    }

    /// Reads the current validator set as seen by `service_id`.
    #[instrument(skip_all, fields(%service_id))]
    pub async fn validators<C: NodeClient>(
        &self,
        service_id: ServiceId,
        client: &C,
    ) -> Result<Vec<Validator>, ObserveError> {
        self.observe(service_id, Query::Validators, || client.current_validators())
            .await
    }

    async fn observe<T, F, Fut>(
        &self,
        service_id: ServiceId,
        query: Query,
        mut f: F,
    ) -> Result<T, ObserveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let retries = self.policy.max_attempts.saturating_sub(1);
        let backoff = ConstantBuilder::default()
            .with_delay(self.policy.delay())
            .with_max_times(usize::try_from(retries).unwrap_or(usize::MAX));

        let mut attempts = 0u32;
        let result = (|| {
            attempts += 1;
            f()
        })
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(RpcError::is_transient)
        .notify(|err: &RpcError, delay: Duration| {
            warn!(%service_id, %query, error = %err, ?delay, "observation failed, retrying");
        })
        .await;

        result.map_err(|err| {
            if err.is_transient() {
                ObserveError::Exhausted {
                    service_id,
                    query,
                    attempts,
                    last: err,
                }
            } else {
                ObserveError::Rejected {
                    service_id,
                    query,
                    source: err,
                }
            }
        })
    }
}
