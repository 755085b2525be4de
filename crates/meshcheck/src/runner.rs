//! Runs registered tests against networks from a [`NetworkBuilder`].

use std::time::Duration;

use meshcheck_services::{NetworkBuilder, NetworkError};
use tokio::time::{timeout, Instant};
use tracing::{error, info, instrument};

use crate::{
    error::StageError,
    observe::Observer,
    registry::{Registry, TestEntry},
};

/// A test did not pass.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// No test has this name.
    #[error("no test named `{0}`")]
    UnknownTest(String),

    /// The test's network could not be started.
    #[error("test `{name}` could not start its network")]
    Network {
        /// The test.
        name: String,
        /// Why.
        #[source]
        source: NetworkError,
    },

    /// The scenario failed.
    #[error("test `{name}` failed")]
    Failed {
        /// The test.
        name: String,
        /// Where and why.
        #[source]
        source: StageError,
    },

    /// The test ran out of time.
    #[error("test `{name}` timed out after {limit:?}")]
    Timeout {
        /// The test.
        name: String,
        /// Its time limit.
        limit: Duration,
    },
}

/// The outcome of one test.
#[derive(Debug)]
pub struct RunReport {
    /// The test.
    pub name: String,
    /// Did it pass?
    pub outcome: Result<(), RunError>,
    /// How long it took.
    pub elapsed: Duration,
}

impl RunReport {
    /// Did the test pass?
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Runs tests one after another.
#[derive(Debug)]
pub struct Runner<B> {
    builder: B,
    observer: Observer,
}

impl<B: NetworkBuilder> Runner<B> {
    /// Creates a runner that starts networks with `builder`.
    pub fn new(builder: B, observer: Observer) -> Self {
        Self { builder, observer }
    }

    /// Runs the tests named in `names`, or every test if `names` is empty.
    ///
    /// Unknown names are rejected before anything runs.
    pub async fn run(
        &self,
        registry: &Registry,
        names: &[String],
    ) -> Result<Vec<RunReport>, RunError> {
        let entries = if names.is_empty() {
            registry.entries().iter().collect::<Vec<_>>()
        } else {
            names
                .iter()
                .map(|name| {
                    registry
                        .get(name)
                        .ok_or_else(|| RunError::UnknownTest(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut reports = Vec::with_capacity(entries.len());
        for entry in entries {
            reports.push(self.run_one(entry).await);
        }
        Ok(reports)
    }

    /// Runs one test under its time limit.
    #[instrument(skip_all, fields(test = %entry.name))]
    pub async fn run_one(&self, entry: &TestEntry) -> RunReport {
        info!(timeout = ?entry.timeout, "starting test");
        let start = Instant::now();

        let outcome = match timeout(entry.timeout, self.execute(entry)).await {
            Ok(result) => result,
            Err(_) => Err(RunError::Timeout {
                name: entry.name.clone(),
                limit: entry.timeout,
            }),
        };

        let elapsed = start.elapsed();
        match &outcome {
            Ok(()) => info!(?elapsed, "test passed"),
            Err(err) => error!(?elapsed, error = ?err, "test failed"),
        }
        RunReport {
            name: entry.name.clone(),
            outcome,
            elapsed,
        }
    }

    async fn execute(&self, entry: &TestEntry) -> Result<(), RunError> {
        let network = self
            .builder
            .build(&entry.loader)
            .await
            .map_err(|source| RunError::Network {
                name: entry.name.clone(),
                source,
            })?;
        let desired = entry.loader.desired_services().keys().copied();
        entry
            .kind
            .run(network, desired, &self.observer)
            .await
            .map_err(|source| RunError::Failed {
                name: entry.name.clone(),
                source,
            })
    }
}
