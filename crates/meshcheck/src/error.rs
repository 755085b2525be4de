//! Scenario errors.

use std::fmt;

use meshcheck_services::NetworkError;

use crate::{membership::MembershipError, observe::ObserveError, verify::VerifyError};

/// A scenario step failed.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The network could not carry out a request.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A membership update was invalid.
    #[error(transparent)]
    Membership(#[from] MembershipError),

    /// A node could not be observed.
    #[error(transparent)]
    Observe(#[from] ObserveError),

    /// A node's peers were wrong.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// Some other observed state was wrong.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// An internal invariant was broken.
    #[error(transparent)]
    Bug(#[from] buggy::Bug),
}

/// A step of a scenario.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stage {
    /// The network as loaded.
    Initial,
    /// A same-certificate node has joined.
    FirstDuplicateAdded,
    /// A second node with that certificate has joined.
    SecondDuplicateAdded,
    /// The first of the two has left.
    FirstDuplicateRemoved,
    /// Cleanup after the last check.
    Terminal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initial => "initial",
            Self::FirstDuplicateAdded => "first duplicate added",
            Self::SecondDuplicateAdded => "second duplicate added",
            Self::FirstDuplicateRemoved => "first duplicate removed",
            Self::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// A scenario failed during `stage`.
#[derive(Debug, thiserror::Error)]
#[error("stage `{stage}` failed")]
pub struct StageError {
    /// The stage that failed.
    pub stage: Stage,
    /// What went wrong.
    #[source]
    pub source: ScenarioError,
}

/// Attaches a [`Stage`] to scenario errors.
pub(crate) trait StageExt<T> {
    fn during(self, stage: Stage) -> Result<T, StageError>;
}

impl<T, E> StageExt<T> for Result<T, E>
where
    E: Into<ScenarioError>,
{
    fn during(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|err| StageError {
            stage,
            source: err.into(),
        })
    }
}
