//! Compares observed peer lists with expectations.

use std::fmt;

use meshcheck_services::{NodeIdentity, Peer, ServiceId};

use crate::expect::{CountMode, ExpectedPeers};

/// One way an observed peer list disagrees with its expectation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Violation {
    /// The node reported the wrong number of peers.
    Count {
        /// How the count is compared.
        mode: CountMode,
        /// The expected count.
        expected: usize,
        /// The observed count.
        actual: usize,
    },
    /// The node reported a peer it should not know.
    Unrecognized(NodeIdentity),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count {
                mode,
                expected,
                actual,
            } => write!(f, "expected {mode} {expected} peers, found {actual}"),
            Self::Unrecognized(id) => write!(f, "unrecognized peer {id}"),
        }
    }
}

/// A service's peer list did not match its expectation.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("service {service_id} has unexpected peers: {}", DisplayList(.violations))]
pub struct VerifyError {
    /// The service whose peers were checked.
    pub service_id: ServiceId,
    /// Everything that was wrong, in check order.
    pub violations: Vec<Violation>,
}

struct DisplayList<'a>(&'a [Violation]);

impl fmt::Display for DisplayList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Checks `observed` against `expected`.
///
/// The count and every identity are checked; all violations are reported
/// together.
pub fn verify_peers(
    service_id: ServiceId,
    expected: &ExpectedPeers,
    observed: &[Peer],
) -> Result<(), VerifyError> {
    let mut violations = Vec::new();

    if !expected.mode.accepts(expected.count, observed.len()) {
        violations.push(Violation::Count {
            mode: expected.mode,
            expected: expected.count,
            actual: observed.len(),
        });
    }

    violations.extend(
        observed
            .iter()
            .filter(|peer| !expected.acceptable.contains(&peer.id))
            .map(|peer| Violation::Unrecognized(peer.id.clone())),
    );

    if violations.is_empty() {
        Ok(())
    } else {
        Err(VerifyError {
            service_id,
            violations,
        })
    }
}
