//! Computes which peers each service is allowed to report.
//!
//! Boot members are fully meshed and accept every node that bootstraps from
//! them, so a boot member should see every other live identity. Added
//! services bootstrap from, and only know, the boot members.
//!
//! A node keeps one connection per identity. When two live services share an
//! identity a boot member sees only one of them, and which one is not
//! determined. Boot members then get a lower bound instead of an exact
//! count, and the services holding the shared identity are not checked.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use meshcheck_services::{NodeIdentity, ServiceId};

use crate::membership::{MembershipError, MembershipState, Origin};

/// How an observed peer count is compared with the expected one.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CountMode {
    /// The counts must match.
    Exact,
    /// The observed count must be at least the expected one.
    AtLeast,
}

impl CountMode {
    /// Does `observed` satisfy `expected` under this mode?
    pub fn accepts(self, expected: usize, observed: usize) -> bool {
        match self {
            Self::Exact => observed == expected,
            Self::AtLeast => observed >= expected,
        }
    }
}

impl fmt::Display for CountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => f.write_str("exactly"),
            Self::AtLeast => f.write_str("at least"),
        }
    }
}

/// The peers a service may report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExpectedPeers {
    /// Identities the service may list. Never its own.
    pub acceptable: BTreeSet<NodeIdentity>,
    /// How many peers it should list.
    pub count: usize,
    /// How `count` is compared.
    pub mode: CountMode,
}

/// What to check for one service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expectation {
    /// Check the service's peers against this.
    Verify(ExpectedPeers),
    /// The service holds a shared identity and is not checked.
    Exempt,
}

/// Computes the expectation for `target` in `state`.
pub fn expected_peers(
    state: &MembershipState,
    target: ServiceId,
) -> Result<Expectation, MembershipError> {
    let own = state
        .identity(target)
        .ok_or(MembershipError::UnknownService(target))?;

    let ambiguous = state.ambiguous_identities();
    if ambiguous.contains(own) {
        return Ok(Expectation::Exempt);
    }

    let expected = match state.origin(target) {
        Some(Origin::Boot) => {
            let acceptable = state
                .identities()
                .into_iter()
                .filter(|id| *id != own)
                .cloned()
                .collect();
            if ambiguous.is_empty() {
                ExpectedPeers {
                    acceptable,
                    count: state.len().saturating_sub(1),
                    mode: CountMode::Exact,
                }
            } else {
                let unambiguous = state
                    .live()
                    .filter(|(_, id)| !ambiguous.contains(id))
                    .count();
                ExpectedPeers {
                    acceptable,
                    count: unambiguous.saturating_sub(1),
                    mode: CountMode::AtLeast,
                }
            }
        }
        Some(Origin::Added) | None => {
            let boot = state.boot().collect::<Vec<_>>();
            ExpectedPeers {
                count: boot.len(),
                acceptable: boot.into_iter().map(|(_, id)| id.clone()).collect(),
                mode: CountMode::Exact,
            }
        }
    };
    Ok(Expectation::Verify(expected))
}

/// Computes the expectation for every live service.
pub fn expected_for_all(
    state: &MembershipState,
) -> Result<BTreeMap<ServiceId, Expectation>, MembershipError> {
    state
        .live()
        .map(|(id, _)| Ok((id, expected_peers(state, id)?)))
        .collect()
}
