//! Topology-convergence checks for peer-to-peer validator networks.
//!
//! A scenario mutates a running network while a [`MembershipTracker`]
//! records who is live. Before every check the tracker's snapshot is turned
//! into per-service [`Expectation`]s, each node's peer list is read through
//! an [`Observer`] that retries while nodes are still bootstrapping, and the
//! lists are compared with [`verify_peers`].
//!
//! Tests are collected in a [`Registry`] and executed by a [`Runner`].

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod expect;
pub mod membership;
pub mod observe;
pub mod registry;
pub mod runner;
pub mod scenario;
pub mod verify;

pub use crate::{
    config::RunConfig,
    error::{ScenarioError, Stage, StageError},
    expect::{expected_for_all, expected_peers, CountMode, ExpectedPeers, Expectation},
    membership::{MembershipError, MembershipEvent, MembershipState, MembershipTracker, Origin},
    observe::{ObserveError, Observer, Query, RetryPolicy},
    registry::{default_registry, Registry, RegistryBuilder, RegistryError, TestEntry},
    runner::{RunError, RunReport, Runner},
    scenario::{DuplicateIdScenario, Harness, ScenarioKind},
    verify::{verify_peers, VerifyError, Violation},
};
