//! End-to-end scenarios against the simulated network.

#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    iter,
    time::Duration,
};

use anyhow::Result;
use meshcheck::{
    default_registry,
    registry::{single_node_loader, staking_loader},
    DuplicateIdScenario, Harness, ObserveError, Observer, Query, RegistryBuilder, RetryPolicy,
    RunError, Runner, ScenarioError, ScenarioKind, Stage, Violation,
};
use meshcheck_services::{
    ConfigId, FactoryConfig, LogLevel, Network, NetworkBuilder, NetworkError, NetworkLoader,
    NodeIdentity, ServiceConfig, ServiceId,
};
use meshcheck_sim::{
    SimClient, SimNetwork, SimNetworkBuilder, SimOptions, SimStartupChecker, STATIC_CERT_NODE_ID,
};
use pretty_assertions::assert_eq;
use test_log::test;

const SAME_CERT: ConfigId = ConfigId(1);

fn observer() -> Observer {
    Observer::new(RetryPolicy::new(5, Duration::from_millis(100)))
}

fn sim() -> SimNetworkBuilder {
    SimNetworkBuilder::new(SimOptions {
        warmup_failures: 2,
        startup_delay_ms: 10,
    })
}

/// Five boot members and nothing else.
fn boot_only_loader() -> NetworkLoader {
    NetworkLoader::new(
        FactoryConfig::default(),
        true,
        BTreeMap::from([(SAME_CERT, ServiceConfig::new(false, LogLevel::Debug))]),
        BTreeMap::new(),
    )
    .expect("valid loader")
}

/// Makes a boot member report an unknown peer once `trigger` has started.
struct RogueAfter {
    inner: SimNetwork,
    trigger: ServiceId,
    target: ServiceId,
    rogue: NodeIdentity,
}

impl Network for RogueAfter {
    type Client = SimClient;
    type Checker = SimStartupChecker;

    fn boot_service_ids(&self) -> BTreeSet<ServiceId> {
        self.inner.boot_service_ids()
    }

    fn client(&self, service_id: ServiceId) -> Result<SimClient, NetworkError> {
        self.inner.client(service_id)
    }

    fn add_service(
        &mut self,
        config_id: ConfigId,
        service_id: ServiceId,
    ) -> impl Future<Output = Result<SimStartupChecker, NetworkError>> + Send {
        async move {
            let checker = self.inner.add_service(config_id, service_id).await?;
            if service_id == self.trigger {
                self.inner.inject_rogue_peer(self.target, self.rogue.clone());
            }
            Ok(checker)
        }
    }

    fn remove_service(
        &mut self,
        service_id: ServiceId,
    ) -> impl Future<Output = Result<(), NetworkError>> + Send {
        self.inner.remove_service(service_id)
    }
}

async fn registered(loader: &NetworkLoader) -> Result<Harness<SimNetwork>> {
    let net = sim().build(loader).await?;
    let mut h = Harness::new(net, observer());
    h.register_network(loader.desired_services().keys().copied())
        .await?;
    Ok(h)
}

#[test(tokio::test(start_paused = true))]
async fn test_default_suite_passes() -> Result<()> {
    let registry = default_registry(&FactoryConfig::default())?;
    let runner = Runner::new(sim(), observer());
    let reports = runner.run(&registry, &[]).await?;

    assert_eq!(reports.len(), 4);
    for report in &reports {
        assert!(report.passed(), "{}: {:?}", report.name, report.outcome);
    }
    assert!(reports
        .iter()
        .any(|r| r.name == "singleNodeGetValidatorsTest"));
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn test_single_node_validators() -> Result<()> {
    let loader = single_node_loader(&FactoryConfig::default())?;
    let net = sim().build(&loader).await?;
    assert_eq!(net.boot_service_ids(), BTreeSet::from([ServiceId::boot(0)]));

    let mut h = Harness::new(net, observer());
    h.register_network(iter::empty()).await?;
    h.verify_all().await?;

    let client = h.client(ServiceId::boot(0))?;
    let validators = h.observer().validators(ServiceId::boot(0), client).await?;
    let own = h.membership().identity(ServiceId::boot(0)).cloned();
    assert_eq!(validators.len(), 1);
    assert_eq!(Some(validators[0].id.clone()), own);

    let net = sim().build(&loader).await?;
    ScenarioKind::GetValidators {
        reference: ServiceId::boot(0),
    }
    .run(net, iter::empty(), &observer())
    .await?;
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn test_duplicate_flow_step_by_step() -> Result<()> {
    let loader = boot_only_loader();
    let mut h = registered(&loader).await?;
    let boot = ServiceId::boot(0);
    let observer = observer();

    let peers = |h: &Harness<SimNetwork>| {
        let client = h.client(boot).unwrap().clone();
        let observer = observer.clone();
        async move { observer.peers(boot, &client).await.unwrap() }
    };

    h.verify_all().await?;
    assert_eq!(peers(&h).await.len(), 4);

    h.add_service(SAME_CERT, ServiceId(1)).await?;
    h.verify_all().await?;
    let seen = peers(&h).await;
    assert_eq!(seen.len(), 5);
    assert!(seen.iter().any(|p| p.id.as_str() == STATIC_CERT_NODE_ID));

    h.add_service(SAME_CERT, ServiceId(2)).await?;
    h.verify_all().await?;
    assert!(peers(&h).await.len() >= 4);

    h.remove_service(ServiceId(1)).await?;
    h.verify_all().await?;
    let seen = peers(&h).await;
    assert_eq!(seen.len(), 5);
    assert!(seen.iter().any(|p| p.id.as_str() == STATIC_CERT_NODE_ID));
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn test_duplicate_scenario_on_boot_only_network() -> Result<()> {
    let net = sim().build(&boot_only_loader()).await?;
    let scenario = ScenarioKind::DuplicateNodeId(DuplicateIdScenario {
        same_cert_config: SAME_CERT,
        first: ServiceId(1),
        second: ServiceId(2),
    });
    scenario.run(net, iter::empty(), &observer()).await?;
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn test_unrecognized_peer_fails() -> Result<()> {
    let loader = staking_loader(&FactoryConfig::default())?;
    let net = sim().build(&loader).await?;
    net.inject_rogue_peer(ServiceId::boot(3), "NodeID-rogue".into());

    let err = ScenarioKind::FullyConnected
        .run(net, [ServiceId(0)], &observer())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Initial);
    let err = match err.source {
        ScenarioError::Verify(err) => err,
        other => panic!("expected verification failure, got {other:?}"),
    };
    assert_eq!(err.service_id, ServiceId::boot(3));
    assert!(err
        .violations
        .contains(&Violation::Unrecognized("NodeID-rogue".into())));
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn test_unrecognized_peer_fails_while_identities_collide() -> Result<()> {
    let net = RogueAfter {
        inner: sim().build(&boot_only_loader()).await?,
        trigger: ServiceId(2),
        target: ServiceId::boot(0),
        rogue: "NodeID-rogue".into(),
    };
    let scenario = ScenarioKind::DuplicateNodeId(DuplicateIdScenario {
        same_cert_config: SAME_CERT,
        first: ServiceId(1),
        second: ServiceId(2),
    });

    let err = scenario
        .run(net, iter::empty(), &observer())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::SecondDuplicateAdded);
    let err = match err.source {
        ScenarioError::Verify(err) => err,
        other => panic!("expected verification failure, got {other:?}"),
    };
    assert_eq!(err.service_id, ServiceId::boot(0));
    // The lower bound holds, only the unknown identity is reported.
    assert_eq!(
        err.violations,
        [Violation::Unrecognized("NodeID-rogue".into())]
    );
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn test_stalled_node_exhausts_retries() -> Result<()> {
    let net = sim().build(&boot_only_loader()).await?;
    net.stall(ServiceId::boot(1), u32::MAX)?;
    let err = ScenarioKind::FullyConnected
        .run(net, iter::empty(), &observer())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Initial);
    match err.source {
        ScenarioError::Observe(ObserveError::Exhausted {
            service_id,
            query,
            attempts,
            ..
        }) => {
            assert_eq!(service_id, ServiceId::boot(1));
            assert_eq!(query, Query::NodeId);
            assert_eq!(attempts, 5);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn test_timeout_is_reported() -> Result<()> {
    let loader = staking_loader(&FactoryConfig::default())?;
    let mut builder = RegistryBuilder::new();
    builder.register(
        "slow",
        ScenarioKind::FullyConnected,
        loader,
        Duration::from_secs(3),
    )?;
    let registry = builder.build();

    let slow = SimNetworkBuilder::new(SimOptions {
        warmup_failures: u32::MAX,
        startup_delay_ms: 0,
    });
    let runner = Runner::new(slow, Observer::new(RetryPolicy::new(100, Duration::from_secs(1))));
    let reports = runner.run(&registry, &["slow".to_owned()]).await?;

    assert_eq!(reports.len(), 1);
    match &reports[0].outcome {
        Err(RunError::Timeout { name, limit }) => {
            assert_eq!(name, "slow");
            assert_eq!(*limit, Duration::from_secs(3));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    Ok(())
}

#[test(tokio::test)]
async fn test_unknown_test_rejected() -> Result<()> {
    let registry = default_registry(&FactoryConfig::default())?;
    let runner = Runner::new(sim(), observer());
    let err = runner
        .run(&registry, &["noSuchTest".to_owned()])
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::UnknownTest(name) if name == "noSuchTest"));
    Ok(())
}

#[test(tokio::test(start_paused = true))]
async fn test_validators_scenario() -> Result<()> {
    let loader = staking_loader(&FactoryConfig::default())?;
    let net = sim().build(&loader).await?;
    ScenarioKind::GetValidators {
        reference: ServiceId(0),
    }
    .run(net, [ServiceId(0)], &observer())
    .await?;
    Ok(())
}
