//! End-to-end scenarios through the simulation manager.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use meshemu_links::ModelConfig;
use meshemu_reconcile::{
    ConnectionFilter, ConnectionKind, ConnectionQuery, EventLog, LinkEvent, ReconcileError,
};
use meshemu_sim::{
    DistanceEntry, DistributedConfig, MovementConfig, Readiness, SimError, SimulationConfig,
    SimulationManager,
};
use meshemu_topology::{Distance, NodeId};

fn entry(a: u32, b: u32, d: f64) -> DistanceEntry {
    DistanceEntry::new(a, b, Distance::new(d).unwrap())
}

fn replay(node_count: u32, steps: Vec<Vec<DistanceEntry>>) -> SimulationConfig {
    SimulationConfig {
        node_count,
        link_quality: ModelConfig::Step { threshold: 10.0 },
        movement: MovementConfig::Replay { steps },
        ..SimulationConfig::default()
    }
}

#[tokio::test]
async fn three_node_replay() {
    let config = replay(
        3,
        vec![
            vec![entry(1, 2, 5.0), entry(1, 3, 50.0), entry(2, 3, 5.0)],
            vec![entry(1, 2, 50.0), entry(1, 3, 50.0), entry(2, 3, 5.0)],
        ],
    );
    let log = EventLog::new();
    let manager = SimulationManager::new(config).unwrap();

    let first = manager.start(Box::new(log.clone())).await.unwrap();
    manager.wait_until_network_ready().await.unwrap();
    assert_eq!(first.links_up, 2);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.active.len(), 2);
    assert!(snapshot
        .connections(&ConnectionFilter::default().with_node(NodeId::new(1)))
        .iter()
        .all(|c| c.pair.high() == NodeId::new(2)));

    let reports = manager.step(1).await.unwrap();
    assert_eq!(reports[0].links_down, 1);
    assert_eq!(reports[0].links_up, 0);

    let downs: Vec<_> = log
        .events_at(1)
        .into_iter()
        .filter(|e| matches!(e, LinkEvent::LinkDown { .. }))
        .collect();
    assert_eq!(downs.len(), 1);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.active.len(), 1);
    assert_eq!(snapshot.inactive.len(), 1);
    assert_eq!(snapshot.inactive[0].pair.low(), NodeId::new(1));
}

#[tokio::test]
async fn failed_start_releases_waiters_and_resets() {
    let config = replay(2, vec![vec![]]);
    let manager = Arc::new(SimulationManager::new(config).unwrap());

    let waiter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.wait_until_network_ready().await })
    };

    let err = manager.start(Box::new(EventLog::new())).await.unwrap_err();
    assert!(matches!(
        err,
        SimError::Reconcile(ReconcileError::EmptyDistanceMatrix { step: 0 })
    ));
    assert!(matches!(waiter.await.unwrap(), Err(SimError::SetupFailed(_))));
    assert!(matches!(manager.readiness(), Readiness::Failed(_)));
    assert!(!manager.is_started().await);
    assert!(manager.snapshot().active.is_empty());
}

#[tokio::test]
async fn waiter_resolves_once_network_is_up() {
    let config = replay(2, vec![vec![entry(1, 2, 1.0)]]);
    let manager = Arc::new(SimulationManager::new(config).unwrap());

    let waiter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.wait_until_network_ready().await })
    };
    tokio::task::yield_now().await;

    manager.start(Box::new(EventLog::new())).await.unwrap();
    assert!(waiter.await.unwrap().is_ok());
    assert_eq!(manager.readiness(), Readiness::Ready);
}

#[tokio::test]
async fn distributed_steps_are_coerced_to_one() {
    let mut config = replay(2, vec![vec![entry(1, 2, 1.0)], vec![entry(1, 2, 20.0)]]);
    config.distributed = Some(DistributedConfig {
        local: "alpha".into(),
        owners: BTreeMap::from([(1, "alpha".to_string()), (2, "beta".to_string())]),
    });
    let manager = SimulationManager::new(config).unwrap();
    manager.start(Box::new(EventLog::new())).await.unwrap();

    let reports = manager.step(5).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].links_down, 1);
    assert_eq!(manager.snapshot().step, 2);
}

#[tokio::test]
async fn hub_and_management_links() {
    let mut config = replay(3, vec![vec![entry(1, 2, 50.0), entry(1, 3, 50.0), entry(2, 3, 50.0)]]);
    config.central_hub = true;
    config.management = true;
    let log = EventLog::new();
    let manager = SimulationManager::new(config).unwrap();

    let first = manager.start(Box::new(log.clone())).await.unwrap();
    assert_eq!(first.created, 3);

    let snapshot = manager.snapshot();
    let count = |kind: ConnectionKind| snapshot.active.iter().filter(|c| c.kind == kind).count();
    assert_eq!(count(ConnectionKind::Central), 3);
    assert_eq!(count(ConnectionKind::Management), 3);
    assert_eq!(count(ConnectionKind::User), 0);

    let reports = manager.step(1).await.unwrap();
    assert!(!reports[0].unchanged);
    assert_eq!(reports[0].adjusted, 3);
    assert_eq!(reports[0].transitions(), 0);
    assert!(log.events_at(1).iter().all(|e| !e.is_transition()));
}

#[tokio::test]
async fn auto_step_runs_until_stopped() {
    let config = SimulationConfig {
        node_count: 3,
        ..SimulationConfig::default()
    };
    let manager = SimulationManager::new(config).unwrap();
    manager.start(Box::new(EventLog::new())).await.unwrap();

    manager.start_auto_step(Duration::from_millis(5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(manager.stop_auto_step().await);

    let reached = manager.snapshot().step;
    assert!(reached > 2, "only reached step {}", reached);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(manager.snapshot().step, reached);
}

#[tokio::test]
async fn abort_stops_auto_step() {
    let config = SimulationConfig {
        node_count: 3,
        auto_step_interval_ms: Some(5),
        ..SimulationConfig::default()
    };
    let manager = SimulationManager::new(config).unwrap();
    manager.start(Box::new(EventLog::new())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    manager.abort().await;
    assert!(!manager.is_started().await);
    assert!(!manager.stop_auto_step().await);
}

#[tokio::test]
async fn random_walk_runs_are_reproducible() {
    let config = SimulationConfig {
        node_count: 6,
        movement: MovementConfig::RandomWalk {
            width: 60.0,
            height: 60.0,
            max_step: 8.0,
            seed: 11,
        },
        ..SimulationConfig::default()
    };

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        let manager = SimulationManager::new(config.clone()).unwrap();
        manager.start(Box::new(EventLog::new())).await.unwrap();
        manager.step(5).await.unwrap();
        snapshots.push(manager.snapshot());
    }
    assert_eq!(snapshots[0], snapshots[1]);
}
