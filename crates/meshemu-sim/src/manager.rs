//! Simulation lifecycle and the simulation lock.
//!
//! [`SimulationManager`] owns the engine behind a single async mutex. Every
//! transition that touches reconciliation state (`start`, `step`, `abort`,
//! auto-stepping) goes through that lock, so steps never interleave and an
//! abort waits for an in-flight step to finish.
//!
//! Engine work runs on tokio's blocking pool since backend callbacks may
//! shell out. The lock guard travels with that work, so a caller that stops
//! waiting does not release the lock before the step is done.
//!
//! Two `watch` channels are published from inside the lock and read without
//! it:
//! - readiness, which flips from `Pending` to `Ready` (or `Failed`) once the
//!   initial network of step 0 is in place
//! - the latest [`TopologySnapshot`]

use std::sync::Arc;
use std::time::Duration;

use meshemu_reconcile::{NetworkBackendNotifications, ReconciliationEngine, StepReport};
use tokio::sync::{watch, Mutex};
use tokio::task;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SimulationConfig;
use crate::error::{Result, SimError};
use crate::snapshot::TopologySnapshot;

/// Whether the initial network is set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    /// Start failed; carries the reason.
    Failed(String),
}

struct Shared {
    /// The simulation lock.
    engine: Arc<Mutex<Option<ReconciliationEngine>>>,
    readiness: watch::Sender<Readiness>,
    snapshot: watch::Sender<Arc<TopologySnapshot>>,
}

impl Shared {
    async fn step(self: &Arc<Self>, count: u64) -> Result<Vec<StepReport>> {
        let mut guard = Arc::clone(&self.engine).lock_owned().await;
        if guard.is_none() {
            return Err(SimError::NotStarted);
        }

        let shared = Arc::clone(self);
        task::spawn_blocking(move || -> Result<Vec<StepReport>> {
            let engine = guard.as_mut().ok_or(SimError::NotStarted)?;
            let count = if engine.is_distributed() && count > 1 {
                warn!(
                    "distributed simulation steps one at a time; running 1 of {} requested steps",
                    count
                );
                1
            } else {
                count
            };

            let mut reports = Vec::new();
            for _ in 0..count {
                reports.push(engine.step()?);
                shared.publish(engine);
            }
            Ok(reports)
        })
        .await?
    }

    fn publish(&self, engine: &ReconciliationEngine) {
        self.snapshot
            .send_replace(Arc::new(TopologySnapshot::capture(engine)));
    }

    fn clear(&self, readiness: Readiness) {
        self.readiness.send_replace(readiness);
        self.snapshot.send_replace(Arc::new(TopologySnapshot::default()));
    }
}

struct AutoStep {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives a [`ReconciliationEngine`] built from a [`SimulationConfig`].
pub struct SimulationManager {
    config: SimulationConfig,
    shared: Arc<Shared>,
    auto_step: Mutex<Option<AutoStep>>,
}

impl SimulationManager {
    /// Create a manager for a validated configuration. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let (readiness, _) = watch::channel(Readiness::Pending);
        let (snapshot, _) = watch::channel(Arc::new(TopologySnapshot::default()));
        Ok(Self {
            config,
            shared: Arc::new(Shared {
                engine: Arc::new(Mutex::new(None)),
                readiness,
                snapshot,
            }),
            auto_step: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub async fn is_started(&self) -> bool {
        self.shared.engine.lock().await.is_some()
    }

    /// Build the engine, bring up management links and run step 0.
    ///
    /// On failure nothing is kept: the next `start` begins from scratch.
    /// Starts auto-stepping if the configuration asks for it.
    pub async fn start(&self, backend: Box<dyn NetworkBackendNotifications>) -> Result<StepReport> {
        let report = {
            let mut guard = self.shared.engine.lock().await;
            if guard.is_some() {
                return Err(SimError::AlreadyStarted);
            }
            self.shared.readiness.send_replace(Readiness::Pending);

            let config = self.config.clone();
            let setup = task::spawn_blocking(move || set_up(&config, backend))
                .await
                .map_err(SimError::from)
                .and_then(|result| result);
            match setup {
                Ok((engine, report)) => {
                    self.shared.publish(&engine);
                    *guard = Some(engine);
                    self.shared.readiness.send_replace(Readiness::Ready);
                    report
                }
                Err(err) => {
                    error!("simulation start failed: {}", err);
                    self.shared.clear(Readiness::Failed(err.to_string()));
                    return Err(err);
                }
            }
        };

        info!(
            "simulation started with {} nodes: {} links up, {} failed pairs",
            self.config.node_count,
            report.links_up,
            report.failures.len()
        );

        if let Some(interval) = self.config.auto_step_interval() {
            self.start_auto_step(interval).await?;
        }
        Ok(report)
    }

    /// Run `count` steps under the simulation lock.
    ///
    /// In distributed mode only a single step is run per call.
    pub async fn step(&self, count: u64) -> Result<Vec<StepReport>> {
        self.shared.step(count).await
    }

    /// Step every `interval` in a background task until stopped.
    ///
    /// Replaces a running auto-step task. The task ends on its own when a
    /// step fails or the simulation is aborted.
    pub async fn start_auto_step(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(SimError::Config("auto-step interval must be positive".into()));
        }
        if !self.is_started().await {
            return Err(SimError::NotStarted);
        }
        self.stop_auto_step().await;

        let (stop, mut stopped) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = shared.step(1).await {
                            error!("auto-step halted: {}", e);
                            break;
                        }
                    }
                }
            }
        });

        *self.auto_step.lock().await = Some(AutoStep { stop, handle });
        info!("auto-stepping every {:?}", interval);
        Ok(())
    }

    /// Stop auto-stepping and wait for the task to finish its current step.
    ///
    /// Returns whether a task was running.
    pub async fn stop_auto_step(&self) -> bool {
        let Some(auto) = self.auto_step.lock().await.take() else {
            return false;
        };
        auto.stop.send_replace(true);
        if let Err(e) = auto.handle.await {
            warn!("auto-step task ended abnormally: {}", e);
        }
        info!("auto-stepping stopped");
        true
    }

    /// Stop everything and drop all reconciliation state.
    ///
    /// Safe to call at any time; waits for an in-flight step.
    pub async fn abort(&self) {
        self.stop_auto_step().await;
        let mut guard = self.shared.engine.lock().await;
        if let Some(mut engine) = guard.take() {
            let step = engine.current_step();
            engine.reset();
            info!("simulation aborted after {} steps", step);
        }
        self.shared.clear(Readiness::Pending);
    }

    /// Wait until step 0 has set up the network, without holding the lock.
    pub async fn wait_until_network_ready(&self) -> Result<()> {
        let mut rx = self.shared.readiness.subscribe();
        let state = {
            let state = rx
                .wait_for(|r| *r != Readiness::Pending)
                .await
                .map_err(|_| SimError::NotStarted)?;
            state.clone()
        };
        match state {
            Readiness::Ready => Ok(()),
            Readiness::Failed(reason) => Err(SimError::SetupFailed(reason)),
            Readiness::Pending => Err(SimError::NotStarted),
        }
    }

    pub fn readiness(&self) -> Readiness {
        self.shared.readiness.borrow().clone()
    }

    /// Latest published snapshot. Never blocks on a running step.
    pub fn snapshot(&self) -> Arc<TopologySnapshot> {
        Arc::clone(&self.shared.snapshot.borrow())
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> watch::Receiver<Arc<TopologySnapshot>> {
        self.shared.snapshot.subscribe()
    }
}

/// Build the engine, bring up management links and run step 0.
fn set_up(
    config: &SimulationConfig,
    backend: Box<dyn NetworkBackendNotifications>,
) -> Result<(ReconciliationEngine, StepReport)> {
    let mut engine = config.build_engine(backend)?;
    let management = engine.connect_management()?;
    debug!("{} management links created", management);
    let report = engine.step()?;
    Ok((engine, report))
}

impl Drop for SimulationManager {
    fn drop(&mut self) {
        if let Some(auto) = self.auto_step.get_mut().take() {
            auto.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MovementConfig;
    use meshemu_reconcile::TracingBackend;
    use meshemu_topology::DistanceMatrix;

    /// Blocks its thread on every step after the first, like a backend
    /// running shell commands.
    struct SlowBackend;

    impl NetworkBackendNotifications for SlowBackend {
        fn before_simulation_step(&mut self, step: u64, _distances: &DistanceMatrix) {
            if step > 0 {
                std::thread::sleep(Duration::from_millis(300));
            }
        }
    }

    fn config() -> SimulationConfig {
        SimulationConfig {
            node_count: 4,
            movement: MovementConfig::RandomWalk {
                width: 20.0,
                height: 20.0,
                max_step: 2.0,
                seed: 5,
            },
            ..SimulationConfig::default()
        }
    }

    #[tokio::test]
    async fn lifecycle_errors() {
        let manager = SimulationManager::new(config()).unwrap();
        assert!(matches!(manager.step(1).await, Err(SimError::NotStarted)));
        assert!(matches!(
            manager.start_auto_step(Duration::from_millis(5)).await,
            Err(SimError::NotStarted)
        ));

        manager.start(Box::new(TracingBackend)).await.unwrap();
        assert!(matches!(
            manager.start(Box::new(TracingBackend)).await,
            Err(SimError::AlreadyStarted)
        ));
        assert!(manager.is_started().await);
    }

    #[tokio::test]
    async fn steps_publish_snapshots() {
        let manager = SimulationManager::new(config()).unwrap();
        let mut updates = manager.subscribe();
        manager.start(Box::new(TracingBackend)).await.unwrap();
        assert!(updates.has_changed().unwrap());
        assert_eq!(manager.snapshot().step, 1);

        let reports = manager.step(3).await.unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[2].step, 3);
        assert_eq!(manager.snapshot().step, 4);
        assert_eq!(manager.snapshot().distances.len(), 6);
    }

    #[tokio::test]
    async fn abort_resets_and_allows_restart() {
        let manager = SimulationManager::new(config()).unwrap();
        manager.start(Box::new(TracingBackend)).await.unwrap();
        manager.step(2).await.unwrap();

        manager.abort().await;
        assert!(!manager.is_started().await);
        assert_eq!(manager.readiness(), Readiness::Pending);
        assert_eq!(manager.snapshot().step, 0);
        assert!(matches!(manager.step(1).await, Err(SimError::NotStarted)));

        manager.start(Box::new(TracingBackend)).await.unwrap();
        assert_eq!(manager.snapshot().step, 1);
    }

    #[tokio::test]
    async fn abort_when_idle_is_harmless() {
        let manager = SimulationManager::new(config()).unwrap();
        manager.abort().await;
        assert!(!manager.stop_auto_step().await);
    }

    #[tokio::test]
    async fn zero_interval_rejected() {
        let manager = SimulationManager::new(config()).unwrap();
        manager.start(Box::new(TracingBackend)).await.unwrap();
        assert!(matches!(
            manager.start_auto_step(Duration::ZERO).await,
            Err(SimError::Config(_))
        ));
    }

    #[tokio::test]
    async fn blocking_backend_does_not_stall_the_runtime() {
        let manager = Arc::new(SimulationManager::new(config()).unwrap());
        manager.start(Box::new(SlowBackend)).await.unwrap();

        let stepping = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.step(1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!stepping.is_finished());
        assert_eq!(manager.snapshot().step, 1);
        assert_eq!(stepping.await.unwrap().unwrap().len(), 1);
        assert_eq!(manager.snapshot().step, 2);

        // A caller that gives up waiting leaves the step running to completion.
        let timed_out = tokio::time::timeout(Duration::from_millis(20), manager.step(1)).await;
        assert!(timed_out.is_err());
        manager.step(1).await.unwrap();
        assert_eq!(manager.snapshot().step, 4);
        assert!(manager.is_started().await);
    }
}
