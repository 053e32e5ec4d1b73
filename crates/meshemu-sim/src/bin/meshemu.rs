//! Meshemu scenario runner
//!
//! Usage: `meshemu [scenario.json] [steps]`
//!
//! Without a scenario file the configuration comes from `MESHEMU_*`
//! variables. Prints the final topology snapshot as JSON.

use std::env;

use meshemu_reconcile::{Broadcast, EventLog, TracingBackend};
use meshemu_sim::{SimulationConfig, SimulationManager};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshemu=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::from_env()?,
    };
    let steps: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);

    let log = EventLog::new();
    let backend = Broadcast::new().with(TracingBackend).with(log.clone());

    let manager = SimulationManager::new(config)?;
    manager.start(Box::new(backend)).await?;
    manager.wait_until_network_ready().await?;

    match manager.config().auto_step_interval() {
        Some(interval) => {
            let runs = u32::try_from(steps).unwrap_or(u32::MAX);
            tokio::time::sleep(interval.saturating_mul(runs)).await;
            manager.stop_auto_step().await;
        }
        None => {
            manager.step(steps).await?;
        }
    }

    let snapshot = manager.snapshot();
    tracing::info!(
        "finished at step {} with {} active and {} inactive links, {} events recorded",
        snapshot.step,
        snapshot.active.len(),
        snapshot.inactive.len(),
        log.len()
    );
    println!("{}", snapshot.to_json()?);

    manager.abort().await;
    Ok(())
}
