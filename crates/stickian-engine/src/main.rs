//! Game engine binary for Stickian.
//!
//! Wires the stores, catalog, admission front, tick processor, and tick
//! scheduler together and runs the tick loop until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `stickian-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Create the in-memory stores and seed the starting city
//! 4. Submit the configured bootstrap intents
//! 5. Run the tick scheduler until shutdown
//! 6. Log the final report

mod bootstrap;
mod error;

use std::path::Path;
use std::sync::Arc;

use stickian_core::{
    Admission, EngineConfig, ShutdownSignal, TickCounter, TickProcessor, TickScheduler,
};
use stickian_db::{InMemoryCityStore, InMemoryEventStore};
use stickian_types::CityId;
use stickian_world::Catalog;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "stickian-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the tick loop fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    let (config, from_file) = load_config()?;
    init_logging(&config)?;

    info!(
        world_name = config.world.name,
        tick_interval_ms = config.world.tick_interval_ms,
        catch_up_capacity = config.scheduler.catch_up_capacity,
        precheck = config.ingress.precheck,
        from_file,
        "Configuration loaded"
    );

    let catalog = Arc::new(Catalog::standard());
    let events = Arc::new(InMemoryEventStore::new());
    let cities = Arc::new(InMemoryCityStore::new());
    let counter = Arc::new(TickCounter::new());

    let city_id = config.world.seed_city_id.map_or_else(CityId::new, CityId::from);
    bootstrap::seed_city(cities.as_ref(), &stickian_world::starting_city(city_id))?;

    let admission = Admission::new(
        Arc::clone(&events),
        Arc::clone(&cities),
        Arc::clone(&catalog),
        Arc::clone(&counter),
    )
    .with_precheck(config.ingress.precheck);
    let admitted = bootstrap::submit_intents(&admission, city_id, &config.bootstrap.intents)?;
    info!(city = %city_id, admitted, "Bootstrap complete");

    let period = config.tick_period();
    let processor = TickProcessor::new(
        Arc::clone(&events),
        Arc::clone(&cities),
        Arc::clone(&catalog),
        period,
    )?;
    let scheduler = TickScheduler::new(
        Arc::clone(&counter),
        period,
        config.scheduler.catch_up_capacity,
    )?;

    let shutdown = Arc::new(ShutdownSignal::new());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown requested"),
                Err(err) => warn!(error = %err, "Ctrl-C handler failed, shutting down"),
            }
            shutdown.cancel();
        });
    }

    let report = scheduler.run(&processor, &shutdown).await?;

    match admission.city_status(city_id) {
        Ok(city) => info!(
            city = %city.id,
            buildings = ?city.buildings,
            resources = ?city.resources,
            queued = city.upgrade_queue.len(),
            "Final city state"
        ),
        Err(err) => warn!(city = %city_id, error = %err, "Final city state unavailable"),
    }
    info!(
        last_tick = ?report.last_tick,
        processed = report.stats.processed,
        failed = report.stats.failed,
        dropped = report.stats.dropped,
        watermark = processor.watermark(),
        "stickian-engine stopped"
    );
    Ok(())
}

/// Load `stickian-config.yaml`, falling back to defaults if it is absent.
///
/// Returns the config and whether it came from the file.
fn load_config() -> Result<(EngineConfig, bool), EngineError> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        Ok((EngineConfig::from_file(path)?, true))
    } else {
        let mut config = EngineConfig::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok((config, false))
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(config: &EngineConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_err| EnvFilter::try_new(&config.logging.level))
        .map_err(|err| EngineError::Logging {
            message: format!("invalid log filter: {err}"),
        })?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| EngineError::Logging {
        message: err.to_string(),
    })
}
