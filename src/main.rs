//! Kestrel - a small ECS runtime demo
//!
//! Loads run settings, populates a world, and drives the tick loop.

mod demo;
mod settings;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use kestrel_ecs::App;

use crate::demo::AccessCounter;
use crate::settings::RunSettings;

fn main() -> Result<()> {
    // Settings pick the log level, so load them under a bootstrap subscriber
    let bootstrap = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .finish();
    let settings = tracing::subscriber::with_default(bootstrap, RunSettings::load);

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .context("Invalid log level in settings")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    info!("Starting Kestrel with {:?}", settings);

    let mut app = App::new();
    demo::register(&mut app).context("Failed to register demo systems")?;

    let mut failed_ticks = 0;
    for tick in 1..=settings.ticks {
        if let Err(e) = app.tick() {
            failed_ticks += 1;
            warn!("{}", e);
        }
        if settings.report_every > 0 && tick % settings.report_every == 0 {
            report(&app, tick)?;
        }
    }

    info!(
        "Finished {} ticks ({} with failures)",
        app.schedule().ticks(),
        failed_ticks
    );
    Ok(())
}

fn report(app: &App, tick: u64) -> Result<()> {
    let world = app.world();
    let counters = world
        .query::<(&AccessCounter,)>()
        .context("Failed to query access counters")?;
    let total: u64 = counters.iter().map(|(_, (c,))| c.0).sum();
    info!(
        "Tick {}: {} entities, {} counters, {} total accesses",
        tick,
        world.entity_count(),
        counters.count(),
        total
    );
    Ok(())
}
