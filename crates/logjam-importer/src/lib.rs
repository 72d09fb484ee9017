//! logjam-importer - fan-in front-end for the logjam aggregation pipeline.
//!
//! Pulls telemetry frames from upstream logjam devices over sharded SUB
//! sockets, validates and deduplicates them, measures per-device sequence
//! gaps, and hands everything to the in-process parser pool with bounded
//! backpressure. Subscriber 0 additionally accepts direct submissions over
//! PULL and ROUTER. A watchdog aborts the process if the 1 Hz control loop
//! ever stalls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

pub mod config;
pub mod device_tracker;
pub mod stats;
pub mod subscriber;
pub mod watchdog;

pub use config::ImporterConfig;

/// Run the importer: spawn the watchdog and the subscriber pool, then drive
/// the 1 Hz tick loop until interrupted.
pub fn run(config: ImporterConfig) -> Result<()> {
    let ctx = zmq::Context::new();

    let watchdog = watchdog::spawn(&ctx)?;
    let mut subscribers = Vec::with_capacity(config.num_subscribers);
    for id in 0..config.num_subscribers {
        subscribers.push(subscriber::spawn(&ctx, id, &config)?);
    }
    info!(
        "importer: {} subscriber(s) listening, watchdog armed",
        subscribers.len()
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("failed to install interrupt handler")?;
    }

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_secs(1));
        for actor in subscribers.iter().chain(std::iter::once(&watchdog)) {
            actor.send(logjam_proto::CMD_TICK)?;
        }
    }

    info!("importer: shutting down");
    for actor in subscribers {
        actor.terminate()?;
    }
    watchdog.terminate()?;
    info!("importer: terminated");
    Ok(())
}
