mod clips;
mod config;
mod debounce;
mod dispatch;
mod hardware;
mod lifecycle;
mod phone;
mod playback;
mod pulse;

use std::{sync::mpsc, thread};

use anyhow::{anyhow, Context, Result};
use dotenv::dotenv;
use tokio::sync::{oneshot, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::clips::ClipLibrary;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::hardware::{audio::AudioDevice, run_sampler, PhoneHardware};
use crate::lifecycle::ShutdownSignal;

#[cfg(not(feature = "real"))]
use crate::hardware::emulated::Hardware;
#[cfg(feature = "real")]
use crate::hardware::physical::Hardware;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "phonehack starting");

    let config = Config::load()?;
    info!(?config.timing, ?config.wiring, manifest = %config.manifest.display(), "configuration loaded");

    let library = ClipLibrary::load(&config.manifest)?;
    let hardware = Hardware::create(&config)?;

    let shutdown = ShutdownSignal::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Sampler -> dispatcher, bounded so a stalled dispatcher applies backpressure.
    let (edge_tx, edge_rx) = mpsc::sync_channel(config.queue_capacity);
    // Dispatcher -> sampler
    let (bell_tx, bell_rx) = mpsc::channel();

    let sampler_shutdown = shutdown_rx.clone();
    let sampler = thread::Builder::new()
        .name("sampler".into())
        .spawn(move || run_sampler(hardware, edge_tx, bell_rx, sampler_shutdown))
        .context("failed to spawn sampler thread")?;

    let (done_tx, done_rx) = oneshot::channel();
    let dispatcher_config = config.clone();
    let dispatcher = thread::Builder::new()
        .name("dispatcher".into())
        .spawn(move || {
            // The audio stream is tied to the thread that opened it.
            let output = AudioDevice::create(dispatcher_config.audio_device.clone());
            let result = Dispatcher::new(&dispatcher_config, library, output, bell_tx)
                .run(edge_rx, shutdown_rx);
            let _ = done_tx.send(result);
        })
        .context("failed to spawn dispatcher thread")?;

    info!("phone initialized, entering main loop");

    let outcome = tokio::select! {
        result = shutdown.wait() => {
            info!("shutdown signal received");
            result.context("failed to listen for shutdown signals")
        }
        result = done_rx => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(anyhow!("dispatcher exited without reporting")),
        }
    };

    info!("shutting down...");

    let _ = shutdown_tx.send(true);

    match sampler.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "sampler stopped with an error"),
        Err(_) => error!("sampler thread panicked"),
    }
    if dispatcher.join().is_err() {
        error!("dispatcher thread panicked");
    }

    info!("phonehack stopped");

    outcome
}
