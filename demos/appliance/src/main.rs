//! Streaming appliance host.
//!
//! Runs the remote control channel and the ingest listener side by side
//! until interrupted:
//!
//!   cargo run -p castline-appliance -- --control-url ws://localhost:4456 --password secret
//!   cargo run -p castline-appliance -- --config castline.toml --port 0

mod config;
mod device;

use castline_control::ControlEngine;
use castline_ingest::{IngestListener, RawChunkHandler};
use clap::Parser;
use config::{AppConfig, Cli};
use device::Device;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("castline=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::resolve(&cli)?;
    let device = Arc::new(Device::new());

    let mut control = match config.control_config()? {
        Some(control_config) => {
            tracing::info!("Remote control via {}", control_config.url);
            let mut engine = ControlEngine::new(control_config, &device);
            engine.start();
            watch_control_state(&engine);
            Some(engine)
        }
        None => {
            tracing::info!("Remote control not configured");
            None
        }
    };

    let mut ingest = IngestListener::new(RawChunkHandler::new, device.clone());
    if config.ingest.enabled {
        ingest.start(config.ingest.port);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    if let Some(engine) = control.as_mut() {
        engine.stop();
    }
    ingest.shutdown().await;
    Ok(())
}

/// Log control channel state changes, the way the overlay indicator would
/// show them.
fn watch_control_state(engine: &ControlEngine<Device>) {
    let mut state = engine.subscribe();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            tracing::info!("Remote control: {:?}", current);
        }
    });
}
