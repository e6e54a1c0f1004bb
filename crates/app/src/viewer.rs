//! Process wiring for the viewer: transport selection, the control server,
//! Ctrl+C handling, and the single-threaded runtime driving the event loop.

use std::sync::Once;

use anyhow::{Context, Result};
use frame_ingest::{
    HttpTransport, HttpTransportConfig, SimulatedTransport, SimulationConfig, Transport,
    inbound_channel,
};
use playback::{
    BackendSource, Viewer, ViewerCommand, ViewerConfig, command_channel, runtime::telemetry,
};
use tracing::{info, warn};

use crate::server::spawn_control_server;

pub fn run(config: ViewerConfig) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry);
    let metrics = telemetry::init_metrics_recorder()?;

    let (inbound_tx, inbound_rx) = inbound_channel();
    let transport: Box<dyn Transport> = match &config.backend {
        BackendSource::Http { base_url } => {
            info!("Streaming frames from {base_url}");
            Box::new(
                HttpTransport::new(HttpTransportConfig::new(base_url.clone()), inbound_tx)
                    .context("Failed to build HTTP transport")?,
            )
        }
        BackendSource::Simulated { frame_delay } => {
            info!(?frame_delay, "Generating frames locally");
            Box::new(SimulatedTransport::new(
                SimulationConfig {
                    frame_delay: *frame_delay,
                    ..SimulationConfig::default()
                },
                inbound_tx,
            ))
        }
    };

    let viewer = Viewer::new(config.viewer.clone(), transport);
    let (commands, command_rx) = command_channel();

    CTRL_HANDLER.call_once(|| {
        let commands = commands.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            let _ = commands.send(ViewerCommand::Shutdown);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let server = spawn_control_server(
        (config.http_host.clone(), config.http_port),
        commands.clone(),
        viewer.subscribe(),
        Some(metrics),
    )
    .context("Failed to start control server")?;
    info!(
        "Control surface available at http://{}:{}/state",
        config.http_host, config.http_port
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to build viewer runtime")?;
    runtime.block_on(viewer.run(command_rx, inbound_rx));

    server.stop();
    Ok(())
}
