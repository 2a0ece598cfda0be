//! # ReLink Session Keeper
//!
//! Long-lived daemon that maintains one persistent TCP session per
//! configured destination: bounded connection pooling, retry with
//! exponential backoff, periodic heartbeats, and structural validation of
//! inbound payloads. Reconnection is supervised per destination, so one
//! unreachable peer never stalls the others.

use anyhow::Result;
use tokio::signal;

use lib_link::{load_config, logger, run_status_monitor, InboundPayload, SessionSupervisor};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = load_config();
    let settings = config.resolve()?;
    logger::setup_logging(&settings.log_dir, &settings.log_level)?;

    log::info!(
        "Starting ReLink: {} destination(s), pool size {}, heartbeat every {}s",
        settings.destinations.len(),
        settings.pool_size,
        settings.heartbeat_interval.as_secs()
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let (supervisor, mut payload_rx) = SessionSupervisor::new(&settings);
    let registry = supervisor.registry();

    let supervisor_handle = tokio::spawn(supervisor.run(shutdown_tx.clone()));
    let monitor_handle = tokio::spawn(run_status_monitor(
        registry,
        settings.status_interval,
        shutdown_tx.subscribe(),
    ));

    // Application payload consumer. The engine only guarantees
    // header/length-validated bytes; real message handling goes here.
    let mut drain_shutdown = shutdown_tx.subscribe();
    let drain_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = drain_shutdown.recv() => break,
                payload = payload_rx.recv() => {
                    match payload {
                        Some(InboundPayload { destination, bytes }) => {
                            log::debug!("Payload from {destination}: {} bytes", bytes.len());
                        }
                        None => break,
                    }
                }
            }
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = tokio::try_join!(supervisor_handle, monitor_handle, drain_handle);

    log::info!("Shutdown complete.");
    Ok(())
}
