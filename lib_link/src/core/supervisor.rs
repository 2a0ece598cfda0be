//! # Session Supervisor
//!
//! Runs one keeper task per destination and keeps it running: each task
//! drives connect/serve/fail cycles forever, recreating the session per
//! cycle, until the shutdown channel fires. Destinations are independent;
//! one unreachable peer never delays the others.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::config::{Destination, Settings};
use crate::core::pool::ConnectionPool;
use crate::core::registry::LinkRegistry;
use crate::core::retry::RetryPolicy;
use crate::core::session::{ConnectionSession, InboundPayload, SessionContext};
use crate::core::validator::DataValidator;

pub struct SessionSupervisor {
    ctx: SessionContext,
    destinations: Vec<Destination>,
}

impl SessionSupervisor {
    /// Builds the supervisor and the shared collaborators from resolved
    /// settings. The returned receiver is the application's end of the
    /// validated-payload channel.
    pub fn new(settings: &Settings) -> (Self, mpsc::UnboundedReceiver<InboundPayload>) {
        let (payload_tx, payload_rx) = mpsc::unbounded_channel();
        let ctx = SessionContext {
            pool: Arc::new(ConnectionPool::new(
                settings.pool_size,
                settings.socket_timeout,
            )),
            validator: Arc::new(DataValidator::new(
                settings.payload_header.clone(),
                settings.payload_min_length,
            )),
            registry: Arc::new(LinkRegistry::new()),
            retry: RetryPolicy::new(settings.max_retries),
            heartbeat_interval: settings.heartbeat_interval,
            cooldown: settings.cooldown,
            payload_tx,
        };
        (
            Self {
                ctx,
                destinations: settings.destinations.clone(),
            },
            payload_rx,
        )
    }

    pub fn registry(&self) -> Arc<LinkRegistry> {
        Arc::clone(&self.ctx.registry)
    }

    /// Spawns one keeper task per destination and waits for all of them.
    /// Tasks exit when `shutdown` fires.
    pub async fn run(self, shutdown: broadcast::Sender<()>) {
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        for dest in &self.destinations {
            tasks.push(tokio::spawn(Self::keep_alive(
                dest.clone(),
                self.ctx.clone(),
                shutdown.subscribe(),
            )));
        }
        for task in tasks {
            let _ = task.await;
        }
    }

    /// The per-destination loop: one session cycle after another, forever.
    async fn keep_alive(
        dest: Destination,
        ctx: SessionContext,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        log::info!("Supervising link to {dest}");
        loop {
            let mut session = ConnectionSession::new(dest.clone(), ctx.clone());
            tokio::select! {
                _ = shutdown.recv() => {
                    log::info!("Link keeper for {dest} shutting down.");
                    return;
                }
                outcome = session.run() => {
                    match outcome.connected_for {
                        Some(connected) => log::debug!(
                            "Session cycle for {dest} ended after {}s connected: {}; restarting",
                            connected.as_secs(),
                            outcome.failure
                        ),
                        None => log::debug!(
                            "Connect cycle for {dest} failed: {}; restarting",
                            outcome.failure
                        ),
                    }
                }
            }
        }
    }
}

/// Periodically logs one status line per destination. Observability only;
/// it drives no transitions.
pub async fn run_status_monitor(
    registry: Arc<LinkRegistry>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut tick = interval(period);
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Status monitor shutting down.");
                return;
            }
            _ = tick.tick() => {
                for line in registry.summary() {
                    log::info!("Link status: {line}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::SessionState;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    fn test_settings(destinations: Vec<Destination>) -> Settings {
        Settings {
            destinations,
            pool_size: 1,
            heartbeat_interval: Duration::from_millis(100),
            socket_timeout: Duration::from_millis(200),
            max_retries: 2,
            cooldown: Duration::from_millis(50),
            status_interval: Duration::from_millis(100),
            payload_header: b"LNK:".to_vec(),
            payload_min_length: 4,
            log_dir: PathBuf::from("./logs"),
            log_level: "info".to_string(),
        }
    }

    #[tokio::test]
    async fn destinations_are_supervised_independently_and_shut_down() {
        // One live, silent peer
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = Destination {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
        };
        let accepts = Arc::new(AtomicU32::new(0));
        let accepts_srv = Arc::clone(&accepts);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                accepts_srv.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });

        // And one port with nothing listening
        let dead_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = Destination {
            host: "127.0.0.1".to_string(),
            port: dead_listener.local_addr().unwrap().port(),
        };
        drop(dead_listener);

        let settings = test_settings(vec![live.clone(), dead.clone()]);
        let (supervisor, _payload_rx) = SessionSupervisor::new(&settings);
        let registry = supervisor.registry();

        let (shutdown_tx, _) = broadcast::channel(1);
        let running = tokio::spawn(supervisor.run(shutdown_tx.clone()));

        tokio::time::sleep(Duration::from_millis(300)).await;

        // The dead destination's failures never blocked the live one
        assert_eq!(accepts.load(Ordering::SeqCst), 1);
        assert_eq!(registry.status(&live).unwrap().state, SessionState::Serving);
        // Still fighting its connect retries, but tracked
        assert_ne!(registry.status(&dead).unwrap().state, SessionState::Serving);

        shutdown_tx.send(()).unwrap();
        timeout(Duration::from_secs(2), running)
            .await
            .expect("supervisor must stop promptly on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn status_monitor_stops_on_shutdown() {
        let registry = Arc::new(LinkRegistry::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let monitor = tokio::spawn(run_status_monitor(
            registry,
            Duration::from_millis(20),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown_tx.send(()).unwrap();
        timeout(Duration::from_secs(1), monitor)
            .await
            .expect("monitor must stop promptly on shutdown")
            .unwrap();
    }
}
