//! # Connection Session
//!
//! The state machine for one logical connection to one destination:
//! connect, serve (receive + heartbeat), fail, release, cool down. One
//! `run()` call drives a single cycle; the supervisor recreates the
//! session for the next one, so connection bookkeeping lives in fields
//! here and never in shared globals.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::Destination;
use crate::core::heartbeat::HeartbeatClock;
use crate::core::pool::{ConnectionPool, PooledHandle};
use crate::core::registry::LinkRegistry;
use crate::core::retry::RetryPolicy;
use crate::core::validator::DataValidator;
use crate::error::LinkError;

/// Liveness marker pushed through the same send path as application
/// traffic.
pub const HEARTBEAT_PAYLOAD: &[u8] = b"PING\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Serving,
    Failing,
}

/// A validated inbound payload handed to the application.
#[derive(Debug, Clone)]
pub struct InboundPayload {
    pub destination: Destination,
    pub bytes: Vec<u8>,
}

/// Shared collaborators and tunables handed to every session.
#[derive(Clone)]
pub struct SessionContext {
    pub pool: Arc<ConnectionPool>,
    pub validator: Arc<DataValidator>,
    pub registry: Arc<LinkRegistry>,
    pub retry: RetryPolicy,
    pub heartbeat_interval: Duration,
    pub cooldown: Duration,
    pub payload_tx: mpsc::UnboundedSender<InboundPayload>,
}

/// How one session cycle ended.
#[derive(Debug)]
pub struct CycleOutcome {
    pub failure: LinkError,
    /// Time spent in `Serving`; `None` when the connect phase never
    /// succeeded.
    pub connected_for: Option<Duration>,
}

pub struct ConnectionSession {
    dest: Destination,
    ctx: SessionContext,
    state: SessionState,
}

impl ConnectionSession {
    pub fn new(dest: Destination, ctx: SessionContext) -> Self {
        Self {
            dest,
            ctx,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives one full lifecycle: connect (with retries), serve until the
    /// link fails, release, cool down. Returns once the cycle is over; the
    /// caller decides whether to start another.
    pub async fn run(&mut self) -> CycleOutcome {
        self.transition(SessionState::Connecting);

        let pool = Arc::clone(&self.ctx.pool);
        let dest = self.dest.clone();
        let connected = self
            .ctx
            .retry
            .run("connect", async || pool.acquire(&dest).await)
            .await;

        let mut handle = match connected {
            Ok(handle) => handle,
            Err(err) => {
                log::error!("Failed to connect to {}: {err}", self.dest);
                self.ctx
                    .registry
                    .record_failure(&self.dest, &err.to_string());
                tokio::time::sleep(self.ctx.cooldown).await;
                self.transition(SessionState::Disconnected);
                return CycleOutcome {
                    failure: err,
                    connected_for: None,
                };
            }
        };

        let started = Instant::now();
        self.transition(SessionState::Serving);
        log::info!("Connected to {}", self.dest);

        let failure = self.serve(&mut handle).await;
        let connected_for = started.elapsed();

        self.transition(SessionState::Failing);
        self.ctx
            .registry
            .record_failure(&self.dest, &failure.to_string());
        log::error!("Disconnected from {}: {failure}", self.dest);
        log::info!("Connection duration: {}s", connected_for.as_secs());

        // A transport fault breaks the stream; only an application-layer
        // (validation) failure leaves it healthy enough to park for reuse.
        if matches!(failure.root(), LinkError::Validation(_)) {
            self.ctx.pool.release(handle).await;
        } else {
            drop(handle);
        }

        tokio::time::sleep(self.ctx.cooldown).await;
        self.transition(SessionState::Disconnected);

        CycleOutcome {
            failure,
            connected_for: Some(connected_for),
        }
    }

    /// The serving loop: heartbeat due-check, then a bounded receive with
    /// validation, strictly sequential. An elapsed receive window with no
    /// data is an idle cycle, not a failure; the heartbeat traffic is what
    /// proves the link alive.
    async fn serve(&self, handle: &mut PooledHandle) -> LinkError {
        let mut clock = HeartbeatClock::new(self.ctx.heartbeat_interval);
        loop {
            if clock.due_at(Instant::now()) {
                let sent = self
                    .ctx
                    .retry
                    .run("heartbeat", async || handle.send(HEARTBEAT_PAYLOAD).await)
                    .await;
                if let Err(err) = sent {
                    return err;
                }
                clock.record_sent(Instant::now());
                log::debug!("Heartbeat sent to {}", self.dest);
            }

            let wait = clock.until_due(Instant::now());
            let received = self
                .ctx
                .retry
                .run("receive", async || match handle.recv(wait).await? {
                    Some(bytes) => {
                        self.ctx.validator.check(&bytes)?;
                        Ok(Some(bytes))
                    }
                    None => Ok(None),
                })
                .await;

            match received {
                Ok(Some(bytes)) => {
                    log::trace!("Received {} bytes from {}", bytes.len(), self.dest);
                    let payload = InboundPayload {
                        destination: self.dest.clone(),
                        bytes,
                    };
                    if self.ctx.payload_tx.send(payload).is_err() {
                        log::warn!(
                            "Payload consumer dropped; discarding data from {}",
                            self.dest
                        );
                    }
                }
                Ok(None) => {} // Idle window elapsed; the next pass re-checks the heartbeat
                Err(err) => return err,
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        self.state = next;
        self.ctx.registry.set_state(&self.dest, next);
    }
}
