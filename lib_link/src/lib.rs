//! # lib_link
//!
//! Connection lifecycle and resilience engine for the ReLink session keeper:
//! a bounded per-destination connection pool, one shared retry/backoff
//! policy for every guarded socket operation, heartbeat scheduling,
//! structural payload validation, and supervised per-destination
//! reconnection.

// Declare the modules to re-export
pub mod config;
pub mod core;
pub mod error;
pub mod logger;

// Re-export the types most callers need
pub use crate::config::{load_config, Config, Destination, Settings};
pub use crate::core::heartbeat::HeartbeatClock;
pub use crate::core::pool::{ConnectionPool, PooledHandle};
pub use crate::core::registry::{LinkRegistry, LinkStatus};
pub use crate::core::retry::RetryPolicy;
pub use crate::core::session::{
    ConnectionSession, CycleOutcome, InboundPayload, SessionContext, SessionState,
};
pub use crate::core::supervisor::{run_status_monitor, SessionSupervisor};
pub use crate::core::validator::DataValidator;
pub use crate::error::LinkError;
