//! # Link Registry
//!
//! Shared per-destination status map, written by sessions on every state
//! transition and read by the status monitor. Pure observability; it
//! drives no transitions.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Local};

use crate::config::Destination;
use crate::core::session::SessionState;

#[derive(Debug, Clone, Default)]
pub struct LinkStatus {
    pub state: SessionState,
    pub connected_since: Option<DateTime<Local>>,
    /// Number of cycles that ended in failure (connect or serve).
    pub reconnects: u64,
    pub last_failure: Option<String>,
}

pub struct LinkRegistry {
    links: Mutex<HashMap<Destination, LinkStatus>>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self {
            links: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_state(&self, dest: &Destination, state: SessionState) {
        let mut links = self.links.lock().expect("Registry lock poisoned");
        let entry = links.entry(dest.clone()).or_default();
        entry.state = state;
        match state {
            SessionState::Serving => entry.connected_since = Some(Local::now()),
            SessionState::Disconnected | SessionState::Failing => entry.connected_since = None,
            SessionState::Connecting => {}
        }
    }

    pub fn record_failure(&self, dest: &Destination, reason: &str) {
        let mut links = self.links.lock().expect("Registry lock poisoned");
        let entry = links.entry(dest.clone()).or_default();
        entry.reconnects += 1;
        entry.last_failure = Some(reason.to_string());
    }

    pub fn status(&self, dest: &Destination) -> Option<LinkStatus> {
        self.links
            .lock()
            .expect("Registry lock poisoned")
            .get(dest)
            .cloned()
    }

    /// One line per destination for the periodic status log.
    pub fn summary(&self) -> Vec<String> {
        let links = self.links.lock().expect("Registry lock poisoned");
        let mut lines: Vec<String> = links
            .iter()
            .map(|(dest, status)| match (status.state, status.connected_since) {
                (SessionState::Serving, Some(since)) => format!(
                    "{dest}: serving since {} ({} reconnects)",
                    since.format("%H:%M:%S"),
                    status.reconnects
                ),
                _ => {
                    let failure = status
                        .last_failure
                        .as_deref()
                        .map(|reason| format!(" - {reason}"))
                        .unwrap_or_default();
                    format!(
                        "{dest}: {:?}{failure} ({} reconnects)",
                        status.state, status.reconnects
                    )
                }
            })
            .collect();
        lines.sort();
        lines
    }
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(port: u16) -> Destination {
        Destination {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    #[test]
    fn transitions_track_connected_since() {
        let registry = LinkRegistry::new();
        let d = dest(9000);

        registry.set_state(&d, SessionState::Connecting);
        assert!(registry.status(&d).unwrap().connected_since.is_none());

        registry.set_state(&d, SessionState::Serving);
        assert!(registry.status(&d).unwrap().connected_since.is_some());

        registry.set_state(&d, SessionState::Failing);
        let status = registry.status(&d).unwrap();
        assert_eq!(status.state, SessionState::Failing);
        assert!(status.connected_since.is_none());
    }

    #[test]
    fn failures_accumulate_per_destination() {
        let registry = LinkRegistry::new();
        let d = dest(9001);

        registry.record_failure(&d, "peer closed the connection");
        registry.record_failure(&d, "operation timed out after 10s");

        let status = registry.status(&d).unwrap();
        assert_eq!(status.reconnects, 2);
        assert_eq!(
            status.last_failure.as_deref(),
            Some("operation timed out after 10s")
        );

        // Independent destinations keep independent counters
        assert!(registry.status(&dest(9002)).is_none());
    }

    #[test]
    fn summary_emits_one_line_per_destination() {
        let registry = LinkRegistry::new();
        registry.set_state(&dest(9000), SessionState::Serving);
        registry.record_failure(&dest(9001), "failed to connect to 127.0.0.1:9001: refused");
        registry.set_state(&dest(9001), SessionState::Disconnected);

        let lines = registry.summary();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("serving since"));
        assert!(lines[1].contains("Disconnected"));
        assert!(lines[1].contains("refused"));
    }
}
