//! # Failure Taxonomy
//!
//! Every guarded socket operation reports through this closed set of
//! failure kinds so the session state machine and the logs can react
//! differently per cause, instead of funneling everything through one
//! generic error.

use std::time::Duration;
use thiserror::Error;

/// Failure kinds produced by the connection engine.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The peer was unreachable, refused the connection, or the dial
    /// exceeded the socket timeout.
    #[error("failed to connect to {destination}: {reason}")]
    Connect {
        /// The `host:port` that was dialed.
        destination: String,
        /// Human-readable dial failure cause.
        reason: String,
    },

    /// A bounded send did not complete within the socket timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection (zero-length read or broken pipe).
    #[error("peer closed the connection")]
    PeerClosed,

    /// A received payload failed the structural validation rule.
    #[error("payload failed validation: {0}")]
    Validation(String),

    /// Transport-level I/O failure outside the cases above.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A guarded operation failed `attempts` consecutive times.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Name of the guarded operation ("connect", "receive", ...).
        operation: &'static str,
        /// How many attempts were made before giving up.
        attempts: u32,
        /// The failure of the final attempt.
        source: Box<LinkError>,
    },
}

impl LinkError {
    /// Whether the retry policy may attempt the operation again.
    ///
    /// A closed peer cannot yield data on a further read; recovery goes
    /// through a fresh connect cycle instead. Exhaustion is terminal by
    /// definition.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LinkError::PeerClosed | LinkError::RetriesExhausted { .. }
        )
    }

    /// The underlying cause when retries were exhausted, `self` otherwise.
    pub fn root(&self) -> &LinkError {
        match self {
            LinkError::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_close_and_exhaustion_are_terminal() {
        assert!(!LinkError::PeerClosed.is_retryable());
        let exhausted = LinkError::RetriesExhausted {
            operation: "receive",
            attempts: 3,
            source: Box::new(LinkError::Timeout(Duration::from_secs(1))),
        };
        assert!(!exhausted.is_retryable());

        assert!(LinkError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(LinkError::Validation("short".into()).is_retryable());
        assert!(LinkError::Connect {
            destination: "example.com:443".into(),
            reason: "refused".into(),
        }
        .is_retryable());
    }

    #[test]
    fn root_unwraps_nested_exhaustion() {
        let err = LinkError::RetriesExhausted {
            operation: "receive",
            attempts: 5,
            source: Box::new(LinkError::Validation("missing header".into())),
        };
        assert!(matches!(err.root(), LinkError::Validation(_)));
        assert!(matches!(LinkError::PeerClosed.root(), LinkError::PeerClosed));
    }
}
