//! # Data Validator
//!
//! Structural acceptance rule for inbound payloads: a fixed header marker
//! and a minimum body length after it. Real deployments substitute a
//! protocol-specific rule; the accept/reject contract over an opaque byte
//! sequence stays stable.

use crate::error::LinkError;

#[derive(Debug, Clone)]
pub struct DataValidator {
    header: Vec<u8>,
    min_body_length: usize,
}

impl DataValidator {
    pub fn new(header: impl Into<Vec<u8>>, min_body_length: usize) -> Self {
        Self {
            header: header.into(),
            min_body_length,
        }
    }

    /// True iff the payload starts with the header marker and is at least
    /// header + minimum body length long.
    pub fn validate(&self, payload: &[u8]) -> bool {
        payload.starts_with(&self.header)
            && payload.len() >= self.header.len() + self.min_body_length
    }

    /// Validation with a distinguishable failure for the session loop, so
    /// a rejected payload is never silently dropped.
    pub fn check(&self, payload: &[u8]) -> Result<(), LinkError> {
        if self.validate(payload) {
            return Ok(());
        }
        let reason = if payload.starts_with(&self.header) {
            format!(
                "payload too short ({} bytes, need {})",
                payload.len(),
                self.header.len() + self.min_body_length
            )
        } else {
            "missing header marker".to_string()
        };
        log::warn!("Payload validation failed: {reason}");
        Err(LinkError::Validation(reason))
    }
}
