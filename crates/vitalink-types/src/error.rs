//! Error taxonomy shared by every VitaLink crate.
//!
//! Structural errors ([`VitaError::DuplicateKey`], [`VitaError::UnknownInstance`])
//! indicate caller misuse and are always recoverable by re-querying current
//! instance state; they must never crash the process.  Protocol-level
//! non-convergence ([`VitaError::ConvergenceTimeout`]) is surfaced to the
//! application layer, which owns retry and escalation policy.
//! [`VitaError::StaleClock`] is advisory and never blocks data flow.

use std::time::Duration;

use thiserror::Error;

use crate::topic::InstanceKey;

/// Global error type spanning lifecycle misuse, wire validation, and
/// protocol-level non-convergence.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum VitaError {
    /// `register` was called for a key tuple that already has a live instance.
    #[error("duplicate key: a live instance already exists for {key:?}")]
    DuplicateKey { key: InstanceKey },

    /// `update`/`unregister` through a handle whose instance is gone or was
    /// superseded by a fresh registration of the same key.
    #[error("unknown instance: no live instance for {key:?}")]
    UnknownInstance { key: InstanceKey },

    /// No applied-state sample matched the objective within the caller's
    /// window.  The caller decides retry vs. alarm escalation.
    #[error("objective did not converge within {waited:?}")]
    ConvergenceTimeout { waited: Duration },

    /// A peer's estimated clock offset exceeds the caller-supplied threshold.
    /// Advisory only.
    #[error("stale clock: peer {peer} offset {offset_nanos} ns")]
    StaleClock { peer: String, offset_nanos: i64 },

    /// A bounded identifier exceeded its wire-contract length cap.
    #[error("{what} exceeds {max} bytes (got {actual})")]
    IdentifierTooLong {
        what: &'static str,
        max: usize,
        actual: usize,
    },

    /// A record violated a structural invariant (nanosecond range, sequence
    /// cap, key mismatch on update, ...).
    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },
}

impl VitaError {
    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            VitaError::DuplicateKey { .. } => "duplicate_key",
            VitaError::UnknownInstance { .. } => "unknown_instance",
            VitaError::ConvergenceTimeout { .. } => "convergence_timeout",
            VitaError::StaleClock { .. } => "stale_clock",
            VitaError::IdentifierTooLong { .. } => "identifier_too_long",
            VitaError::InvalidRecord { .. } => "invalid_record",
        }
    }
}
