//! `vitalink-kernel` – Protocol Engines
//!
//! The coordination logic layered on top of the sample plane: who is alive,
//! whose clock drifts, and whether a requested change was actually applied.
//!
//! # Modules
//!
//! - [`liveliness`] – [`LivelinessMonitor`][liveliness::LivelinessMonitor]:
//!   heartbeat-deadline tracking with an explicit grace window.  Presence is
//!   inferred from heartbeats, never from data-topic silence.
//! - [`heartbeat`] – [`HeartbeatPublisher`][heartbeat::HeartbeatPublisher]:
//!   registers and periodically republishes a participant's own heartbeat.
//! - [`timesync`] – [`TimeSyncResponder`][timesync::TimeSyncResponder] and
//!   [`ClockOffsetEstimator`][timesync::ClockOffsetEstimator]: one TimeSync
//!   reply per observed heartbeat (rate-capped per source) and per-peer
//!   one-directional offset estimation.
//! - [`objective`] – the Objective/Ack/State triad: classification
//!   ([`classify`][objective::classify]), value-equality convergence
//!   ([`converges`][objective::converges]), and the controller-side
//!   [`ObjectiveController`][objective::ObjectiveController].
//! - [`wait`] – [`WaitGate`][wait::WaitGate]: the cancellable, timeout-bound
//!   wait primitive with a tri-state outcome.

pub mod heartbeat;
pub mod liveliness;
pub mod objective;
pub mod timesync;
pub mod wait;

pub use heartbeat::{HeartbeatPublisher, HeartbeatTask};
pub use liveliness::{LivelinessMonitor, Presence};
pub use objective::{classify, converges, state_topic, Capability, Exchange, ExchangeRole, ObjectiveController};
pub use timesync::{ClockOffsetEstimator, OffsetEstimate, TimeSyncResponder};
pub use wait::{wait_gate, GateHandle, WaitGate, WaitOutcome};
