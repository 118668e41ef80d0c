//! `vitalink-middleware` – The Sample Plane
//!
//! Routes keyed samples between device adapters, protocol engines, and
//! supervisory applications without caring about the records' clinical
//! meaning.
//!
//! # Modules
//!
//! - [`bus`] – [`SampleBus`]: typed, per-topic publish/subscribe built on
//!   Tokio broadcast channels.  Fire-and-forget publishing, per-lane
//!   isolation, lag surfaced to slow subscribers.
//! - [`registry`] – [`InstanceRegistry`]: the keyed-instance lifecycle
//!   manager.  Register / update / unregister are the only mutators; every
//!   successful mutation publishes exactly one sample, causally ordered per
//!   key.
//! - [`view`] – [`InstanceView`]: consumer-side mirror folding a sample
//!   stream into a key → value map.

pub mod bus;
pub mod registry;
pub mod view;

pub use bus::{SampleBus, TopicReceiver};
pub use registry::{InstanceHandle, InstanceRegistry};
pub use view::InstanceView;
