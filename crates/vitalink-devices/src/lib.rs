//! `vitalink-devices` – The Adapter Layer
//!
//! Everything a device driver needs to join the bus without knowing the bus:
//! the capability-set contract, the publishing facade that owns instance
//! handles, and the runner that supervises one connection.
//!
//! # Modules
//!
//! - [`adapter`] – [`DeviceAdapter`]: the fixed capability-set trait
//!   (identity, observation stream, objective application) implemented once
//!   per device family and selected by configuration.
//! - [`publisher`] – [`DevicePublisher`]: maps [`Observation`]s onto
//!   register / update / unregister calls and owns the handle map.
//! - [`runner`] – [`DeviceRunner`] / [`DeviceTask`]: identity registration,
//!   heartbeats, observation pumping, and in-order objective dispatch.
//! - [`sim`] – [`SimPulseOximeter`] and [`SimInfusionPump`]: stub device
//!   families for headless tests and demos.

pub mod adapter;
pub mod publisher;
pub mod runner;
pub mod sim;

pub use adapter::{DeviceAdapter, Observation, ObjectiveCommand};
pub use publisher::DevicePublisher;
pub use runner::{DeviceRunner, DeviceTask};
pub use sim::{SimInfusionPump, SimOximeterControls, SimPulseOximeter};
