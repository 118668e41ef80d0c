//! `vitalink-types` – The Data Contract
//!
//! Every entity on the VitaLink bus is a keyed record: a tuple of key fields
//! identifies a logical instance, non-key fields are replaced wholesale on
//! each publish, and instances move through an explicit
//! registered → updated* → unregistered lifecycle.  This crate defines that
//! contract and nothing else — no transport, no policy.
//!
//! # Modules
//!
//! - [`ident`] – bounded string identifiers (fail-closed length caps).
//! - [`time`] – the explicit `(sec, nanosec)` wall-clock pair.
//! - [`topic`] – topic catalog, key tuples, the [`KeyedRecord`] trait.
//! - [`liveliness`] – [`HeartBeat`], [`TimeSync`], [`DeviceIdentity`],
//!   [`DeviceConnectivity`].
//! - [`physio`] – [`Numeric`] (≤3 Hz scalars) and [`SampleArray`]
//!   (>3 Hz batches).
//! - [`clinical`] – alarm limits and their objective triad, alerts,
//!   infusion records, [`Patient`].
//! - [`value`] – [`RecordValue`], the per-topic record union, plus JSON
//!   schema export.
//! - [`sample`] – the bus envelope ([`Sample`] / [`SampleEvent`]).
//! - [`nomenclature`] – `MDC_` metric and unit codes used by the bundled
//!   adapters.
//! - [`error`] – [`VitaError`], the shared error taxonomy.

pub mod clinical;
pub mod error;
pub mod ident;
pub mod liveliness;
pub mod nomenclature;
pub mod physio;
pub mod sample;
pub mod time;
pub mod topic;
pub mod value;

pub use clinical::{
    AlarmLimit, GlobalAlarmLimitObjective, InfusionObjective, InfusionProgram, InfusionStatus,
    LimitType, LocalAlarmLimitObjective, Patient, PatientAlert, TechnicalAlert,
};
pub use error::VitaError;
pub use ident::{
    AlertId, AlertText, DeviceId, DisplayName, IsoDate, MedicalRecordNumber, MetricId, UnitId,
    VendorMetricId,
};
pub use liveliness::{
    ConnectionState, DeviceConnectivity, DeviceIdentity, HeartBeat, ParticipantKind, TimeSync,
};
pub use physio::{Numeric, SampleArray};
pub use sample::{Sample, SampleEvent};
pub use time::WallClock;
pub use topic::{InstanceKey, KeyField, KeyedRecord, Topic, TopicMeta};
pub use value::RecordValue;
