//! The device-adapter contract.
//!
//! VitaLink never speaks a vendor wire protocol.  An adapter translates one
//! device family's transport into typed [`Observation`]s and applies
//! [`ObjectiveCommand`]s addressed to its device; the runner wires those to
//! the bus.  One adapter implementation per device family, selected by
//! configuration rather than subclassing.
//!
//! # Contract
//!
//! * On connect the runner registers exactly one `DeviceIdentity` (from
//!   [`DeviceAdapter::identity`]) and starts periodic heartbeats.
//! * Each physical-link transition surfaces as one
//!   [`Observation::Connectivity`].
//! * The adapter decides instance identity for every reading (metric /
//!   instance / unit); the core never infers it.
//! * Alarms register at onset, may update text while active, and unregister
//!   at clearance.
//! * An objective addressed to the adapter's device id is applied within the
//!   adapter's own latency budget; the applied state comes back as
//!   observations.  The core enforces no deadline.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use vitalink_types::{
    AlertId, AlertText, ConnectionState, DeviceIdentity, DisplayName, InfusionObjective,
    InfusionProgram, LimitType, LocalAlarmLimitObjective, MetricId, UnitId, VendorMetricId,
    VitaError, WallClock,
};

/// One typed event produced by a device adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// The secondary physical link changed state.
    Connectivity {
        state: ConnectionState,
        valid_targets: Vec<DisplayName>,
    },
    /// A scalar reading (≤3 Hz).
    Numeric {
        metric: MetricId,
        vendor_metric: VendorMetricId,
        instance: u32,
        unit: UnitId,
        value: f32,
        device_time: WallClock,
    },
    /// A batch of high-rate samples (>3 Hz), timestamped at batch end.
    SampleBatch {
        metric: MetricId,
        vendor_metric: VendorMetricId,
        instance: u32,
        unit: UnitId,
        frequency: u32,
        values: Vec<f32>,
        device_time: WallClock,
    },
    /// An alarm condition is (still) active; registers on first sight,
    /// updates text afterwards.
    AlarmActive {
        identifier: AlertId,
        text: AlertText,
        /// `true` routes to the TechnicalAlert topic, `false` to
        /// PatientAlert.
        technical: bool,
    },
    /// The alarm condition cleared.
    AlarmCleared { identifier: AlertId, technical: bool },
    /// An alarm threshold is applied on the device (device-initiated or
    /// objective-driven) — the State side of the alarm-limit triad.
    AlarmLimit {
        metric: MetricId,
        limit_type: LimitType,
        value: f32,
        unit: UnitId,
    },
    /// Holistic pump state — the State side of the infusion triad.
    InfusionState {
        active: bool,
        drug_name: DisplayName,
        volume_to_infuse_ml: f32,
        infusion_duration_seconds: u32,
        volume_infused_ml: f32,
        milliliters_per_hour: f32,
    },
}

/// An objective addressed to one device, as handed to its adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectiveCommand {
    AlarmLimit(LocalAlarmLimitObjective),
    Infusion(InfusionObjective),
    Program(InfusionProgram),
}

/// Every device-family adapter implements this capability set.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Static identity published once on connect.
    fn identity(&self) -> DeviceIdentity;

    /// Live stream of observations.  The stream owns its state (it must not
    /// borrow the adapter) so that objectives can be applied while it is
    /// pending.
    fn observations(&mut self) -> BoxStream<'static, Observation>;

    /// Apply an objective and return the observations reflecting the applied
    /// state.  Conflicting objectives are applied in arrival order —
    /// last-writer-wins, no arbitration.
    ///
    /// # Errors
    ///
    /// Adapters reject objectives their device family cannot express with
    /// [`VitaError::InvalidRecord`].
    async fn apply_objective(
        &mut self,
        command: ObjectiveCommand,
    ) -> Result<Vec<Observation>, VitaError>;
}
