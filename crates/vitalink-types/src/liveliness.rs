//! Participant-level records: heartbeat, time-sync, identity, connectivity.
//!
//! Liveliness of a *participant* is inferred from [`HeartBeat`] alone; topic
//! silence never proves disconnection.  [`TimeSync`] carries the round-trip
//! timestamp pair that lets the original heartbeat source estimate its clock
//! offset against the recipient.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::VitaError;
use crate::ident::{DeviceId, DisplayName};
use crate::time::WallClock;
use crate::topic::{InstanceKey, KeyField, KeyedRecord, Topic};

/// Role of a participant on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ParticipantKind {
    Device,
    Supervisor,
}

/// Periodic liveness pulse.  Reference period: 2 seconds.
///
/// Key: `device_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HeartBeat {
    pub device_id: DeviceId,
    pub kind: ParticipantKind,
}

impl KeyedRecord for HeartBeat {
    const TOPIC: Topic = Topic::HeartBeat;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(Self::TOPIC, vec![KeyField::text(&self.device_id)])
    }
}

/// Round-trip timestamp pair published by a heartbeat recipient, one sample
/// per observed heartbeat.
///
/// When this record reaches the original heartbeat source it holds both the
/// source's own send time and the recipient's receipt time, enabling
/// one-directional clock-offset/latency estimation.  Symmetric estimation
/// requires the reverse heartbeat/TimeSync pair.
///
/// Key: `heartbeat_source` + `heartbeat_recipient`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeSync {
    pub heartbeat_source: DeviceId,
    pub heartbeat_recipient: DeviceId,
    /// Publish time of the observed heartbeat, per the source's clock.
    pub source_timestamp: WallClock,
    /// Receipt time of that heartbeat, per the recipient's clock.
    pub recipient_receipt_timestamp: WallClock,
}

impl KeyedRecord for TimeSync {
    const TOPIC: Topic = Topic::TimeSync;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(
            Self::TOPIC,
            vec![
                KeyField::text(&self.heartbeat_source),
                KeyField::text(&self.heartbeat_recipient),
            ],
        )
    }
}

/// Static identity of a device, published once on connect (or on reconnect).
///
/// Key: `device_id`.  Mutable shape: non-key fields may grow in future
/// versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceIdentity {
    pub device_id: DeviceId,
    pub manufacturer: DisplayName,
    pub model: DisplayName,
    pub serial_number: DisplayName,
    /// Resource name of the icon a supervisory UI should render.
    pub icon_name: DisplayName,
}

impl KeyedRecord for DeviceIdentity {
    const TOPIC: Topic = Topic::DeviceIdentity;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(Self::TOPIC, vec![KeyField::text(&self.device_id)])
    }
}

/// State machine of a device's secondary physical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConnectionState {
    Initial,
    Connecting,
    Negotiating,
    Connected,
    Terminal,
}

/// Connectivity of a device's secondary physical link, republished on every
/// transition.
///
/// Key: `device_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceConnectivity {
    pub device_id: DeviceId,
    pub state: ConnectionState,
    /// Targets the link may legally connect to (ports, addresses).
    pub valid_targets: Vec<DisplayName>,
}

impl DeviceConnectivity {
    /// Wire cap on the target list length.
    pub const MAX_VALID_TARGETS: usize = 16;

    /// Build a record, enforcing the target-list cap.
    ///
    /// # Errors
    ///
    /// [`VitaError::InvalidRecord`] when more than
    /// [`Self::MAX_VALID_TARGETS`] targets are supplied.
    pub fn try_new(
        device_id: DeviceId,
        state: ConnectionState,
        valid_targets: Vec<DisplayName>,
    ) -> Result<Self, VitaError> {
        if valid_targets.len() > Self::MAX_VALID_TARGETS {
            return Err(VitaError::InvalidRecord {
                reason: format!(
                    "valid_targets holds {} entries, cap is {}",
                    valid_targets.len(),
                    Self::MAX_VALID_TARGETS
                ),
            });
        }
        Ok(Self {
            device_id,
            state,
            valid_targets,
        })
    }
}

impl KeyedRecord for DeviceConnectivity {
    const TOPIC: Topic = Topic::DeviceConnectivity;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(Self::TOPIC, vec![KeyField::text(&self.device_id)])
    }
}
