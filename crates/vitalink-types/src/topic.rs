//! Topic catalog and keyed-instance identity.
//!
//! Every message type on the bus is a named, versioned record with a declared
//! key: the combination of key fields uniquely identifies a logical instance
//! within the topic, and non-key fields are replaced wholesale on each
//! publish.  [`TopicMeta::mutable`] marks records whose non-key fields may be
//! extended in future versions without breaking old readers; all other topics
//! are frozen shape.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Enumeration of every topic in the catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum Topic {
    /// Periodic liveness pulse from every participant.
    HeartBeat,
    /// Round-trip timestamp pair for clock-offset estimation.
    TimeSync,
    /// Static identity of a device (manufacturer, model, serial, icon).
    DeviceIdentity,
    /// State of a device's secondary physical link.
    DeviceConnectivity,
    /// Scalar sensor reading at up to 3 Hz.
    Numeric,
    /// Batched high-rate samples (>3 Hz), timestamped at batch end.
    SampleArray,
    /// Currently applied alarm threshold on a device.
    AlarmLimit,
    /// Fleet-wide request to change an alarm threshold.
    GlobalAlarmLimitObjective,
    /// Per-device alarm-threshold request, doubling as the device's echo/ack.
    LocalAlarmLimitObjective,
    /// Active physiological alarm condition.
    PatientAlert,
    /// Active equipment alarm condition.
    TechnicalAlert,
    /// Request to stop or resume an infusion.
    InfusionObjective,
    /// Request to program an infusion head.
    InfusionProgram,
    /// Holistic pump-reported infusion state.
    InfusionStatus,
    /// Patient demographic record.
    Patient,
}

impl Topic {
    /// Every topic, in catalog order.
    pub const ALL: [Topic; 15] = [
        Topic::HeartBeat,
        Topic::TimeSync,
        Topic::DeviceIdentity,
        Topic::DeviceConnectivity,
        Topic::Numeric,
        Topic::SampleArray,
        Topic::AlarmLimit,
        Topic::GlobalAlarmLimitObjective,
        Topic::LocalAlarmLimitObjective,
        Topic::PatientAlert,
        Topic::TechnicalAlert,
        Topic::InfusionObjective,
        Topic::InfusionProgram,
        Topic::InfusionStatus,
        Topic::Patient,
    ];

    /// Wire name of the topic.
    pub fn name(&self) -> &'static str {
        self.meta().name
    }

    /// Catalog entry: wire name, designated key fields, mutability contract.
    pub fn meta(&self) -> TopicMeta {
        match self {
            Topic::HeartBeat => TopicMeta {
                topic: *self,
                name: "HeartBeat",
                key_fields: &["device_id"],
                mutable: false,
            },
            Topic::TimeSync => TopicMeta {
                topic: *self,
                name: "TimeSync",
                key_fields: &["heartbeat_source", "heartbeat_recipient"],
                mutable: false,
            },
            Topic::DeviceIdentity => TopicMeta {
                topic: *self,
                name: "DeviceIdentity",
                key_fields: &["device_id"],
                mutable: true,
            },
            Topic::DeviceConnectivity => TopicMeta {
                topic: *self,
                name: "DeviceConnectivity",
                key_fields: &["device_id"],
                mutable: false,
            },
            Topic::Numeric => TopicMeta {
                topic: *self,
                name: "Numeric",
                key_fields: &[
                    "device_id",
                    "metric_id",
                    "vendor_metric_id",
                    "instance_id",
                    "unit_id",
                ],
                mutable: false,
            },
            Topic::SampleArray => TopicMeta {
                topic: *self,
                name: "SampleArray",
                key_fields: &[
                    "device_id",
                    "metric_id",
                    "vendor_metric_id",
                    "instance_id",
                    "unit_id",
                    "frequency",
                ],
                mutable: false,
            },
            Topic::AlarmLimit => TopicMeta {
                topic: *self,
                name: "AlarmLimit",
                key_fields: &["device_id", "metric_id", "limit_type"],
                mutable: false,
            },
            Topic::GlobalAlarmLimitObjective => TopicMeta {
                topic: *self,
                name: "GlobalAlarmLimitObjective",
                key_fields: &["metric_id", "limit_type"],
                mutable: false,
            },
            Topic::LocalAlarmLimitObjective => TopicMeta {
                topic: *self,
                name: "LocalAlarmLimitObjective",
                key_fields: &["device_id", "metric_id", "limit_type"],
                mutable: false,
            },
            Topic::PatientAlert => TopicMeta {
                topic: *self,
                name: "PatientAlert",
                key_fields: &["device_id", "identifier"],
                mutable: false,
            },
            Topic::TechnicalAlert => TopicMeta {
                topic: *self,
                name: "TechnicalAlert",
                key_fields: &["device_id", "identifier"],
                mutable: false,
            },
            Topic::InfusionObjective => TopicMeta {
                topic: *self,
                name: "InfusionObjective",
                key_fields: &["device_id"],
                mutable: false,
            },
            Topic::InfusionProgram => TopicMeta {
                topic: *self,
                name: "InfusionProgram",
                key_fields: &["device_id", "head"],
                mutable: false,
            },
            Topic::InfusionStatus => TopicMeta {
                topic: *self,
                name: "InfusionStatus",
                key_fields: &["device_id"],
                mutable: true,
            },
            Topic::Patient => TopicMeta {
                topic: *self,
                name: "Patient",
                key_fields: &["medical_record_number"],
                mutable: true,
            },
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Catalog entry describing one topic's wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicMeta {
    pub topic: Topic,
    /// Wire name used for keyed delivery.
    pub name: &'static str,
    /// Field names forming the instance key, in declaration order.
    pub key_fields: &'static [&'static str],
    /// Whether non-key fields may be extended in future versions without
    /// breaking old readers.
    pub mutable: bool,
}

/// One field of a key tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyField {
    Text(String),
    Number(i64),
}

impl KeyField {
    pub fn text(value: impl AsRef<str>) -> Self {
        KeyField::Text(value.as_ref().to_string())
    }

    pub fn number(value: impl Into<i64>) -> Self {
        KeyField::Number(value.into())
    }
}

/// Identity of a logical instance: the topic plus its key tuple.
///
/// Two samples with equal keys are the *same* instance; last write wins for
/// non-key fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    topic: Topic,
    fields: Vec<KeyField>,
}

impl InstanceKey {
    pub fn new(topic: Topic, fields: Vec<KeyField>) -> Self {
        Self { topic, fields }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }
}

/// Implemented by every wire record: names its topic and extracts its key
/// tuple.  Key extraction is the only sanctioned way to build an
/// [`InstanceKey`] for a record.
pub trait KeyedRecord {
    const TOPIC: Topic;

    fn key(&self) -> InstanceKey;
}
