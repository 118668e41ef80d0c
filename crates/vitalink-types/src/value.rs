//! Uniform record union carried by bus samples.
//!
//! [`RecordValue`] wraps exactly one wire record per topic so that transport
//! and lifecycle code can handle every topic through a single type while the
//! typed records stay the public API for producers and consumers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clinical::{
    AlarmLimit, GlobalAlarmLimitObjective, InfusionObjective, InfusionProgram, InfusionStatus,
    LocalAlarmLimitObjective, Patient, PatientAlert, TechnicalAlert,
};
use crate::liveliness::{DeviceConnectivity, DeviceIdentity, HeartBeat, TimeSync};
use crate::physio::{Numeric, SampleArray};
use crate::topic::{InstanceKey, KeyedRecord, Topic};

macro_rules! record_value {
    ($($variant:ident),+ $(,)?) => {
        /// One wire record, tagged by topic.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
        pub enum RecordValue {
            $($variant($variant)),+
        }

        impl RecordValue {
            /// Topic this record belongs to.
            pub fn topic(&self) -> Topic {
                match self {
                    $(RecordValue::$variant(_) => Topic::$variant),+
                }
            }

            /// Key tuple of the wrapped record.
            pub fn key(&self) -> InstanceKey {
                match self {
                    $(RecordValue::$variant(record) => record.key()),+
                }
            }
        }

        $(
            impl From<$variant> for RecordValue {
                fn from(record: $variant) -> Self {
                    RecordValue::$variant(record)
                }
            }
        )+
    };
}

record_value!(
    HeartBeat,
    TimeSync,
    DeviceIdentity,
    DeviceConnectivity,
    Numeric,
    SampleArray,
    AlarmLimit,
    GlobalAlarmLimitObjective,
    LocalAlarmLimitObjective,
    PatientAlert,
    TechnicalAlert,
    InfusionObjective,
    InfusionProgram,
    InfusionStatus,
    Patient,
);

impl Topic {
    /// JSON schema of this topic's record shape — the machine-readable form
    /// of the wire contract, suitable for cross-language code generation.
    pub fn json_schema(&self) -> schemars::schema::RootSchema {
        match self {
            Topic::HeartBeat => schemars::schema_for!(HeartBeat),
            Topic::TimeSync => schemars::schema_for!(TimeSync),
            Topic::DeviceIdentity => schemars::schema_for!(DeviceIdentity),
            Topic::DeviceConnectivity => schemars::schema_for!(DeviceConnectivity),
            Topic::Numeric => schemars::schema_for!(Numeric),
            Topic::SampleArray => schemars::schema_for!(SampleArray),
            Topic::AlarmLimit => schemars::schema_for!(AlarmLimit),
            Topic::GlobalAlarmLimitObjective => schemars::schema_for!(GlobalAlarmLimitObjective),
            Topic::LocalAlarmLimitObjective => schemars::schema_for!(LocalAlarmLimitObjective),
            Topic::PatientAlert => schemars::schema_for!(PatientAlert),
            Topic::TechnicalAlert => schemars::schema_for!(TechnicalAlert),
            Topic::InfusionObjective => schemars::schema_for!(InfusionObjective),
            Topic::InfusionProgram => schemars::schema_for!(InfusionProgram),
            Topic::InfusionStatus => schemars::schema_for!(InfusionStatus),
            Topic::Patient => schemars::schema_for!(Patient),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::DeviceId;
    use crate::liveliness::ParticipantKind;

    #[test]
    fn topic_tag_follows_variant() {
        let value: RecordValue = HeartBeat {
            device_id: DeviceId::new("pox-1").unwrap(),
            kind: ParticipantKind::Device,
        }
        .into();
        assert_eq!(value.topic(), Topic::HeartBeat);
        assert_eq!(value.key().topic(), Topic::HeartBeat);
    }

    #[test]
    fn every_topic_exports_a_schema() {
        for topic in Topic::ALL {
            let schema = topic.json_schema();
            let rendered = serde_json::to_string(&schema).unwrap();
            assert!(!rendered.is_empty(), "{topic} produced an empty schema");
        }
    }

    #[test]
    fn record_value_serde_roundtrip() {
        let value: RecordValue = HeartBeat {
            device_id: DeviceId::new("pox-1").unwrap(),
            kind: ParticipantKind::Supervisor,
        }
        .into();
        let json = serde_json::to_string(&value).unwrap();
        let back: RecordValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);
    }
}
