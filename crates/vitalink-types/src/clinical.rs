//! Alarm, infusion, and demographic records.
//!
//! Alarm limits follow the objective/state triad: a supervisory application
//! issues a [`GlobalAlarmLimitObjective`] (or a device-scoped
//! [`LocalAlarmLimitObjective`]), the target device echoes a
//! [`LocalAlarmLimitObjective`] as its acknowledgment, and the device's own
//! [`AlarmLimit`] reflects the applied state.  Infusion control follows the
//! same triad with [`InfusionObjective`] / [`InfusionProgram`] on the request
//! side and [`InfusionStatus`] as the holistically-reported state.
//!
//! Every objective-style record carries a `requestor` field identifying
//! provenance.  The field is advisory and is never used for access control.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ident::{
    AlertId, AlertText, DeviceId, DisplayName, IsoDate, MedicalRecordNumber, MetricId, UnitId,
};
use crate::topic::{InstanceKey, KeyField, KeyedRecord, Topic};

/// Which side of a metric's range a threshold guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum LimitType {
    Low,
    High,
}

impl LimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::Low => "low",
            LimitType::High => "high",
        }
    }
}

/// Alarm threshold currently applied on a device.
///
/// Key: `device_id` + `metric_id` + `limit_type`.  Written only by the
/// owning device, whether the value was device-initiated or
/// objective-driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AlarmLimit {
    pub device_id: DeviceId,
    pub metric_id: MetricId,
    pub limit_type: LimitType,
    pub value: f32,
    pub unit_id: UnitId,
}

impl KeyedRecord for AlarmLimit {
    const TOPIC: Topic = Topic::AlarmLimit;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(
            Self::TOPIC,
            vec![
                KeyField::text(&self.device_id),
                KeyField::text(&self.metric_id),
                KeyField::text(self.limit_type.as_str()),
            ],
        )
    }
}

/// Fleet-wide request to change an alarm threshold on every device carrying
/// the metric.
///
/// Key: `metric_id` + `limit_type` — deliberately no device id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GlobalAlarmLimitObjective {
    pub metric_id: MetricId,
    pub limit_type: LimitType,
    pub value: f32,
    pub unit_id: UnitId,
    /// Provenance of the request; advisory only.
    pub requestor: DeviceId,
}

impl KeyedRecord for GlobalAlarmLimitObjective {
    const TOPIC: Topic = Topic::GlobalAlarmLimitObjective;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(
            Self::TOPIC,
            vec![
                KeyField::text(&self.metric_id),
                KeyField::text(self.limit_type.as_str()),
            ],
        )
    }
}

/// Device-scoped alarm-threshold request.
///
/// Doubles as the device's acknowledgment: when a device honors a global or
/// local objective it republishes this record under its own device id with
/// the value it is applying.
///
/// Key: `device_id` + `metric_id` + `limit_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocalAlarmLimitObjective {
    pub device_id: DeviceId,
    pub metric_id: MetricId,
    pub limit_type: LimitType,
    pub value: f32,
    pub unit_id: UnitId,
    /// Provenance of the request; advisory only.
    pub requestor: DeviceId,
}

impl KeyedRecord for LocalAlarmLimitObjective {
    const TOPIC: Topic = Topic::LocalAlarmLimitObjective;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(
            Self::TOPIC,
            vec![
                KeyField::text(&self.device_id),
                KeyField::text(&self.metric_id),
                KeyField::text(self.limit_type.as_str()),
            ],
        )
    }
}

/// Active physiological alarm condition.
///
/// Registered at alarm onset, text updatable while registered, unregistered
/// at clearance.  Key: `device_id` + `identifier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatientAlert {
    pub device_id: DeviceId,
    pub identifier: AlertId,
    pub text: AlertText,
}

impl KeyedRecord for PatientAlert {
    const TOPIC: Topic = Topic::PatientAlert;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(
            Self::TOPIC,
            vec![
                KeyField::text(&self.device_id),
                KeyField::text(&self.identifier),
            ],
        )
    }
}

/// Active equipment alarm condition (sensor off, low battery, ...).
///
/// Same lifecycle and key shape as [`PatientAlert`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TechnicalAlert {
    pub device_id: DeviceId,
    pub identifier: AlertId,
    pub text: AlertText,
}

impl KeyedRecord for TechnicalAlert {
    const TOPIC: Topic = Topic::TechnicalAlert;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(
            Self::TOPIC,
            vec![
                KeyField::text(&self.device_id),
                KeyField::text(&self.identifier),
            ],
        )
    }
}

/// Request to stop (or resume) an infusion.
///
/// Key: `device_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InfusionObjective {
    pub device_id: DeviceId,
    pub stop_infusion: bool,
    /// Provenance of the request; advisory only.
    pub requestor: DeviceId,
}

impl KeyedRecord for InfusionObjective {
    const TOPIC: Topic = Topic::InfusionObjective;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(Self::TOPIC, vec![KeyField::text(&self.device_id)])
    }
}

/// Request to program one infusion head.
///
/// Key: `device_id` + `head`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InfusionProgram {
    pub device_id: DeviceId,
    /// Pump head index for multi-channel pumps.
    pub head: u8,
    pub drug_name: DisplayName,
    pub volume_to_infuse_ml: f32,
    pub infusion_duration_seconds: u32,
    /// Provenance of the request; advisory only.
    pub requestor: DeviceId,
}

impl KeyedRecord for InfusionProgram {
    const TOPIC: Topic = Topic::InfusionProgram;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(
            Self::TOPIC,
            vec![
                KeyField::text(&self.device_id),
                KeyField::number(self.head),
            ],
        )
    }
}

/// Holistic pump-reported infusion state, republished wholesale on every
/// change.
///
/// Key: `device_id`.  Mutable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InfusionStatus {
    pub device_id: DeviceId,
    pub infusion_active: bool,
    pub drug_name: DisplayName,
    pub volume_to_infuse_ml: f32,
    pub infusion_duration_seconds: u32,
    pub volume_infused_ml: f32,
    pub milliliters_per_hour: f32,
}

impl KeyedRecord for InfusionStatus {
    const TOPIC: Topic = Topic::InfusionStatus;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(Self::TOPIC, vec![KeyField::text(&self.device_id)])
    }
}

/// Patient demographic record, owned by the supervisory/coordinator side.
///
/// Key: `medical_record_number`.  Mutable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Patient {
    pub medical_record_number: MedicalRecordNumber,
    pub given_name: DisplayName,
    pub family_name: DisplayName,
    pub date_of_birth: IsoDate,
}

impl KeyedRecord for Patient {
    const TOPIC: Topic = Topic::Patient;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(
            Self::TOPIC,
            vec![KeyField::text(&self.medical_record_number)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nomenclature;

    fn device(id: &str) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    #[test]
    fn alarm_limit_keys_separate_low_and_high() {
        let mk = |limit_type| AlarmLimit {
            device_id: device("pox-1"),
            metric_id: nomenclature::spo2(),
            limit_type,
            value: 85.0,
            unit_id: nomenclature::percent(),
        };
        assert_ne!(mk(LimitType::Low).key(), mk(LimitType::High).key());
    }

    #[test]
    fn local_objective_and_applied_limit_share_key_fields() {
        let objective = LocalAlarmLimitObjective {
            device_id: device("pox-1"),
            metric_id: nomenclature::spo2(),
            limit_type: LimitType::Low,
            value: 85.0,
            unit_id: nomenclature::percent(),
            requestor: device("supervisor"),
        };
        let state = AlarmLimit {
            device_id: device("pox-1"),
            metric_id: nomenclature::spo2(),
            limit_type: LimitType::Low,
            value: 85.0,
            unit_id: nomenclature::percent(),
        };
        // Same tuple, different topics: correlation matches on fields.
        assert_eq!(objective.key().fields(), state.key().fields());
        assert_ne!(objective.key(), state.key());
    }

    #[test]
    fn global_objective_key_has_no_device() {
        let objective = GlobalAlarmLimitObjective {
            metric_id: nomenclature::spo2(),
            limit_type: LimitType::Low,
            value: 85.0,
            unit_id: nomenclature::percent(),
            requestor: device("supervisor"),
        };
        assert_eq!(objective.key().fields().len(), 2);
    }

    #[test]
    fn patient_and_technical_alerts_are_distinct_instances() {
        let patient = PatientAlert {
            device_id: device("pox-1"),
            identifier: AlertId::new("SPO2_LOW").unwrap(),
            text: AlertText::new("SpO2 below limit").unwrap(),
        };
        let technical = TechnicalAlert {
            device_id: device("pox-1"),
            identifier: AlertId::new("SPO2_LOW").unwrap(),
            text: AlertText::new("SpO2 below limit").unwrap(),
        };
        assert_ne!(patient.key(), technical.key());
    }

    #[test]
    fn infusion_program_keys_by_head() {
        let mk = |head| InfusionProgram {
            device_id: device("pump-1"),
            head,
            drug_name: DisplayName::new("saline").unwrap(),
            volume_to_infuse_ml: 500.0,
            infusion_duration_seconds: 3600,
            requestor: device("supervisor"),
        };
        assert_ne!(mk(0).key(), mk(1).key());
    }

    #[test]
    fn infusion_status_serde_roundtrip() {
        let status = InfusionStatus {
            device_id: device("pump-1"),
            infusion_active: true,
            drug_name: DisplayName::new("saline").unwrap(),
            volume_to_infuse_ml: 500.0,
            infusion_duration_seconds: 3600,
            volume_infused_ml: 125.0,
            milliliters_per_hour: 500.0,
        };
        let json = serde_json::to_string(&status).unwrap();
        let back: InfusionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, back);
    }

    #[test]
    fn patient_record_serde_roundtrip() {
        let patient = Patient {
            medical_record_number: MedicalRecordNumber::new("MRN-001234").unwrap(),
            given_name: DisplayName::new("Alex").unwrap(),
            family_name: DisplayName::new("Rivera").unwrap(),
            date_of_birth: IsoDate::new("1984-03-12").unwrap(),
        };
        let json = serde_json::to_string(&patient).unwrap();
        let back: Patient = serde_json::from_str(&json).unwrap();
        assert_eq!(patient, back);
    }
}
