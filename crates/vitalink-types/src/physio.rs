//! Physiological data records: scalar numerics and batched sample arrays.
//!
//! The adapter decides instance identity (metric / instance / unit key); the
//! core never infers it.  The split is rate-based: readings at or below 3 Hz
//! travel as [`Numeric`], faster signals are batched into [`SampleArray`]
//! and timestamped at the batch's end.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::VitaError;
use crate::ident::{DeviceId, MetricId, UnitId, VendorMetricId};
use crate::time::WallClock;
use crate::topic::{InstanceKey, KeyField, KeyedRecord, Topic};

/// A scalar sensor reading (≤3 Hz).
///
/// Key: `device_id` + `metric_id` + `vendor_metric_id` + `instance_id` +
/// `unit_id`.  `vendor_metric_id` participates in the key but is otherwise
/// opaque metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Numeric {
    pub device_id: DeviceId,
    pub metric_id: MetricId,
    pub vendor_metric_id: VendorMetricId,
    /// Discriminates multiple simultaneous instances of the same metric
    /// (e.g. two temperature probes).
    pub instance_id: u32,
    pub unit_id: UnitId,
    pub value: f32,
    /// Observation time per the device's own clock.
    pub device_time: WallClock,
    /// Time the value was presented to the bus.
    pub presentation_time: WallClock,
}

impl KeyedRecord for Numeric {
    const TOPIC: Topic = Topic::Numeric;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(
            Self::TOPIC,
            vec![
                KeyField::text(&self.device_id),
                KeyField::text(&self.metric_id),
                KeyField::text(&self.vendor_metric_id),
                KeyField::number(self.instance_id),
                KeyField::text(&self.unit_id),
            ],
        )
    }
}

/// A batch of high-rate samples (>3 Hz), timestamped at the batch's end.
///
/// Key: the [`Numeric`] key plus `frequency` (Hz).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SampleArray {
    pub device_id: DeviceId,
    pub metric_id: MetricId,
    pub vendor_metric_id: VendorMetricId,
    pub instance_id: u32,
    pub unit_id: UnitId,
    /// Sampling frequency in Hz; part of the instance key.
    pub frequency: u32,
    pub values: Vec<f32>,
    pub device_time: WallClock,
    pub presentation_time: WallClock,
}

impl SampleArray {
    /// Wire cap on the batch length.
    pub const MAX_VALUES: usize = 1024;

    /// Build a record, enforcing the batch-length cap.
    ///
    /// # Errors
    ///
    /// [`VitaError::InvalidRecord`] when `values` exceeds
    /// [`Self::MAX_VALUES`] entries.
    #[allow(clippy::too_many_arguments)]
    pub fn try_new(
        device_id: DeviceId,
        metric_id: MetricId,
        vendor_metric_id: VendorMetricId,
        instance_id: u32,
        unit_id: UnitId,
        frequency: u32,
        values: Vec<f32>,
        device_time: WallClock,
        presentation_time: WallClock,
    ) -> Result<Self, VitaError> {
        if values.len() > Self::MAX_VALUES {
            return Err(VitaError::InvalidRecord {
                reason: format!(
                    "sample batch holds {} values, cap is {}",
                    values.len(),
                    Self::MAX_VALUES
                ),
            });
        }
        Ok(Self {
            device_id,
            metric_id,
            vendor_metric_id,
            instance_id,
            unit_id,
            frequency,
            values,
            device_time,
            presentation_time,
        })
    }
}

impl KeyedRecord for SampleArray {
    const TOPIC: Topic = Topic::SampleArray;

    fn key(&self) -> InstanceKey {
        InstanceKey::new(
            Self::TOPIC,
            vec![
                KeyField::text(&self.device_id),
                KeyField::text(&self.metric_id),
                KeyField::text(&self.vendor_metric_id),
                KeyField::number(self.instance_id),
                KeyField::text(&self.unit_id),
                KeyField::number(self.frequency),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nomenclature;

    fn numeric(device: &str, instance: u32) -> Numeric {
        Numeric {
            device_id: DeviceId::new(device).unwrap(),
            metric_id: nomenclature::spo2(),
            vendor_metric_id: VendorMetricId::new("").unwrap(),
            instance_id: instance,
            unit_id: nomenclature::percent(),
            value: 97.0,
            device_time: WallClock::new(100, 0).unwrap(),
            presentation_time: WallClock::new(100, 5).unwrap(),
        }
    }

    #[test]
    fn numeric_key_has_five_fields() {
        assert_eq!(numeric("pox-1", 0).key().fields().len(), 5);
    }

    #[test]
    fn numeric_instances_differ_by_instance_id() {
        assert_ne!(numeric("pox-1", 0).key(), numeric("pox-1", 1).key());
    }

    #[test]
    fn numeric_value_change_keeps_identity() {
        let a = numeric("pox-1", 0);
        let mut b = a.clone();
        b.value = 88.0;
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn sample_array_key_includes_frequency() {
        let mk = |frequency| {
            SampleArray::try_new(
                DeviceId::new("pox-1").unwrap(),
                nomenclature::pleth(),
                VendorMetricId::new("").unwrap(),
                0,
                nomenclature::dimensionless(),
                frequency,
                vec![0.0; 32],
                WallClock::new(100, 0).unwrap(),
                WallClock::new(100, 5).unwrap(),
            )
            .unwrap()
        };
        assert_ne!(mk(75).key(), mk(150).key());
    }

    #[test]
    fn sample_array_rejects_oversized_batch() {
        let err = SampleArray::try_new(
            DeviceId::new("pox-1").unwrap(),
            nomenclature::pleth(),
            VendorMetricId::new("").unwrap(),
            0,
            nomenclature::dimensionless(),
            75,
            vec![0.0; SampleArray::MAX_VALUES + 1],
            WallClock::new(100, 0).unwrap(),
            WallClock::new(100, 5).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, VitaError::InvalidRecord { .. }));
    }

    #[test]
    fn numeric_serde_roundtrip() {
        let n = numeric("pox-1", 0);
        let json = serde_json::to_string(&n).unwrap();
        let back: Numeric = serde_json::from_str(&json).unwrap();
        assert_eq!(n, back);
    }
}
