//! [`DevicePublisher`] – maps adapter observations onto instance lifecycle.
//!
//! Owns the per-device handle map so adapters never juggle handles: each
//! [`Observation`] becomes a register-or-update (alarm clearance becomes an
//! unregister) on the participant's [`InstanceRegistry`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;
use vitalink_types::{
    AlarmLimit, DeviceConnectivity, DeviceId, DeviceIdentity, InfusionStatus, InstanceKey,
    KeyedRecord, LocalAlarmLimitObjective, Numeric, PatientAlert, RecordValue, SampleArray,
    TechnicalAlert, VitaError, WallClock,
};
use vitalink_middleware::{InstanceHandle, InstanceRegistry};

use crate::adapter::Observation;

/// Publishing facade for one device.
///
/// Construction registers exactly one `DeviceIdentity`; dropping the
/// publisher does not withdraw anything — call
/// [`DevicePublisher::shutdown`] for a clean departure.
pub struct DevicePublisher {
    registry: Arc<InstanceRegistry>,
    device_id: DeviceId,
    identity_key: InstanceKey,
    handles: Mutex<HashMap<InstanceKey, InstanceHandle>>,
}

impl fmt::Debug for DevicePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevicePublisher")
            .field("device_id", &self.device_id)
            .field("identity_key", &self.identity_key)
            .finish_non_exhaustive()
    }
}

impl DevicePublisher {
    /// Register `identity` and return the publisher for that device.
    ///
    /// # Errors
    ///
    /// [`VitaError::DuplicateKey`] when the device's identity is already
    /// registered on this registry.
    pub fn new(
        registry: Arc<InstanceRegistry>,
        identity: &DeviceIdentity,
    ) -> Result<Self, VitaError> {
        let device_id = identity.device_id.clone();
        let identity_key = identity.key();
        let handle = registry.register(identity.clone())?;
        let mut handles = HashMap::new();
        handles.insert(identity_key.clone(), handle);
        Ok(Self {
            registry,
            device_id,
            identity_key,
            handles: Mutex::new(handles),
        })
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Publish one observation.
    ///
    /// # Errors
    ///
    /// * [`VitaError::InvalidRecord`] for records violating wire caps.
    /// * [`VitaError::UnknownInstance`] when clearing an alarm that was
    ///   never raised — a logic error in the adapter.
    pub fn apply(&self, observation: Observation) -> Result<(), VitaError> {
        match observation {
            Observation::Connectivity {
                state,
                valid_targets,
            } => {
                let record =
                    DeviceConnectivity::try_new(self.device_id.clone(), state, valid_targets)?;
                self.upsert(record.into())
            }
            Observation::Numeric {
                metric,
                vendor_metric,
                instance,
                unit,
                value,
                device_time,
            } => self.upsert(
                Numeric {
                    device_id: self.device_id.clone(),
                    metric_id: metric,
                    vendor_metric_id: vendor_metric,
                    instance_id: instance,
                    unit_id: unit,
                    value,
                    device_time,
                    presentation_time: WallClock::now(),
                }
                .into(),
            ),
            Observation::SampleBatch {
                metric,
                vendor_metric,
                instance,
                unit,
                frequency,
                values,
                device_time,
            } => {
                let record = SampleArray::try_new(
                    self.device_id.clone(),
                    metric,
                    vendor_metric,
                    instance,
                    unit,
                    frequency,
                    values,
                    device_time,
                    WallClock::now(),
                )?;
                self.upsert(record.into())
            }
            Observation::AlarmActive {
                identifier,
                text,
                technical,
            } => {
                if technical {
                    self.upsert(
                        TechnicalAlert {
                            device_id: self.device_id.clone(),
                            identifier,
                            text,
                        }
                        .into(),
                    )
                } else {
                    self.upsert(
                        PatientAlert {
                            device_id: self.device_id.clone(),
                            identifier,
                            text,
                        }
                        .into(),
                    )
                }
            }
            Observation::AlarmCleared {
                identifier,
                technical,
            } => {
                let key = if technical {
                    TechnicalAlert {
                        device_id: self.device_id.clone(),
                        identifier,
                        text: vitalink_types::AlertText::new("").expect("empty fits cap"),
                    }
                    .key()
                } else {
                    PatientAlert {
                        device_id: self.device_id.clone(),
                        identifier,
                        text: vitalink_types::AlertText::new("").expect("empty fits cap"),
                    }
                    .key()
                };
                self.retire(&key)
            }
            Observation::AlarmLimit {
                metric,
                limit_type,
                value,
                unit,
            } => self.upsert(
                AlarmLimit {
                    device_id: self.device_id.clone(),
                    metric_id: metric,
                    limit_type,
                    value,
                    unit_id: unit,
                }
                .into(),
            ),
            Observation::InfusionState {
                active,
                drug_name,
                volume_to_infuse_ml,
                infusion_duration_seconds,
                volume_infused_ml,
                milliliters_per_hour,
            } => self.upsert(
                InfusionStatus {
                    device_id: self.device_id.clone(),
                    infusion_active: active,
                    drug_name,
                    volume_to_infuse_ml,
                    infusion_duration_seconds,
                    volume_infused_ml,
                    milliliters_per_hour,
                }
                .into(),
            ),
        }
    }

    /// Publish the device's echo of an objective it is honoring — the Ack
    /// side of the triad, on the `LocalAlarmLimitObjective` lane under this
    /// device's id.
    pub fn publish_ack(&self, ack: LocalAlarmLimitObjective) -> Result<(), VitaError> {
        debug_assert_eq!(ack.device_id, self.device_id);
        self.upsert(ack.into())
    }

    /// Withdraw every instance this publisher registered, the identity last.
    pub fn shutdown(&self) {
        let mut handles = self.handles.lock().expect("device handles poisoned");
        let others: Vec<InstanceKey> = handles
            .keys()
            .filter(|key| **key != self.identity_key)
            .cloned()
            .collect();
        for key in others {
            if let Some(handle) = handles.remove(&key) {
                let _ = self.registry.unregister(&handle);
            }
        }
        if let Some(handle) = handles.remove(&self.identity_key) {
            let _ = self.registry.unregister(&handle);
        }
        debug!(device = %self.device_id, "device publisher shut down");
    }

    fn upsert(&self, value: RecordValue) -> Result<(), VitaError> {
        let key = value.key();
        let mut handles = self.handles.lock().expect("device handles poisoned");
        if let Some(handle) = handles.get(&key) {
            match self.registry.update(handle, value.clone()) {
                Ok(()) => return Ok(()),
                // Withdrawn elsewhere; register a fresh incarnation below.
                Err(VitaError::UnknownInstance { .. }) => {}
                Err(other) => return Err(other),
            }
        }
        let handle = self.registry.register(value)?;
        handles.insert(key, handle);
        Ok(())
    }

    fn retire(&self, key: &InstanceKey) -> Result<(), VitaError> {
        let mut handles = self.handles.lock().expect("device handles poisoned");
        let handle = handles
            .remove(key)
            .ok_or_else(|| VitaError::UnknownInstance { key: key.clone() })?;
        self.registry.unregister(&handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalink_types::{nomenclature, AlertId, AlertText, LimitType, Topic, VendorMetricId};
    use vitalink_middleware::SampleBus;

    fn publisher() -> (SampleBus, DevicePublisher) {
        let bus = SampleBus::default();
        let device_id = DeviceId::new("pox-1").unwrap();
        let registry = Arc::new(InstanceRegistry::new(device_id.clone(), bus.clone()));
        let identity = DeviceIdentity {
            device_id,
            manufacturer: vitalink_types::DisplayName::new("Nellcor").unwrap(),
            model: vitalink_types::DisplayName::new("N-595").unwrap(),
            serial_number: vitalink_types::DisplayName::new("SN0042").unwrap(),
            icon_name: vitalink_types::DisplayName::new("n595.png").unwrap(),
        };
        let publisher = DevicePublisher::new(registry, &identity).unwrap();
        (bus, publisher)
    }

    fn spo2_observation(value: f32) -> Observation {
        Observation::Numeric {
            metric: nomenclature::spo2(),
            vendor_metric: VendorMetricId::new("").unwrap(),
            instance: 0,
            unit: nomenclature::percent(),
            value,
            device_time: WallClock::now(),
        }
    }

    #[tokio::test]
    async fn identity_is_registered_on_construction() {
        let bus = SampleBus::default();
        let mut rx = bus.subscribe(Topic::DeviceIdentity);
        let device_id = DeviceId::new("pox-1").unwrap();
        let registry = Arc::new(InstanceRegistry::new(device_id.clone(), bus.clone()));
        let identity = DeviceIdentity {
            device_id,
            manufacturer: vitalink_types::DisplayName::new("Nellcor").unwrap(),
            model: vitalink_types::DisplayName::new("N-595").unwrap(),
            serial_number: vitalink_types::DisplayName::new("SN0042").unwrap(),
            icon_name: vitalink_types::DisplayName::new("n595.png").unwrap(),
        };
        let _publisher = DevicePublisher::new(registry, &identity).unwrap();

        let sample = rx.recv().await.unwrap();
        assert!(matches!(
            sample.event.value(),
            Some(RecordValue::DeviceIdentity(_))
        ));
    }

    #[test]
    fn repeated_numeric_observations_update_one_instance() {
        let (_bus, publisher) = publisher();
        publisher.apply(spo2_observation(97.0)).unwrap();
        publisher.apply(spo2_observation(96.0)).unwrap();

        let handles = publisher.handles.lock().unwrap();
        // Identity + one numeric instance.
        assert_eq!(handles.len(), 2);
    }

    #[test]
    fn alarm_lifecycle_registers_and_retires() {
        let (_bus, publisher) = publisher();
        let raise = Observation::AlarmActive {
            identifier: AlertId::new("SPO2_LIMIT_VIOLATED").unwrap(),
            text: AlertText::new("SpO2 84% below low limit 90%").unwrap(),
            technical: false,
        };
        publisher.apply(raise).unwrap();

        let clear = Observation::AlarmCleared {
            identifier: AlertId::new("SPO2_LIMIT_VIOLATED").unwrap(),
            technical: false,
        };
        publisher.apply(clear.clone()).unwrap();

        // Clearing an alarm that is not active is a caller logic error.
        let err = publisher.apply(clear).unwrap_err();
        assert!(matches!(err, VitaError::UnknownInstance { .. }));
    }

    #[tokio::test]
    async fn shutdown_withdraws_everything() {
        let (bus, publisher) = publisher();
        let mut identity_rx = bus.subscribe(Topic::DeviceIdentity);
        publisher.apply(spo2_observation(97.0)).unwrap();
        publisher
            .apply(Observation::AlarmLimit {
                metric: nomenclature::spo2(),
                limit_type: LimitType::Low,
                value: 90.0,
                unit: nomenclature::percent(),
            })
            .unwrap();

        publisher.shutdown();
        assert!(publisher.handles.lock().unwrap().is_empty());

        // The identity withdrawal reaches subscribers.
        let mut saw_unregister = false;
        while let Ok(sample) =
            tokio::time::timeout(std::time::Duration::from_millis(100), identity_rx.recv()).await
        {
            if matches!(sample.unwrap().event, vitalink_types::SampleEvent::Unregistered) {
                saw_unregister = true;
                break;
            }
        }
        assert!(saw_unregister);
    }
}
