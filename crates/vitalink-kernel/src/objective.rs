//! Objective / State / Acknowledgment correlation.
//!
//! Every "ask a device to change something" interaction runs over three
//! logical channels: an **Objective** written by a controller, an **Ack**
//! written by the target device (an echo of the objective it is honoring,
//! reusing the objective's shape scoped per device), and a **State** written
//! by the device reflecting the currently-applied value.
//!
//! The protocol defines no correlation id: an objective is matched to state
//! purely by key-tuple equality and field equality.  Under rapid conflicting
//! writes this is ambiguous — the device's resulting state reflects
//! whichever objective it processed last, and this module deliberately does
//! not invent an id to paper over that.  A controller therefore treats a
//! command as *pending* until it observes a State sample whose fields equal
//! the requested ones, always under a caller-supplied timeout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;
use vitalink_types::{DeviceId, InstanceKey, RecordValue, Topic, VitaError};
use vitalink_middleware::{InstanceHandle, InstanceRegistry};

use crate::wait::WaitOutcome;

/// Command capability a triad belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    AlarmLimit,
    Infusion,
    Connectivity,
}

/// Role a record plays within its triad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeRole {
    /// Desired value, written by a controller.
    Objective,
    /// Per-device echo of the objective being honored.
    Ack,
    /// Currently-applied value, written by the owning device.
    State,
}

/// A record classified into its triad: one place for correlation logic
/// instead of every controller re-deriving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub capability: Capability,
    /// Target device; `None` for fleet-wide objectives.
    pub device: Option<DeviceId>,
    pub role: ExchangeRole,
}

/// Classify `value` within the triad pattern.
///
/// `source` is the publishing participant: a `LocalAlarmLimitObjective`
/// published by the device it names is that device's ack, the same record
/// published by anyone else is a request.
pub fn classify(source: &DeviceId, value: &RecordValue) -> Option<Exchange> {
    match value {
        RecordValue::GlobalAlarmLimitObjective(_) => Some(Exchange {
            capability: Capability::AlarmLimit,
            device: None,
            role: ExchangeRole::Objective,
        }),
        RecordValue::LocalAlarmLimitObjective(objective) => Some(Exchange {
            capability: Capability::AlarmLimit,
            device: Some(objective.device_id.clone()),
            role: if *source == objective.device_id {
                ExchangeRole::Ack
            } else {
                ExchangeRole::Objective
            },
        }),
        RecordValue::AlarmLimit(state) => Some(Exchange {
            capability: Capability::AlarmLimit,
            device: Some(state.device_id.clone()),
            role: ExchangeRole::State,
        }),
        RecordValue::InfusionObjective(objective) => Some(Exchange {
            capability: Capability::Infusion,
            device: Some(objective.device_id.clone()),
            role: ExchangeRole::Objective,
        }),
        RecordValue::InfusionProgram(program) => Some(Exchange {
            capability: Capability::Infusion,
            device: Some(program.device_id.clone()),
            role: ExchangeRole::Objective,
        }),
        RecordValue::InfusionStatus(status) => Some(Exchange {
            capability: Capability::Infusion,
            device: Some(status.device_id.clone()),
            role: ExchangeRole::State,
        }),
        RecordValue::DeviceConnectivity(connectivity) => Some(Exchange {
            capability: Capability::Connectivity,
            device: Some(connectivity.device_id.clone()),
            role: ExchangeRole::State,
        }),
        _ => None,
    }
}

/// State topic a given objective converges on, if it is an objective at all.
pub fn state_topic(objective: &RecordValue) -> Option<Topic> {
    match objective {
        RecordValue::GlobalAlarmLimitObjective(_) | RecordValue::LocalAlarmLimitObjective(_) => {
            Some(Topic::AlarmLimit)
        }
        RecordValue::InfusionObjective(_) | RecordValue::InfusionProgram(_) => {
            Some(Topic::InfusionStatus)
        }
        _ => None,
    }
}

/// Whether `candidate` (a state record) satisfies `objective`.
///
/// Matching is key equality plus field equality — values compare exactly,
/// because the device echoes the objective's fields verbatim when it honors
/// them.
pub fn converges(objective: &RecordValue, candidate: &RecordValue) -> bool {
    match (objective, candidate) {
        (RecordValue::LocalAlarmLimitObjective(wanted), RecordValue::AlarmLimit(state)) => {
            state.device_id == wanted.device_id
                && state.metric_id == wanted.metric_id
                && state.limit_type == wanted.limit_type
                && state.unit_id == wanted.unit_id
                && state.value == wanted.value
        }
        (RecordValue::GlobalAlarmLimitObjective(wanted), RecordValue::AlarmLimit(state)) => {
            // Fleet-wide: any device reporting the requested threshold.
            state.metric_id == wanted.metric_id
                && state.limit_type == wanted.limit_type
                && state.unit_id == wanted.unit_id
                && state.value == wanted.value
        }
        (RecordValue::InfusionObjective(wanted), RecordValue::InfusionStatus(state)) => {
            state.device_id == wanted.device_id
                && state.infusion_active == !wanted.stop_infusion
        }
        (RecordValue::InfusionProgram(wanted), RecordValue::InfusionStatus(state)) => {
            state.device_id == wanted.device_id
                && state.drug_name == wanted.drug_name
                && state.volume_to_infuse_ml == wanted.volume_to_infuse_ml
                && state.infusion_duration_seconds == wanted.infusion_duration_seconds
        }
        _ => false,
    }
}

/// Controller-side half of the triad: issues objectives and waits, bounded,
/// for the matching applied state.
pub struct ObjectiveController {
    registry: Arc<InstanceRegistry>,
    handles: Mutex<HashMap<InstanceKey, InstanceHandle>>,
}

impl ObjectiveController {
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self {
            registry,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Publish (or republish) an objective instance.
    ///
    /// A first issue registers the instance; later issues for the same key
    /// update it.  Publishing is fire-and-forget — convergence is observed
    /// separately.
    pub fn issue(&self, objective: impl Into<RecordValue>) -> Result<(), VitaError> {
        let value = objective.into();
        let key = value.key();
        let mut handles = self.handles.lock().expect("objective handles poisoned");
        if let Some(handle) = handles.get(&key) {
            match self.registry.update(handle, value.clone()) {
                Ok(()) => return Ok(()),
                // The instance was withdrawn elsewhere; fall through and
                // register a fresh incarnation.
                Err(VitaError::UnknownInstance { .. }) => {}
                Err(other) => return Err(other),
            }
        }
        let handle = self.registry.register(value)?;
        handles.insert(key, handle);
        Ok(())
    }

    /// Withdraw a previously issued objective — the cancellation primitive.
    ///
    /// # Errors
    ///
    /// [`VitaError::UnknownInstance`] when no live objective exists for the
    /// key.
    pub fn withdraw(&self, key: &InstanceKey) -> Result<(), VitaError> {
        let mut handles = self.handles.lock().expect("objective handles poisoned");
        let handle = handles
            .remove(key)
            .ok_or_else(|| VitaError::UnknownInstance { key: key.clone() })?;
        self.registry.unregister(&handle)
    }

    /// Wait, bounded by `timeout`, until a state sample matching `objective`
    /// is observed.
    ///
    /// Subscribes to the state lane at call time: call before issuing (or
    /// use [`ObjectiveController::issue_and_await`]) so the device's
    /// response cannot slip past between issue and subscribe.
    ///
    /// # Errors
    ///
    /// [`VitaError::InvalidRecord`] when `objective` is not an
    /// objective-style record.
    pub async fn await_convergence(
        &self,
        objective: &RecordValue,
        timeout: Duration,
    ) -> Result<WaitOutcome, VitaError> {
        let topic = state_topic(objective).ok_or_else(|| VitaError::InvalidRecord {
            reason: format!("{} is not an objective topic", objective.topic()),
        })?;
        let mut receiver = self.registry.bus().subscribe(topic);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, receiver.recv()).await {
                Err(_) => return Ok(WaitOutcome::TimedOut),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Ok(WaitOutcome::Cancelled);
                }
                Ok(Ok(sample)) => {
                    if sample
                        .event
                        .value()
                        .is_some_and(|candidate| converges(objective, candidate))
                    {
                        debug!(topic = %topic, "objective converged");
                        return Ok(WaitOutcome::Ready);
                    }
                }
            }
        }
    }

    /// Issue `objective` and wait for convergence in one call, with the
    /// subscription opened before the objective is published.
    pub async fn issue_and_await(
        &self,
        objective: impl Into<RecordValue>,
        timeout: Duration,
    ) -> Result<WaitOutcome, VitaError> {
        let value = objective.into();
        // Validate and subscribe before publishing.
        let topic = state_topic(&value).ok_or_else(|| VitaError::InvalidRecord {
            reason: format!("{} is not an objective topic", value.topic()),
        })?;
        let mut receiver = self.registry.bus().subscribe(topic);
        self.issue(value.clone())?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, receiver.recv()).await {
                Err(_) => return Ok(WaitOutcome::TimedOut),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Ok(WaitOutcome::Cancelled);
                }
                Ok(Ok(sample)) => {
                    if sample
                        .event
                        .value()
                        .is_some_and(|candidate| converges(&value, candidate))
                    {
                        return Ok(WaitOutcome::Ready);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalink_types::{
        nomenclature, AlarmLimit, InfusionObjective, InfusionStatus, KeyedRecord, LimitType,
        LocalAlarmLimitObjective, Sample, SampleEvent, WallClock,
    };
    use vitalink_middleware::SampleBus;

    fn device(id: &str) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    fn spo2_objective(device_id: &str, value: f32) -> LocalAlarmLimitObjective {
        LocalAlarmLimitObjective {
            device_id: device(device_id),
            metric_id: nomenclature::spo2(),
            limit_type: LimitType::Low,
            value,
            unit_id: nomenclature::percent(),
            requestor: device("supervisor"),
        }
    }

    fn spo2_state(device_id: &str, value: f32) -> AlarmLimit {
        AlarmLimit {
            device_id: device(device_id),
            metric_id: nomenclature::spo2(),
            limit_type: LimitType::Low,
            value,
            unit_id: nomenclature::percent(),
        }
    }

    #[test]
    fn classify_distinguishes_request_from_ack_by_source() {
        let objective: RecordValue = spo2_objective("pox-1", 85.0).into();

        let request = classify(&device("supervisor"), &objective).unwrap();
        assert_eq!(request.role, ExchangeRole::Objective);

        let ack = classify(&device("pox-1"), &objective).unwrap();
        assert_eq!(ack.role, ExchangeRole::Ack);
        assert_eq!(ack.capability, Capability::AlarmLimit);
        assert_eq!(ack.device, Some(device("pox-1")));
    }

    #[test]
    fn classify_marks_applied_state() {
        let state: RecordValue = spo2_state("pox-1", 85.0).into();
        let exchange = classify(&device("pox-1"), &state).unwrap();
        assert_eq!(exchange.role, ExchangeRole::State);
    }

    #[test]
    fn converges_requires_full_field_equality() {
        let objective: RecordValue = spo2_objective("pox-1", 85.0).into();
        assert!(converges(&objective, &spo2_state("pox-1", 85.0).into()));
        assert!(!converges(&objective, &spo2_state("pox-1", 84.0).into()));
        assert!(!converges(&objective, &spo2_state("pox-2", 85.0).into()));
    }

    #[test]
    fn infusion_objective_converges_on_activity_flag() {
        let stop: RecordValue = InfusionObjective {
            device_id: device("pump-1"),
            stop_infusion: true,
            requestor: device("supervisor"),
        }
        .into();
        let stopped: RecordValue = InfusionStatus {
            device_id: device("pump-1"),
            infusion_active: false,
            drug_name: vitalink_types::DisplayName::new("saline").unwrap(),
            volume_to_infuse_ml: 500.0,
            infusion_duration_seconds: 3600,
            volume_infused_ml: 10.0,
            milliliters_per_hour: 0.0,
        }
        .into();
        assert!(converges(&stop, &stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn await_convergence_times_out_without_state() {
        let bus = SampleBus::default();
        let registry = Arc::new(InstanceRegistry::new(device("supervisor"), bus));
        let controller = ObjectiveController::new(registry);

        let outcome = controller
            .issue_and_await(spo2_objective("pox-1", 85.0), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[tokio::test]
    async fn await_convergence_sees_matching_state() {
        let bus = SampleBus::default();
        let registry = Arc::new(InstanceRegistry::new(device("supervisor"), bus.clone()));
        let controller = ObjectiveController::new(registry);

        // A simulated device applies the requested limit shortly after.
        let device_bus = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let state = spo2_state("pox-1", 85.0);
            device_bus.publish(Sample {
                key: state.key(),
                seq: 0,
                source: device("pox-1"),
                publish_time: WallClock::now(),
                event: SampleEvent::Registered(state.into()),
            });
        });

        let outcome = controller
            .issue_and_await(spo2_objective("pox-1", 85.0), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Ready);
    }

    #[tokio::test]
    async fn reissue_updates_the_same_objective_instance() {
        let bus = SampleBus::default();
        let registry = Arc::new(InstanceRegistry::new(device("supervisor"), bus.clone()));
        let controller = ObjectiveController::new(registry.clone());

        controller.issue(spo2_objective("pox-1", 85.0)).unwrap();
        controller.issue(spo2_objective("pox-1", 88.0)).unwrap();

        let keys = registry.live_keys(Topic::LocalAlarmLimitObjective);
        assert_eq!(keys.len(), 1);
        match registry.value(&keys[0]).unwrap() {
            RecordValue::LocalAlarmLimitObjective(o) => assert_eq!(o.value, 88.0),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[tokio::test]
    async fn withdraw_is_single_shot() {
        let bus = SampleBus::default();
        let registry = Arc::new(InstanceRegistry::new(device("supervisor"), bus));
        let controller = ObjectiveController::new(registry);

        let objective = spo2_objective("pox-1", 85.0);
        let key = objective.key();
        controller.issue(objective).unwrap();

        controller.withdraw(&key).unwrap();
        assert!(matches!(
            controller.withdraw(&key),
            Err(VitaError::UnknownInstance { .. })
        ));
    }

    #[tokio::test]
    async fn non_objective_record_is_rejected() {
        let bus = SampleBus::default();
        let registry = Arc::new(InstanceRegistry::new(device("supervisor"), bus));
        let controller = ObjectiveController::new(registry);

        let state: RecordValue = spo2_state("pox-1", 85.0).into();
        let err = controller
            .await_convergence(&state, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, VitaError::InvalidRecord { .. }));
    }
}
