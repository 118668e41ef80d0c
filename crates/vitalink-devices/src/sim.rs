//! Simulated device families for headless tests and demos.
//!
//! [`SimPulseOximeter`] models a serial pulse oximeter: SpO₂ and pulse-rate
//! numerics on a fixed period, four owned alarm limits, patient alerts while
//! a reading violates a limit, and a connectivity walk
//! (Initial → Connecting → Connected) guarding first publication behind a
//! [`WaitGate`] the way a serial driver bounds its init handshake by a
//! maximum quiet time.
//!
//! [`SimInfusionPump`] models a single-head pump reporting holistic
//! [`Observation::InfusionState`] and applying stop/program objectives
//! last-writer-wins.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use vitalink_types::{
    nomenclature, AlertId, AlertText, ConnectionState, DeviceId, DeviceIdentity, DisplayName,
    LimitType, MetricId, UnitId, VendorMetricId, VitaError, WallClock,
};
use vitalink_kernel::{wait_gate, GateHandle, WaitGate};

use crate::adapter::{DeviceAdapter, Observation, ObjectiveCommand};

// ────────────────────────────────────────────────────────────────────────────
// Pulse oximeter
// ────────────────────────────────────────────────────────────────────────────

/// Pleth waveform: samples per batch and sampling frequency.
const PLETH_BATCH: usize = 32;
const PLETH_HZ: u32 = 75;

struct OximeterState {
    spo2: f32,
    pulse_rate: f32,
    limits: HashMap<(MetricId, LimitType), (f32, UnitId)>,
    violated: HashSet<MetricId>,
    connected: bool,
    pleth_phase: u64,
    ready: Option<GateHandle>,
}

impl OximeterState {
    fn tick(&mut self, now: WallClock) -> Vec<Observation> {
        let mut out = Vec::new();
        if !self.connected {
            self.connected = true;
            let targets = vec![DisplayName::new("COM1").expect("fits cap")];
            for state in [
                ConnectionState::Initial,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ] {
                out.push(Observation::Connectivity {
                    state,
                    valid_targets: targets.clone(),
                });
            }
            // Announce the power-on alarm limits.
            for ((metric, limit_type), (value, unit)) in &self.limits {
                out.push(Observation::AlarmLimit {
                    metric: metric.clone(),
                    limit_type: *limit_type,
                    value: *value,
                    unit: unit.clone(),
                });
            }
        }

        out.push(Observation::Numeric {
            metric: nomenclature::spo2(),
            vendor_metric: VendorMetricId::new("").expect("fits cap"),
            instance: 0,
            unit: nomenclature::percent(),
            value: self.spo2,
            device_time: now,
        });
        out.push(Observation::Numeric {
            metric: nomenclature::pulse_rate(),
            vendor_metric: VendorMetricId::new("").expect("fits cap"),
            instance: 0,
            unit: nomenclature::beats_per_minute(),
            value: self.pulse_rate,
            device_time: now,
        });

        // Phase-continuous synthetic pleth strip, batched above 3 Hz.
        let beats_per_sample = self.pulse_rate / 60.0 / PLETH_HZ as f32;
        let values: Vec<f32> = (0..PLETH_BATCH)
            .map(|i| {
                let t = (self.pleth_phase + i as u64) as f32;
                ((t * beats_per_sample * std::f32::consts::TAU).sin() + 1.0) * 0.5
            })
            .collect();
        self.pleth_phase = self.pleth_phase.wrapping_add(PLETH_BATCH as u64);
        out.push(Observation::SampleBatch {
            metric: nomenclature::pleth(),
            vendor_metric: VendorMetricId::new("").expect("fits cap"),
            instance: 0,
            unit: nomenclature::dimensionless(),
            frequency: PLETH_HZ,
            values,
            device_time: now,
        });

        let spo2 = self.spo2;
        let pulse = self.pulse_rate;
        self.evaluate(nomenclature::spo2(), "SpO2", spo2, "%", &mut out);
        self.evaluate(nomenclature::pulse_rate(), "pulse", pulse, " bpm", &mut out);

        if let Some(gate) = self.ready.take() {
            gate.open();
        }
        out
    }

    fn evaluate(
        &mut self,
        metric: MetricId,
        label: &str,
        value: f32,
        unit_suffix: &str,
        out: &mut Vec<Observation>,
    ) {
        let low = self.limits.get(&(metric.clone(), LimitType::Low)).map(|l| l.0);
        let high = self.limits.get(&(metric.clone(), LimitType::High)).map(|l| l.0);
        let violated =
            low.is_some_and(|limit| value < limit) || high.is_some_and(|limit| value > limit);

        let identifier = AlertId::new(format!("{}_LIMIT_VIOLATED", metric.as_str()))
            .expect("metric ids fit the alert cap");
        if violated {
            let text = AlertText::new(format!("{label} {value}{unit_suffix} outside limits"))
                .expect("fits cap");
            self.violated.insert(metric);
            out.push(Observation::AlarmActive {
                identifier,
                text,
                technical: false,
            });
        } else if self.violated.remove(&metric) {
            out.push(Observation::AlarmCleared {
                identifier,
                technical: false,
            });
        }
    }
}

/// Runtime controls shared with a spawned oximeter, for tests and demos.
#[derive(Clone)]
pub struct SimOximeterControls {
    state: Arc<Mutex<OximeterState>>,
}

impl SimOximeterControls {
    /// Replace the simulated vitals; the next tick publishes them.
    pub fn set_vitals(&self, spo2: f32, pulse_rate: f32) {
        let mut state = self.state.lock().expect("oximeter state poisoned");
        state.spo2 = spo2;
        state.pulse_rate = pulse_rate;
    }
}

/// Demo pulse-oximeter adapter.
pub struct SimPulseOximeter {
    device_id: DeviceId,
    emit_period: Duration,
    state: Arc<Mutex<OximeterState>>,
    ready: WaitGate,
}

impl SimPulseOximeter {
    /// Power-on limits: SpO₂ 90–100 %, pulse 40–150 bpm.
    pub fn new(device_id: DeviceId, emit_period: Duration) -> Self {
        let (gate_handle, ready) = wait_gate();
        let mut limits = HashMap::new();
        limits.insert(
            (nomenclature::spo2(), LimitType::Low),
            (90.0, nomenclature::percent()),
        );
        limits.insert(
            (nomenclature::spo2(), LimitType::High),
            (100.0, nomenclature::percent()),
        );
        limits.insert(
            (nomenclature::pulse_rate(), LimitType::Low),
            (40.0, nomenclature::beats_per_minute()),
        );
        limits.insert(
            (nomenclature::pulse_rate(), LimitType::High),
            (150.0, nomenclature::beats_per_minute()),
        );
        Self {
            device_id,
            emit_period,
            state: Arc::new(Mutex::new(OximeterState {
                spo2: 98.0,
                pulse_rate: 72.0,
                limits,
                violated: HashSet::new(),
                connected: false,
                pleth_phase: 0,
                ready: Some(gate_handle),
            })),
            ready,
        }
    }

    /// Gate that opens once the first vitals have been emitted — wait on it
    /// with a timeout instead of polling the bus.
    pub fn ready_gate(&self) -> WaitGate {
        self.ready.clone()
    }

    pub fn controls(&self) -> SimOximeterControls {
        SimOximeterControls {
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl DeviceAdapter for SimPulseOximeter {
    fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            device_id: self.device_id.clone(),
            manufacturer: DisplayName::new("Nellcor").expect("fits cap"),
            model: DisplayName::new("N-595").expect("fits cap"),
            serial_number: DisplayName::new("SIM-0595").expect("fits cap"),
            icon_name: DisplayName::new("n595.png").expect("fits cap"),
        }
    }

    fn observations(&mut self) -> BoxStream<'static, Observation> {
        let state = self.state.clone();
        let interval = tokio::time::interval(self.emit_period);
        stream::unfold((state, interval), |(state, mut interval)| async move {
            interval.tick().await;
            let batch = state
                .lock()
                .expect("oximeter state poisoned")
                .tick(WallClock::now());
            Some((stream::iter(batch), (state, interval)))
        })
        .flatten()
        .boxed()
    }

    async fn apply_objective(
        &mut self,
        command: ObjectiveCommand,
    ) -> Result<Vec<Observation>, VitaError> {
        match command {
            ObjectiveCommand::AlarmLimit(objective) => {
                let mut state = self.state.lock().expect("oximeter state poisoned");
                state.limits.insert(
                    (objective.metric_id.clone(), objective.limit_type),
                    (objective.value, objective.unit_id.clone()),
                );
                Ok(vec![Observation::AlarmLimit {
                    metric: objective.metric_id,
                    limit_type: objective.limit_type,
                    value: objective.value,
                    unit: objective.unit_id,
                }])
            }
            ObjectiveCommand::Infusion(_) | ObjectiveCommand::Program(_) => {
                Err(VitaError::InvalidRecord {
                    reason: "pulse oximeter cannot run infusions".to_string(),
                })
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Infusion pump
// ────────────────────────────────────────────────────────────────────────────

struct PumpState {
    active: bool,
    drug_name: DisplayName,
    volume_to_infuse_ml: f32,
    infusion_duration_seconds: u32,
    volume_infused_ml: f32,
    connected: bool,
}

impl PumpState {
    fn rate_ml_per_hour(&self) -> f32 {
        if self.active && self.infusion_duration_seconds > 0 {
            self.volume_to_infuse_ml / self.infusion_duration_seconds as f32 * 3600.0
        } else {
            0.0
        }
    }

    fn status(&self) -> Observation {
        Observation::InfusionState {
            active: self.active,
            drug_name: self.drug_name.clone(),
            volume_to_infuse_ml: self.volume_to_infuse_ml,
            infusion_duration_seconds: self.infusion_duration_seconds,
            volume_infused_ml: self.volume_infused_ml,
            milliliters_per_hour: self.rate_ml_per_hour(),
        }
    }

    fn tick(&mut self) -> Vec<Observation> {
        let mut out = Vec::new();
        if !self.connected {
            self.connected = true;
            for state in [
                ConnectionState::Initial,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ] {
                out.push(Observation::Connectivity {
                    state,
                    valid_targets: Vec::new(),
                });
            }
        }
        out.push(self.status());
        out
    }
}

/// Demo single-head infusion pump adapter.
pub struct SimInfusionPump {
    device_id: DeviceId,
    emit_period: Duration,
    state: Arc<Mutex<PumpState>>,
}

impl SimInfusionPump {
    pub fn new(device_id: DeviceId, emit_period: Duration) -> Self {
        Self {
            device_id,
            emit_period,
            state: Arc::new(Mutex::new(PumpState {
                active: false,
                drug_name: DisplayName::new("saline").expect("fits cap"),
                volume_to_infuse_ml: 0.0,
                infusion_duration_seconds: 3600,
                volume_infused_ml: 0.0,
                connected: false,
            })),
        }
    }
}

#[async_trait]
impl DeviceAdapter for SimInfusionPump {
    fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            device_id: self.device_id.clone(),
            manufacturer: DisplayName::new("Hospira").expect("fits cap"),
            model: DisplayName::new("Symbiq").expect("fits cap"),
            serial_number: DisplayName::new("SIM-SYMBIQ").expect("fits cap"),
            icon_name: DisplayName::new("symbiq.png").expect("fits cap"),
        }
    }

    fn observations(&mut self) -> BoxStream<'static, Observation> {
        let state = self.state.clone();
        let interval = tokio::time::interval(self.emit_period);
        stream::unfold((state, interval), |(state, mut interval)| async move {
            interval.tick().await;
            let batch = state.lock().expect("pump state poisoned").tick();
            Some((stream::iter(batch), (state, interval)))
        })
        .flatten()
        .boxed()
    }

    async fn apply_objective(
        &mut self,
        command: ObjectiveCommand,
    ) -> Result<Vec<Observation>, VitaError> {
        match command {
            ObjectiveCommand::Infusion(objective) => {
                let mut state = self.state.lock().expect("pump state poisoned");
                state.active = !objective.stop_infusion;
                Ok(vec![state.status()])
            }
            ObjectiveCommand::Program(program) => {
                let mut state = self.state.lock().expect("pump state poisoned");
                state.drug_name = program.drug_name;
                state.volume_to_infuse_ml = program.volume_to_infuse_ml;
                state.infusion_duration_seconds = program.infusion_duration_seconds;
                state.active = true;
                Ok(vec![state.status()])
            }
            ObjectiveCommand::AlarmLimit(_) => Err(VitaError::InvalidRecord {
                reason: "infusion pump owns no alarm limits".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalink_types::{InfusionObjective, InfusionProgram, LocalAlarmLimitObjective};

    fn device(id: &str) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    async fn take(stream: &mut BoxStream<'static, Observation>, n: usize) -> Vec<Observation> {
        let mut out = Vec::new();
        for _ in 0..n {
            out.push(stream.next().await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn first_tick_walks_connectivity_then_vitals() {
        let mut oximeter = SimPulseOximeter::new(device("pox-1"), Duration::from_millis(5));
        let mut stream = oximeter.observations();

        let mut connectivity = Vec::new();
        for _ in 0..3 {
            match stream.next().await.unwrap() {
                Observation::Connectivity { state, .. } => connectivity.push(state),
                other => panic!("expected connectivity walk, got {other:?}"),
            }
        }
        assert_eq!(
            connectivity,
            vec![
                ConnectionState::Initial,
                ConnectionState::Connecting,
                ConnectionState::Connected
            ]
        );

        // Four power-on limits, then the two vitals.
        let mut limits = 0;
        let mut numerics = Vec::new();
        for _ in 0..6 {
            match stream.next().await.unwrap() {
                Observation::AlarmLimit { .. } => limits += 1,
                Observation::Numeric { metric, .. } => numerics.push(metric),
                other => panic!("unexpected observation {other:?}"),
            }
        }
        assert_eq!(limits, 4);
        assert_eq!(
            numerics,
            vec![nomenclature::spo2(), nomenclature::pulse_rate()]
        );
    }

    #[tokio::test]
    async fn ready_gate_opens_after_first_vitals() {
        let mut oximeter = SimPulseOximeter::new(device("pox-1"), Duration::from_millis(5));
        let mut ready = oximeter.ready_gate();

        let mut stream = oximeter.observations();
        take(&mut stream, 9).await;
        assert!(ready.wait(Duration::from_secs(1)).await.is_ready());
    }

    #[tokio::test]
    async fn low_spo2_raises_then_clears_a_patient_alert() {
        let mut oximeter = SimPulseOximeter::new(device("pox-1"), Duration::from_millis(5));
        let controls = oximeter.controls();
        let mut stream = oximeter.observations();

        controls.set_vitals(84.0, 72.0);
        let mut raised = None;
        for _ in 0..12 {
            if let Some(Observation::AlarmActive { identifier, technical, .. }) =
                stream.next().await
            {
                raised = Some((identifier, technical));
                break;
            }
        }
        let (identifier, technical) = raised.expect("low SpO2 must raise an alert");
        assert!(identifier.as_str().contains("MDC_PULS_OXIM_SAT_O2"));
        assert!(!technical);

        controls.set_vitals(97.0, 72.0);
        let mut cleared = false;
        for _ in 0..12 {
            if let Some(Observation::AlarmCleared { .. }) = stream.next().await {
                cleared = true;
                break;
            }
        }
        assert!(cleared, "recovered SpO2 must clear the alert");
    }

    #[tokio::test]
    async fn pleth_batch_follows_the_vitals() {
        let mut oximeter = SimPulseOximeter::new(device("pox-1"), Duration::from_millis(5));
        let mut stream = oximeter.observations();

        let mut batch = None;
        for _ in 0..10 {
            if let Some(Observation::SampleBatch {
                metric,
                frequency,
                values,
                ..
            }) = stream.next().await
            {
                batch = Some((metric, frequency, values));
                break;
            }
        }
        let (metric, frequency, values) = batch.expect("oximeter must emit a pleth batch");
        assert_eq!(metric, nomenclature::pleth());
        assert_eq!(frequency, PLETH_HZ);
        assert_eq!(values.len(), PLETH_BATCH);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn alarm_limit_objective_is_applied_and_reflected() {
        let mut oximeter = SimPulseOximeter::new(device("pox-1"), Duration::from_millis(5));
        let applied = oximeter
            .apply_objective(ObjectiveCommand::AlarmLimit(LocalAlarmLimitObjective {
                device_id: device("pox-1"),
                metric_id: nomenclature::spo2(),
                limit_type: LimitType::Low,
                value: 85.0,
                unit_id: nomenclature::percent(),
                requestor: device("supervisor"),
            }))
            .await
            .unwrap();
        assert_eq!(
            applied,
            vec![Observation::AlarmLimit {
                metric: nomenclature::spo2(),
                limit_type: LimitType::Low,
                value: 85.0,
                unit: nomenclature::percent(),
            }]
        );
    }

    #[tokio::test]
    async fn oximeter_rejects_infusion_objectives() {
        let mut oximeter = SimPulseOximeter::new(device("pox-1"), Duration::from_millis(5));
        let err = oximeter
            .apply_objective(ObjectiveCommand::Infusion(InfusionObjective {
                device_id: device("pox-1"),
                stop_infusion: true,
                requestor: device("supervisor"),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, VitaError::InvalidRecord { .. }));
    }

    #[tokio::test]
    async fn pump_applies_programs_last_writer_wins() {
        let mut pump = SimInfusionPump::new(device("pump-1"), Duration::from_millis(5));
        let program = |volume: f32| {
            ObjectiveCommand::Program(InfusionProgram {
                device_id: device("pump-1"),
                head: 0,
                drug_name: DisplayName::new("saline").unwrap(),
                volume_to_infuse_ml: volume,
                infusion_duration_seconds: 3600,
                requestor: device("supervisor"),
            })
        };

        pump.apply_objective(program(5.0)).await.unwrap();
        let after_second = pump.apply_objective(program(7.0)).await.unwrap();
        match &after_second[0] {
            Observation::InfusionState {
                volume_to_infuse_ml,
                milliliters_per_hour,
                ..
            } => {
                assert_eq!(*volume_to_infuse_ml, 7.0);
                assert_eq!(*milliliters_per_hour, 7.0);
            }
            other => panic!("unexpected observation {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_objective_halts_the_rate() {
        let mut pump = SimInfusionPump::new(device("pump-1"), Duration::from_millis(5));
        pump.apply_objective(ObjectiveCommand::Program(InfusionProgram {
            device_id: device("pump-1"),
            head: 0,
            drug_name: DisplayName::new("heparin").unwrap(),
            volume_to_infuse_ml: 250.0,
            infusion_duration_seconds: 7200,
            requestor: device("supervisor"),
        }))
        .await
        .unwrap();

        let stopped = pump
            .apply_objective(ObjectiveCommand::Infusion(InfusionObjective {
                device_id: device("pump-1"),
                stop_infusion: true,
                requestor: device("supervisor"),
            }))
            .await
            .unwrap();
        match &stopped[0] {
            Observation::InfusionState {
                active,
                milliliters_per_hour,
                ..
            } => {
                assert!(!active);
                assert_eq!(*milliliters_per_hour, 0.0);
            }
            other => panic!("unexpected observation {other:?}"),
        }
    }
}
