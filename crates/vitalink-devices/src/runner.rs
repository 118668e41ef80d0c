//! [`DeviceRunner`] – wires one adapter to the bus.
//!
//! The runner owns the adapter for the lifetime of the connection: it
//! registers the identity, starts heartbeats, pumps the observation stream
//! into the [`DevicePublisher`], and dispatches inbound objectives addressed
//! to the adapter's device.  Objectives are processed strictly in arrival
//! order, so conflicting requests resolve last-writer-wins with no
//! arbitration.
//!
//! A fleet-wide `GlobalAlarmLimitObjective` is mirrored into a per-device
//! application: the device applies it to its own metric, echoes a
//! `LocalAlarmLimitObjective` under its own id (the ack), and republishes
//! its `AlarmLimit` (the state).

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vitalink_types::{
    DeviceId, LocalAlarmLimitObjective, ParticipantKind, RecordValue, Sample, Topic, VitaError,
};
use vitalink_kernel::{HeartbeatPublisher, HeartbeatTask, TimeSyncResponder};
use vitalink_middleware::{InstanceRegistry, SampleBus, TopicReceiver};

use crate::adapter::{DeviceAdapter, Observation, ObjectiveCommand};
use crate::publisher::DevicePublisher;

/// Spawns and supervises one device connection.
pub struct DeviceRunner {
    bus: SampleBus,
    heartbeat_period: Duration,
}

impl DeviceRunner {
    /// Reference heartbeat period is 2 seconds.
    pub fn new(bus: SampleBus, heartbeat_period: Duration) -> Self {
        Self {
            bus,
            heartbeat_period,
        }
    }

    /// Register the adapter's identity, start heartbeats, and run the
    /// observation/objective loop.
    ///
    /// # Errors
    ///
    /// [`VitaError::DuplicateKey`] when the device id is already live on
    /// this bus (identity or heartbeat instance).
    pub fn spawn(&self, mut adapter: Box<dyn DeviceAdapter>) -> Result<DeviceTask, VitaError> {
        let identity = adapter.identity();
        let device_id = identity.device_id.clone();
        let registry = Arc::new(InstanceRegistry::new(device_id.clone(), self.bus.clone()));
        let publisher = DevicePublisher::new(registry.clone(), &identity)?;

        let heartbeat = HeartbeatPublisher::new(
            registry.clone(),
            ParticipantKind::Device,
            self.heartbeat_period,
        )
        .spawn()?;

        // Every participant answers foreign heartbeats with a TimeSync pair.
        let replies = std::num::NonZeroU32::new(2).expect("nonzero literal");
        let burst = std::num::NonZeroU32::new(4).expect("nonzero literal");
        let timesync = TimeSyncResponder::new(registry, replies, burst)
            .spawn(self.bus.subscribe(Topic::HeartBeat));

        let local_rx = self.bus.subscribe(Topic::LocalAlarmLimitObjective);
        let global_rx = self.bus.subscribe(Topic::GlobalAlarmLimitObjective);
        let infusion_rx = self.bus.subscribe(Topic::InfusionObjective);
        let program_rx = self.bus.subscribe(Topic::InfusionProgram);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loop_device = device_id.clone();
        let join = tokio::spawn(async move {
            run_loop(
                &mut adapter,
                &publisher,
                loop_device,
                local_rx,
                global_rx,
                infusion_rx,
                program_rx,
                shutdown_rx,
            )
            .await;
            publisher.shutdown();
        });

        Ok(DeviceTask {
            device_id,
            shutdown: shutdown_tx,
            join,
            heartbeat,
            timesync,
        })
    }
}

/// Handle to a running device connection.
pub struct DeviceTask {
    device_id: DeviceId,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    heartbeat: HeartbeatTask,
    timesync: JoinHandle<()>,
}

impl DeviceTask {
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Stop the loop, withdraw every instance, and stop heartbeats.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
        self.heartbeat.shutdown().await;
        self.timesync.abort();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    adapter: &mut Box<dyn DeviceAdapter>,
    publisher: &DevicePublisher,
    device_id: DeviceId,
    mut local_rx: TopicReceiver,
    mut global_rx: TopicReceiver,
    mut infusion_rx: TopicReceiver,
    mut program_rx: TopicReceiver,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut observations: BoxStream<'static, Observation> = adapter.observations();
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!(device = %device_id, "device runner stopping");
                break;
            }
            next = observations.next() => match next {
                Some(observation) => publish(publisher, observation),
                None => {
                    // The transport side is done; keep serving objectives.
                    info!(device = %device_id, "observation stream ended");
                    observations = stream::pending().boxed();
                }
            },
            sample = local_rx.recv() => {
                if let Some(command) = local_command(&device_id, sample) {
                    apply(adapter, publisher, command).await;
                }
            }
            sample = global_rx.recv() => {
                if let Some(command) = global_command(&device_id, sample) {
                    apply(adapter, publisher, command).await;
                }
            }
            sample = infusion_rx.recv() => {
                if let Some(command) = infusion_command(&device_id, sample) {
                    apply(adapter, publisher, command).await;
                }
            }
            sample = program_rx.recv() => {
                if let Some(command) = program_command(&device_id, sample) {
                    apply(adapter, publisher, command).await;
                }
            }
        }
    }
}

fn publish(publisher: &DevicePublisher, observation: Observation) {
    if let Err(error) = publisher.apply(observation) {
        warn!(device = %publisher.device_id(), %error, "observation dropped");
    }
}

async fn apply(
    adapter: &mut Box<dyn DeviceAdapter>,
    publisher: &DevicePublisher,
    command: ObjectiveCommand,
) {
    // Echo before state: the ack announces which objective is being honored,
    // the observations that follow carry the applied values.
    let ack = match &command {
        ObjectiveCommand::AlarmLimit(objective) => Some(objective.clone()),
        _ => None,
    };
    match adapter.apply_objective(command).await {
        Ok(observations) => {
            if let Some(ack) = ack {
                if let Err(error) = publisher.publish_ack(ack) {
                    warn!(device = %publisher.device_id(), %error, "ack dropped");
                }
            }
            for observation in observations {
                publish(publisher, observation);
            }
        }
        Err(error) => {
            warn!(device = %publisher.device_id(), %error, "objective rejected");
        }
    }
}

type RecvResult = Result<Sample, broadcast::error::RecvError>;

fn sample_value(device_id: &DeviceId, result: RecvResult) -> Option<(DeviceId, RecordValue)> {
    match result {
        Ok(sample) => {
            // Our own publications come back on subscribed lanes; the ack
            // echo in particular must not be re-applied as a request.
            if sample.source == *device_id {
                return None;
            }
            sample
                .event
                .value()
                .cloned()
                .map(|value| (sample.source, value))
        }
        Err(broadcast::error::RecvError::Lagged(missed)) => {
            warn!(device = %device_id, missed, "objective lane lagged");
            None
        }
        Err(broadcast::error::RecvError::Closed) => None,
    }
}

fn local_command(device_id: &DeviceId, result: RecvResult) -> Option<ObjectiveCommand> {
    let (_, value) = sample_value(device_id, result)?;
    match value {
        RecordValue::LocalAlarmLimitObjective(objective)
            if objective.device_id == *device_id =>
        {
            Some(ObjectiveCommand::AlarmLimit(objective))
        }
        _ => None,
    }
}

fn global_command(device_id: &DeviceId, result: RecvResult) -> Option<ObjectiveCommand> {
    let (_, value) = sample_value(device_id, result)?;
    match value {
        RecordValue::GlobalAlarmLimitObjective(objective) => {
            // Mirror the fleet-wide request into a per-device application.
            Some(ObjectiveCommand::AlarmLimit(LocalAlarmLimitObjective {
                device_id: device_id.clone(),
                metric_id: objective.metric_id,
                limit_type: objective.limit_type,
                value: objective.value,
                unit_id: objective.unit_id,
                requestor: objective.requestor,
            }))
        }
        _ => None,
    }
}

fn infusion_command(device_id: &DeviceId, result: RecvResult) -> Option<ObjectiveCommand> {
    let (_, value) = sample_value(device_id, result)?;
    match value {
        RecordValue::InfusionObjective(objective) if objective.device_id == *device_id => {
            Some(ObjectiveCommand::Infusion(objective))
        }
        _ => None,
    }
}

fn program_command(device_id: &DeviceId, result: RecvResult) -> Option<ObjectiveCommand> {
    let (_, value) = sample_value(device_id, result)?;
    match value {
        RecordValue::InfusionProgram(program) if program.device_id == *device_id => {
            Some(ObjectiveCommand::Program(program))
        }
        _ => None,
    }
}
