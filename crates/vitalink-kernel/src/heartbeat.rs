//! [`HeartbeatPublisher`] – periodic liveness announcement.
//!
//! Registers the participant's `HeartBeat` instance once and republishes it
//! on a fixed period until stopped.  Stopping withdraws the instance so that
//! listeners can distinguish a clean departure from heartbeat silence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use vitalink_types::{HeartBeat, ParticipantKind, VitaError};
use vitalink_middleware::InstanceRegistry;

/// Builder for the heartbeat task of one participant.
pub struct HeartbeatPublisher {
    registry: Arc<InstanceRegistry>,
    kind: ParticipantKind,
    period: Duration,
}

impl HeartbeatPublisher {
    /// Reference period is 2 seconds.
    pub fn new(registry: Arc<InstanceRegistry>, kind: ParticipantKind, period: Duration) -> Self {
        Self {
            registry,
            kind,
            period,
        }
    }

    /// Register the heartbeat instance and start the periodic republish
    /// task.
    ///
    /// # Errors
    ///
    /// [`VitaError::DuplicateKey`] when this participant already has a live
    /// heartbeat instance.
    pub fn spawn(self) -> Result<HeartbeatTask, VitaError> {
        let Self {
            registry,
            kind,
            period,
        } = self;
        let heartbeat = HeartBeat {
            device_id: registry.participant().clone(),
            kind,
        };
        let handle = registry.register(heartbeat.clone())?;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the registration above
            // already announced us.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if registry.update(&handle, heartbeat.clone()).is_err() {
                            // Instance withdrawn out from under us.
                            break;
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_ok() {
                            let _ = registry.unregister(&handle);
                            debug!(device = %heartbeat.device_id, "heartbeat stopped");
                        }
                        // A dropped task handle leaves the instance
                        // registered and silent, like a crashed device.
                        break;
                    }
                }
            }
        });
        Ok(HeartbeatTask {
            stop: stop_tx,
            join,
        })
    }
}

/// Running heartbeat task.  Dropping it without [`HeartbeatTask::shutdown`]
/// leaves the instance registered and silent — listeners will flag the
/// participant absent after their grace window.
#[derive(Debug)]
pub struct HeartbeatTask {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl HeartbeatTask {
    /// Request the task to stop and withdraw the heartbeat instance.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Stop and wait for the task to finish.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.join.await;
    }
}
