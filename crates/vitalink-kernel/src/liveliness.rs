//! [`LivelinessMonitor`] – heartbeat-based participant presence.
//!
//! Every participant publishes a `HeartBeat` on a fixed period (reference:
//! 2 seconds).  A device is declared [`Presence::Absent`] only after a full
//! grace window (`period * grace_periods`) of heartbeat silence — never from
//! silence on data topics.  The view is eventually consistent by design: it
//! lags a real disconnection by up to the grace window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};
use vitalink_types::{DeviceId, RecordValue, SampleEvent};
use vitalink_middleware::TopicReceiver;

/// Presence of a participant as inferred from heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// A heartbeat arrived within the grace window.
    Present,
    /// No heartbeat for a full grace window (or the device is unknown).
    Absent,
}

/// Tracks the most recent heartbeat per device and derives presence.
///
/// Clone it cheaply – all clones share the same underlying map.
#[derive(Clone)]
pub struct LivelinessMonitor {
    inner: Arc<Mutex<HashMap<DeviceId, Instant>>>,
    period: Duration,
    grace_periods: u32,
}

impl LivelinessMonitor {
    /// `period` is the expected heartbeat interval; `grace_periods` is how
    /// many silent periods a consumer tolerates before declaring absence
    /// (reference: 3–5).
    pub fn new(period: Duration, grace_periods: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            period,
            grace_periods,
        }
    }

    /// The silence window after which a device is declared absent.
    pub fn grace_window(&self) -> Duration {
        self.period * self.grace_periods
    }

    /// Record a heartbeat from `device`, resetting its deadline.
    pub fn observe(&self, device: &DeviceId) {
        let mut inner = self.inner.lock().expect("liveliness monitor poisoned");
        inner.insert(device.clone(), Instant::now());
    }

    /// Drop a device from tracking (its heartbeat instance was withdrawn).
    pub fn forget(&self, device: &DeviceId) {
        let mut inner = self.inner.lock().expect("liveliness monitor poisoned");
        inner.remove(device);
    }

    /// Presence of `device`.  Unknown devices are [`Presence::Absent`].
    pub fn presence(&self, device: &DeviceId) -> Presence {
        let inner = self.inner.lock().expect("liveliness monitor poisoned");
        match inner.get(device) {
            Some(last) if last.elapsed() <= self.grace_window() => Presence::Present,
            _ => Presence::Absent,
        }
    }

    /// Devices that were heard from at least once and have since exceeded
    /// the grace window.  Order is unspecified.
    pub fn absent_devices(&self) -> Vec<DeviceId> {
        let inner = self.inner.lock().expect("liveliness monitor poisoned");
        let window = self.grace_window();
        inner
            .iter()
            .filter(|(_, last)| last.elapsed() > window)
            .map(|(device, _)| device.clone())
            .collect()
    }

    /// Devices currently inside the grace window.  Order is unspecified.
    pub fn present_devices(&self) -> Vec<DeviceId> {
        let inner = self.inner.lock().expect("liveliness monitor poisoned");
        let window = self.grace_window();
        inner
            .iter()
            .filter(|(_, last)| last.elapsed() <= window)
            .map(|(device, _)| device.clone())
            .collect()
    }

    /// Spawn a background listener that feeds the monitor from the bus's
    /// HeartBeat lane until it closes.
    pub fn spawn_listener(&self, mut receiver: TopicReceiver) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(sample) => match &sample.event {
                        SampleEvent::Registered(RecordValue::HeartBeat(hb))
                        | SampleEvent::Updated(RecordValue::HeartBeat(hb)) => {
                            monitor.observe(&hb.device_id);
                        }
                        SampleEvent::Unregistered => {
                            info!(source = %sample.source, "heartbeat withdrawn");
                            monitor.forget(&sample.source);
                        }
                        _ => {}
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "liveliness listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_heartbeat_is_present() {
        let monitor = LivelinessMonitor::new(Duration::from_secs(2), 3);
        monitor.observe(&device("pox-1"));
        assert_eq!(monitor.presence(&device("pox-1")), Presence::Present);
    }

    #[test]
    fn unknown_device_is_absent() {
        let monitor = LivelinessMonitor::new(Duration::from_secs(2), 3);
        assert_eq!(monitor.presence(&device("ghost")), Presence::Absent);
    }

    /// Grace accounting: with period 2 s and grace 3, a silent device is
    /// still present at 4 s and flagged absent only once 6 s have passed.
    #[tokio::test(start_paused = true)]
    async fn absence_respects_the_grace_window() {
        let monitor = LivelinessMonitor::new(Duration::from_secs(2), 3);
        let d2 = device("d2");
        monitor.observe(&d2);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(monitor.presence(&d2), Presence::Present);
        assert!(monitor.absent_devices().is_empty());

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(monitor.presence(&d2), Presence::Absent);
        assert_eq!(monitor.absent_devices(), vec![d2]);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_resets_the_deadline() {
        let monitor = LivelinessMonitor::new(Duration::from_secs(2), 3);
        let d = device("pox-1");
        monitor.observe(&d);

        tokio::time::sleep(Duration::from_secs(5)).await;
        monitor.observe(&d);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(monitor.presence(&d), Presence::Present);
    }

    #[tokio::test(start_paused = true)]
    async fn forget_drops_tracking() {
        let monitor = LivelinessMonitor::new(Duration::from_secs(2), 3);
        let d = device("pox-1");
        monitor.observe(&d);
        monitor.forget(&d);
        assert_eq!(monitor.presence(&d), Presence::Absent);
        tokio::time::sleep(Duration::from_secs(60)).await;
        // Forgotten devices never show up as absent stragglers.
        assert!(monitor.absent_devices().is_empty());
    }
}
