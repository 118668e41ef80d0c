//! [`InstanceView`] – consumer-side mirror of live instances.
//!
//! Folds a topic's sample stream into a key → current-value map:
//! `Registered` / `Updated` upsert, `Unregistered` removes.  Removal is
//! idempotent — repeated delivery of "gone" is safe.
//!
//! A view only mirrors *data* liveliness.  Whether the publishing
//! participant is still alive is the heartbeat monitor's job; topic silence
//! here proves nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;
use vitalink_types::{InstanceKey, RecordValue, Sample, SampleEvent};

use crate::bus::TopicReceiver;

/// Mirror of the live instances observed on one or more topic lanes.
///
/// Clone it cheaply – all clones share the same underlying map.
#[derive(Clone, Default)]
pub struct InstanceView {
    inner: Arc<Mutex<HashMap<InstanceKey, RecordValue>>>,
}

impl InstanceView {
    /// Creates a new, empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample into the view.
    pub fn apply(&self, sample: &Sample) {
        let mut inner = self.inner.lock().expect("instance view poisoned");
        match &sample.event {
            SampleEvent::Registered(value) | SampleEvent::Updated(value) => {
                inner.insert(sample.key.clone(), value.clone());
            }
            SampleEvent::Unregistered => {
                // Idempotent: removing an absent key is safe.
                inner.remove(&sample.key);
            }
        }
    }

    /// Spawn a background listener that folds every sample from `receiver`
    /// into the view until the lane closes.
    ///
    /// Lag is logged and skipped: every sample is a full value, so the view
    /// reconverges on the next sample for each key.
    pub fn spawn_listener(&self, mut receiver: TopicReceiver) -> JoinHandle<()> {
        let view = self.clone();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(sample) => view.apply(&sample),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(topic = %receiver.topic(), missed, "instance view lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Current value of an instance, if live.
    pub fn get(&self, key: &InstanceKey) -> Option<RecordValue> {
        let inner = self.inner.lock().expect("instance view poisoned");
        inner.get(key).cloned()
    }

    /// Snapshot of every live instance.
    pub fn snapshot(&self) -> HashMap<InstanceKey, RecordValue> {
        self.inner.lock().expect("instance view poisoned").clone()
    }

    /// Number of live instances in the view.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("instance view poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalink_types::{
        DeviceId, HeartBeat, KeyedRecord, ParticipantKind, Topic, WallClock,
    };

    use crate::bus::SampleBus;
    use crate::registry::InstanceRegistry;

    fn heartbeat(device: &str) -> HeartBeat {
        HeartBeat {
            device_id: DeviceId::new(device).unwrap(),
            kind: ParticipantKind::Device,
        }
    }

    #[test]
    fn apply_upserts_and_removes() {
        let view = InstanceView::new();
        let hb = heartbeat("pox-1");
        let key = hb.key();

        view.apply(&Sample {
            key: key.clone(),
            seq: 0,
            source: hb.device_id.clone(),
            publish_time: WallClock::now(),
            event: SampleEvent::Registered(hb.clone().into()),
        });
        assert!(view.get(&key).is_some());

        view.apply(&Sample {
            key: key.clone(),
            seq: 1,
            source: hb.device_id.clone(),
            publish_time: WallClock::now(),
            event: SampleEvent::Unregistered,
        });
        assert!(view.get(&key).is_none());

        // Repeated "gone" is safe.
        view.apply(&Sample {
            key: key.clone(),
            seq: 2,
            source: hb.device_id.clone(),
            publish_time: WallClock::now(),
            event: SampleEvent::Unregistered,
        });
        assert!(view.is_empty());
    }

    #[tokio::test]
    async fn listener_mirrors_registry_lifecycle() {
        let bus = SampleBus::default();
        let registry = InstanceRegistry::new(DeviceId::new("pox-1").unwrap(), bus.clone());

        let view = InstanceView::new();
        view.spawn_listener(bus.subscribe(Topic::HeartBeat));
        // Give the listener a chance to subscribe before publishing.
        tokio::task::yield_now().await;

        let handle = registry.register(heartbeat("pox-1")).unwrap();

        // Wait until the listener has folded the registration.
        for _ in 0..50 {
            if !view.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(view.len(), 1);

        registry.unregister(&handle).unwrap();
        for _ in 0..50 {
            if view.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(view.is_empty());
    }
}
