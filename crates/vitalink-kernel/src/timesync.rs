//! Time synchronisation: heartbeat-triggered replies and offset estimation.
//!
//! On receiving a foreign `HeartBeat`, a participant publishes one
//! `TimeSync` pairing the heartbeat's publish time with its own receipt
//! time.  When that record reaches the original heartbeat source, the source
//! can estimate the recipient's clock offset one-directionally (transit
//! latency included); symmetric estimation needs the reverse pair.
//!
//! No acknowledgment of TimeSync delivery exists, so "clocks synchronized"
//! and "recipient not yet processed" are indistinguishable without a
//! caller-supplied timeout policy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{trace, warn};
use vitalink_types::{
    DeviceId, InstanceKey, RecordValue, SampleEvent, TimeSync, VitaError, WallClock,
};
use vitalink_middleware::{InstanceHandle, InstanceRegistry, TopicReceiver};

/// Publishes one `TimeSync` per observed foreign heartbeat, rate-capped per
/// source.
///
/// The cap defends against a misbehaving participant heartbeating at a
/// pathological rate; it is configuration, not protocol.
pub struct TimeSyncResponder {
    registry: Arc<InstanceRegistry>,
    limiter: DefaultKeyedRateLimiter<DeviceId>,
    handles: Mutex<HashMap<InstanceKey, InstanceHandle>>,
}

impl TimeSyncResponder {
    /// `replies_per_second` caps sustained replies per heartbeat source;
    /// `burst` allows short catch-up bursts (reference: 2/s, burst 4).
    pub fn new(
        registry: Arc<InstanceRegistry>,
        replies_per_second: std::num::NonZeroU32,
        burst: std::num::NonZeroU32,
    ) -> Self {
        let quota = Quota::per_second(replies_per_second).allow_burst(burst);
        Self {
            registry,
            limiter: RateLimiter::keyed(quota),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Consume the HeartBeat lane until it closes, replying with TimeSync
    /// records.
    pub fn spawn(self, mut receiver: TopicReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(sample) => match &sample.event {
                        SampleEvent::Registered(RecordValue::HeartBeat(hb))
                        | SampleEvent::Updated(RecordValue::HeartBeat(hb)) => {
                            self.on_heartbeat(&hb.device_id, sample.publish_time);
                        }
                        SampleEvent::Unregistered => {
                            self.on_departure(&sample.source);
                        }
                        _ => {}
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "time-sync responder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn on_heartbeat(&self, source: &DeviceId, source_timestamp: WallClock) {
        if source == self.registry.participant() {
            return;
        }
        if self.limiter.check_key(source).is_err() {
            trace!(%source, "time-sync reply rate-capped");
            return;
        }

        let reply = TimeSync {
            heartbeat_source: source.clone(),
            heartbeat_recipient: self.registry.participant().clone(),
            source_timestamp,
            recipient_receipt_timestamp: WallClock::now(),
        };
        let key = vitalink_types::KeyedRecord::key(&reply);

        let mut handles = self.handles.lock().expect("time-sync handles poisoned");
        let refreshed = match handles.get(&key) {
            Some(handle) => self.registry.update(handle, reply.clone()).is_ok(),
            None => false,
        };
        if !refreshed {
            match self.registry.register(reply) {
                Ok(handle) => {
                    handles.insert(key, handle);
                }
                Err(error) => warn!(%source, %error, "time-sync publish failed"),
            }
        }
    }

    fn on_departure(&self, source: &DeviceId) {
        let mut handles = self.handles.lock().expect("time-sync handles poisoned");
        let departed: Vec<InstanceKey> = handles
            .keys()
            .filter(|key| {
                matches!(
                    key.fields().first(),
                    Some(vitalink_types::KeyField::Text(id)) if id == source.as_str()
                )
            })
            .cloned()
            .collect();
        for key in departed {
            if let Some(handle) = handles.remove(&key) {
                let _ = self.registry.unregister(&handle);
            }
        }
    }
}

/// Latest one-directional clock-offset estimate for one peer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetEstimate {
    /// `recipient_receipt - source_send`, in nanoseconds.  Includes transit
    /// latency.
    pub offset_nanos: i64,
    /// When the estimate was folded in, per the local clock.
    pub measured_at: WallClock,
}

/// Folds `TimeSync` records addressed to this participant into per-peer
/// offset estimates.
///
/// Clone it cheaply – all clones share the same underlying map.
#[derive(Clone)]
pub struct ClockOffsetEstimator {
    self_id: DeviceId,
    inner: Arc<Mutex<HashMap<DeviceId, OffsetEstimate>>>,
}

impl ClockOffsetEstimator {
    pub fn new(self_id: DeviceId) -> Self {
        Self {
            self_id,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fold one record in.  Records whose `heartbeat_source` is another
    /// participant are ignored — they estimate someone else's clock.
    pub fn ingest(&self, record: &TimeSync) {
        if record.heartbeat_source != self.self_id {
            return;
        }
        let offset = record
            .recipient_receipt_timestamp
            .delta_nanos(record.source_timestamp)
            .clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        let mut inner = self.inner.lock().expect("offset estimator poisoned");
        inner.insert(
            record.heartbeat_recipient.clone(),
            OffsetEstimate {
                offset_nanos: offset,
                measured_at: WallClock::now(),
            },
        );
    }

    /// Latest estimate for `peer`, if any heartbeat of ours was answered.
    pub fn offset(&self, peer: &DeviceId) -> Option<OffsetEstimate> {
        let inner = self.inner.lock().expect("offset estimator poisoned");
        inner.get(peer).copied()
    }

    /// Peers whose estimated |offset| exceeds `threshold`.
    ///
    /// Advisory only — stale clocks never block data flow.
    pub fn stale_peers(&self, threshold: Duration) -> Vec<(DeviceId, OffsetEstimate)> {
        let limit = threshold.as_nanos().min(i64::MAX as u128) as i64;
        let inner = self.inner.lock().expect("offset estimator poisoned");
        inner
            .iter()
            .filter(|(_, estimate)| estimate.offset_nanos.abs() > limit)
            .map(|(peer, estimate)| (peer.clone(), *estimate))
            .collect()
    }

    /// Advisory check for one peer.
    ///
    /// # Errors
    ///
    /// [`VitaError::StaleClock`] when the peer's |offset| exceeds
    /// `threshold`.  Absence of an estimate is not an error — it means "not
    /// yet measured", which only a caller-side timeout can distinguish from
    /// a dead peer.
    pub fn verify(&self, peer: &DeviceId, threshold: Duration) -> Result<(), VitaError> {
        let limit = threshold.as_nanos().min(i64::MAX as u128) as i64;
        match self.offset(peer) {
            Some(estimate) if estimate.offset_nanos.abs() > limit => Err(VitaError::StaleClock {
                peer: peer.to_string(),
                offset_nanos: estimate.offset_nanos,
            }),
            _ => Ok(()),
        }
    }

    /// Spawn a background listener folding the TimeSync lane into the
    /// estimator until the lane closes.
    pub fn spawn_listener(&self, mut receiver: TopicReceiver) -> JoinHandle<()> {
        let estimator = self.clone();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(sample) => {
                        if let Some(RecordValue::TimeSync(record)) = sample.event.value() {
                            estimator.ingest(record);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "offset estimator lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
