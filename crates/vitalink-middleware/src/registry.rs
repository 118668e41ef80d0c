//! [`InstanceRegistry`] – the keyed-instance lifecycle manager.
//!
//! Tracks, per topic, the set of live instances and their current field
//! values, and exposes registration / update / unregistration as explicit
//! operations.  Each successful mutation publishes exactly one outbound
//! [`Sample`] on the bus.
//!
//! # Ordering
//!
//! Mutation and publication happen under one lock, so the samples emitted
//! for a given key are causally ordered: updates for the same key are never
//! delivered out of publish order.  Cross-key ordering is unspecified.
//!
//! # Handles
//!
//! Every registration mints a fresh [`InstanceHandle`].  Handles are
//! uuid-tagged so a stale handle can never mutate a later re-registration of
//! the same key: after `unregister`, the key is free for a fresh `register`,
//! and the old handle keeps failing with
//! [`VitaError::UnknownInstance`] forever.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;
use uuid::Uuid;
use vitalink_types::{
    DeviceId, InstanceKey, RecordValue, Sample, SampleEvent, Topic, VitaError, WallClock,
};

use crate::bus::SampleBus;

/// Capability token returned by [`InstanceRegistry::register`], scoped to
/// later `update` / `unregister` calls on that instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    id: Uuid,
    key: InstanceKey,
}

impl InstanceHandle {
    /// Key tuple of the instance this handle is scoped to.
    pub fn key(&self) -> &InstanceKey {
        &self.key
    }
}

struct Slot {
    handle_id: Uuid,
    seq: u64,
    value: RecordValue,
}

/// Per-participant keyed-instance state and the only sanctioned mutator of
/// it.  Construct once per participant and share via `Arc`.
pub struct InstanceRegistry {
    participant: DeviceId,
    bus: SampleBus,
    inner: Mutex<HashMap<InstanceKey, Slot>>,
}

impl InstanceRegistry {
    pub fn new(participant: DeviceId, bus: SampleBus) -> Self {
        Self {
            participant,
            bus,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Participant this registry publishes as.
    pub fn participant(&self) -> &DeviceId {
        &self.participant
    }

    /// The bus this registry publishes onto.
    pub fn bus(&self) -> &SampleBus {
        &self.bus
    }

    /// Register a new instance for `record`'s key tuple.
    ///
    /// Publishes one `Registered` sample.
    ///
    /// # Errors
    ///
    /// [`VitaError::DuplicateKey`] when a live instance already exists for
    /// the key; the caller must pick a different key or treat the instance
    /// as already registered.
    pub fn register(&self, record: impl Into<RecordValue>) -> Result<InstanceHandle, VitaError> {
        let value = record.into();
        let key = value.key();
        let mut inner = self.inner.lock().expect("instance registry poisoned");

        if inner.contains_key(&key) {
            return Err(VitaError::DuplicateKey { key });
        }

        let handle = InstanceHandle {
            id: Uuid::new_v4(),
            key: key.clone(),
        };
        inner.insert(
            key.clone(),
            Slot {
                handle_id: handle.id,
                seq: 0,
                value: value.clone(),
            },
        );
        debug!(topic = %key.topic(), "instance registered");
        self.bus.publish(Sample {
            key,
            seq: 0,
            source: self.participant.clone(),
            publish_time: WallClock::now(),
            event: SampleEvent::Registered(value),
        });
        Ok(handle)
    }

    /// Replace all non-key fields of the handle's instance atomically.
    ///
    /// Publishes one `Updated` sample.
    ///
    /// # Errors
    ///
    /// * [`VitaError::UnknownInstance`] when the handle's instance was
    ///   unregistered (or superseded by a re-registration of the key).
    /// * [`VitaError::InvalidRecord`] when `record`'s key fields differ from
    ///   the handle's — an update can never move an instance to a new key.
    pub fn update(
        &self,
        handle: &InstanceHandle,
        record: impl Into<RecordValue>,
    ) -> Result<(), VitaError> {
        let value = record.into();
        if value.key() != handle.key {
            return Err(VitaError::InvalidRecord {
                reason: format!(
                    "update for {:?} does not match the handle's key",
                    value.key()
                ),
            });
        }

        let mut inner = self.inner.lock().expect("instance registry poisoned");
        let slot = inner
            .get_mut(&handle.key)
            .filter(|slot| slot.handle_id == handle.id)
            .ok_or_else(|| VitaError::UnknownInstance {
                key: handle.key.clone(),
            })?;

        slot.seq += 1;
        slot.value = value.clone();
        let seq = slot.seq;
        self.bus.publish(Sample {
            key: handle.key.clone(),
            seq,
            source: self.participant.clone(),
            publish_time: WallClock::now(),
            event: SampleEvent::Updated(value),
        });
        Ok(())
    }

    /// Withdraw the handle's instance.
    ///
    /// Publishes one `Unregistered` sample and frees the key for a fresh
    /// `register`.  The terminal transition is atomic: the instance never
    /// partially unregisters.
    ///
    /// # Errors
    ///
    /// [`VitaError::UnknownInstance`] when the instance is already gone —
    /// including a second unregister through the same handle.
    pub fn unregister(&self, handle: &InstanceHandle) -> Result<(), VitaError> {
        let mut inner = self.inner.lock().expect("instance registry poisoned");
        let live = inner
            .get(&handle.key)
            .is_some_and(|slot| slot.handle_id == handle.id);
        if !live {
            return Err(VitaError::UnknownInstance {
                key: handle.key.clone(),
            });
        }

        let slot = inner.remove(&handle.key).expect("checked above");
        debug!(topic = %handle.key.topic(), "instance unregistered");
        self.bus.publish(Sample {
            key: handle.key.clone(),
            seq: slot.seq + 1,
            source: self.participant.clone(),
            publish_time: WallClock::now(),
            event: SampleEvent::Unregistered,
        });
        Ok(())
    }

    /// Keys of every live instance on `topic`, in unspecified order.
    pub fn live_keys(&self, topic: Topic) -> Vec<InstanceKey> {
        let inner = self.inner.lock().expect("instance registry poisoned");
        inner
            .keys()
            .filter(|key| key.topic() == topic)
            .cloned()
            .collect()
    }

    /// Current value of a live instance, if any.
    pub fn value(&self, key: &InstanceKey) -> Option<RecordValue> {
        let inner = self.inner.lock().expect("instance registry poisoned");
        inner.get(key).map(|slot| slot.value.clone())
    }
}
