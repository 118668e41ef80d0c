//! Bus sample envelope: one lifecycle transition of one keyed instance.
//!
//! Samples are self-contained full-value records, never deltas, so a dropped
//! sample merely delays convergence and can never corrupt instance state.

use serde::{Deserialize, Serialize};

use crate::ident::DeviceId;
use crate::time::WallClock;
use crate::topic::InstanceKey;
use crate::value::RecordValue;

/// The lifecycle transition a sample reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleEvent {
    /// First publish with this key tuple; the instance is now live.
    Registered(RecordValue),
    /// Subsequent publish with the same key; non-key fields replaced
    /// wholesale.
    Updated(RecordValue),
    /// Explicit withdrawal; subscribers must treat the instance as gone.
    Unregistered,
}

impl SampleEvent {
    /// The carried record, when the transition has one.
    pub fn value(&self) -> Option<&RecordValue> {
        match self {
            SampleEvent::Registered(value) | SampleEvent::Updated(value) => Some(value),
            SampleEvent::Unregistered => None,
        }
    }
}

/// One publication on the bus.
///
/// `seq` increases by one per publication of the same instance and restarts
/// at zero when the key is re-registered after withdrawal — per-key ordering
/// is observable, cross-key ordering is unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub key: InstanceKey,
    pub seq: u64,
    /// Participant that produced the sample.
    pub source: DeviceId,
    pub publish_time: WallClock,
    pub event: SampleEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveliness::{HeartBeat, ParticipantKind};
    use crate::topic::KeyedRecord;

    #[test]
    fn unregistered_carries_no_value() {
        let hb = HeartBeat {
            device_id: DeviceId::new("pox-1").unwrap(),
            kind: ParticipantKind::Device,
        };
        let sample = Sample {
            key: hb.key(),
            seq: 3,
            source: hb.device_id.clone(),
            publish_time: WallClock::new(10, 0).unwrap(),
            event: SampleEvent::Unregistered,
        };
        assert!(sample.event.value().is_none());

        let registered = Sample {
            event: SampleEvent::Registered(hb.clone().into()),
            ..sample
        };
        assert!(registered.event.value().is_some());
    }
}
