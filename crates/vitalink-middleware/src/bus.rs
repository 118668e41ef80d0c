//! Typed, topic-based publish/subscribe sample bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every sample without any single subscriber blocking
//! the others.  Traffic is partitioned into one lane per [`Topic`] so
//! components only receive the records they care about.
//!
//! Publishing is fire-and-forget: it never blocks, and zero subscribers is a
//! normal condition.  Delivery to a lagging subscriber surfaces as a
//! [`broadcast::error::RecvError::Lagged`] on the receiving side; the sample
//! stream stays consistent because every sample carries full field values
//! rather than deltas.

use std::collections::HashMap;

use tokio::sync::broadcast;
use vitalink_types::{Sample, Topic};

/// Default lane capacity (number of buffered samples before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared sample bus.  Clone it cheaply – all clones share the same
/// underlying broadcast lanes.
#[derive(Clone, Debug)]
pub struct SampleBus {
    lanes: HashMap<Topic, broadcast::Sender<Sample>>,
}

impl SampleBus {
    /// Create a new bus with the given per-lane capacity.
    pub fn new(capacity: usize) -> Self {
        let lanes = Topic::ALL
            .into_iter()
            .map(|topic| (topic, broadcast::channel(capacity).0))
            .collect();
        Self { lanes }
    }

    /// Publish `sample` onto its topic's lane.
    ///
    /// Returns the number of active receivers that were handed the sample;
    /// `0` when nobody is listening (normal, not an error).
    pub fn publish(&self, sample: Sample) -> usize {
        let topic = sample.key.topic();
        self.lane(topic).send(sample).unwrap_or(0)
    }

    /// Subscribe to one topic's lane.
    pub fn subscribe(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.lane(topic).subscribe(),
        }
    }

    /// Number of active receivers on `topic`'s lane.
    pub fn receiver_count(&self, topic: Topic) -> usize {
        self.lane(topic).receiver_count()
    }

    fn lane(&self, topic: Topic) -> &broadcast::Sender<Sample> {
        // Every topic gets a lane in `new`; the map is total over Topic::ALL.
        &self.lanes[&topic]
    }
}

impl Default for SampleBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single topic lane.
///
/// Obtained via [`SampleBus::subscribe`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Sample>,
}

impl TopicReceiver {
    /// Wait for the next sample on this topic.
    ///
    /// Returns:
    /// * `Ok(sample)` – a successfully received sample.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   samples were dropped.  The caller decides whether to continue.
    /// * `Err(RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Sample, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalink_types::{
        DeviceId, HeartBeat, KeyedRecord, ParticipantKind, SampleEvent, WallClock,
    };

    fn heartbeat_sample(device: &str, seq: u64) -> Sample {
        let hb = HeartBeat {
            device_id: DeviceId::new(device).unwrap(),
            kind: ParticipantKind::Device,
        };
        Sample {
            key: hb.key(),
            seq,
            source: hb.device_id.clone(),
            publish_time: WallClock::now(),
            event: SampleEvent::Updated(hb.into()),
        }
    }

    #[test]
    fn publish_without_subscribers_is_normal() {
        let bus = SampleBus::default();
        assert_eq!(bus.publish(heartbeat_sample("pox-1", 0)), 0);
    }

    #[tokio::test]
    async fn publish_and_receive_on_same_lane() {
        let bus = SampleBus::default();
        let mut rx = bus.subscribe(Topic::HeartBeat);

        let sample = heartbeat_sample("pox-1", 0);
        assert_eq!(bus.publish(sample.clone()), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, sample);
    }

    #[tokio::test]
    async fn lanes_are_isolated() {
        let bus = SampleBus::default();
        let mut numeric_rx = bus.subscribe(Topic::Numeric);
        let _heartbeat_rx = bus.subscribe(Topic::HeartBeat);

        bus.publish(heartbeat_sample("pox-1", 0));

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            numeric_rx.recv(),
        )
        .await;
        assert!(result.is_err(), "Numeric lane must not see HeartBeat traffic");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_sample() {
        let bus = SampleBus::default();
        let mut rx1 = bus.subscribe(Topic::HeartBeat);
        let mut rx2 = bus.subscribe(Topic::HeartBeat);

        let sample = heartbeat_sample("pox-1", 4);
        assert_eq!(bus.publish(sample.clone()), 2);

        assert_eq!(rx1.recv().await.unwrap(), sample);
        assert_eq!(rx2.recv().await.unwrap(), sample);
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag_not_corruption() {
        let bus = SampleBus::new(8);
        let mut slow = bus.subscribe(Topic::HeartBeat);

        for seq in 0..100 {
            bus.publish(heartbeat_sample("pox-1", seq));
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged, got {result:?}"
        );
    }
}
