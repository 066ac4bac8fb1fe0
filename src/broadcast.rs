//! # Broadcast Hub
//!
//! Replicates processing events (transcript, response text, media references)
//! to any number of passive observer connections. The hub keeps a bounded ring
//! of recent events; a newly joined observer gets the ring replayed in
//! insertion order before receiving live events.
//!
//! Delivery is per-observer over an unbounded channel, so a slow or broken
//! observer never blocks the publisher or its peers. A send into a dropped
//! receiver evicts that observer from the registry.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// A processing event fanned out to observers.
///
/// Serialized as `{"type": "transcription"|"response", "text", "media_ref",
/// "timestamp"}` on the observer wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    /// Emitted right after speech-to-text completes.
    Transcription {
        text: String,
        media_ref: Option<String>,
        timestamp: String,
    },
    /// Emitted right after the response audio is synthesized.
    Response {
        text: String,
        media_ref: Option<String>,
        timestamp: String,
    },
}

impl BroadcastEvent {
    pub fn transcription(text: impl Into<String>, media_ref: Option<String>) -> Self {
        BroadcastEvent::Transcription {
            text: text.into(),
            media_ref,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn response(text: impl Into<String>, media_ref: Option<String>) -> Self {
        BroadcastEvent::Response {
            text: text.into(),
            media_ref,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Identifies one registered observer; pass back to [`BroadcastHub::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle(usize);

struct HubInner {
    next_id: usize,
    observers: HashMap<usize, mpsc::UnboundedSender<BroadcastEvent>>,
    history: VecDeque<BroadcastEvent>,
}

/// Registry of observers plus the bounded event ring.
pub struct BroadcastHub {
    capacity: usize,
    inner: Mutex<HubInner>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(HubInner {
                next_id: 0,
                observers: HashMap::new(),
                history: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Register an observer. History is replayed into the returned channel in
    /// insertion order before any live event can arrive.
    pub fn join(&self) -> (ObserverHandle, mpsc::UnboundedReceiver<BroadcastEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();

        for event in inner.history.iter() {
            // The receiver is still in scope, the send cannot fail yet.
            let _ = tx.send(event.clone());
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.observers.insert(id, tx);
        debug!(observer = id, replayed = inner.history.len(), "observer joined");
        (ObserverHandle(id), rx)
    }

    /// Append to the ring (evicting the oldest beyond capacity) and fan out.
    /// Observers whose receiver is gone are evicted.
    pub fn publish(&self, event: BroadcastEvent) {
        let mut inner = self.inner.lock().unwrap();

        if inner.history.len() == self.capacity {
            inner.history.pop_front();
        }
        inner.history.push_back(event.clone());

        inner
            .observers
            .retain(|id, tx| match tx.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!(observer = id, "observer gone, removing");
                    false
                }
            });
    }

    pub fn leave(&self, handle: ObserverHandle) {
        let mut inner = self.inner.lock().unwrap();
        if inner.observers.remove(&handle.0).is_some() {
            debug!(observer = handle.0, "observer left");
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().unwrap().observers.len()
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().unwrap().history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: usize) -> BroadcastEvent {
        BroadcastEvent::Transcription {
            text: format!("event {}", n),
            media_ref: None,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fan_out_preserves_order() {
        let hub = BroadcastHub::new(100);
        let (_h1, mut rx1) = hub.join();
        let (_h2, mut rx2) = hub.join();

        hub.publish(BroadcastEvent::transcription("what is this", None));
        hub.publish(BroadcastEvent::response("a fern", Some("response_1.wav".into())));

        for rx in [&mut rx1, &mut rx2] {
            let first = rx.try_recv().unwrap();
            let second = rx.try_recv().unwrap();
            assert!(matches!(first, BroadcastEvent::Transcription { .. }));
            assert!(matches!(second, BroadcastEvent::Response { .. }));
        }
    }

    #[tokio::test]
    async fn test_late_joiner_replays_history_in_order() {
        let hub = BroadcastHub::new(100);
        hub.publish(event(0));
        hub.publish(event(1));
        hub.publish(event(2));

        let (_h, mut rx) = hub.join();
        for expected in 0..3 {
            match rx.try_recv().unwrap() {
                BroadcastEvent::Transcription { text, .. } => {
                    assert_eq!(text, format!("event {}", expected));
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ring_evicts_oldest() {
        let hub = BroadcastHub::new(3);
        for n in 0..5 {
            hub.publish(event(n));
        }
        assert_eq!(hub.history_len(), 3);

        let (_h, mut rx) = hub.join();
        let texts: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| match e {
                BroadcastEvent::Transcription { text, .. } => text,
                BroadcastEvent::Response { text, .. } => text,
            })
            .collect();
        assert_eq!(texts, vec!["event 2", "event 3", "event 4"]);
    }

    #[tokio::test]
    async fn test_dead_observer_is_evicted() {
        let hub = BroadcastHub::new(100);
        let (_h1, rx1) = hub.join();
        let (_h2, mut rx2) = hub.join();
        assert_eq!(hub.observer_count(), 2);

        drop(rx1);
        hub.publish(event(0));

        // The broken observer is gone, the healthy one still gets the event
        assert_eq!(hub.observer_count(), 1);
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_leave_deregisters() {
        let hub = BroadcastHub::new(100);
        let (h, mut rx) = hub.join();
        hub.leave(h);
        assert_eq!(hub.observer_count(), 0);

        hub.publish(event(0));
        // Channel was dropped from the registry; nothing new arrives
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_two_observers_then_late_joiner() {
        // Scenario: both live observers see both events in publish order, and
        // an observer joining afterwards replays them identically.
        let hub = BroadcastHub::new(100);
        let (_h1, mut rx1) = hub.join();
        let (_h2, mut rx2) = hub.join();

        hub.publish(BroadcastEvent::transcription("turn on the light", None));
        hub.publish(BroadcastEvent::response("done", Some("response_7.wav".into())));

        let collect = |rx: &mut mpsc::UnboundedReceiver<BroadcastEvent>| {
            let mut seen = Vec::new();
            while let Ok(e) = rx.try_recv() {
                seen.push(e);
            }
            seen
        };

        let seen1 = collect(&mut rx1);
        let seen2 = collect(&mut rx2);
        assert_eq!(seen1.len(), 2);
        assert_eq!(seen1, seen2);

        let (_h3, mut rx3) = hub.join();
        let seen3 = collect(&mut rx3);
        assert_eq!(seen3, seen1);
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(BroadcastEvent::Transcription {
            text: "hello".into(),
            media_ref: Some("image_5.jpg".into()),
            timestamp: "2026-01-01T00:00:00Z".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "transcription");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["media_ref"], "image_5.jpg");
        assert_eq!(json["timestamp"], "2026-01-01T00:00:00Z");
    }
}
