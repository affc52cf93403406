//! Fan-out of typed events to connected observers.
//!
//! Each observer owns a bounded mailbox; the fabric never blocks a producer
//! on a slow consumer — when an observer's mailbox is full, the oldest
//! buffered event for *that observer only* is dropped to make room (§4.2).
//! Observer disconnection is not an error for producers: publishing to a
//! deregistered or dropped observer is simply a no-op.

use std::collections::VecDeque;
use std::sync::Arc;

use agentctl_core::types::{BackgroundTask, Message, Notable, PressureLevel};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

/// Default per-observer mailbox capacity before drop-oldest kicks in.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// One event published to observers, tagged with its wire `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BroadcastEvent {
    Message(Message),
    Token { stream_id: String, text: String },
    Reasoning { stream_id: String, text: String },
    State { mode: String, delay: Value },
    Notable(Notable),
    ContextPressure {
        tokens: u64,
        max: u64,
        ratio: f64,
        level: PressureLevel,
    },
    FsmState { state: String, turn_number: u64 },
    Task(BackgroundTask),
}

struct Mailbox {
    queue: std::sync::Mutex<VecDeque<Arc<BroadcastEvent>>>,
    notify: Notify,
    capacity: usize,
}

impl Mailbox {
    fn push(&self, event: Arc<BroadcastEvent>) {
        let mut queue = self.queue.lock().expect("mailbox mutex poisoned");
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }
}

/// Unique registration handle for one connected observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// The fan-out fabric. Cheap to clone — internally an `Arc<DashMap<..>>`.
#[derive(Clone, Default)]
pub struct BroadcastFabric {
    observers: Arc<DashMap<ObserverId, Arc<Mailbox>>>,
}

impl BroadcastFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer and return a handle to both identify it for
    /// `deregister` and to pull events from its mailbox.
    pub fn register(&self) -> (ObserverId, ObserverHandle) {
        self.register_with_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    pub fn register_with_capacity(&self, capacity: usize) -> (ObserverId, ObserverHandle) {
        let id = ObserverId::new();
        let mailbox = Arc::new(Mailbox {
            queue: std::sync::Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
        });
        self.observers.insert(id, Arc::clone(&mailbox));
        (id, ObserverHandle { mailbox })
    }

    /// Deregister an observer. Not an error if it is already gone.
    pub fn deregister(&self, id: ObserverId) {
        self.observers.remove(&id);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Publish an event to every currently-registered observer, in the order
    /// this call was made relative to other `publish` calls.
    pub fn publish(&self, event: BroadcastEvent) {
        let event = Arc::new(event);
        for entry in self.observers.iter() {
            entry.value().push(Arc::clone(&event));
        }
    }
}

/// Per-observer receive side. Each observer sees events in the order the
/// fabric enqueued them; polling is cooperative via `recv`.
pub struct ObserverHandle {
    mailbox: Arc<Mailbox>,
}

impl ObserverHandle {
    /// Wait for and return the next event, in FIFO order for this observer.
    pub async fn recv(&self) -> Arc<BroadcastEvent> {
        loop {
            if let Some(event) = self.try_recv() {
                return event;
            }
            self.mailbox.notify.notified().await;
        }
    }

    /// Non-blocking pop; `None` if the mailbox is currently empty.
    pub fn try_recv(&self) -> Option<Arc<BroadcastEvent>> {
        self.mailbox
            .queue
            .lock()
            .expect("mailbox mutex poisoned")
            .pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_enqueue_order() {
        let fabric = BroadcastFabric::new();
        let (_id, handle) = fabric.register();
        fabric.publish(BroadcastEvent::Token {
            stream_id: "s1".into(),
            text: "a".into(),
        });
        fabric.publish(BroadcastEvent::Token {
            stream_id: "s1".into(),
            text: "b".into(),
        });
        let first = handle.recv().await;
        let second = handle.recv().await;
        match (&*first, &*second) {
            (BroadcastEvent::Token { text: t1, .. }, BroadcastEvent::Token { text: t2, .. }) => {
                assert_eq!(t1, "a");
                assert_eq!(t2, "b");
            }
            _ => panic!("unexpected event variants"),
        }
    }

    #[tokio::test]
    async fn slow_observer_drops_oldest_not_producer() {
        let fabric = BroadcastFabric::new();
        let (_id, handle) = fabric.register_with_capacity(2);
        for i in 0..5 {
            fabric.publish(BroadcastEvent::Token {
                stream_id: "s1".into(),
                text: i.to_string(),
            });
        }
        // Capacity 2: only the two most recent survive.
        let first = handle.try_recv().unwrap();
        let second = handle.try_recv().unwrap();
        assert!(handle.try_recv().is_none());
        match (&*first, &*second) {
            (BroadcastEvent::Token { text: t1, .. }, BroadcastEvent::Token { text: t2, .. }) => {
                assert_eq!(t1, "3");
                assert_eq!(t2, "4");
            }
            _ => panic!("unexpected event variants"),
        }
    }

    #[tokio::test]
    async fn deregistered_observer_is_not_an_error() {
        let fabric = BroadcastFabric::new();
        let (id, _handle) = fabric.register();
        fabric.deregister(id);
        // Publishing with zero observers must not panic or block.
        fabric.publish(BroadcastEvent::Notable(Notable {
            id: 1,
            label: "x".into(),
            content: "y".into(),
            reason: None,
            timestamp: chrono::Utc::now(),
            message_id: None,
        }));
        assert_eq!(fabric.observer_count(), 0);
    }
}
