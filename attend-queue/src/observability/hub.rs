use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_core::Stream;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::warn;

use crate::JobEvent;

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Synchronous observer of queue notifications
pub type EventListener = Arc<dyn Fn(&JobEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(LISTENER_ID.fetch_add(1, Ordering::Relaxed))
}

/// Fan-out of job notifications.
///
/// Listeners run inline, in registration order, on whichever task emitted the
/// event. Emission clones the listener list first so no lock is held while
/// listeners run; a listener may register or remove listeners re-entrantly.
/// Async consumers can use `stream()` instead, which never blocks emitters.
pub struct EventHub {
    listeners: RwLock<Vec<(ListenerId, EventListener)>>,
    broadcaster: broadcast::Sender<JobEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (broadcaster, _) = broadcast::channel(capacity);
        Self {
            listeners: RwLock::new(Vec::new()),
            broadcaster,
        }
    }

    pub fn on(&self, listener: EventListener) -> ListenerId {
        let id = next_listener_id();
        self.listeners.write().push((id, listener));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(entry, _)| *entry != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn emit(&self, event: JobEvent) {
        let snapshot: Vec<EventListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(event = event.event_name(), job_id = %event.job_id(), "event listener panicked");
            }
        }

        // No subscribers is not an error
        let _ = self.broadcaster.send(event);
    }

    /// Stream of events emitted after this call; lagging consumers skip ahead
    pub fn stream(&self) -> BoxStream<JobEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};

        let receiver = self.broadcaster.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|result| result.ok());
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobId;
    use chrono::Utc;
    use parking_lot::Mutex;
    use tokio_stream::StreamExt;

    fn added(id: u64) -> JobEvent {
        JobEvent::Added {
            job_id: JobId(id),
            at: Utc::now(),
        }
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let hub = EventHub::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let seen = seen.clone();
            hub.on(Arc::new(move |_event: &JobEvent| seen.lock().push(name)));
        }
        hub.emit(added(1));

        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn removed_listeners_stop_receiving() {
        let hub = EventHub::new(16);
        let count = Arc::new(AtomicU64::new(0));

        let counter = count.clone();
        let id = hub.on(Arc::new(move |_event: &JobEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        hub.emit(added(1));
        assert!(hub.off(id));
        assert!(!hub.off(id));
        hub.emit(added(2));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn a_panicking_listener_does_not_stop_the_others() {
        let hub = EventHub::new(16);
        let reached = Arc::new(AtomicU64::new(0));

        hub.on(Arc::new(|_event: &JobEvent| panic!("listener bug")));
        let counter = reached.clone();
        hub.on(Arc::new(move |_event: &JobEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        hub.emit(added(1));

        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_receives_emitted_events() {
        let hub = EventHub::new(16);
        let mut stream = hub.stream();

        hub.emit(added(5));

        let event = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next())
            .await
            .expect("Timeout waiting for event")
            .expect("Stream ended");
        assert_eq!(event.job_id(), JobId(5));
    }
}
