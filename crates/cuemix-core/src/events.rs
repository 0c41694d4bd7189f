//! Cue lifecycle events and listeners
//!
//! Listeners are called synchronously on the thread that caused the event:
//! the caller's thread for obtain/start/stop/release, the render thread for
//! loop wrap-around and natural end of play. Implementations must not block.
//! [`QueuedListener`] moves events onto a bounded channel for consumers that
//! need to do real work with them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::RwLock;

use crate::render::ThreadPriority;

/// Process-unique identifier of a cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CueId(u64);

impl CueId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cue#{}", self.0)
    }
}

/// What happened to a playback instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceEventKind {
    Obtain,
    Release,
    Start,
    Stop,
    Loop,
}

#[derive(Debug, Clone)]
pub struct InstanceEvent {
    pub kind: InstanceEventKind,
    pub time: DateTime<Utc>,
    pub cue: CueId,
    pub cue_name: Arc<str>,
    pub instance: usize,
    /// Cursor position in frames when the event fired
    pub frame: f64,
}

/// A cue started delivering audio
#[derive(Debug, Clone)]
pub struct OpenedEvent {
    pub time: DateTime<Utc>,
    pub cue: CueId,
    pub cue_name: Arc<str>,
    pub thread_priority: ThreadPriority,
    pub buffer_frames: usize,
}

#[derive(Debug, Clone)]
pub struct ClosedEvent {
    pub time: DateTime<Utc>,
    pub cue: CueId,
    pub cue_name: Arc<str>,
}

/// Observer of cue lifecycle events
///
/// Every method has an empty default so implementors pick what they need.
pub trait CueListener: Send + Sync {
    fn on_opened(&self, _event: &OpenedEvent) {}

    fn on_closed(&self, _event: &ClosedEvent) {}

    fn on_instance_event(&self, _event: &InstanceEvent) {}
}

/// Any event, as carried by [`QueuedListener`]
#[derive(Debug, Clone)]
pub enum ListenerEvent {
    Opened(OpenedEvent),
    Closed(ClosedEvent),
    Instance(InstanceEvent),
}

/// Listener that forwards events into a bounded channel
///
/// Never blocks the emitting thread: when the channel is full the event is
/// dropped and counted.
pub struct QueuedListener {
    tx: Sender<ListenerEvent>,
    rx: Receiver<ListenerEvent>,
    dropped: AtomicU64,
}

impl QueuedListener {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, rx) = channel::bounded(capacity);
        Arc::new(Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
        })
    }

    /// Receiver side, clonable for any number of consumers
    pub fn receiver(&self) -> Receiver<ListenerEvent> {
        self.rx.clone()
    }

    pub fn try_recv(&self) -> Option<ListenerEvent> {
        self.rx.try_recv().ok()
    }

    /// Everything currently queued
    pub fn drain(&self) -> Vec<ListenerEvent> {
        self.rx.try_iter().collect()
    }

    /// Events lost to a full channel
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn push(&self, event: ListenerEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl CueListener for QueuedListener {
    fn on_opened(&self, event: &OpenedEvent) {
        self.push(ListenerEvent::Opened(event.clone()));
    }

    fn on_closed(&self, event: &ClosedEvent) {
        self.push(ListenerEvent::Closed(event.clone()));
    }

    fn on_instance_event(&self, event: &InstanceEvent) {
        self.push(ListenerEvent::Instance(event.clone()));
    }
}

/// Registered listeners of one cue
///
/// Registration swaps in a new list; emitters clone the current `Arc` and
/// iterate without holding the lock.
pub(crate) struct Listeners {
    list: RwLock<Arc<Vec<Arc<dyn CueListener>>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            list: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn add(&self, listener: Arc<dyn CueListener>) {
        let mut list = self.list.write();
        let mut next = Vec::clone(&list);
        next.push(listener);
        *list = Arc::new(next);
    }

    /// Remove by identity; returns whether it was registered
    pub fn remove(&self, listener: &Arc<dyn CueListener>) -> bool {
        let mut list = self.list.write();
        let target = Arc::as_ptr(listener) as *const ();
        let next: Vec<_> = list
            .iter()
            .filter(|l| Arc::as_ptr(l) as *const () != target)
            .cloned()
            .collect();
        let removed = next.len() != list.len();
        *list = Arc::new(next);
        removed
    }

    pub fn len(&self) -> usize {
        self.list.read().len()
    }

    fn snapshot(&self) -> Arc<Vec<Arc<dyn CueListener>>> {
        Arc::clone(&self.list.read())
    }

    pub fn opened(&self, event: OpenedEvent) {
        for listener in self.snapshot().iter() {
            listener.on_opened(&event);
        }
    }

    pub fn closed(&self, event: ClosedEvent) {
        for listener in self.snapshot().iter() {
            listener.on_closed(&event);
        }
    }

    pub fn instance(&self, event: InstanceEvent) {
        let listeners = self.snapshot();
        if listeners.is_empty() {
            return;
        }
        for listener in listeners.iter() {
            listener.on_instance_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: InstanceEventKind, instance: usize) -> InstanceEvent {
        InstanceEvent {
            kind,
            time: Utc::now(),
            cue: CueId(7),
            cue_name: Arc::from("test"),
            instance,
            frame: 0.0,
        }
    }

    #[test]
    fn test_cue_ids_are_unique() {
        let a = CueId::next();
        let b = CueId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_queued_listener_drops_when_full() {
        let queued = QueuedListener::new(2);
        for i in 0..5 {
            queued.on_instance_event(&event(InstanceEventKind::Start, i));
        }
        assert_eq!(queued.dropped(), 3);

        let events = queued.drain();
        assert_eq!(events.len(), 2);
        match &events[0] {
            ListenerEvent::Instance(e) => assert_eq!(e.instance, 0),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(queued.try_recv().is_none());
    }

    #[test]
    fn test_listener_add_remove() {
        let listeners = Listeners::new();
        let queued = QueuedListener::new(8);
        let as_dyn: Arc<dyn CueListener> = queued.clone();

        listeners.add(Arc::clone(&as_dyn));
        assert_eq!(listeners.len(), 1);
        listeners.instance(event(InstanceEventKind::Loop, 1));
        assert_eq!(queued.drain().len(), 1);

        assert!(listeners.remove(&as_dyn));
        assert!(!listeners.remove(&as_dyn));
        listeners.instance(event(InstanceEventKind::Loop, 1));
        assert!(queued.drain().is_empty());
    }
}
