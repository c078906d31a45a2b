//! # Event bus for broadcasting observability events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (registry, device supervisors, runtime).
//! It is the observability sink of the crate: [`Bus::record`] is the single entry point
//! every component uses to describe a transition.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Subscriber (one):
//!   HealthRegistry   ──┐
//!   DeviceSupervisor ──┼──────► Bus ───────► runtime listener ────► SubscriberSet
//!   Runtime          ──┘  (broadcast chan)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active subscribers at send time.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::event::{Event, EventKind, Level};

/// Broadcast channel for observability events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately (send clones internally).
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Records one narrative entry: `record(subsystem, level, message, reason?, action?)`.
    pub fn record(
        &self,
        kind: EventKind,
        subsystem: &str,
        level: Level,
        message: impl Into<Arc<str>>,
        reason: Option<&str>,
        action: Option<&str>,
    ) {
        let mut ev = Event::new(kind, subsystem, message).with_level(level);
        if let Some(reason) = reason {
            ev = ev.with_reason(reason);
        }
        if let Some(action) = action {
            ev = ev.with_action(action);
        }
        self.publish(ev);
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_builds_event_with_narrative_fields() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();

        bus.record(
            EventKind::FailureRecorded,
            "obd",
            Level::Error,
            "Subsystem failure detected",
            Some("link down"),
            None,
        );

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::FailureRecorded);
        assert_eq!(ev.level, Level::Error);
        assert_eq!(ev.reason.as_deref(), Some("link down"));
        assert!(ev.action.is_none());
    }

    #[test]
    fn publish_without_receivers_is_silent() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::RuntimeStarted, "backend", "started"));
    }
}
