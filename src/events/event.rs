//! # Observability events emitted by the registry, device supervisors and runtime.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Registry events**: gating rejections, recorded failures, escalation, recovery, resets
//! - **Device events**: hysteresis-filtered status changes, hardware probes, connections
//! - **Runtime events**: startup, shutdown and grace handling
//! - **Subscriber events**: overflow and panics inside subscriber workers
//!
//! The [`Event`] struct carries the narrative fields every record has
//! (`subsystem`, `level`, `message`) plus the optional `reason` and `action`.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use devicevisor::{Event, EventKind, Level};
//!
//! let ev = Event::new(EventKind::FailureRecorded, "obd", "Subsystem failure detected")
//!     .with_level(Level::Error)
//!     .with_reason("port closed")
//!     .with_action("Incrementing restart count (1/3)");
//!
//! assert_eq!(ev.kind, EventKind::FailureRecorded);
//! assert_eq!(&*ev.subsystem, "obd");
//! assert_eq!(ev.reason.as_deref(), Some("port closed"));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Severity of an event, mirrored onto `tracing` levels by the log writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    /// Escalations that need a human (e.g. a subsystem marked FAULTY).
    Critical,
}

impl Level {
    /// Upper-case label used in rendered lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of observability events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Registry events ===
    /// A transition was rejected because the subsystem is past its retry cap.
    TransitionBlocked,
    /// A failure report incremented the restart counter.
    FailureRecorded,
    /// The restart counter reached the cap; the subsystem was forced to FAULTY.
    MarkedFaulty,
    /// An ACTIVE report cleared a non-zero restart counter.
    Recovered,
    /// The subsystem entered ACTIVE from another state.
    SteadyState,
    /// Manual reset back to WAITING.
    ManualReset,

    // === Device events ===
    /// Hysteresis-filtered change in what a supervisor reports.
    StatusChanged,
    /// Maintenance probe found hardware; simulation is overridden.
    HardwareDetected,
    /// Maintenance probe found nothing; simulation stays on.
    HardwareAbsent,
    /// A hardware connection was acquired.
    Connected,
    /// The global simulation clock was switched on or off.
    SimulationToggled,

    // === Runtime events ===
    /// Runtime spawned its device supervisors.
    RuntimeStarted,
    /// Shutdown requested (OS signal or explicit call).
    ShutdownRequested,
    /// All supervisors stopped within the grace period.
    AllStoppedWithin,
    /// Grace period exceeded; some supervisors did not stop in time.
    GraceExceeded,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,
    /// Subscriber panicked during event processing.
    SubscriberPanicked,
}

/// Observability record.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp
/// - `reason` / `action`: optional narrative, rendered as `| Reason: … | Action: …`
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Source subsystem (e.g. `camera_rear`, `supervisor`).
    pub subsystem: Arc<str>,
    /// Severity.
    pub level: Level,
    /// Short human-readable message.
    pub message: Arc<str>,
    /// Why this happened.
    pub reason: Option<Arc<str>>,
    /// What the system does about it.
    pub action: Option<Arc<str>>,
}

impl Event {
    /// Creates a new `Info` event with the current timestamp and next sequence number.
    pub fn new(
        kind: EventKind,
        subsystem: impl Into<Arc<str>>,
        message: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            subsystem: subsystem.into(),
            level: Level::Info,
            message: message.into(),
            reason: None,
            action: None,
        }
    }

    /// Sets the severity.
    #[inline]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the action taken in response.
    #[inline]
    pub fn with_action(mut self, action: impl Into<Arc<str>>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow, subscriber, "Subscriber dropped event")
            .with_level(Level::Warn)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked, subscriber, "Subscriber panicked")
            .with_level(Level::Error)
            .with_reason(info)
    }

    /// Renders the narrative line: `message | Reason: … | Action: …`.
    pub fn narrative(&self) -> String {
        let mut line = self.message.to_string();
        if let Some(reason) = &self.reason {
            line.push_str(" | Reason: ");
            line.push_str(reason);
        }
        if let Some(action) = &self.action {
            line.push_str(" | Action: ");
            line.push_str(action);
        }
        line
    }
}
