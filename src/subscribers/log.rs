//! # LogWriter: renders events through `tracing`.
//!
//! Each [`Event`] becomes one `tracing` record at the matching level, carrying
//! `subsystem` and `seq` as fields and the narrative line as the message.
//! `Critical` maps onto `error!` with `critical = true`.
//!
//! `Debug` events are dropped unless the writer is verbose (maintenance deployments).
//!
//! ## Example output
//! ```text
//! INFO  subsystem="OBD" seq=12 Subsystem reached steady state (ACTIVE) | Reason: Health checks passed | Action: Monitoring operational data
//! WARN  subsystem="CAMERA_REAR" seq=40 Hardware initialization failed | Reason: no device at /dev/video0 | Action: Subsystem entering WAITING state for retry
//! ERROR subsystem="SUPERVISOR" seq=51 critical=true Subsystem OBD marked as FAULTY | Reason: Hard failure threshold reached
//! ```

use async_trait::async_trait;

use crate::events::{Event, Level};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter {
    verbose: bool,
}

impl LogWriter {
    /// Construct a new [`LogWriter`] that drops `Debug` events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `Debug` events (maintenance mode).
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether an event of this level is written at all.
    pub fn accepts(&self, level: Level) -> bool {
        self.verbose || level > Level::Debug
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        if !self.accepts(e.level) {
            return;
        }
        let source = e.subsystem.to_uppercase();
        let line = e.narrative();
        match e.level {
            Level::Debug => tracing::debug!(subsystem = %source, seq = e.seq, "{line}"),
            Level::Info => tracing::info!(subsystem = %source, seq = e.seq, "{line}"),
            Level::Warn => tracing::warn!(subsystem = %source, seq = e.seq, "{line}"),
            Level::Error => tracing::error!(subsystem = %source, seq = e.seq, "{line}"),
            Level::Critical => {
                tracing::error!(subsystem = %source, seq = e.seq, critical = true, "{line}")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
