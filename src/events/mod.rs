//! Observability events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the health registry, device
//! supervisors, the runtime and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`Level`] event classification and narrative payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `HealthRegistry`, `DeviceSupervisor`, `Runtime`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the runtime listener (fans out to `SubscriberSet`), tests.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, Level};
