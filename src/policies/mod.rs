//! Reconnection policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how reconnection delays evolve (first / growth / max + jitter)
//! - [`Growth`]        linear or exponential growth curve
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! Settings.supervision ──► BackoffPolicy
//!      └─► core::supervisor::DeviceSupervisor uses:
//!           - backoff.next(registry.restart_count(name)) after a failed open
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=5s, linear, max=30s, jitter=None.

mod backoff;
mod jitter;

pub use backoff::{BackoffPolicy, Growth};
pub use jitter::JitterPolicy;
