//! # Runtime: composition root for supervision.
//!
//! The [`Runtime`] owns the event bus, the [`HealthRegistry`], the
//! [`SimulationClock`] and every [`DeviceSupervisor`]. It wires subscribers to the
//! bus, spawns one task per device and drives graceful shutdown.
//!
//! ## High-level architecture
//! ```text
//! RuntimeBuilder ──build()──► Runtime
//!                               ├─ supervise(hw, synth, params) ─► DeviceView   (per device)
//!                               └─ handle() ─► RuntimeHandle (shutdown, toggle_simulation)
//!
//! run():
//!   listener: Bus.subscribe() ─► SubscriberSet::emit(&Event) ─► [queue S1] … [queue SN]
//!   publish RuntimeStarted
//!   for each device: set.spawn(supervisor.run(runtime_token.child_token()))
//!
//! Shutdown path:
//!   wait_for_shutdown_signal() | RuntimeHandle::shutdown()
//!             └─► Bus.publish(ShutdownRequested)
//!             └─► runtime_token.cancel()   → propagates to child tokens
//!             └─► wait_all_with_grace(grace):
//!                    ├─ Ok (all joined)    → Bus.publish(AllStoppedWithin)
//!                    └─ Timeout exceeded   → Bus.publish(GraceExceeded), abort stragglers
//!   listener drained, subscriber queues drained
//! ```
//!
//! ## Rules
//! - Supervisors only stop on cancellation; the runtime never waits for them to finish on their own.
//! - Events published before `run()` starts are not delivered to subscribers.
//! - A failed signal registration is logged and leaves explicit shutdown as the only exit.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{Mode, Settings};
use crate::core::shutdown;
use crate::core::supervisor::{DeviceParams, DeviceSupervisor, SupervisionContext};
use crate::devices::DeviceView;
use crate::error::RuntimeError;
use crate::events::{Bus, EventKind, Level};
use crate::hardware::Hardware;
use crate::health::{names, HealthRegistry, HealthSummary, SubsystemState};
use crate::policies::BackoffPolicy;
use crate::simulation::{SimulationClock, Synthesize};
use crate::subscribers::{Subscribe, SubscriberSet};

type Launch = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>;

struct DeviceTask {
    name: String,
    launch: Launch,
}

/// Builder for a [`Runtime`].
pub struct RuntimeBuilder {
    mode: Mode,
    max_retries: u32,
    backoff: BackoffPolicy,
    grace: Duration,
    bus_capacity: usize,
    devices: Vec<(&'static str, bool)>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RuntimeBuilder {
    /// Builder with the stock defaults (see [`Settings::default`]).
    pub fn new() -> Self {
        Self::from_settings(&Settings::default())
    }

    /// Builder mirroring a loaded deployment configuration.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            mode: settings.mode,
            max_retries: settings.supervision.max_retries,
            backoff: settings.backoff_policy(),
            grace: settings.grace(),
            bus_capacity: settings.runtime.bus_capacity,
            devices: vec![
                (names::CAMERA_REAR, settings.camera_rear.enabled),
                (names::CAMERA_FRONT, settings.camera_front.enabled),
                (names::OBD, settings.obd.enabled),
            ],
            subscribers: Vec::new(),
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Marks a device slot enabled or disabled; disabled slots start `DISABLED`.
    pub fn device_enabled(mut self, name: &'static str, enabled: bool) -> Self {
        match self.devices.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = enabled,
            None => self.devices.push((name, enabled)),
        }
        self
    }

    /// Sets event subscribers. They run on dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    pub fn build(self) -> Runtime {
        let bus = Bus::new(self.bus_capacity);

        let mut initial: Vec<(&str, SubsystemState)> = vec![
            (names::NETWORKING, SubsystemState::Active),
            (names::BACKEND, SubsystemState::Active),
            (names::LOGGING, SubsystemState::Active),
            (names::SYSTEM, SubsystemState::Active),
        ];
        for &(name, enabled) in &self.devices {
            let state = if enabled {
                SubsystemState::Waiting
            } else {
                SubsystemState::Disabled
            };
            initial.push((name, state));
        }
        let registry = Arc::new(HealthRegistry::with_subsystems(
            self.max_retries,
            bus.clone(),
            initial,
        ));

        let ctx = SupervisionContext {
            registry,
            clock: Arc::new(SimulationClock::new()),
            bus,
            mode: self.mode,
            backoff: self.backoff,
        };

        Runtime {
            ctx,
            grace: self.grace,
            subscribers: self.subscribers,
            devices: Vec::new(),
            token: CancellationToken::new(),
            stop: CancellationToken::new(),
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable control surface for a running [`Runtime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    ctx: SupervisionContext,
    stop: CancellationToken,
}

impl RuntimeHandle {
    /// Requests graceful shutdown; `run()` returns once supervisors stopped.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    /// Flips global simulation and returns the new state.
    pub fn toggle_simulation(&self) -> bool {
        let active = self.ctx.clock.toggle();
        let state = if active { "ENABLED" } else { "DISABLED" };
        self.ctx.bus.record(
            EventKind::SimulationToggled,
            names::SYSTEM,
            Level::Info,
            format!("Simulation mode {state}"),
            None,
            Some("Toggling global simulation state"),
        );
        active
    }

    pub fn registry(&self) -> Arc<HealthRegistry> {
        Arc::clone(&self.ctx.registry)
    }

    pub fn clock(&self) -> Arc<SimulationClock> {
        Arc::clone(&self.ctx.clock)
    }

    pub fn health(&self) -> HealthSummary {
        self.ctx.registry.get_health_summary()
    }
}

/// Owns the shared state and the device supervisors.
pub struct Runtime {
    ctx: SupervisionContext,
    grace: Duration,
    subscribers: Vec<Arc<dyn Subscribe>>,
    devices: Vec<DeviceTask>,
    token: CancellationToken,
    stop: CancellationToken,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Shared collaborators handed to every supervisor.
    pub fn context(&self) -> &SupervisionContext {
        &self.ctx
    }

    pub fn bus(&self) -> &Bus {
        &self.ctx.bus
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            ctx: self.ctx.clone(),
            stop: self.stop.clone(),
        }
    }

    /// Adds a device supervisor; returns the read side of its cache.
    pub fn supervise<H, S>(&mut self, hardware: H, synth: S, params: DeviceParams) -> DeviceView<H::Sample>
    where
        H: Hardware,
        S: Synthesize<Sample = H::Sample>,
    {
        let sup = DeviceSupervisor::new(hardware, synth, params, self.ctx.clone());
        let view = sup.view();
        self.devices.push(DeviceTask {
            name: sup.name().to_string(),
            launch: Box::new(move |token| -> BoxFuture<'static, ()> { Box::pin(sup.run(token)) }),
        });
        view
    }

    /// Runs until a termination signal or [`RuntimeHandle::shutdown`], then stops
    /// every supervisor within the grace period.
    pub async fn run(self) -> Result<(), RuntimeError> {
        let Runtime {
            ctx,
            grace,
            subscribers,
            devices,
            token,
            stop,
        } = self;
        let bus = ctx.bus.clone();

        let listener_stop = CancellationToken::new();
        let listener = subscriber_listener(&bus, subscribers, listener_stop.clone());

        let names: Vec<String> = devices.iter().map(|d| d.name.clone()).collect();
        bus.record(
            EventKind::RuntimeStarted,
            names::BACKEND,
            Level::Info,
            "Supervision started",
            Some(&format!("mode={}, devices=[{}]", ctx.mode.as_str(), names.join(", "))),
            None,
        );

        let mut set = JoinSet::new();
        for device in devices {
            let child = token.child_token();
            let fut = (device.launch)(child);
            let name = device.name;
            set.spawn(async move {
                fut.await;
                name
            });
        }

        let reason = tokio::select! {
            signal = signal_or_pending() => signal.to_string(),
            _ = stop.cancelled() => "shutdown requested".to_string(),
        };
        bus.record(
            EventKind::ShutdownRequested,
            names::BACKEND,
            Level::Warn,
            "Backend stopping",
            Some(&reason),
            Some("Cancelling device supervisors"),
        );
        token.cancel();

        let res = wait_all_with_grace(&bus, &mut set, names, grace).await;

        listener_stop.cancel();
        if let Ok(subs) = listener.await {
            subs.shutdown().await;
        }
        res
    }
}

/// Waits for every supervisor to return within `grace`.
async fn wait_all_with_grace(
    bus: &Bus,
    set: &mut JoinSet<String>,
    names: Vec<String>,
    grace: Duration,
) -> Result<(), RuntimeError> {
    let mut running: BTreeSet<String> = names.into_iter().collect();
    let done = async {
        while let Some(joined) = set.join_next().await {
            if let Ok(name) = joined {
                running.remove(&name);
            }
        }
    };

    match tokio::time::timeout(grace, done).await {
        Ok(()) => {
            bus.record(
                EventKind::AllStoppedWithin,
                names::BACKEND,
                Level::Info,
                "All device supervisors stopped",
                None,
                None,
            );
            Ok(())
        }
        Err(_) => {
            let stuck: Vec<String> = running.into_iter().collect();
            bus.record(
                EventKind::GraceExceeded,
                names::BACKEND,
                Level::Error,
                format!("Shutdown grace {grace:?} exceeded"),
                Some(&stuck.join(", ")),
                Some("Aborting remaining supervisors"),
            );
            set.abort_all();
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
    }
}

/// Forwards bus events to the subscriber set until `stop`, then drains what is buffered.
fn subscriber_listener(
    bus: &Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
    stop: CancellationToken,
) -> JoinHandle<SubscriberSet> {
    let mut rx = bus.subscribe();
    let set = SubscriberSet::new(subscribers, bus.clone());
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                ev = rx.recv() => match ev {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = stop.cancelled() => {
                    while let Ok(ev) = rx.try_recv() {
                        set.emit(&ev);
                    }
                    break;
                }
            }
        }
        set
    })
}

async fn signal_or_pending() -> &'static str {
    match shutdown::wait_for_shutdown_signal().await {
        Ok(name) => name,
        Err(e) => {
            warn!(error = %e, "signal handlers unavailable; waiting for explicit shutdown");
            futures::future::pending().await
        }
    }
}
