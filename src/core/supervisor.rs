//! # DeviceSupervisor: one polling loop per physical device.
//!
//! Each supervisor owns one device's connection handle and latest-sample cache. It
//! keeps the rest of the system supplied with *some* data (real or synthetic) and
//! keeps the [`HealthRegistry`] informed.
//!
//! ## Architecture
//! ```text
//! loop {
//!   ├─► cancelled? → close handle, exit
//!   ├─► probe (maintenance only) ─► decide_use_simulation()
//!   ├─► simulate:
//!   │     ├─► release held handle
//!   │     ├─► synthesize(now, clock.cycle()) → cache
//!   │     ├─► report ACTIVE "Simulation Mode"
//!   │     └─► sleep(cadence)
//!   ├─► no handle: open(target)
//!   │     └─► Err → report WAITING+error → sleep(backoff)      (cancellable)
//!   └─► read(handle)
//!         ├─► None   → close, report WAITING+error → sleep(backoff)
//!         └─► Some   → cache, report ACTIVE → sleep(poll_interval)
//! }
//! ```
//!
//! ## Rules
//! - Every report goes to the registry; only news (per [`ReportFilter`]) becomes a
//!   status-change event.
//! - Backoff is `policy.next(restart_count)` with the count read back from the registry
//!   after the failure was recorded.
//! - Hardware errors never leave the loop.
//! - Cancellation is checked at the top of every iteration and during every sleep;
//!   in-flight hardware calls are not interrupted.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::config::Mode;
use crate::core::arbitration::{decide_use_simulation, should_probe, Probe};
use crate::core::report::ReportFilter;
use crate::devices::DeviceView;
use crate::events::{Bus, EventKind, Level};
use crate::hardware::{Hardware, Target};
use crate::health::{HealthRegistry, SubsystemState};
use crate::policies::BackoffPolicy;
use crate::simulation::{SimulationClock, Synthesize};

/// Registry message attached to every simulated `ACTIVE` report.
pub const SIMULATION_MESSAGE: &str = "Simulation Mode";

/// Per-device parameters.
#[derive(Debug, Clone)]
pub struct DeviceParams {
    /// Subsystem name in the registry.
    pub name: String,
    /// Where the hardware lives.
    pub target: Target,
    /// Configured to use synthetic data.
    pub simulation: bool,
    /// In maintenance mode, switch to real hardware when it is detected.
    pub allow_real_override: bool,
    /// Sleep between synthetic samples.
    pub cadence: Duration,
    /// Sleep between successful real reads.
    pub poll_interval: Duration,
    /// Error recorded when a read yields nothing.
    pub read_failure: &'static str,
}

/// Process-wide collaborators shared by every supervisor.
#[derive(Clone)]
pub struct SupervisionContext {
    pub registry: Arc<HealthRegistry>,
    pub clock: Arc<SimulationClock>,
    pub bus: Bus,
    pub mode: Mode,
    pub backoff: BackoffPolicy,
}

/// Supervises one device.
pub struct DeviceSupervisor<H: Hardware, S> {
    hardware: H,
    synth: S,
    params: DeviceParams,
    ctx: SupervisionContext,
    view: DeviceView<H::Sample>,
    filter: ReportFilter,
    last_probe: Option<Probe>,
}

impl<H, S> DeviceSupervisor<H, S>
where
    H: Hardware,
    S: Synthesize<Sample = H::Sample>,
{
    pub fn new(hardware: H, synth: S, params: DeviceParams, ctx: SupervisionContext) -> Self {
        let view = DeviceView::new(params.name.as_str());
        Self {
            hardware,
            synth,
            params,
            ctx,
            view,
            filter: ReportFilter::new(),
            last_probe: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    /// Read-side handle onto this supervisor's cache.
    pub fn view(&self) -> DeviceView<H::Sample> {
        self.view.clone()
    }

    /// Runs until `token` is cancelled.
    pub async fn run(mut self, token: CancellationToken) {
        let mut handle: Option<H::Handle> = None;

        loop {
            if token.is_cancelled() {
                break;
            }

            let global_active = self.ctx.clock.is_active();
            let probe = self.probe(handle.is_some(), global_active).await;
            let simulate =
                decide_use_simulation(&self.params, self.ctx.mode, global_active, probe);

            if simulate {
                self.release(&mut handle).await;
                self.simulate(global_active);
                if !pause(self.params.cadence, &token).await {
                    break;
                }
                continue;
            }

            if handle.is_none() {
                match self.hardware.open(&self.params.target).await {
                    Ok(h) => {
                        handle = Some(h);
                        self.view.set_simulation(false);
                        self.view.set_detected(true);
                        self.record(
                            EventKind::Connected,
                            Level::Info,
                            format!("Connected to {}", self.params.target),
                            Some("Hardware handshake successful"),
                            Some("Starting poll loop"),
                        );
                    }
                    Err(e) => {
                        let error = e.to_string();
                        self.view.set_error(error.as_str());
                        let news = self.report(SubsystemState::Waiting, None, Some(&error));
                        let delay = self.backoff_delay();
                        if news {
                            self.record(
                                EventKind::StatusChanged,
                                Level::Warn,
                                "Hardware initialization failed",
                                Some(&error),
                                Some(&format!("Entering WAITING, retry in {delay:?}")),
                            );
                        }
                        if !pause(delay, &token).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            let Some(h) = handle.as_mut() else {
                continue;
            };
            match self.hardware.read(h).await {
                Some(sample) => {
                    self.view.store(sample, false);
                    if self.report(SubsystemState::Active, None, None) {
                        self.record(
                            EventKind::StatusChanged,
                            Level::Info,
                            format!("Receiving data from {}", self.params.target),
                            None,
                            None,
                        );
                    }
                    if !pause(self.params.poll_interval, &token).await {
                        break;
                    }
                }
                None => {
                    self.release(&mut handle).await;
                    let error = self.params.read_failure;
                    self.view.set_error(error);
                    let news = self.report(SubsystemState::Waiting, None, Some(error));
                    let delay = self.backoff_delay();
                    if news {
                        self.record(
                            EventKind::StatusChanged,
                            Level::Error,
                            "Capture interrupted",
                            Some(error),
                            Some(&format!("Link released, reconnecting in {delay:?}")),
                        );
                    }
                    if !pause(delay, &token).await {
                        break;
                    }
                }
            }
        }

        self.release(&mut handle).await;
    }

    /// Closes the held handle, if any, and marks the device as not detected.
    async fn release(&self, handle: &mut Option<H::Handle>) {
        if let Some(h) = handle.take() {
            self.hardware.close(h).await;
            self.view.set_detected(false);
        }
    }

    /// Runs the maintenance probe when its preconditions hold; logs only changes.
    async fn probe(&mut self, holding: bool, global_active: bool) -> Probe {
        if !should_probe(&self.params, self.ctx.mode, global_active) {
            return Probe::NotAttempted;
        }
        let probe = if holding || self.hardware.probe(&self.params.target).await {
            Probe::Found
        } else {
            Probe::Absent
        };

        if self.last_probe != Some(probe) {
            self.last_probe = Some(probe);
            let target = self.params.target.to_string();
            match probe {
                Probe::Found => self.record(
                    EventKind::HardwareDetected,
                    Level::Info,
                    format!("Maintenance mode: real hardware detected at {target}"),
                    Some("allow_real is set and the device is available"),
                    Some("Overriding simulation to use real hardware"),
                ),
                Probe::Absent => self.record(
                    EventKind::HardwareAbsent,
                    Level::Debug,
                    format!("Maintenance mode: no hardware at {target}"),
                    Some("allow_real is set but the device is unavailable"),
                    Some("Staying in simulation mode"),
                ),
                Probe::NotAttempted => {}
            }
        }
        probe
    }

    fn simulate(&mut self, global_active: bool) {
        let sample = self
            .synth
            .synthesize(SystemTime::now(), self.ctx.clock.cycle());
        self.view.store(sample, true);
        if self.report(SubsystemState::Active, Some(SIMULATION_MESSAGE), None) {
            let reason = if global_active {
                "Global simulation is active"
            } else {
                "Device configured for simulation"
            };
            self.record(
                EventKind::StatusChanged,
                Level::Info,
                SIMULATION_MESSAGE,
                Some(reason),
                Some("Serving synthetic samples"),
            );
        }
    }

    /// `min(cap, base × (restart_count + 1))`, with the count the registry holds now.
    fn backoff_delay(&self) -> Duration {
        let count = self
            .ctx
            .registry
            .restart_count(&self.params.name)
            .unwrap_or(0);
        self.ctx.backoff.next(count)
    }

    fn report(&mut self, state: SubsystemState, message: Option<&str>, error: Option<&str>) -> bool {
        self.ctx
            .registry
            .update_status(&self.params.name, state, message, error);
        self.filter.observe(state, error)
    }

    fn record(
        &self,
        kind: EventKind,
        level: Level,
        message: impl Into<Arc<str>>,
        reason: Option<&str>,
        action: Option<&str>,
    ) {
        self.ctx
            .bus
            .record(kind, &self.params.name, level, message, reason, action);
    }
}

/// Sleeps for `delay` unless cancelled first. Returns false on cancellation.
async fn pause(delay: Duration, token: &CancellationToken) -> bool {
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return !token.is_cancelled();
    }
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);
    select! {
        _ = &mut sleep => true,
        _ = token.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{pid, Telemetry};
    use crate::error::HardwareError;
    use crate::events::Event;
    use crate::simulation::TelemetryWaveform;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    /// Adapter double: opens while `present`, reads from a script (`false` = empty read).
    #[derive(Default)]
    struct Scripted {
        present: AtomicBool,
        reads: Mutex<VecDeque<bool>>,
        opened: AtomicUsize,
        closed: AtomicUsize,
        read_calls: AtomicUsize,
    }

    impl Scripted {
        fn new(present: bool, reads: &[bool]) -> Arc<Self> {
            let s = Self::default();
            s.present.store(present, Ordering::SeqCst);
            *s.reads.lock().unwrap() = reads.iter().copied().collect();
            Arc::new(s)
        }
    }

    #[async_trait]
    impl Hardware for Arc<Scripted> {
        type Handle = ();
        type Sample = Telemetry;

        async fn open(&self, target: &Target) -> Result<(), HardwareError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.present.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(HardwareError::NotFound {
                    target: target.to_string(),
                })
            }
        }

        async fn read(&self, _handle: &mut ()) -> Option<Telemetry> {
            let n = self.read_calls.fetch_add(1, Ordering::SeqCst);
            let ok = self.reads.lock().unwrap().pop_front().unwrap_or(true);
            ok.then(|| Telemetry::new(SystemTime::now(), false).with(pid::RPM, n as f64, "rpm"))
        }

        async fn close(&self, _handle: ()) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }

        async fn probe(&self, _target: &Target) -> bool {
            self.present.load(Ordering::SeqCst)
        }
    }

    fn params(simulation: bool, allow_real_override: bool) -> DeviceParams {
        DeviceParams {
            name: "obd".into(),
            target: Target::Serial(None),
            simulation,
            allow_real_override,
            cadence: Duration::from_millis(500),
            poll_interval: Duration::from_millis(500),
            read_failure: "No data from adapter",
        }
    }

    fn context(mode: Mode) -> (SupervisionContext, broadcast::Receiver<Event>) {
        let bus = Bus::new(4096);
        let rx = bus.subscribe();
        let ctx = SupervisionContext {
            registry: Arc::new(HealthRegistry::new(3, bus.clone())),
            clock: Arc::new(SimulationClock::new()),
            bus,
            mode,
            backoff: BackoffPolicy::default(),
        };
        (ctx, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn count(events: &[Event], kind: EventKind) -> usize {
        events.iter().filter(|e| e.kind == kind).count()
    }

    async fn settle(d: Duration) {
        time::sleep(d).await;
    }

    #[tokio::test(start_paused = true)]
    async fn simulating_device_with_absent_hardware_reports_only_active() {
        let hw = Scripted::new(false, &[]);
        let (ctx, mut rx) = context(Mode::Operational);
        let registry = Arc::clone(&ctx.registry);
        let sup = DeviceSupervisor::new(Arc::clone(&hw), TelemetryWaveform, params(true, false), ctx);
        let view = sup.view();
        let token = CancellationToken::new();
        let task = tokio::spawn(sup.run(token.clone()));

        settle(Duration::from_secs(20)).await;
        token.cancel();
        task.await.unwrap();

        let st = registry.status("obd").unwrap();
        assert_eq!(st.state, SubsystemState::Active);
        assert_eq!(st.message.as_deref(), Some(SIMULATION_MESSAGE));
        assert_eq!(st.restart_count, 0);
        assert_eq!(hw.opened.load(Ordering::SeqCst), 0);

        let latest = view.latest_value().unwrap();
        assert!(latest.simulated);
        assert_eq!(latest.get(pid::RPM), Some(3900.0));
        assert!(view.status().simulation);

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::StatusChanged), 1);
        assert_eq!(count(&events, EventKind::FailureRecorded), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_hardware_backs_off_until_faulty() {
        let hw = Scripted::new(false, &[]);
        let (ctx, mut rx) = context(Mode::Operational);
        let registry = Arc::clone(&ctx.registry);
        let sup = DeviceSupervisor::new(Arc::clone(&hw), TelemetryWaveform, params(false, false), ctx);
        let view = sup.view();
        let token = CancellationToken::new();
        let task = tokio::spawn(sup.run(token.clone()));

        // attempts at t=0, 10, 25 (delays 5*(n+1) after n recorded failures), blocked at t=45
        settle(Duration::from_secs(1)).await;
        assert_eq!(hw.opened.load(Ordering::SeqCst), 1);
        assert_eq!(registry.restart_count("obd"), Some(1));

        settle(Duration::from_secs(10)).await;
        assert_eq!(hw.opened.load(Ordering::SeqCst), 2);

        settle(Duration::from_secs(15)).await;
        assert_eq!(hw.opened.load(Ordering::SeqCst), 3);
        let st = registry.status("obd").unwrap();
        assert_eq!(st.state, SubsystemState::Faulty);
        assert_eq!(st.restart_count, 3);

        settle(Duration::from_secs(20)).await;
        assert_eq!(hw.opened.load(Ordering::SeqCst), 4);
        assert_eq!(registry.status("obd").unwrap().state, SubsystemState::Faulty);
        assert_eq!(registry.restart_count("obd"), Some(3));

        token.cancel();
        task.await.unwrap();

        assert!(!view.status().detected);
        assert!(view.status().last_error.is_some());
        let events = drain(&mut rx);
        // same error string every time: one status-change event
        assert_eq!(count(&events, EventKind::StatusChanged), 1);
        assert_eq!(count(&events, EventKind::MarkedFaulty), 1);
        assert_eq!(count(&events, EventKind::TransitionBlocked), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_read_releases_link_and_reconnects() {
        let hw = Scripted::new(true, &[true, false]);
        let (ctx, mut rx) = context(Mode::Operational);
        let registry = Arc::clone(&ctx.registry);
        let sup = DeviceSupervisor::new(Arc::clone(&hw), TelemetryWaveform, params(false, false), ctx);
        let view = sup.view();
        let token = CancellationToken::new();
        let task = tokio::spawn(sup.run(token.clone()));

        // t=0 read ok, t=0.5 empty read → close, backoff 10s
        settle(Duration::from_secs(1)).await;
        assert_eq!(hw.closed.load(Ordering::SeqCst), 1);
        let st = registry.status("obd").unwrap();
        assert_eq!(st.state, SubsystemState::Waiting);
        assert_eq!(st.last_error.as_deref(), Some("No data from adapter"));
        assert_eq!(st.restart_count, 1);

        settle(Duration::from_secs(10)).await;
        assert_eq!(hw.opened.load(Ordering::SeqCst), 2);
        let st = registry.status("obd").unwrap();
        assert_eq!(st.state, SubsystemState::Active);
        assert_eq!(st.restart_count, 0);
        let latest = view.latest_value().unwrap();
        assert!(!latest.simulated);
        assert!(view.status().detected);

        token.cancel();
        task.await.unwrap();
        // held link is released on stop
        assert_eq!(hw.closed.load(Ordering::SeqCst), 2);
        assert!(!view.status().detected);

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::Connected), 2);
        assert_eq!(count(&events, EventKind::Recovered), 1);
        let interrupted = events
            .iter()
            .filter(|e| e.kind == EventKind::StatusChanged && e.level == Level::Error)
            .count();
        assert_eq!(interrupted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let hw = Scripted::new(false, &[]);
        let (ctx, _rx) = context(Mode::Operational);
        let sup = DeviceSupervisor::new(Arc::clone(&hw), TelemetryWaveform, params(false, false), ctx);
        let token = CancellationToken::new();
        let task = tokio::spawn(sup.run(token.clone()));

        settle(Duration::from_millis(100)).await;
        token.cancel();
        // well inside the 10s backoff
        time::timeout(Duration::from_millis(10), task)
            .await
            .expect("supervisor should stop promptly")
            .unwrap();
        assert_eq!(hw.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_override_follows_hardware_presence() {
        let hw = Scripted::new(false, &[]);
        let (ctx, mut rx) = context(Mode::Maintenance);
        let registry = Arc::clone(&ctx.registry);
        let clock = Arc::clone(&ctx.clock);
        let sup = DeviceSupervisor::new(Arc::clone(&hw), TelemetryWaveform, params(true, true), ctx);
        let view = sup.view();
        let token = CancellationToken::new();
        let task = tokio::spawn(sup.run(token.clone()));

        settle(Duration::from_secs(2)).await;
        assert!(view.latest_value().unwrap().simulated);
        assert_eq!(hw.opened.load(Ordering::SeqCst), 0);

        hw.present.store(true, Ordering::SeqCst);
        settle(Duration::from_secs(2)).await;
        assert_eq!(hw.opened.load(Ordering::SeqCst), 1);
        assert!(!view.latest_value().unwrap().simulated);
        assert_eq!(registry.status("obd").unwrap().message, None);
        let st = view.status();
        assert!(st.detected);
        assert!(!st.simulation);

        // global simulation wins and releases the link
        clock.toggle();
        settle(Duration::from_secs(2)).await;
        assert_eq!(hw.closed.load(Ordering::SeqCst), 1);
        assert!(view.latest_value().unwrap().simulated);
        assert_eq!(
            registry.status("obd").unwrap().message.as_deref(),
            Some(SIMULATION_MESSAGE)
        );
        let st = view.status();
        assert!(!st.detected);
        assert!(st.simulation);

        // back to real hardware, then stop while the link is held
        clock.toggle();
        settle(Duration::from_secs(2)).await;
        assert_eq!(hw.opened.load(Ordering::SeqCst), 2);
        assert!(view.status().detected);

        token.cancel();
        task.await.unwrap();
        assert_eq!(hw.closed.load(Ordering::SeqCst), 2);
        assert!(!view.status().detected);

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::HardwareAbsent), 1);
        assert_eq!(count(&events, EventKind::HardwareDetected), 1);
    }
}
