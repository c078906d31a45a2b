use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devicevisor::{
    Elm327, LogWriter, Mode, PatternKind, RuntimeBuilder, RuntimeHandle, Settings,
    TelemetryWaveform, TestPattern, VideoNode,
};

/// Dashboard device supervisor.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Settings file (defaults to config/maintenance.yaml, then config/operational.yaml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured deployment mode.
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Start with global simulation switched on.
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("loading settings")?;
    if let Some(mode) = args.mode {
        settings.mode = mode;
    }

    let default_filter = if settings.verbose() {
        "devicevisor=debug"
    } else {
        "devicevisor=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        mode = settings.mode.as_str(),
        max_retries = settings.supervision.max_retries,
        "starting devicevisor v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut rt = RuntimeBuilder::from_settings(&settings)
        .with_subscribers(vec![Arc::new(LogWriter::new().verbose(settings.verbose()))])
        .build();

    if settings.camera_rear.enabled {
        let cam = &settings.camera_rear;
        rt.supervise(
            VideoNode::new(cam.width(), cam.height()),
            TestPattern::new(PatternKind::Orbit, cam.width(), cam.height()),
            settings.camera_rear_params(),
        );
    }
    if settings.camera_front.enabled {
        let cam = &settings.camera_front;
        rt.supervise(
            VideoNode::new(cam.width(), cam.height()),
            TestPattern::new(PatternKind::Sweep, cam.width(), cam.height()),
            settings.camera_front_params(),
        );
    }
    if settings.obd.enabled {
        rt.supervise(
            Elm327::new().with_baud_rate(settings.obd.baud_rate),
            TelemetryWaveform::new(),
            settings.obd_params(),
        );
    }

    let handle = rt.handle();
    if args.simulate {
        handle.toggle_simulation();
        tracing::info!("global simulation enabled from the command line");
    }
    tokio::spawn(watch_health(handle));

    rt.run().await?;
    Ok(())
}

/// Logs the overall status whenever it changes.
async fn watch_health(handle: RuntimeHandle) {
    let mut last = None;
    let mut tick = tokio::time::interval(Duration::from_secs(5));
    loop {
        tick.tick().await;
        let summary = handle.health();
        if last != Some(summary.status) {
            tracing::info!(status = ?summary.status, "overall health");
            last = Some(summary.status);
        }
    }
}
