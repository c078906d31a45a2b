//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] completes on the first of:
//! - `SIGINT` (Ctrl-C in a terminal)
//! - `SIGTERM` (systemd stop)
//! - `SIGQUIT`
//!
//! On non-unix targets only Ctrl-C is observed.

/// Waits for a termination signal and returns its name.
///
/// Each call registers its own listeners; `Err` means registration failed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for a termination signal and returns its name.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("CTRL_C")
}
