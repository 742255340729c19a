//! Shutdown on OS signals.
//!
//! [`shutdown_token`] hands out a [`CancellationToken`] that is cancelled on
//! SIGINT, SIGTERM or SIGQUIT, ready to pass to
//! [`Manager::watch`](crate::process::Manager::watch).

use crate::error::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Complete when the supervisor receives a termination signal.
pub async fn wait_for_shutdown_signal() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigquit.recv() => info!("Received SIGQUIT"),
    }

    Ok(())
}

/// Token cancelled by the first termination signal.
///
/// Handlers are registered before returning, so a signal arriving right
/// after the call is not lost.
pub fn shutdown_token() -> Result<CancellationToken> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigquit.recv() => info!("Received SIGQUIT"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });

    Ok(token)
}
