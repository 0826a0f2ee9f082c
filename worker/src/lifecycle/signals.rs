// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::sync::Arc;

use miette::IntoDiagnostic;
use tokio::task::JoinHandle;

use crate::{ShutdownKind, WakeupChannel, WorkerState};

/// Turns process signals into shutdown requests and wakes the [lifecycle controller].
///
/// | Signal    | Request                     |
/// | :-------- | :-------------------------- |
/// | `SIGQUIT` | [`ShutdownKind::Graceful`]  |
/// | `SIGTERM` | [`ShutdownKind::Immediate`] |
/// | `SIGINT`  | [`ShutdownKind::Immediate`] |
///
/// The handlers are registered before this returns, so a signal that arrives right
/// after is not lost. The returned task runs until it is aborted.
///
/// # Errors
///
/// Returns an error if a signal handler can't be registered.
///
/// [lifecycle controller]: crate::WorkerLifecycle
#[cfg(unix)]
pub fn spawn_signal_listener(
    state: Arc<WorkerState>,
    wakeup: WakeupChannel,
) -> miette::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut quit = signal(SignalKind::quit()).into_diagnostic()?;
    let mut terminate = signal(SignalKind::terminate()).into_diagnostic()?;
    let mut interrupt = signal(SignalKind::interrupt()).into_diagnostic()?;

    Ok(tokio::spawn(async move {
        loop {
            let (kind, name) = tokio::select! {
                Some(()) = quit.recv() => (ShutdownKind::Graceful, "SIGQUIT"),
                Some(()) = terminate.recv() => (ShutdownKind::Immediate, "SIGTERM"),
                Some(()) = interrupt.recv() => (ShutdownKind::Immediate, "SIGINT"),
                else => return,
            };
            tracing::info!(signal = name, ?kind, "Shutdown requested");
            state.request_shutdown(kind);
            wakeup.signal();
        }
    }))
}

/// Only Ctrl+C is available here; it maps to [`ShutdownKind::Immediate`].
///
/// # Errors
///
/// Never fails; the signature matches the unix version.
#[cfg(not(unix))]
pub fn spawn_signal_listener(
    state: Arc<WorkerState>,
    wakeup: WakeupChannel,
) -> miette::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.into_diagnostic().is_ok() {
            tracing::info!(signal = "ctrl-c", "Shutdown requested");
            state.request_shutdown(ShutdownKind::Immediate);
            wakeup.signal();
        }
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;
    use crate::WakeupOutcome;

    #[tokio::test]
    #[serial]
    async fn test_sigquit_requests_graceful_shutdown() {
        let state = Arc::new(WorkerState::new(0, 1));
        let wakeup = WakeupChannel::new();
        let listener = spawn_signal_listener(state.clone(), wakeup.clone()).unwrap();

        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("kill -QUIT {}", std::process::id()))
            .status()
            .unwrap();
        assert!(status.success());

        assert_eq!(
            wakeup.wait(Duration::from_secs(10)).await,
            WakeupOutcome::Signaled
        );
        assert_eq!(state.requested_shutdown(), Some(ShutdownKind::Graceful));

        listener.abort();
    }
}
