// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Single-slot notification used to interrupt the [lifecycle controller]'s timed wait.
//! See [`WakeupChannel`] for details.
//!
//! [lifecycle controller]: crate::WorkerLifecycle

use std::{sync::Arc, time::Duration};

use tokio::sync::Notify;

/// Outcome of [`WakeupChannel::wait()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupOutcome {
    /// [`WakeupChannel::signal()`] was called since the previous wait returned.
    Signaled,
    /// The timeout elapsed with no signal.
    TimedOut,
}

/// Cloneable handle that lets any task (or a plain OS thread) wake the [lifecycle
/// controller] out of its poll wait.
///
/// This is a liveness primitive, not a message queue:
/// - [`signal()`] never blocks and never fails. When nobody is waiting it stores a single
///   permit, so any number of signals sent between two waits collapse into one wakeup.
/// - [`wait()`] consumes at most one permit per call.
///
/// The "reason" for a wakeup is never carried by the channel itself. The waiter reads it
/// from [`WorkerState`] (alive flag and pending shutdown request) after it wakes up.
///
/// [`WorkerState`]: crate::WorkerState
/// [`signal()`]: WakeupChannel::signal
/// [`wait()`]: WakeupChannel::wait
/// [lifecycle controller]: crate::WorkerLifecycle
#[derive(Debug, Clone, Default)]
pub struct WakeupChannel {
    notify: Arc<Notify>,
}

impl WakeupChannel {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Wakes the current (or the next) waiter.
    pub fn signal(&self) { self.notify.notify_one(); }

    /// Suspends the calling task until [`signal()`](Self::signal) is called or `timeout`
    /// elapses, whichever comes first. A signal sent before this call started is
    /// delivered immediately.
    pub async fn wait(&self, timeout: Duration) -> WakeupOutcome {
        match tokio::time::timeout(timeout, self.notify.notified()).await {
            Ok(()) => WakeupOutcome::Signaled,
            Err(_elapsed) => WakeupOutcome::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SHORT: Duration = Duration::from_millis(20);
    const LONG: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_signal_before_wait_is_not_lost() {
        let channel = WakeupChannel::new();
        channel.signal();
        assert_eq!(channel.wait(LONG).await, WakeupOutcome::Signaled);
    }

    #[tokio::test]
    async fn test_repeated_signals_collapse_into_one_wakeup() {
        let channel = WakeupChannel::new();
        channel.signal();
        channel.signal();
        channel.signal();
        assert_eq!(channel.wait(LONG).await, WakeupOutcome::Signaled);
        assert_eq!(channel.wait(SHORT).await, WakeupOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_signal() {
        let channel = WakeupChannel::new();
        assert_eq!(channel.wait(Duration::from_secs(5)).await, WakeupOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_signal_from_another_task_while_waiting() {
        let channel = WakeupChannel::new();
        let signaler = channel.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(SHORT).await;
            signaler.signal();
        });
        assert_eq!(channel.wait(LONG).await, WakeupOutcome::Signaled);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_signal_from_os_thread() {
        let channel = WakeupChannel::new();
        let signaler = channel.clone();
        std::thread::spawn(move || signaler.signal()).join().unwrap();
        assert_eq!(channel.wait(LONG).await, WakeupOutcome::Signaled);
    }
}
