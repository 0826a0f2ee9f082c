// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The worker's top level control loop. See [`WorkerLifecycle`] for details.

use std::{fmt::{Debug, Formatter, Result as FmtResult},
          sync::Arc,
          time::Duration};

use super::{NoopHeartbeat, OsParentProcess, ParentProcess, WorkerHeartbeat};
use crate::{Acceptor, AcceptorError, ConnectionHandlerFactory, DrainReport, Listener,
            LivenessState, ShutdownKind, WakeupChannel, WakeupOutcome, WorkerConfig,
            WorkerState};

/// `Starting → Accepting → Stopping → Stopped`. Never goes backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Starting,
    Accepting,
    Stopping,
    Stopped,
}

/// Why the controller left [`LifecycleState::Accepting`]. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The supervisor asked (via a signal, or a bare [`WakeupChannel::signal()`], which
    /// counts as a graceful request).
    ShutdownRequested(ShutdownKind),
    /// The parent process id no longer matches the one captured at startup.
    ParentChanged,
    /// The worker marked itself not alive, eg after reaching `max_requests`.
    NotAlive,
}

/// Returned by [`WorkerLifecycle::run()`] once every connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub reason: StopReason,
    pub requests_served: u64,
    pub drain: DrainReport,
}

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum LifecycleError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Acceptor(#[from] AcceptorError),
}

/// Drives one worker from start to exit.
///
/// While [`Accepting`], each loop iteration:
/// 1. beats the [`WorkerHeartbeat`],
/// 2. compares the current parent pid to the one captured at startup, and stops (without
///    waiting) if it changed,
/// 3. waits on the [`WakeupChannel`] for up to the poll timeout, and stops if it was
///    signaled.
///
/// Stopping marks the worker not alive, beats one last time, and asks the [`Acceptor`]
/// to stop: with the graceful timeout, or with no grace at all for an
/// [`ShutdownKind::Immediate`] request.
///
/// [`Accepting`]: LifecycleState::Accepting
pub struct WorkerLifecycle<A> {
    acceptor: A,
    control: ControlLoop,
    graceful_timeout: Duration,
    connection_limit: usize,
    lifecycle_state: LifecycleState,
}

/// The part of the controller that the poll loop borrows. Kept apart from the acceptor
/// so that the loop's future only needs the acceptor to be [`Send`].
struct ControlLoop {
    state: Arc<WorkerState>,
    wakeup: WakeupChannel,
    heartbeat: Box<dyn WorkerHeartbeat>,
    parent: Box<dyn ParentProcess>,
    poll_timeout: Duration,
}

impl<A> Debug for WorkerLifecycle<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("WorkerLifecycle")
            .field("state", &self.control.state)
            .field("lifecycle_state", &self.lifecycle_state)
            .field("poll_timeout", &self.control.poll_timeout)
            .field("graceful_timeout", &self.graceful_timeout)
            .field("connection_limit", &self.connection_limit)
            .finish_non_exhaustive()
    }
}

impl<A: Acceptor> WorkerLifecycle<A> {
    #[must_use]
    pub fn new(
        acceptor: A,
        config: &WorkerConfig,
        state: Arc<WorkerState>,
        wakeup: WakeupChannel,
    ) -> Self {
        Self {
            acceptor,
            control: ControlLoop {
                state,
                wakeup,
                heartbeat: Box::new(NoopHeartbeat),
                parent: Box::new(OsParentProcess),
                poll_timeout: config.timeout,
            },
            graceful_timeout: config.graceful_timeout,
            connection_limit: config.worker_connections,
            lifecycle_state: LifecycleState::Starting,
        }
    }

    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: Box<dyn WorkerHeartbeat>) -> Self {
        self.control.heartbeat = heartbeat;
        self
    }

    /// The parent pid to compare against is the one stored in [`WorkerState`], not the
    /// one this probe reports now.
    #[must_use]
    pub fn with_parent_process(mut self, parent: Box<dyn ParentProcess>) -> Self {
        self.control.parent = parent;
        self
    }

    #[must_use]
    pub fn lifecycle_state(&self) -> LifecycleState { self.lifecycle_state }

    /// Runs the worker until it stops and every connection has been closed.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] if the acceptor can't start. Shutdown requests, parent
    /// death, and autorestart are normal exits, reported in [`WorkerExit::reason`].
    pub async fn run(
        mut self,
        listeners: Vec<Listener>,
        factory: Arc<dyn ConnectionHandlerFactory>,
    ) -> Result<WorkerExit, LifecycleError> {
        let listener_count = listeners.len();
        if let Err(error) =
            self.acceptor
                .start_accepting(listeners, self.connection_limit, factory)
        {
            self.control.state.mark_not_alive();
            self.transition(LifecycleState::Stopped);
            return Err(error.into());
        }

        tracing::info!(
            listeners = listener_count,
            worker_connections = self.connection_limit,
            parent_pid = self.control.state.parent_pid(),
            "Booted worker"
        );
        self.transition(LifecycleState::Accepting);

        let reason = self.control.poll_until_stop().await;

        self.transition(LifecycleState::Stopping);
        self.control.state.mark_not_alive();
        self.control.beat();

        let grace = match reason {
            StopReason::ShutdownRequested(ShutdownKind::Immediate) => Duration::ZERO,
            _ => self.graceful_timeout,
        };
        let drain = self.acceptor.stop_accepting(grace).await;

        self.transition(LifecycleState::Stopped);

        let exit = WorkerExit {
            reason,
            requests_served: self.control.state.requests_served(),
            drain,
        };
        tracing::info!(
            ?reason,
            requests_served = exit.requests_served,
            finished = drain.finished,
            cancelled = drain.cancelled,
            "Worker exiting"
        );

        Ok(exit)
    }

    fn transition(&mut self, next: LifecycleState) {
        tracing::info!(from = ?self.lifecycle_state, to = ?next, "Worker lifecycle");
        self.lifecycle_state = next;
    }
}

impl ControlLoop {
    async fn poll_until_stop(&self) -> StopReason {
        loop {
            if let Some(kind) = self.state.requested_shutdown() {
                return StopReason::ShutdownRequested(kind);
            }
            if self.state.is_alive() == LivenessState::NotAlive {
                return StopReason::NotAlive;
            }

            self.beat();

            let current_parent_pid = self.parent.parent_pid();
            if current_parent_pid != self.state.parent_pid() {
                tracing::info!(
                    expected = self.state.parent_pid(),
                    current = current_parent_pid,
                    "Parent changed, shutting down"
                );
                return StopReason::ParentChanged;
            }

            match self.wakeup.wait(self.poll_timeout).await {
                WakeupOutcome::Signaled => return self.stop_reason_after_wakeup(),
                WakeupOutcome::TimedOut => {}
            }
        }
    }

    fn stop_reason_after_wakeup(&self) -> StopReason {
        match self.state.requested_shutdown() {
            Some(kind) => StopReason::ShutdownRequested(kind),
            None if self.state.is_alive() == LivenessState::NotAlive => StopReason::NotAlive,
            None => StopReason::ShutdownRequested(ShutdownKind::Graceful),
        }
    }

    fn beat(&self) {
        if let Err(report) = self.heartbeat.notify() {
            tracing::warn!(error = ?report, "Heartbeat failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex,
                    atomic::{AtomicU32, AtomicUsize, Ordering}};

    use futures_util::future::BoxFuture;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Connection;

    /// Records what the controller asked of it.
    #[derive(Debug, Default, Clone)]
    struct FakeAcceptor {
        calls: Arc<Mutex<Vec<String>>>,
        fail_start: bool,
    }

    impl Acceptor for FakeAcceptor {
        fn start_accepting(
            &mut self,
            _listeners: Vec<Listener>,
            connection_limit: usize,
            _factory: Arc<dyn ConnectionHandlerFactory>,
        ) -> Result<(), AcceptorError> {
            if self.fail_start {
                return Err(AcceptorError::NoListeners);
            }
            self.calls
                .lock()
                .unwrap()
                .push(format!("start {connection_limit}"));
            Ok(())
        }

        async fn stop_accepting(&mut self, graceful_timeout: Duration) -> DrainReport {
            self.calls
                .lock()
                .unwrap()
                .push(format!("stop {}ms", graceful_timeout.as_millis()));
            DrainReport::default()
        }
    }

    #[derive(Debug)]
    struct NoopFactory;

    impl ConnectionHandlerFactory for NoopFactory {
        fn handle_connection(&self, _connection: Connection) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }
    }

    #[derive(Debug, Default, Clone)]
    struct CountingHeartbeat {
        beats: Arc<AtomicUsize>,
    }

    impl WorkerHeartbeat for CountingHeartbeat {
        fn notify(&self) -> miette::Result<()> {
            self.beats.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Reports pid `1` for the first `changes_after` probes, `2` afterwards.
    #[derive(Debug)]
    struct ScriptedParent {
        probes: AtomicU32,
        changes_after: u32,
    }

    impl ParentProcess for ScriptedParent {
        fn parent_pid(&self) -> u32 {
            let probe = self.probes.fetch_add(1, Ordering::SeqCst);
            if probe < self.changes_after { 1 } else { 2 }
        }
    }

    fn config() -> WorkerConfig {
        WorkerConfig::default()
            .with_worker_connections(7)
            .with_timeout(Duration::from_secs(60))
            .with_graceful_timeout(Duration::from_secs(5))
    }

    fn create_lifecycle(
        acceptor: FakeAcceptor,
        changes_after: u32,
    ) -> (WorkerLifecycle<FakeAcceptor>, Arc<WorkerState>, WakeupChannel, CountingHeartbeat)
    {
        let state = Arc::new(WorkerState::new(0, 1));
        let wakeup = WakeupChannel::new();
        let heartbeat = CountingHeartbeat::default();
        let lifecycle = WorkerLifecycle::new(acceptor, &config(), state.clone(), wakeup.clone())
            .with_heartbeat(Box::new(heartbeat.clone()))
            .with_parent_process(Box::new(ScriptedParent {
                probes: AtomicU32::new(0),
                changes_after,
            }));
        (lifecycle, state, wakeup, heartbeat)
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_change_stops_without_waiting_for_poll_timeout() {
        let acceptor = FakeAcceptor::default();
        let (lifecycle, state, _wakeup, heartbeat) = create_lifecycle(acceptor.clone(), 0);

        let started_at = tokio::time::Instant::now();
        let exit = lifecycle.run(vec![], Arc::new(NoopFactory)).await.unwrap();

        assert_eq!(exit.reason, StopReason::ParentChanged);
        assert!(started_at.elapsed() < Duration::from_secs(60));
        assert_eq!(state.is_alive(), LivenessState::NotAlive);
        // One beat in the loop, one final beat.
        assert_eq!(heartbeat.beats.load(Ordering::SeqCst), 2);
        assert_eq!(
            *acceptor.calls.lock().unwrap(),
            vec!["start 7".to_string(), "stop 5000ms".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_beats_every_poll_timeout_until_parent_changes() {
        let (lifecycle, _state, _wakeup, heartbeat) =
            create_lifecycle(FakeAcceptor::default(), 3);

        let started_at = tokio::time::Instant::now();
        let exit = lifecycle.run(vec![], Arc::new(NoopFactory)).await.unwrap();

        assert_eq!(exit.reason, StopReason::ParentChanged);
        let elapsed = started_at.elapsed();
        assert!(elapsed >= Duration::from_secs(180) && elapsed < Duration::from_secs(181));
        assert_eq!(heartbeat.beats.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_graceful_shutdown_request() {
        let acceptor = FakeAcceptor::default();
        let (lifecycle, state, wakeup, _heartbeat) = create_lifecycle(acceptor.clone(), u32::MAX);

        let run = tokio::spawn(lifecycle.run(vec![], Arc::new(NoopFactory)));
        state.request_shutdown(ShutdownKind::Graceful);
        wakeup.signal();

        let exit = run.await.unwrap().unwrap();
        assert_eq!(exit.reason, StopReason::ShutdownRequested(ShutdownKind::Graceful));
        assert_eq!(acceptor.calls.lock().unwrap()[1], "stop 5000ms");
    }

    #[tokio::test]
    async fn test_immediate_shutdown_skips_grace_period() {
        let acceptor = FakeAcceptor::default();
        let (lifecycle, state, wakeup, _heartbeat) = create_lifecycle(acceptor.clone(), u32::MAX);

        let run = tokio::spawn(lifecycle.run(vec![], Arc::new(NoopFactory)));
        state.request_shutdown(ShutdownKind::Immediate);
        wakeup.signal();

        let exit = run.await.unwrap().unwrap();
        assert_eq!(exit.reason, StopReason::ShutdownRequested(ShutdownKind::Immediate));
        assert_eq!(acceptor.calls.lock().unwrap()[1], "stop 0ms");
    }

    #[tokio::test]
    async fn test_autorestart_wakeup_stops_as_not_alive() {
        let (lifecycle, state, wakeup, _heartbeat) =
            create_lifecycle(FakeAcceptor::default(), u32::MAX);

        let run = tokio::spawn(lifecycle.run(vec![], Arc::new(NoopFactory)));
        state.record_request();
        state.mark_not_alive();
        wakeup.signal();

        let exit = run.await.unwrap().unwrap();
        assert_eq!(exit.reason, StopReason::NotAlive);
        assert_eq!(exit.requests_served, 1);
    }

    #[tokio::test]
    async fn test_bare_wakeup_is_a_graceful_request() {
        let (lifecycle, _state, wakeup, _heartbeat) =
            create_lifecycle(FakeAcceptor::default(), u32::MAX);

        let run = tokio::spawn(lifecycle.run(vec![], Arc::new(NoopFactory)));
        wakeup.signal();

        let exit = run.await.unwrap().unwrap();
        assert_eq!(exit.reason, StopReason::ShutdownRequested(ShutdownKind::Graceful));
    }

    #[tokio::test]
    async fn test_acceptor_start_failure() {
        let acceptor = FakeAcceptor {
            fail_start: true,
            ..Default::default()
        };
        let (lifecycle, state, _wakeup, heartbeat) = create_lifecycle(acceptor, u32::MAX);

        let result = lifecycle.run(vec![], Arc::new(NoopFactory)).await;

        assert!(matches!(
            result,
            Err(LifecycleError::Acceptor(AcceptorError::NoListeners))
        ));
        assert_eq!(state.is_alive(), LivenessState::NotAlive);
        assert_eq!(heartbeat.beats.load(Ordering::SeqCst), 0);
    }
}
