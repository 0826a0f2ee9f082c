// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::{fmt::{Debug, Formatter, Result as FmtResult},
          sync::Arc};

use super::{LifecycleError, NoopHeartbeat, OsParentProcess, ParentProcess, WorkerExit,
            WorkerHeartbeat, WorkerLifecycle};
use crate::{Acceptor, Application, ConfigError, ConnectionHandler,
            ConnectionHandlerFactory, Listener, NoopHooks, Protocol, RequestHooks,
            ServiceContext, TokioAcceptor, WakeupChannel, WorkerConfig, WorkerState};

/// Everything needed to run one worker process, wired together.
///
/// ```no_run
/// use r3bl_worker::{Body, LineProtocol, LineRequest, Application, RequestEnv,
///                   ResponseHead, Worker, WorkerConfig, Listener};
///
/// struct Echo;
///
/// impl Application<LineRequest> for Echo {
///     async fn call(
///         &self,
///         env: RequestEnv<'_, LineRequest>,
///         _start_response: &mut ResponseHead,
///     ) -> miette::Result<Body> {
///         Ok(Body::from_chunks([format!("{}\n", env.request.line)]))
///     }
/// }
///
/// # async fn run() -> miette::Result<()> {
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await.unwrap();
/// let worker = Worker::new(WorkerConfig::default(), LineProtocol, Echo)?;
/// let exit = worker.run(vec![Listener::from(listener)]).await?;
/// println!("{exit:?}");
/// # Ok(())
/// # }
/// ```
pub struct Worker<P, A, K = NoopHooks> {
    config: WorkerConfig,
    state: Arc<WorkerState>,
    wakeup: WakeupChannel,
    protocol: P,
    app: A,
    hooks: K,
    heartbeat: Box<dyn WorkerHeartbeat>,
    parent: Box<dyn ParentProcess>,
}

impl<P, A, K> Debug for Worker<P, A, K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<P, A> Worker<P, A, NoopHooks>
where
    P: Protocol,
    A: Application<P::Request>,
{
    /// Captures the current parent pid.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` doesn't validate.
    pub fn new(config: WorkerConfig, protocol: P, app: A) -> Result<Self, ConfigError> {
        config.validate()?;
        let parent = OsParentProcess;
        Ok(Self {
            state: Arc::new(WorkerState::new(config.max_requests, parent.parent_pid())),
            config,
            wakeup: WakeupChannel::new(),
            protocol,
            app,
            hooks: NoopHooks,
            heartbeat: Box::new(NoopHeartbeat),
            parent: Box::new(parent),
        })
    }
}

impl<P, A, K> Worker<P, A, K>
where
    P: Protocol,
    A: Application<P::Request>,
    K: RequestHooks<P::Request>,
{
    #[must_use]
    pub fn with_hooks<K2: RequestHooks<P::Request>>(self, hooks: K2) -> Worker<P, A, K2> {
        Worker {
            config: self.config,
            state: self.state,
            wakeup: self.wakeup,
            protocol: self.protocol,
            app: self.app,
            hooks,
            heartbeat: self.heartbeat,
            parent: self.parent,
        }
    }

    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: impl WorkerHeartbeat + 'static) -> Self {
        self.heartbeat = Box::new(heartbeat);
        self
    }

    /// Replaces the parent probe and re-captures the parent pid from it. This resets the
    /// [`WorkerState`], so call it before handing out [`Worker::state()`].
    #[must_use]
    pub fn with_parent_process(mut self, parent: impl ParentProcess + 'static) -> Self {
        self.state = Arc::new(WorkerState::new(
            self.config.max_requests,
            parent.parent_pid(),
        ));
        self.parent = Box::new(parent);
        self
    }

    #[must_use]
    pub fn config(&self) -> &WorkerConfig { &self.config }

    /// Shared state, eg for [`spawn_signal_listener()`](crate::spawn_signal_listener).
    #[must_use]
    pub fn state(&self) -> Arc<WorkerState> { self.state.clone() }

    #[must_use]
    pub fn wakeup(&self) -> WakeupChannel { self.wakeup.clone() }

    /// Serves `listeners` on tokio tasks until the worker stops.
    ///
    /// # Errors
    ///
    /// See [`WorkerLifecycle::run()`].
    pub async fn run(self, listeners: Vec<Listener>) -> Result<WorkerExit, LifecycleError> {
        self.run_with(TokioAcceptor::new(), listeners).await
    }

    /// Same as [`Worker::run()`] with a different [`Acceptor`] backend.
    ///
    /// # Errors
    ///
    /// See [`WorkerLifecycle::run()`].
    pub async fn run_with<Acc: Acceptor>(
        self,
        acceptor: Acc,
        listeners: Vec<Listener>,
    ) -> Result<WorkerExit, LifecycleError> {
        let lifecycle = WorkerLifecycle::new(
            acceptor,
            &self.config,
            self.state.clone(),
            self.wakeup.clone(),
        )
        .with_heartbeat(self.heartbeat)
        .with_parent_process(self.parent);

        let factory: Arc<dyn ConnectionHandlerFactory> =
            Arc::new(ConnectionHandler::new(Arc::new(ServiceContext {
                config: self.config,
                state: self.state,
                wakeup: self.wakeup,
                protocol: self.protocol,
                app: self.app,
                hooks: self.hooks,
            })));

        lifecycle.run(listeners, factory).await
    }
}
