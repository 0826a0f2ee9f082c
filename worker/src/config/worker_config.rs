// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::time::Duration;

/// Default maximum number of concurrently served connections.
pub const DEFAULT_WORKER_CONNECTIONS: usize = 1_000;

/// Default control loop poll timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default keep-alive read timeout, in seconds.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 2;

/// Default grace period for in-flight connections on shutdown, in seconds.
pub const DEFAULT_GRACEFUL_TIMEOUT_SECS: u64 = 30;

/// Options consumed by the worker. Build one with [`WorkerConfig::default()`] and the
/// `with_*` setters, then check it with [`WorkerConfig::validate()`] (which
/// [`Worker::new()`] does for you).
///
/// [`Worker::new()`]: crate::Worker::new
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Maximum number of connections served at the same time, per listening socket.
    /// Accepting on a socket pauses while this many of its handler tasks are running.
    pub worker_connections: usize,
    /// How long the lifecycle controller waits for a wakeup before it beats the
    /// heartbeat and checks the parent process again.
    pub timeout: Duration,
    /// How long a connection may sit idle waiting for its next request. [`None`] (or
    /// zero) means wait forever.
    pub keepalive: Option<Duration>,
    /// How long in-flight connections get to finish after a graceful shutdown starts.
    pub graceful_timeout: Duration,
    /// Requests served before the worker retires itself. `0` means unlimited.
    pub max_requests: u64,
    /// Include the full error report in error responses.
    pub debug: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_connections: DEFAULT_WORKER_CONNECTIONS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            keepalive: Some(Duration::from_secs(DEFAULT_KEEPALIVE_SECS)),
            graceful_timeout: Duration::from_secs(DEFAULT_GRACEFUL_TIMEOUT_SECS),
            max_requests: 0,
            debug: false,
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn with_worker_connections(mut self, worker_connections: usize) -> Self {
        self.worker_connections = worker_connections;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_keepalive(mut self, keepalive: Option<Duration>) -> Self {
        self.keepalive = keepalive;
        self
    }

    #[must_use]
    pub fn with_graceful_timeout(mut self, graceful_timeout: Duration) -> Self {
        self.graceful_timeout = graceful_timeout;
        self
    }

    #[must_use]
    pub fn with_max_requests(mut self, max_requests: u64) -> Self {
        self.max_requests = max_requests;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The effective keep-alive read timeout. A zero duration is the same as no timeout.
    #[must_use]
    pub fn keepalive_timeout(&self) -> Option<Duration> {
        self.keepalive.filter(|it| !it.is_zero())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value would make the worker unable to serve (no
    /// connection slots) or spin (zero poll timeout).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_connections == 0 {
            return Err(ConfigError::ZeroWorkerConnections);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Invalid [`WorkerConfig`] values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum ConfigError {
    #[error("worker_connections must be at least 1")]
    #[diagnostic(
        code(r3bl_worker::config::zero_worker_connections),
        help("Use a value like 1000. Each connection is a cheap task, not a thread.")
    )]
    ZeroWorkerConnections,

    #[error("timeout must be greater than zero")]
    #[diagnostic(
        code(r3bl_worker::config::zero_timeout),
        help(
            "The timeout bounds how long the control loop sleeps between heartbeats. \
             A zero value would make it spin."
        )
    )]
    ZeroTimeout,
}
