// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The seam between the generic worker and a concurrency backend. See [`Acceptor`].

use std::{future::Future, sync::Arc, time::Duration};

use futures_util::future::BoxFuture;

use super::Listener;
use crate::Connection;

/// Produces the task body that serves one accepted connection. Implemented by
/// [`ConnectionHandler`](crate::ConnectionHandler); tests plug in their own.
pub trait ConnectionHandlerFactory: Send + Sync + 'static {
    fn handle_connection(&self, connection: Connection) -> BoxFuture<'static, ()>;
}

/// What happened to the connections that were still being served when
/// [`Acceptor::stop_accepting()`] was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Handler tasks that ended on their own within the graceful timeout.
    pub finished: usize,
    /// Handler tasks that were still running at the deadline and got cancelled.
    pub cancelled: usize,
}

/// Binds the worker to one concurrency backend. This is the only part of the worker
/// that knows how tasks are spawned and cancelled.
///
/// Lifecycle:
/// 1. [`start_accepting()`] takes ownership of the listeners and returns right away; the
///    accept loops run in the background.
/// 2. [`stop_accepting()`] closes the listeners, waits up to the graceful timeout for
///    running handlers, cancels the rest, and only returns once every connection has
///    been closed.
///
/// [`start_accepting()`]: Acceptor::start_accepting
/// [`stop_accepting()`]: Acceptor::stop_accepting
pub trait Acceptor: Send {
    /// # Errors
    ///
    /// Returns [`AcceptorError`] if there is nothing to accept on, the limit is zero, or
    /// this acceptor is already running.
    fn start_accepting(
        &mut self,
        listeners: Vec<Listener>,
        connection_limit: usize,
        factory: Arc<dyn ConnectionHandlerFactory>,
    ) -> Result<(), AcceptorError>;

    fn stop_accepting(
        &mut self,
        graceful_timeout: Duration,
    ) -> impl Future<Output = DrainReport> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum AcceptorError {
    #[error("No listening sockets were given to the worker")]
    #[diagnostic(
        code(r3bl_worker::acceptor::no_listeners),
        help("Bind at least one TCP or unix socket before starting the worker.")
    )]
    NoListeners,

    #[error("The acceptor is already accepting connections")]
    #[diagnostic(code(r3bl_worker::acceptor::already_accepting))]
    AlreadyAccepting,

    #[error("The connection limit must be at least 1")]
    #[diagnostic(code(r3bl_worker::acceptor::zero_connection_limit))]
    ZeroConnectionLimit,
}
