// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::{sync::{Arc, Mutex, MutexGuard, PoisonError},
          time::Duration};

use tokio::{sync::Semaphore,
            task::{JoinError, JoinSet}};

use super::{Acceptor, AcceptorError, ConnectionHandlerFactory, DrainReport, Listener};

/// How long an accept loop pauses after a failed `accept()` (eg `EMFILE`), so that it
/// doesn't spin while the process is out of file descriptors.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

type HandlerTasks = Arc<Mutex<JoinSet<()>>>;

/// [`Acceptor`] backed by tokio tasks.
///
/// - One accept task per [`Listener`].
/// - One handler task per accepted connection, tracked in a [`JoinSet`] so they can be
///   drained and, at the graceful deadline, aborted.
/// - Concurrency is bounded per listener: each one gets its own [`Semaphore`] with
///   `connection_limit` permits, so a busy listener can't starve the others. A permit is
///   acquired **before** `accept()` is called and moves into the handler task, so a full
///   listener stops pulling connections off its backlog (where a sibling worker can pick
///   them up) instead of accepting and then queueing them.
#[derive(Debug, Default)]
pub struct TokioAcceptor {
    accept_tasks: JoinSet<()>,
    handler_tasks: HandlerTasks,
    accepting: bool,
}

impl TokioAcceptor {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of handler tasks that have not been reaped yet.
    #[must_use]
    pub fn tracked_connections(&self) -> usize { lock(&self.handler_tasks).len() }
}

impl Acceptor for TokioAcceptor {
    fn start_accepting(
        &mut self,
        listeners: Vec<Listener>,
        connection_limit: usize,
        factory: Arc<dyn ConnectionHandlerFactory>,
    ) -> Result<(), AcceptorError> {
        if self.accepting {
            return Err(AcceptorError::AlreadyAccepting);
        }
        if listeners.is_empty() {
            return Err(AcceptorError::NoListeners);
        }
        if connection_limit == 0 {
            return Err(AcceptorError::ZeroConnectionLimit);
        }

        for listener in listeners {
            self.accept_tasks.spawn(accept_loop(
                listener,
                Arc::new(Semaphore::new(connection_limit)),
                factory.clone(),
                self.handler_tasks.clone(),
            ));
        }
        self.accepting = true;

        Ok(())
    }

    async fn stop_accepting(&mut self, graceful_timeout: Duration) -> DrainReport {
        // Dropping the accept tasks drops (closes) their listeners.
        self.accept_tasks.abort_all();
        while self.accept_tasks.join_next().await.is_some() {}
        self.accepting = false;

        let mut tasks = std::mem::take(&mut *lock(&self.handler_tasks));
        let mut report = DrainReport::default();

        if !tasks.is_empty() {
            tracing::info!(
                in_flight = tasks.len(),
                ?graceful_timeout,
                "Waiting for connections to finish"
            );
        }

        let drained = tokio::time::timeout(graceful_timeout, async {
            while let Some(result) = tasks.join_next().await {
                log_if_panicked(result);
                report.finished += 1;
            }
        })
        .await;

        if drained.is_err() {
            tasks.abort_all();
            while let Some(result) = tasks.join_next().await {
                match result {
                    Err(error) if error.is_cancelled() => report.cancelled += 1,
                    other => {
                        log_if_panicked(other);
                        report.finished += 1;
                    }
                }
            }
            tracing::warn!(
                cancelled = report.cancelled,
                "Cancelled connections still running after the graceful timeout"
            );
        }

        report
    }
}

async fn accept_loop(
    listener: Listener,
    semaphore: Arc<Semaphore>,
    factory: Arc<dyn ConnectionHandlerFactory>,
    handler_tasks: HandlerTasks,
) {
    let name = listener.describe();
    tracing::info!(listener = %name, "Listening");

    loop {
        // Only fails if the semaphore is closed, which never happens here.
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            return;
        };

        let connection = match listener.accept().await {
            Ok(connection) => connection,
            Err(error) => {
                tracing::warn!(listener = %name, %error, "Accept failed");
                drop(permit);
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };

        let handler = factory.handle_connection(connection);
        {
            let mut tasks = lock(&handler_tasks);
            while let Some(result) = tasks.try_join_next() {
                log_if_panicked(result);
            }
            tasks.spawn(async move {
                let _permit = permit;
                handler.await;
            });
        }
    }
}

fn lock(tasks: &Mutex<JoinSet<()>>) -> MutexGuard<'_, JoinSet<()>> {
    // A panic while holding this lock can't leave the set half updated.
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

fn log_if_panicked(result: Result<(), JoinError>) {
    if let Err(error) = result
        && error.is_panic()
    {
        tracing::error!(%error, "Connection handler panicked");
    }
}
