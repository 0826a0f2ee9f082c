// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::sync::Arc;

use futures_util::{FutureExt, future::BoxFuture};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::Instrument;

use super::{Connection, ConnectionError, ConnectionWriter, FailureClass, PeerAddr,
            RequestDispatcher, ServiceContext};
use crate::{Application, ConnectionHandlerFactory, Continuation, ErrorResponse,
            LivenessState, Protocol, RequestHooks, RequestParser, write_error_response};

/// Why [`ConnectionHandler::handle()`] stopped serving a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerExit {
    /// The peer closed the stream between requests.
    EndOfStream,
    /// The last response asked for the connection to be closed.
    CloseRequested,
    /// No request arrived within the keep-alive timeout.
    ReadTimeout,
    /// The worker stopped being alive while this connection was idle. A request that
    /// arrives after that is not served.
    WorkerStopping,
    Failed(FailureClass),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// Requests read from this connection and handed to the dispatcher.
    pub requests: u64,
    pub exit: HandlerExit,
}

/// Serves one accepted [`Connection`] end to end: read a request, dispatch it, repeat
/// until the connection should close. The connection is closed exactly once, when
/// [`handle()`](Self::handle) returns, or when its task is aborted.
pub struct ConnectionHandler<P, A, K> {
    ctx: Arc<ServiceContext<P, A, K>>,
    dispatcher: RequestDispatcher<P, A, K>,
}

impl<P, A, K> Clone for ConnectionHandler<P, A, K> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<P, A, K> std::fmt::Debug for ConnectionHandler<P, A, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler").finish_non_exhaustive()
    }
}

impl<P, A, K> ConnectionHandler<P, A, K>
where
    P: Protocol,
    A: Application<P::Request>,
    K: RequestHooks<P::Request>,
{
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext<P, A, K>>) -> Self {
        Self {
            dispatcher: RequestDispatcher::new(ctx.clone()),
            ctx,
        }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<ServiceContext<P, A, K>> { &self.ctx }

    pub async fn handle(&self, connection: Connection) -> HandlerOutcome {
        let span = tracing::debug_span!(
            "connection",
            id = connection.id(),
            peer = %connection.peer_addr()
        );
        self.serve(connection).instrument(span).await
    }

    async fn serve(&self, connection: Connection) -> HandlerOutcome {
        let (reader, mut writer, peer_addr) = connection.into_split();
        let mut parser = self.ctx.protocol.new_parser(reader);
        let mut requests = 0;

        let exit = match self
            .request_loop(&mut parser, &mut writer, &peer_addr, &mut requests)
            .await
        {
            Ok(exit) => exit,
            Err(error) => {
                self.report_failure(&error, &mut writer).await;
                HandlerExit::Failed(error.failure_class())
            }
        };

        // Let the peer see EOF, then close by dropping both halves.
        if let Err(error) = writer.shutdown().await {
            tracing::debug!(%error, "Ignoring error while shutting down connection");
        }
        drop(writer);
        drop(parser);

        tracing::debug!(requests, ?exit, "Connection closed");
        HandlerOutcome { requests, exit }
    }

    async fn request_loop(
        &self,
        parser: &mut P::Parser,
        writer: &mut ConnectionWriter,
        peer_addr: &PeerAddr,
        requests: &mut u64,
    ) -> Result<HandlerExit, ConnectionError> {
        loop {
            if self.ctx.state.is_alive() == LivenessState::NotAlive {
                return Ok(HandlerExit::WorkerStopping);
            }

            let read = async {
                match self.ctx.config.keepalive_timeout() {
                    Some(keepalive) => tokio::time::timeout(keepalive, parser.next_request())
                        .await
                        .ok(),
                    None => Some(parser.next_request().await),
                }
            };

            // An idle connection stops waiting as soon as the worker stops being alive.
            let next = tokio::select! {
                next = read => next,
                () = self.ctx.state.not_alive() => return Ok(HandlerExit::WorkerStopping),
            };

            let Some(next) = next else {
                return Ok(HandlerExit::ReadTimeout);
            };

            let Some(request) = next? else {
                return Ok(HandlerExit::EndOfStream);
            };

            // The read and the shutdown can complete together.
            if self.ctx.state.is_alive() == LivenessState::NotAlive {
                return Ok(HandlerExit::WorkerStopping);
            }

            *requests += 1;

            match self.dispatcher.dispatch(&request, writer, peer_addr).await? {
                Continuation::Continue => {}
                Continuation::Stop => return Ok(HandlerExit::CloseRequested),
            }
        }
    }

    async fn report_failure<W>(&self, error: &ConnectionError, writer: &mut W)
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        match error.failure_class() {
            FailureClass::TransportExpected => {
                tracing::debug!(%error, "Ignoring expected transport error");
            }
            FailureClass::TransportUnexpected => {
                tracing::error!(%error, "Socket error processing request");
            }
            FailureClass::ProtocolMalformed => {
                tracing::error!(%error, "Malformed request, closing connection");
            }
            FailureClass::ApplicationFault => {
                tracing::error!(%error, report = ?error.report(), "General error processing request");
            }
        }

        if !error.should_attempt_error_response() {
            return;
        }

        let Some(report) = error.report() else {
            return;
        };

        let response = ErrorResponse::internal(report, self.ctx.config.debug);
        if let Err(error) = write_error_response(&self.ctx.protocol, writer, &response).await
        {
            tracing::debug!(%error, "Could not send error response");
        }
    }
}

impl<P, A, K> ConnectionHandlerFactory for ConnectionHandler<P, A, K>
where
    P: Protocol,
    A: Application<P::Request>,
    K: RequestHooks<P::Request>,
{
    fn handle_connection(&self, connection: Connection) -> BoxFuture<'static, ()> {
        let handler = self.clone();
        async move {
            handler.handle(connection).await;
        }
        .boxed()
    }
}
