// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::{fmt::{Debug, Formatter, Result as FmtResult},
          future::Future};

use futures_util::{Stream, StreamExt, stream::{self, BoxStream}};

use super::ResponseHead;
use crate::{PeerAddr, WorkerState};

/// What the [`Application`] sees of a request.
#[derive(Debug)]
pub struct RequestEnv<'a, Req> {
    pub request: &'a Req,
    pub peer_addr: &'a PeerAddr,
    pub worker: &'a WorkerState,
    pub debug: bool,
}

/// Response body returned by [`Application::call()`].
pub enum Body {
    /// Chunks are written in order. The stream is dropped as soon as it is exhausted (or
    /// fails), which releases whatever it holds.
    Stream(BoxStream<'static, miette::Result<Vec<u8>>>),
    /// Close the connection without sending a response. Nothing is written, not even the
    /// head, and no keep-alive is attempted. The application never sees the connection's
    /// writer, so this is how it drops a client on purpose.
    AlreadyHandled,
}

impl Body {
    #[must_use]
    pub fn empty() -> Self { Self::Stream(stream::empty().boxed()) }

    #[must_use]
    pub fn from_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let chunks: Vec<Vec<u8>> = chunks.into_iter().map(Into::into).collect();
        Self::Stream(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    #[must_use]
    pub fn from_stream<S>(body: S) -> Self
    where
        S: Stream<Item = miette::Result<Vec<u8>>> + Send + 'static,
    {
        Self::Stream(body.boxed())
    }
}

impl Debug for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Body::Stream(_) => write!(f, "Body::Stream"),
            Body::AlreadyHandled => write!(f, "Body::AlreadyHandled"),
        }
    }
}

/// The application callable. `start_response` is pre-filled with `200 OK`; set the
/// status and headers on it before returning the body.
///
/// An `Err` (or an `Err` item in the body stream) is an application fault: it is logged
/// with its full report and, if the head wasn't written yet, answered with an error
/// response. The connection is then closed, and the worker keeps serving.
pub trait Application<Req>: Send + Sync + 'static {
    fn call(
        &self,
        env: RequestEnv<'_, Req>,
        start_response: &mut ResponseHead,
    ) -> impl Future<Output = miette::Result<Body>> + Send;
}

/// Hooks that run around every dispatched request.
pub trait RequestHooks<Req>: Send + Sync + 'static {
    /// Runs before the application. An error fails the request.
    ///
    /// # Errors
    ///
    /// Any error is reported as a request failure and answered with an error response.
    fn pre_request(&self, _worker: &WorkerState, _request: &Req) -> miette::Result<()> {
        Ok(())
    }

    /// Runs exactly once after every dispatched request, however it ended. Errors are
    /// logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Errors never change the outcome of the request.
    fn post_request(&self, _worker: &WorkerState, _request: &Req) -> miette::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl<Req> RequestHooks<Req> for NoopHooks {}
