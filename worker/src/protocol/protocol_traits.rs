// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Seams between the worker and the wire protocol it serves. The worker never looks
//! inside a request or a response head; it only needs to:
//! 1. pull the next request off a connection ([`RequestParser`]),
//! 2. know whether the peer asked to close after it ([`ProtocolRequest`]),
//! 3. frame a response head or an error response ([`Protocol`]).

use std::future::Future;

use super::{ErrorResponse, ParseError, ResponseHead};
use crate::ConnectionReader;

pub trait ProtocolRequest: Send + Sync + 'static {
    /// `true` when the peer asked to close the connection after this request's response.
    fn should_close(&self) -> bool;
}

/// Lazy, finite, non-restartable source of requests for one connection.
pub trait RequestParser: Send + 'static {
    type Request: ProtocolRequest;

    /// Reads the next request.
    ///
    /// - `Ok(Some(request))`: a complete request.
    /// - `Ok(None)`: the peer closed the stream between requests.
    /// - `Err(_)`: I/O failure, or bytes that can't be framed as a request.
    fn next_request(
        &mut self,
    ) -> impl Future<Output = Result<Option<Self::Request>, ParseError>> + Send;
}

pub trait Protocol: Send + Sync + 'static {
    type Request: ProtocolRequest;
    type Parser: RequestParser<Request = Self::Request>;

    fn new_parser(&self, reader: ConnectionReader) -> Self::Parser;

    /// Appends the framed response head to `out`. `keep_alive` is `false` when the
    /// connection closes after this response.
    fn encode_head(&self, head: &ResponseHead, keep_alive: bool, out: &mut Vec<u8>);

    /// Appends a complete error response (head and body) to `out`. The connection is
    /// always closed after an error response.
    fn encode_error(&self, error: &ErrorResponse, out: &mut Vec<u8>);
}
