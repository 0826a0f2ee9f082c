// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use tokio::io::{DuplexStream, ReadHalf, WriteHalf, duplex, split};

use crate::{Connection, PeerAddr};

/// Size of the in-memory pipe between the client and the worker side. Large enough that
/// a test can write a whole batch of requests before the worker reads any of them.
pub const MOCK_CONNECTION_BUFFER_SIZE: usize = 64 * 1024;

/// The client half of an in-memory connection. The worker half is handed out as a
/// [`Connection`] by [`get_mock_connection()`].
#[derive(Debug)]
pub struct MockClient {
    pub client_read: ReadHalf<DuplexStream>,
    pub client_write: WriteHalf<DuplexStream>,
}

/// A “channel” is created by [`tokio::io::duplex`] that can be used as in-memory IO
/// types.
///
/// Given a "channel":
/// 1. Bytes the test writes to [`MockClient::client_write`] are read by the worker from
///    the returned [`Connection`].
/// 2. Responses the worker writes to the [`Connection`] are read by the test from
///    [`MockClient::client_read`].
#[must_use]
pub fn get_mock_connection() -> (MockClient, Connection) {
    let (client_stream, server_stream) = duplex(MOCK_CONNECTION_BUFFER_SIZE);
    let (client_read, client_write) = split(client_stream);

    let connection = Connection::new(Box::new(server_stream), PeerAddr::Unknown);

    (
        MockClient {
            client_read,
            client_write,
        },
        connection,
    )
}
