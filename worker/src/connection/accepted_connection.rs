// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::{fmt::{Debug, Display, Formatter, Result as FmtResult},
          net::SocketAddr,
          path::PathBuf,
          sync::atomic::{AtomicU64, Ordering}};

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf, split};

/// Any byte stream a [`Connection`] can wrap: TCP, unix sockets, or in-memory pipes in
/// tests.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Read half handed to the [`RequestParser`](crate::RequestParser).
pub type ConnectionReader = ReadHalf<BoxedStream>;

/// Write half the [dispatcher](crate::RequestDispatcher) writes responses to.
pub type ConnectionWriter = WriteHalf<BoxedStream>;

/// Remote address of an accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(SocketAddr),
    /// Unix peers are usually unnamed.
    Unix(Option<PathBuf>),
    Unknown,
}

impl Display for PeerAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PeerAddr::Tcp(addr) => write!(f, "{addr}"),
            PeerAddr::Unix(Some(path)) => write!(f, "unix:{}", path.display()),
            PeerAddr::Unix(None) => write!(f, "unix:<unnamed>"),
            PeerAddr::Unknown => write!(f, "<unknown>"),
        }
    }
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One accepted transport endpoint plus its peer address.
///
/// A connection is owned by exactly one [`ConnectionHandler`] task. It is closed when its
/// two halves are dropped, which happens when that task ends, on every path (including
/// an aborted task).
///
/// [`ConnectionHandler`]: crate::ConnectionHandler
pub struct Connection {
    stream: BoxedStream,
    peer_addr: PeerAddr,
    id: u64,
}

impl Connection {
    #[must_use]
    pub fn new(stream: BoxedStream, peer_addr: PeerAddr) -> Self {
        Self {
            stream,
            peer_addr,
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn peer_addr(&self) -> &PeerAddr { &self.peer_addr }

    /// Process unique id, used to correlate log lines.
    #[must_use]
    pub fn id(&self) -> u64 { self.id }

    #[must_use]
    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter, PeerAddr) {
        let (reader, writer) = split(self.stream);
        (reader, writer, self.peer_addr)
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}
