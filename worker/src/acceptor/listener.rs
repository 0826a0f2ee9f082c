// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::{io, net::SocketAddr};

use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

use crate::{Connection, PeerAddr};

/// An already bound, listening socket. The worker never binds sockets itself; the
/// supervisor (or the `line_worker` binary) hands them over.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl From<TcpListener> for Listener {
    fn from(listener: TcpListener) -> Self { Self::Tcp(listener) }
}

#[cfg(unix)]
impl From<UnixListener> for Listener {
    fn from(listener: UnixListener) -> Self { Self::Unix(listener) }
}

impl Listener {
    /// Adopts a std listener, eg one inherited from the supervisor.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket can't be switched to non-blocking mode or
    /// registered with the tokio reactor (which requires a running runtime).
    pub fn from_std_tcp(listener: std::net::TcpListener) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self::Tcp(TcpListener::from_std(listener)?))
    }

    /// # Errors
    ///
    /// Same as [`Listener::from_std_tcp()`].
    #[cfg(unix)]
    pub fn from_std_unix(listener: std::os::unix::net::UnixListener) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self::Unix(UnixListener::from_std(listener)?))
    }

    #[must_use]
    pub fn local_tcp_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Listener::Unix(_) => None,
        }
    }

    /// Human readable name for log lines, eg `tcp:127.0.0.1:8000` or `unix:/tmp/w.sock`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Listener::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => format!("tcp:{addr}"),
                Err(_) => "tcp:<unknown>".to_string(),
            },
            #[cfg(unix)]
            Listener::Unix(listener) => match listener
                .local_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|path| path.display().to_string()))
            {
                Some(path) => format!("unix:{path}"),
                None => "unix:<unnamed>".to_string(),
            },
        }
    }

    /// Waits for the next connection.
    ///
    /// # Errors
    ///
    /// Returns the accept error (eg `EMFILE` when out of file descriptors). These are
    /// usually transient.
    pub async fn accept(&self) -> io::Result<Connection> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                if let Err(error) = stream.set_nodelay(true) {
                    tracing::debug!(%error, peer = %addr, "Could not set TCP_NODELAY");
                }
                Ok(Connection::new(Box::new(stream), PeerAddr::Tcp(addr)))
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, addr) = listener.accept().await?;
                let peer_addr =
                    PeerAddr::Unix(addr.as_pathname().map(std::path::Path::to_path_buf));
                Ok(Connection::new(Box::new(stream), peer_addr))
            }
        }
    }
}
