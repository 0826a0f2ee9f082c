// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::{io::Result,
          pin::Pin,
          sync::{Arc,
                 atomic::{AtomicUsize, Ordering}},
          task::{Context, Poll}};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Wraps a stream and counts how many times it was dropped, ie, how many times the
/// underlying socket was closed. A connection must be closed exactly once, no matter
/// whether the handler finished, failed, or was cancelled mid-request.
#[derive(Debug)]
pub struct DropProbeStream<S> {
    inner: S,
    drops: Arc<AtomicUsize>,
}

impl<S> DropProbeStream<S> {
    #[must_use]
    pub fn new(inner: S, drops: Arc<AtomicUsize>) -> Self { Self { inner, drops } }
}

impl<S> Drop for DropProbeStream<S> {
    fn drop(&mut self) { self.drops.fetch_add(1, Ordering::SeqCst); }
}

/// Implement the [`AsyncRead`] trait by delegating to the inner stream. This requires
/// `S: Unpin`, which every stream used by the tests is.
impl<S: AsyncRead + Unpin> AsyncRead for DropProbeStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DropProbeStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_counts_drop_and_passes_bytes_through() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (stream, mut other) = tokio::io::duplex(16);
        let mut stream = DropProbeStream::new(stream, drops.clone());

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0; 4];
        other.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(stream);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
