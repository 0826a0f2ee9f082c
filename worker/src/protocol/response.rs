// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::Protocol;

/// Status line and headers of a response. The [`Application`](crate::Application) fills
/// this in (it is the "start response" callback); the head is only written to the
/// connection when the first body chunk (or the end of the body) arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: 200,
            reason: "OK".into(),
            headers: vec![],
        }
    }
}

impl ResponseHead {
    /// Sets the status line.
    pub fn start(&mut self, status: u16, reason: impl Into<String>) -> &mut Self {
        self.status = status;
        self.reason = reason.into();
        self
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// The response paired 1:1 with a request.
#[derive(Debug, Default)]
pub struct Response {
    head: ResponseHead,
    request_wants_close: bool,
    force_close: bool,
    headers_sent: bool,
    body_bytes: u64,
}

impl Response {
    #[must_use]
    pub fn new(request_wants_close: bool) -> Self {
        Self {
            request_wants_close,
            ..Self::default()
        }
    }

    pub fn head_mut(&mut self) -> &mut ResponseHead { &mut self.head }

    #[must_use]
    pub fn head(&self) -> &ResponseHead { &self.head }

    /// Closes the connection after this response, overriding keep-alive negotiation.
    pub fn force_close(&mut self) { self.force_close = true; }

    #[must_use]
    pub fn is_force_close(&self) -> bool { self.force_close }

    #[must_use]
    pub fn should_close(&self) -> bool { self.request_wants_close || self.force_close }

    #[must_use]
    pub fn headers_sent(&self) -> bool { self.headers_sent }

    #[must_use]
    pub fn body_bytes(&self) -> u64 { self.body_bytes }

    /// Writes one body chunk, preceded by the head if it hasn't been sent yet.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the write fails.
    pub async fn write<P, W>(
        &mut self,
        protocol: &P,
        writer: &mut W,
        chunk: &[u8],
    ) -> std::io::Result<()>
    where
        P: Protocol,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut out = vec![];
        if !self.headers_sent {
            protocol.encode_head(&self.head, !self.should_close(), &mut out);
        }
        out.extend_from_slice(chunk);
        writer.write_all(&out).await?;
        self.headers_sent = true;
        self.body_bytes += chunk.len() as u64;
        Ok(())
    }

    /// Ends the response: sends the head for an empty body, then flushes.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the write or flush fails.
    pub async fn finish<P, W>(&mut self, protocol: &P, writer: &mut W) -> std::io::Result<()>
    where
        P: Protocol,
        W: AsyncWrite + Unpin + ?Sized,
    {
        if !self.headers_sent {
            self.write(protocol, writer, &[]).await?;
        }
        writer.flush().await
    }
}

/// Best effort response sent when a request fails before its head was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: u16,
    pub reason: String,
    /// Full error report as plain text (no color codes or box drawing, since it goes
    /// over the wire). Only filled in when the worker runs with `debug` on.
    pub detail: Option<String>,
}

impl ErrorResponse {
    #[must_use]
    pub fn internal(report: &miette::Report, debug: bool) -> Self {
        Self {
            status: 500,
            reason: "Internal Server Error".into(),
            detail: debug.then(|| render_plain(report)),
        }
    }
}

fn render_plain(report: &miette::Report) -> String {
    let mut out = String::new();
    match miette::NarratableReportHandler::new().render_report(&mut out, &**report) {
        Ok(()) => out,
        Err(_) => report.to_string(),
    }
}

/// Encodes and writes `error`, then flushes.
///
/// # Errors
///
/// Returns the transport error if the write fails. Callers treat this as best effort.
pub async fn write_error_response<P, W>(
    protocol: &P,
    writer: &mut W,
    error: &ErrorResponse,
) -> std::io::Result<()>
where
    P: Protocol,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut out = vec![];
    protocol.encode_error(error, &mut out);
    writer.write_all(&out).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_internal_error_detail_only_in_debug() {
        let report = miette::miette!("disk on fire");
        let error = ErrorResponse::internal(&report, false);
        assert_eq!(error.status, 500);
        assert_eq!(error.detail, None);
    }

    #[test]
    fn test_internal_error_detail_is_plain_text() {
        let report = miette::miette!("disk on fire").wrap_err("request failed");
        let detail = ErrorResponse::internal(&report, true).detail.unwrap();

        assert!(detail.contains("request failed"), "{detail}");
        assert!(detail.contains("disk on fire"), "{detail}");
        assert!(!detail.contains('\u{1b}'), "{detail:?}");
        assert!(!detail.chars().any(|c| ('\u{2500}'..='\u{257f}').contains(&c)), "{detail}");
    }
}
