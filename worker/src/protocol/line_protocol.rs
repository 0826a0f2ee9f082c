// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! A small text protocol, used by the `line_worker` binary and the tests.
//!
//! # Requests
//!
//! One request per line (`\n` or `\r\n` terminated, UTF-8, at most
//! [`protocol_constants::MAX_LINE_LEN`] bytes). Blank lines are skipped. A trailing
//! `close` token asks the worker to close the connection after the response:
//!
//! ```text
//! hello world        -> LineRequest { line: "hello world", close: false }
//! hello world close  -> LineRequest { line: "hello world", close: true }
//! ```
//!
//! # Responses
//!
//! ```text
//! 200 OK\r\n
//! <name>: <value>\r\n     (zero or more)
//! connection: keep-alive\r\n   (or `close`)
//! \r\n
//! <body bytes>
//! ```

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use super::{ErrorResponse, ParseError, Protocol, ProtocolRequest, RequestParser,
            ResponseHead};
use crate::ConnectionReader;

pub mod protocol_constants {
    pub const MAX_LINE_LEN: usize = 8_192;
    pub const CLOSE_TOKEN: &str = "close";
    pub const CRLF: &str = "\r\n";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRequest {
    pub line: String,
    pub close: bool,
}

impl LineRequest {
    /// Splits off a trailing [`protocol_constants::CLOSE_TOKEN`].
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.rsplit_once(char::is_whitespace) {
            Some((rest, protocol_constants::CLOSE_TOKEN)) => Self {
                line: rest.trim_end().to_string(),
                close: true,
            },
            _ if line == protocol_constants::CLOSE_TOKEN => Self {
                line: String::new(),
                close: true,
            },
            _ => Self {
                line: line.to_string(),
                close: false,
            },
        }
    }
}

impl ProtocolRequest for LineRequest {
    fn should_close(&self) -> bool { self.close }
}

#[derive(Debug)]
pub struct LineParser<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send + 'static> LineParser<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::with_capacity(256),
        }
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> RequestParser for LineParser<R> {
    type Request = LineRequest;

    async fn next_request(&mut self) -> Result<Option<LineRequest>, ParseError> {
        loop {
            self.buffer.clear();

            // One extra byte lets an over long line be told apart from one that is
            // exactly at the limit.
            let limit = protocol_constants::MAX_LINE_LEN as u64 + 1;
            let bytes_read = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.buffer)
                .await?;

            if bytes_read == 0 {
                return Ok(None);
            }

            if self.buffer.last() != Some(&b'\n') {
                return Err(if self.buffer.len() > protocol_constants::MAX_LINE_LEN {
                    ParseError::malformed(format!(
                        "line longer than {} bytes",
                        protocol_constants::MAX_LINE_LEN
                    ))
                } else {
                    ParseError::malformed("stream ended in the middle of a line")
                });
            }

            let line = std::str::from_utf8(&self.buffer)
                .map_err(|_| ParseError::malformed("line is not valid UTF-8"))?;

            if line.trim().is_empty() {
                continue;
            }

            return Ok(Some(LineRequest::parse(line)));
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LineProtocol;

impl Protocol for LineProtocol {
    type Request = LineRequest;
    type Parser = LineParser<ConnectionReader>;

    fn new_parser(&self, reader: ConnectionReader) -> Self::Parser { LineParser::new(reader) }

    fn encode_head(&self, head: &ResponseHead, keep_alive: bool, out: &mut Vec<u8>) {
        use protocol_constants::CRLF;

        let connection = if keep_alive { "keep-alive" } else { "close" };
        let mut text = format!("{} {}{CRLF}", head.status, head.reason);
        for (name, value) in &head.headers {
            text.push_str(&format!("{name}: {value}{CRLF}"));
        }
        text.push_str(&format!("connection: {connection}{CRLF}{CRLF}"));
        out.extend_from_slice(text.as_bytes());
    }

    fn encode_error(&self, error: &ErrorResponse, out: &mut Vec<u8>) {
        let mut head = ResponseHead::default();
        head.start(error.status, error.reason.clone());
        self.encode_head(&head, false, out);
        if let Some(detail) = &error.detail {
            out.extend_from_slice(detail.as_bytes());
            out.extend_from_slice(protocol_constants::CRLF.as_bytes());
        }
    }
}
