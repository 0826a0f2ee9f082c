// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

/// Failure reported by a [`RequestParser`](crate::RequestParser).
///
/// Neither variant produces a response. Both end the connection: [`ParseError::Io`] is
/// classified like any other transport error, [`ParseError::Malformed`] is treated as a
/// premature end of stream.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ParseError {
    #[error("I/O error while reading a request")]
    #[diagnostic(code(r3bl_worker::parse::io))]
    Io(#[from] std::io::Error),

    #[error("Malformed request: {reason}")]
    #[diagnostic(
        code(r3bl_worker::parse::malformed),
        help("The peer sent bytes the protocol can't frame. The connection is closed.")
    )]
    Malformed { reason: String },
}

impl ParseError {
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
