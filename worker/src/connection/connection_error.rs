// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::io::ErrorKind;

use crate::ParseError;

/// How a failed connection is reported.
///
/// | Class                   | Log level | Error response |
/// | :---------------------- | :-------- | :------------- |
/// | [`TransportExpected`]   | `debug`   | No             |
/// | [`TransportUnexpected`] | `error`   | No             |
/// | [`ProtocolMalformed`]   | `error`   | No             |
/// | [`ApplicationFault`]    | `error`   | If the head wasn't sent yet |
///
/// [`ApplicationFault`]: Self::ApplicationFault
/// [`ProtocolMalformed`]: Self::ProtocolMalformed
/// [`TransportExpected`]: Self::TransportExpected
/// [`TransportUnexpected`]: Self::TransportUnexpected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The peer went away (reset, broken pipe). Not a worker fault.
    TransportExpected,
    TransportUnexpected,
    /// The parser couldn't produce a request. Treated as a premature end of stream.
    ProtocolMalformed,
    /// A hook or the application failed.
    ApplicationFault,
}

/// Why a [`ConnectionHandler`](crate::ConnectionHandler) stopped serving a connection
/// early. None of these ever stop the worker.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConnectionError {
    #[error("Transport error: {0}")]
    #[diagnostic(code(r3bl_worker::connection::transport))]
    Transport(#[from] std::io::Error),

    #[error("Malformed request: {reason}")]
    #[diagnostic(code(r3bl_worker::connection::malformed))]
    Malformed { reason: String },

    /// The inner [`miette::Report`] is whatever the hook returned.
    #[error("pre_request hook failed")]
    #[diagnostic(
        code(r3bl_worker::connection::pre_request_hook),
        help("The request was not passed to the application.")
    )]
    PreRequestHook(miette::Report),

    #[error("Application failed while handling a request")]
    #[diagnostic(code(r3bl_worker::connection::application))]
    Application {
        report: miette::Report,
        /// The response head was already written, so no error response can follow.
        headers_sent: bool,
    },
}

impl ConnectionError {
    #[must_use]
    pub fn failure_class(&self) -> FailureClass {
        match self {
            ConnectionError::Transport(error) => match error.kind() {
                ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe => FailureClass::TransportExpected,
                _ => FailureClass::TransportUnexpected,
            },
            ConnectionError::Malformed { .. } => FailureClass::ProtocolMalformed,
            ConnectionError::PreRequestHook(_) | ConnectionError::Application { .. } => {
                FailureClass::ApplicationFault
            }
        }
    }

    /// Whether an error response should be written before the connection is closed.
    #[must_use]
    pub fn should_attempt_error_response(&self) -> bool {
        match self {
            ConnectionError::PreRequestHook(_) => true,
            ConnectionError::Application { headers_sent, .. } => !headers_sent,
            ConnectionError::Transport(_) | ConnectionError::Malformed { .. } => false,
        }
    }

    /// The collaborator's report, for application faults.
    #[must_use]
    pub fn report(&self) -> Option<&miette::Report> {
        match self {
            ConnectionError::PreRequestHook(report)
            | ConnectionError::Application { report, .. } => Some(report),
            ConnectionError::Transport(_) | ConnectionError::Malformed { .. } => None,
        }
    }
}

impl From<ParseError> for ConnectionError {
    fn from(error: ParseError) -> Self {
        match error {
            ParseError::Io(error) => ConnectionError::Transport(error),
            ParseError::Malformed { reason } => ConnectionError::Malformed { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[test_case(ErrorKind::ConnectionReset, FailureClass::TransportExpected)]
    #[test_case(ErrorKind::BrokenPipe, FailureClass::TransportExpected)]
    #[test_case(ErrorKind::ConnectionAborted, FailureClass::TransportExpected)]
    #[test_case(ErrorKind::PermissionDenied, FailureClass::TransportUnexpected)]
    #[test_case(ErrorKind::UnexpectedEof, FailureClass::TransportUnexpected)]
    fn test_transport_classification(kind: ErrorKind, expected: FailureClass) {
        let error = ConnectionError::Transport(std::io::Error::from(kind));
        assert_eq!(error.failure_class(), expected);
        assert!(!error.should_attempt_error_response());
    }

    #[test]
    fn test_parse_error_conversion() {
        let io: ConnectionError =
            ParseError::Io(std::io::Error::from(ErrorKind::ConnectionReset)).into();
        assert_eq!(io.failure_class(), FailureClass::TransportExpected);

        let malformed: ConnectionError = ParseError::malformed("bad").into();
        assert_eq!(malformed.failure_class(), FailureClass::ProtocolMalformed);
        assert!(!malformed.should_attempt_error_response());
    }

    #[test]
    fn test_application_fault_response_depends_on_headers_sent() {
        let before = ConnectionError::Application {
            report: miette::miette!("boom"),
            headers_sent: false,
        };
        let after = ConnectionError::Application {
            report: miette::miette!("boom"),
            headers_sent: true,
        };
        let hook = ConnectionError::PreRequestHook(miette::miette!("denied"));

        assert_eq!(before.failure_class(), FailureClass::ApplicationFault);
        assert!(before.should_attempt_error_response());
        assert!(!after.should_attempt_error_response());
        assert!(hook.should_attempt_error_response());
        assert!(hook.report().is_some());
    }
}
