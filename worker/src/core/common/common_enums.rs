// Copyright (c) 2023-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

/// Control flow signal for the per-connection request loop.
///
/// Returned by [`RequestDispatcher::dispatch()`] after each response and consumed by the
/// [`ConnectionHandler`] loop to decide whether to read the next request from the same
/// connection.
///
/// [`ConnectionHandler`]: crate::ConnectionHandler
/// [`RequestDispatcher::dispatch()`]: crate::RequestDispatcher::dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Continuation {
    /// Keep the connection open and read the next request.
    #[default]
    Continue,

    /// Close the connection once the current response has been written.
    Stop,
}
