// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! # r3bl_worker
//!
//! A cooperatively scheduled, connection handling worker process built on
//! [tokio](https://tokio.rs). One worker owns a set of already bound listening sockets,
//! serves many concurrent connections on lightweight tasks, and enforces its lifecycle
//! policies:
//!
//! - **Graceful shutdown**: stop accepting, give in-flight connections up to
//!   `graceful_timeout` to finish, then cancel what is left.
//! - **Parent liveness**: if the supervising parent process goes away, shut down.
//! - **Keep-alive timeouts**: an idle connection is closed after `keepalive`.
//! - **Autorestart**: after `max_requests` requests the worker retires itself, and the
//!   supervisor starts a fresh one.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  start / stop   ┌──────────────────┐
//! │ WorkerLifecycle      │────────────────▶│ Acceptor         │
//! │ (heartbeat, parent,  │                 │ (TokioAcceptor)  │
//! │  wait on wakeup)     │                 └────────┬─────────┘
//! └──────────▲───────────┘                          │ one task per connection
//!            │ WakeupChannel::signal()              ▼
//! ┌──────────┴───────────┐                 ┌──────────────────┐
//! │ signals, autorestart │                 │ ConnectionHandler│
//! └──────────────────────┘                 │  └ RequestDispatcher
//!                                          └──────────────────┘
//! ```
//!
//! - [`WakeupChannel`]: single slot notification that interrupts the controller's wait.
//! - [`WorkerLifecycle`]: `Starting → Accepting → Stopping → Stopped`.
//! - [`Acceptor`]: the backend seam; [`TokioAcceptor`] is the tokio implementation.
//! - [`ConnectionHandler`]: serves one connection, classifies failures.
//! - [`RequestDispatcher`]: hooks, application call, autorestart, response streaming.
//!
//! The wire protocol and the application are plugged in through [`Protocol`] and
//! [`Application`]. The bundled [`LineProtocol`] is a small text protocol used by the
//! `line_worker` binary and the tests.

// Enforce strict error handling in production library code only. Tests are allowed to
// use .unwrap() (workspace `Cargo.toml` config allows it).
#![cfg_attr(not(test), deny(clippy::unwrap_in_result))]

// Attach modules (re-exported below to provide clean public API).
pub mod acceptor;
pub mod config;
pub mod connection;
pub mod core;
pub mod lifecycle;
pub mod protocol;
pub mod state;
pub mod wakeup;

// Re-export.
pub use acceptor::*;
pub use config::*;
pub use connection::*;
pub use core::*;
pub use lifecycle::*;
pub use protocol::*;
pub use state::*;
pub use wakeup::*;
