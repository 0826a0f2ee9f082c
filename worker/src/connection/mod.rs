// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach.
pub mod accepted_connection;
pub mod connection_error;
pub mod connection_handler;
pub mod request_dispatcher;
pub mod service_context;

// Re-export.
pub use accepted_connection::*;
pub use connection_error::*;
pub use connection_handler::*;
pub use request_dispatcher::*;
pub use service_context::*;
