// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach.
pub mod acceptor_traits;
pub mod listener;
pub mod tokio_acceptor;

// Re-export.
pub use acceptor_traits::*;
pub use listener::*;
pub use tokio_acceptor::*;
