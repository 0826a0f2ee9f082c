// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach.
pub mod heartbeat;
pub mod lifecycle_controller;
pub mod parent_process;
pub mod signals;
pub mod worker;

// Re-export.
pub use heartbeat::*;
pub use lifecycle_controller::*;
pub use parent_process::*;
pub use signals::*;
pub use worker::*;
