// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach.
pub mod worker_state;

// Re-export.
pub use worker_state::*;
