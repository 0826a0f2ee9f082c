// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach.
pub mod common;
pub mod log;
#[cfg(any(test, feature = "test_fixtures"))]
pub mod test_fixtures;

// Re-export.
pub use common::*;
pub use log::*;
#[cfg(any(test, feature = "test_fixtures"))]
pub use test_fixtures::*;
