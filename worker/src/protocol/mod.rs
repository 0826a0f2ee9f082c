// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach.
pub mod application;
pub mod line_protocol;
pub mod parse_error;
pub mod protocol_traits;
pub mod response;

// Re-export.
pub use application::*;
pub use line_protocol::*;
pub use parse_error::*;
pub use protocol_traits::*;
pub use response::*;
