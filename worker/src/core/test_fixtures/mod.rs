// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach sources.
pub mod drop_probe_stream;
pub mod mock_connection;

// Re-export.
pub use drop_probe_stream::*;
pub use mock_connection::*;
