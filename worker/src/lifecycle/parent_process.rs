// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

/// Where the [lifecycle controller](crate::WorkerLifecycle) gets the current parent
/// process id from. When it no longer matches the id captured at startup, the parent
/// (the supervisor) has died, the worker was re-parented, and it shuts itself down.
pub trait ParentProcess: Send + Sync {
    fn parent_pid(&self) -> u32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsParentProcess;

impl ParentProcess for OsParentProcess {
    #[cfg(unix)]
    fn parent_pid(&self) -> u32 { std::os::unix::process::parent_id() }

    /// There's no portable parent id here, so the parent never appears to change.
    #[cfg(not(unix))]
    fn parent_pid(&self) -> u32 { 0 }
}
