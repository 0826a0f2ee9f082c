// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::sync::Arc;

use crate::{WakeupChannel, WorkerConfig, WorkerState};

/// Everything a connection task needs, shared behind an [`Arc`] by every
/// [`ConnectionHandler`](crate::ConnectionHandler) of one worker.
///
/// - `P`: the [`Protocol`](crate::Protocol).
/// - `A`: the [`Application`](crate::Application).
/// - `K`: the [`RequestHooks`](crate::RequestHooks).
#[derive(Debug)]
pub struct ServiceContext<P, A, K> {
    pub config: WorkerConfig,
    pub state: Arc<WorkerState>,
    pub wakeup: WakeupChannel,
    pub protocol: P,
    pub app: A,
    pub hooks: K,
}
