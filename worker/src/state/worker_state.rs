// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Process-wide worker state shared by the [lifecycle controller], the [dispatcher], and
//! the signal listener. See [`WorkerState`] for details.
//!
//! [dispatcher]: crate::RequestDispatcher
//! [lifecycle controller]: crate::WorkerLifecycle

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use tokio::sync::watch;

/// An indication of whether the worker is still serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Alive,
    NotAlive,
}

/// How urgently the supervisor wants this worker to stop.
///
/// The discriminants are ordered by urgency, so a later, more urgent request always wins
/// over an earlier, gentler one (but never the reverse).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShutdownKind {
    /// Stop accepting, then let in-flight connections finish for up to the graceful
    /// timeout (`SIGQUIT`).
    Graceful = 1,
    /// Stop accepting and cancel in-flight connections right away (`SIGTERM`, `SIGINT`).
    Immediate = 2,
}

impl ShutdownKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Graceful),
            2 => Some(Self::Immediate),
            _ => None,
        }
    }
}

/// Result of [`WorkerState::record_request()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTally {
    /// Counter value including the request that was just recorded.
    pub served: u64,
    /// `true` for exactly one request over the lifetime of the worker: the one that
    /// reached the `max_requests` ceiling while the worker was still alive.
    pub autorestart_triggered: bool,
}

/// Shared, thread safe state of one worker process.
///
/// Field ownership:
/// - `alive` goes from `true` to `false` exactly once. The [dispatcher] clears it when
///   the autorestart ceiling is reached. The [lifecycle controller] clears it when it
///   starts stopping. Nothing ever sets it back.
/// - `requests_served` is only incremented by the [dispatcher] and never decreases.
/// - the shutdown request is written by the signal listener and read by the [lifecycle
///   controller] after a wakeup.
///
/// Atomics are used (instead of relying on a single threaded scheduler) so that the same
/// state works on a multi threaded tokio runtime too. `alive` is a [`watch`] channel so
/// that idle connections can wait for it to flip with [`WorkerState::not_alive()`].
///
/// [dispatcher]: crate::RequestDispatcher
/// [lifecycle controller]: crate::WorkerLifecycle
#[derive(Debug)]
pub struct WorkerState {
    alive: watch::Sender<bool>,
    requests_served: AtomicU64,
    max_requests: u64,
    parent_pid: u32,
    shutdown_request: AtomicU8,
}

impl WorkerState {
    /// `max_requests == 0` disables autorestart. `parent_pid` is the parent process id
    /// captured when the worker started.
    #[must_use]
    pub fn new(max_requests: u64, parent_pid: u32) -> Self {
        Self {
            alive: watch::Sender::new(true),
            requests_served: AtomicU64::new(0),
            max_requests,
            parent_pid,
            shutdown_request: AtomicU8::new(0),
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> LivenessState {
        if *self.alive.borrow() {
            LivenessState::Alive
        } else {
            LivenessState::NotAlive
        }
    }

    /// Returns `true` if this call flipped the flag (ie, the worker was alive before).
    pub fn mark_not_alive(&self) -> bool { self.alive.send_replace(false) }

    /// Resolves once the worker is not alive. Returns right away if it already isn't.
    pub async fn not_alive(&self) {
        let mut alive = self.alive.subscribe();
        // The sender is owned by `self`, so this can't fail while `self` is borrowed.
        alive.wait_for(|alive| !*alive).await.ok();
    }

    #[must_use]
    pub fn requests_served(&self) -> u64 { self.requests_served.load(Ordering::Acquire) }

    #[must_use]
    pub fn max_requests(&self) -> u64 { self.max_requests }

    #[must_use]
    pub fn parent_pid(&self) -> u32 { self.parent_pid }

    /// Counts one dispatched request and decides whether it triggers autorestart. When it
    /// does, `alive` is already `false` on return.
    pub fn record_request(&self) -> RequestTally {
        let served = self.requests_served.fetch_add(1, Ordering::AcqRel) + 1;

        let ceiling_reached = self.max_requests > 0 && served >= self.max_requests;
        let autorestart_triggered = ceiling_reached && self.mark_not_alive();

        RequestTally {
            served,
            autorestart_triggered,
        }
    }

    /// Records a shutdown request. Repeated requests keep the most urgent kind. This does
    /// not wake the controller; pair it with [`WakeupChannel::signal()`].
    ///
    /// [`WakeupChannel::signal()`]: crate::WakeupChannel::signal
    pub fn request_shutdown(&self, kind: ShutdownKind) {
        self.shutdown_request.fetch_max(kind as u8, Ordering::AcqRel);
    }

    #[must_use]
    pub fn requested_shutdown(&self) -> Option<ShutdownKind> {
        ShutdownKind::from_u8(self.shutdown_request.load(Ordering::Acquire))
    }
}
