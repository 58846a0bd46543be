//! Runtime traits
//!
//! These traits define the interface between the platform-agnostic bridge
//! and the runtime that supplies threads and an owner loop.

use std::sync::Arc;

use crate::error::{Failure, PumpRefused, SpinResult};
use crate::invocation::Method;

/// Unit of work handed to a starter or an owner loop
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The owner thread's event loop, seen from the bridge
pub trait OwnerLoop: Send + Sync {
    /// Is the current thread the owner thread?
    fn is_owner_thread(&self) -> bool;

    /// Queue `task` to run later on the owner thread
    ///
    /// Fails with `OwnerUnavailable` once the loop is shutting down.
    fn enqueue(&self, task: Task) -> SpinResult<()>;

    /// Re-enter the loop, running queued tasks while `keep_going()` holds
    ///
    /// Owner thread only. Returns `Err` without running anything when the
    /// loop cannot nest here. A shutdown requested meanwhile does not end
    /// the pump; queued tasks keep running until the predicate clears.
    fn pump(&self, keep_going: &dyn Fn() -> bool) -> Result<(), PumpRefused>;
}

/// Launches work on some other thread
pub trait Starter: Send + Sync {
    /// Returns as soon as the task is handed over; never waits for it
    fn start(&self, task: Task) -> SpinResult<()>;
}

/// Dispatcher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatcherState {
    Idle = 0,
    Pumping = 1,
    Stopped = 2,
}

impl DispatcherState {
    #[inline]
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => DispatcherState::Idle,
            1 => DispatcherState::Pumping,
            _ => DispatcherState::Stopped,
        }
    }
}

/// One-shot controller that blocks the owner thread without freezing it
pub trait Dispatcher: Send + Sync {
    /// Pump (or wait) on the owner thread until `stop` is observed
    fn start(&self) -> SpinResult<()>;

    /// Release `start`; callable from any thread, idempotent
    fn stop(&self);

    fn state(&self) -> DispatcherState;
}

/// Creates a fresh dispatcher for every blocking wait
pub trait DispatcherFactory: Send + Sync {
    fn create_dispatcher(&self) -> Arc<dyn Dispatcher>;
}

/// Destination for failures nobody is waiting for
pub trait FailureSink: Send + Sync {
    fn report(&self, method: &Method, failure: Failure);
}

impl<F> FailureSink for F
where
    F: Fn(&Method, Failure) + Send + Sync,
{
    fn report(&self, method: &Method, failure: Failure) {
        self(method, failure)
    }
}
