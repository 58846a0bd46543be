//! Dispatchers
//!
//! A dispatcher blocks the owner thread until `stop()` without freezing
//! it. `PumpDispatcher` re-enters the owner loop; when the loop refuses,
//! it degrades to a plain wait released by `stop()` and says so in the
//! log. `WaitDispatcher` always takes the plain wait.
//!
//! State transitions: `Idle -> Pumping -> Stopped`, or `Idle -> Stopped`
//! when `stop()` arrives first.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use spin_core::{
    Dispatcher, DispatcherFactory, DispatcherState, OwnerLoop, SpinError, SpinResult,
};
use tracing::{debug, trace, warn};

use crate::parking::{CondvarParking, LoopParking};

/// State shared by both dispatcher kinds
struct DispatchCore {
    state: AtomicU8,
    started: AtomicBool,
    stopped: AtomicBool,
    /// Released by `stop()`
    parking: CondvarParking,
}

impl DispatchCore {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(DispatcherState::Idle as u8),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            parking: CondvarParking::new(),
        }
    }

    /// Check the caller and claim the one-shot start
    ///
    /// Returns `false` when `stop()` already happened.
    fn begin(&self, owner: &dyn OwnerLoop) -> SpinResult<bool> {
        if !owner.is_owner_thread() {
            return Err(SpinError::illegal_thread("Dispatcher::start"));
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SpinError::DispatcherReused);
        }
        let pumping = self
            .state
            .compare_exchange(
                DispatcherState::Idle as u8,
                DispatcherState::Pumping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if pumping {
            debug!("dispatcher pumping");
        }
        Ok(pumping)
    }

    #[inline]
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn wait_stopped(&self) {
        while !self.is_stopped() {
            self.parking.park(None);
        }
    }

    /// Flip to stopped; `true` only for the first call
    fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.state
            .store(DispatcherState::Stopped as u8, Ordering::Release);
        self.parking.unpark();
        debug!("dispatcher stopped");
        true
    }

    fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Re-enters the owner loop while waiting
pub struct PumpDispatcher {
    owner: Arc<dyn OwnerLoop>,
    core: DispatchCore,
}

impl PumpDispatcher {
    pub fn new(owner: Arc<dyn OwnerLoop>) -> Self {
        Self {
            owner,
            core: DispatchCore::new(),
        }
    }
}

impl Dispatcher for PumpDispatcher {
    fn start(&self) -> SpinResult<()> {
        if !self.core.begin(self.owner.as_ref())? {
            return Ok(());
        }

        let core = &self.core;
        if let Err(reason) = self.owner.pump(&|| !core.is_stopped()) {
            warn!(%reason, "owner loop refused to pump, waiting without pumping");
            core.wait_stopped();
        }
        Ok(())
    }

    fn stop(&self) {
        if !self.core.stop() {
            return;
        }
        // The pump only re-checks its predicate when a task arrives
        if let Err(err) = self.owner.enqueue(Box::new(|| {})) {
            trace!(%err, "no-op wake not queued");
        }
    }

    fn state(&self) -> DispatcherState {
        self.core.state()
    }
}

/// Portable backend: holds the owner thread until `stop()`
///
/// The owner loop is not serviced during the wait, so a spin-over back
/// onto the owner thread from the worker blocks until the wait ends.
pub struct WaitDispatcher {
    owner: Arc<dyn OwnerLoop>,
    core: DispatchCore,
}

impl WaitDispatcher {
    pub fn new(owner: Arc<dyn OwnerLoop>) -> Self {
        Self {
            owner,
            core: DispatchCore::new(),
        }
    }
}

impl Dispatcher for WaitDispatcher {
    fn start(&self) -> SpinResult<()> {
        if self.core.begin(self.owner.as_ref())? {
            self.core.wait_stopped();
        }
        Ok(())
    }

    fn stop(&self) {
        self.core.stop();
    }

    fn state(&self) -> DispatcherState {
        self.core.state()
    }
}

pub struct PumpDispatcherFactory {
    owner: Arc<dyn OwnerLoop>,
}

impl PumpDispatcherFactory {
    pub fn new(owner: Arc<dyn OwnerLoop>) -> Self {
        Self { owner }
    }
}

impl DispatcherFactory for PumpDispatcherFactory {
    fn create_dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::new(PumpDispatcher::new(Arc::clone(&self.owner)))
    }
}

pub struct WaitDispatcherFactory {
    owner: Arc<dyn OwnerLoop>,
}

impl WaitDispatcherFactory {
    pub fn new(owner: Arc<dyn OwnerLoop>) -> Self {
        Self { owner }
    }
}

impl DispatcherFactory for WaitDispatcherFactory {
    fn create_dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::new(WaitDispatcher::new(Arc::clone(&self.owner)))
    }
}
