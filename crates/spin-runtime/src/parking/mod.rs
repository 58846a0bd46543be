//! Idle parking for the owner loop
//!
//! A parker holds a single wake token. `unpark()` deposits it (waking the
//! parked thread if any), `park()` consumes it or sleeps until it arrives.
//! A token deposited before `park()` is never lost.

use std::time::Duration;

/// Sleep/wake primitive for one parking thread and any number of wakers
pub trait LoopParking: Send + Sync {
    /// Park until unparked or `timeout` elapses
    ///
    /// Returns `true` if a wake token was consumed. Callers re-check their
    /// condition either way.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Deposit the wake token
    fn unpark(&self);

    /// Whether a thread is currently parked (hint, may be stale)
    fn is_parked(&self) -> bool;
}

mod fallback;
pub use fallback::CondvarParking;

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        pub use fallback::CondvarParking as PlatformParking;
    }
}

/// Create the most efficient parker for this platform
pub fn new_parking() -> Box<dyn LoopParking> {
    Box::new(PlatformParking::new())
}
