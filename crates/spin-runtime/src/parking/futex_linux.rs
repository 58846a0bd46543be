//! Linux futex-based parking
//!
//! Futex word semantics:
//! - 0 = no token
//! - 1 = token deposited
//!
//! The parker announces itself before re-checking the word, and the waker
//! deposits the token before checking for a parker, so at least one side
//! always sees the other. `FUTEX_WAIT` only sleeps while the word is 0.

use super::LoopParking;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

pub struct FutexParking {
    word: AtomicU32,
    parked: AtomicBool,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            word: AtomicU32::new(0),
            parked: AtomicBool::new(false),
        }
    }

    #[inline]
    fn take_token(&self) -> bool {
        self.word.swap(0, Ordering::AcqRel) == 1
    }

    fn futex_wait(&self, timeout: Option<Duration>) {
        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // Safety: the futex word lives as long as `self`; the kernel only
        // reads it and the timespec for the duration of the call.
        // ETIMEDOUT, EAGAIN and EINTR all mean "re-check the word".
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.word.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                0u32,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }

    fn futex_wake(&self) {
        // Safety: as above
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.word.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopParking for FutexParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        if self.take_token() {
            return true;
        }

        self.parked.store(true, Ordering::SeqCst);
        if self.word.load(Ordering::SeqCst) == 0 {
            self.futex_wait(timeout);
        }
        self.parked.store(false, Ordering::SeqCst);

        self.take_token()
    }

    fn unpark(&self) {
        if self.word.swap(1, Ordering::SeqCst) == 0 && self.parked.load(Ordering::SeqCst) {
            self.futex_wake();
        }
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
