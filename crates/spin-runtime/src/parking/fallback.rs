//! Condvar-based parking
//!
//! Portable backend. Also used by dispatchers for their stop-released wait.

use super::LoopParking;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

pub struct CondvarParking {
    /// Wake token
    token: Mutex<bool>,
    condvar: Condvar,
    parked: AtomicBool,
}

impl CondvarParking {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(false),
            condvar: Condvar::new(),
            parked: AtomicBool::new(false),
        }
    }
}

impl Default for CondvarParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopParking for CondvarParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if !*token {
            self.parked.store(true, Ordering::Release);
            token = match timeout {
                Some(t) => {
                    self.condvar
                        .wait_timeout_while(token, t, |token| !*token)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .condvar
                    .wait_while(token, |token| !*token)
                    .unwrap_or_else(PoisonError::into_inner),
            };
            self.parked.store(false, Ordering::Release);
        }
        std::mem::replace(&mut *token, false)
    }

    fn unpark(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.condvar.notify_one();
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
