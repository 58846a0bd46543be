//! Starters
//!
//! `SimpleStarter` spawns a dedicated thread per task. `PooledStarter`
//! hands tasks to idle workers and spawns only when none is free; it never
//! caps the number of workers, so a task that itself spins off (and waits)
//! can never starve the pool.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use spin_core::{PanicPayload, SpinResult, Starter, Task};
use tracing::{debug, error};

use crate::config::{defaults, SpinConfig};

/// Run a task, logging (not propagating) a panic
fn run_task(task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let payload = PanicPayload::new(payload);
        error!(panic = %payload.message(), "worker task panicked");
    }
}

/// One named thread per task
#[derive(Debug)]
pub struct SimpleStarter {
    prefix: String,
    spawned: AtomicUsize,
}

impl SimpleStarter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            spawned: AtomicUsize::new(0),
        }
    }

    pub fn with_config(config: &SpinConfig) -> Self {
        Self::new(config.worker_name_prefix.clone())
    }

    /// Threads spawned so far
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Default for SimpleStarter {
    fn default() -> Self {
        Self::new(defaults::WORKER_NAME_PREFIX)
    }
}

impl Starter for SimpleStarter {
    fn start(&self, task: Task) -> SpinResult<()> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.prefix, n);
        debug!(thread = %name, "spawning worker");
        thread::Builder::new().name(name).spawn(move || run_task(task))?;
        Ok(())
    }
}

struct PoolState {
    /// Workers waiting for a task
    idle: usize,
    /// Tasks handed to idle workers but not yet picked up
    handoff: VecDeque<Task>,
}

struct PoolInner {
    state: Mutex<PoolState>,
    available: Condvar,
    keep_alive: Duration,
    prefix: String,
    spawned: AtomicUsize,
    live: AtomicUsize,
}

/// Reuses idle worker threads, retiring them after `keep_alive`
///
/// A task is only queued when an idle worker is reserved for it, so queued
/// tasks never wait behind busy workers.
#[derive(Clone)]
pub struct PooledStarter {
    inner: Arc<PoolInner>,
}

impl PooledStarter {
    pub fn new(prefix: impl Into<String>, keep_alive: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    idle: 0,
                    handoff: VecDeque::new(),
                }),
                available: Condvar::new(),
                keep_alive,
                prefix: prefix.into(),
                spawned: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
            }),
        }
    }

    pub fn with_config(config: &SpinConfig) -> Self {
        Self::new(config.worker_name_prefix.clone(), config.pool_keep_alive)
    }

    /// Threads spawned so far
    pub fn spawned(&self) -> usize {
        self.inner.spawned.load(Ordering::Relaxed)
    }

    /// Workers currently alive (busy or idle)
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::Relaxed)
    }

    /// Workers currently waiting for a task
    pub fn idle(&self) -> usize {
        self.inner.lock().idle
    }

    fn spawn_worker(&self, first: Task) -> SpinResult<()> {
        let n = self.inner.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.inner.prefix, n);
        debug!(thread = %name, "spawning pooled worker");

        self.inner.live.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(inner, first));
        if let Err(err) = spawned {
            self.inner.live.fetch_sub(1, Ordering::Relaxed);
            return Err(err.into());
        }
        Ok(())
    }
}

impl Default for PooledStarter {
    fn default() -> Self {
        Self::new(
            defaults::WORKER_NAME_PREFIX,
            Duration::from_millis(defaults::POOL_KEEP_ALIVE_MS),
        )
    }
}

impl PoolInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Starter for PooledStarter {
    fn start(&self, task: Task) -> SpinResult<()> {
        {
            let mut state = self.inner.lock();
            if state.idle > state.handoff.len() {
                state.handoff.push_back(task);
                drop(state);
                self.inner.available.notify_one();
                return Ok(());
            }
        }
        self.spawn_worker(task)
    }
}

impl std::fmt::Debug for PooledStarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledStarter")
            .field("prefix", &self.inner.prefix)
            .field("live", &self.live())
            .field("keep_alive", &self.inner.keep_alive)
            .finish()
    }
}

/// Pooled worker main loop
fn worker_loop(inner: Arc<PoolInner>, first: Task) {
    run_task(first);

    let mut state = inner.lock();
    loop {
        state.idle += 1;
        let (guard, timeout) = inner
            .available
            .wait_timeout_while(state, inner.keep_alive, |s| s.handoff.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        state = guard;
        state.idle -= 1;

        match state.handoff.pop_front() {
            Some(task) => {
                drop(state);
                run_task(task);
                state = inner.lock();
            }
            None => {
                debug_assert!(timeout.timed_out());
                break;
            }
        }
    }
    drop(state);

    inner.live.fetch_sub(1, Ordering::Relaxed);
    debug!(keep_alive = ?inner.keep_alive, "pooled worker retired");
}
