//! Owner event loop
//!
//! A run-to-completion task loop bound to the thread that calls
//! [`EventLoop::run`]. Any thread may queue tasks; only the owner thread
//! runs them. [`OwnerLoop::pump`] re-enters the loop from inside a task so
//! a caller can wait without starving the queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_queue::SegQueue;
use spin_core::{
    current_thread_name, Failure, OwnerLoop, PanicPayload, PumpRefused, SpinError, SpinResult,
    Task,
};
use tracing::{debug, error};

use crate::config::{defaults, SpinConfig};
use crate::parking::{new_parking, LoopParking};

struct LoopInner {
    queue: SegQueue<Task>,
    parking: Box<dyn LoopParking>,
    owner: OnceLock<ThreadId>,
    depth: AtomicUsize,
    max_depth: usize,
    idle_park: Duration,
    shutdown: AtomicBool,
    /// Set once `run` has returned for good
    closed: AtomicBool,
    executed: AtomicU64,
}

/// Cloneable handle to an owner event loop
#[derive(Clone)]
pub struct EventLoop {
    inner: Arc<LoopInner>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::build(
            defaults::MAX_PUMP_DEPTH,
            Duration::from_millis(defaults::IDLE_PARK_MS),
        )
    }

    pub fn with_config(config: &SpinConfig) -> Self {
        Self::build(config.max_pump_depth, config.idle_park)
    }

    fn build(max_depth: usize, idle_park: Duration) -> Self {
        Self {
            inner: Arc::new(LoopInner {
                queue: SegQueue::new(),
                parking: new_parking(),
                owner: OnceLock::new(),
                depth: AtomicUsize::new(0),
                max_depth: max_depth.max(1),
                idle_park,
                shutdown: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                executed: AtomicU64::new(0),
            }),
        }
    }

    /// Run tasks on the current thread until [`shutdown`](Self::shutdown)
    ///
    /// The first call binds the owner thread; calling it from any other
    /// thread afterwards is `IllegalThreadAccess`. Tasks still queued at
    /// shutdown run before this returns.
    pub fn run(&self) -> SpinResult<()> {
        let current = thread::current().id();
        if *self.inner.owner.get_or_init(|| current) != current {
            return Err(SpinError::illegal_thread("EventLoop::run"));
        }

        debug!(thread = %current_thread_name(), "owner loop running");
        while !self.is_shutdown() {
            if !self.run_one() {
                self.inner.parking.park(Some(self.inner.idle_park));
            }
        }

        let mut drained = 0usize;
        while self.run_one() {
            drained += 1;
        }
        self.inner.closed.store(true, Ordering::SeqCst);
        while self.run_one() {
            drained += 1;
        }
        debug!(drained, executed = self.executed(), "owner loop stopped");
        Ok(())
    }

    /// Ask the loop to stop; callable from any thread
    pub fn shutdown(&self) {
        if !self.inner.shutdown.swap(true, Ordering::AcqRel) {
            debug!("owner loop shutdown requested");
        }
        self.inner.parking.unpark();
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Queue `f` to run later on the owner thread
    pub fn invoke_later<F>(&self, f: F) -> SpinResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(f))
    }

    /// Run `f` on the owner thread and wait for its result
    ///
    /// Refused on the owner thread itself, which would wait on its own
    /// queue forever. A panic in `f` comes back as `SpinError::Failed`.
    pub fn invoke_and_wait<F, R>(&self, f: F) -> SpinResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_owner_thread() {
            return Err(SpinError::illegal_thread("EventLoop::invoke_and_wait"));
        }

        let (tx, rx) = mpsc::sync_channel(1);
        self.enqueue(Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f));
            let _ = tx.send(outcome);
        }))?;

        match rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(SpinError::Failed(Failure::panic(payload))),
            Err(_) => Err(SpinError::OwnerUnavailable),
        }
    }

    /// Tasks queued but not yet run
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// Tasks run so far
    pub fn executed(&self) -> u64 {
        self.inner.executed.load(Ordering::Relaxed)
    }

    /// Current pump nesting (0 when only `run` is active)
    pub fn pump_depth(&self) -> usize {
        self.inner.depth.load(Ordering::Relaxed)
    }

    /// The bound owner thread, once `run` has started
    pub fn owner_thread(&self) -> Option<ThreadId> {
        self.inner.owner.get().copied()
    }

    fn run_one(&self) -> bool {
        match self.inner.queue.pop() {
            Some(task) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                    let payload = PanicPayload::new(payload);
                    error!(panic = %payload.message(), "owner loop task panicked");
                }
                self.inner.executed.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("owner", &self.owner_thread())
            .field("pending", &self.pending())
            .field("depth", &self.pump_depth())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Decrements the pump depth on every exit path
struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl OwnerLoop for EventLoop {
    fn is_owner_thread(&self) -> bool {
        self.inner.owner.get() == Some(&thread::current().id())
    }

    fn enqueue(&self, task: Task) -> SpinResult<()> {
        if self.is_shutdown() {
            return Err(SpinError::OwnerUnavailable);
        }
        self.inner.queue.push(task);
        self.inner.parking.unpark();
        // Raced with the final drain: drop what will never run so that
        // anyone waiting on those tasks is released
        if self.inner.closed.load(Ordering::SeqCst) {
            while let Some(task) = self.inner.queue.pop() {
                drop(task);
            }
        }
        Ok(())
    }

    fn pump(&self, keep_going: &dyn Fn() -> bool) -> Result<(), PumpRefused> {
        if !self.is_owner_thread() {
            return Err(PumpRefused::NotOwnerThread);
        }

        let depth = self.inner.depth.fetch_add(1, Ordering::AcqRel) + 1;
        let _guard = DepthGuard(&self.inner.depth);
        if depth > self.inner.max_depth {
            return Err(PumpRefused::DepthExceeded(self.inner.max_depth));
        }

        debug!(depth, shutdown = self.is_shutdown(), "pump enter");
        // Shutdown does not cut a pump short: its caller may be waiting on
        // a task that is already queued
        while keep_going() {
            if !self.run_one() {
                self.inner.parking.park(Some(self.inner.idle_park));
            }
        }
        debug!(depth, "pump exit");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Start a loop on a named thread and wait until it is bound
    fn spawn_loop(config: &SpinConfig) -> (EventLoop, thread::JoinHandle<SpinResult<()>>) {
        let event_loop = EventLoop::with_config(config);
        let runner = event_loop.clone();
        let handle = thread::Builder::new()
            .name("test-owner".into())
            .spawn(move || runner.run())
            .unwrap();
        event_loop.invoke_and_wait(|| ()).unwrap();
        (event_loop, handle)
    }

    #[test]
    fn test_tasks_run_in_order_on_owner() {
        let (event_loop, handle) = spawn_loop(&SpinConfig::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = Arc::clone(&seen);
            event_loop
                .invoke_later(move || {
                    seen.lock().unwrap().push((i, current_thread_name()));
                })
                .unwrap();
        }
        event_loop.invoke_and_wait(|| ()).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert!(seen.iter().all(|(_, name)| name == "test-owner"));

        event_loop.shutdown();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_invoke_and_wait_returns_value() {
        let (event_loop, handle) = spawn_loop(&SpinConfig::new());
        let name = event_loop.invoke_and_wait(current_thread_name).unwrap();
        assert_eq!(name, "test-owner");
        assert!(!event_loop.is_owner_thread());

        event_loop.shutdown();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_invoke_and_wait_refused_on_owner() {
        let (event_loop, handle) = spawn_loop(&SpinConfig::new());
        let inner = event_loop.clone();
        let refused = event_loop
            .invoke_and_wait(move || matches!(
                inner.invoke_and_wait(|| 1),
                Err(SpinError::IllegalThreadAccess { .. })
            ))
            .unwrap();
        assert!(refused);

        event_loop.shutdown();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_panicking_task_does_not_stop_loop() {
        let (event_loop, handle) = spawn_loop(&SpinConfig::new());

        event_loop.invoke_later(|| panic!("task bug")).unwrap();
        let result = event_loop.invoke_and_wait(|| -> u8 { panic!("waited bug") });
        match result {
            Err(SpinError::Failed(failure)) => assert_eq!(failure.message(), "waited bug"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert_eq!(event_loop.invoke_and_wait(|| 5).unwrap(), 5);

        event_loop.shutdown();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_shutdown_drains_queue_and_refuses_new_tasks() {
        let event_loop = EventLoop::with_config(&SpinConfig::new());
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            event_loop
                .invoke_later(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        assert_eq!(event_loop.pending(), 3);

        event_loop.shutdown();
        // Run on this thread: shutdown is already requested, so it only drains
        event_loop.run().unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(event_loop.executed(), 3);
        assert!(matches!(
            event_loop.invoke_later(|| ()),
            Err(SpinError::OwnerUnavailable)
        ));
    }

    #[test]
    fn test_run_binds_single_owner() {
        let (event_loop, handle) = spawn_loop(&SpinConfig::new());
        assert!(matches!(
            event_loop.run(),
            Err(SpinError::IllegalThreadAccess { .. })
        ));
        event_loop.shutdown();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_pump_refused_off_owner() {
        let event_loop = EventLoop::new();
        assert_eq!(
            event_loop.pump(&|| true),
            Err(PumpRefused::NotOwnerThread)
        );
    }

    #[test]
    fn test_nested_pump_services_queue() {
        let (event_loop, handle) = spawn_loop(&SpinConfig::new());
        let inner = event_loop.clone();

        let (observed_depth, ran_nested) = event_loop
            .invoke_and_wait(move || {
                let flag = Arc::new(AtomicBool::new(false));
                let set = Arc::clone(&flag);
                inner
                    .invoke_later(move || set.store(true, Ordering::SeqCst))
                    .unwrap();

                let depth = Arc::new(AtomicUsize::new(0));
                let seen = Arc::clone(&depth);
                let probe = inner.clone();
                inner
                    .invoke_later(move || seen.store(probe.pump_depth(), Ordering::SeqCst))
                    .unwrap();

                let waiting = Arc::clone(&flag);
                let result = inner.pump(&|| {
                    !(waiting.load(Ordering::SeqCst) && depth.load(Ordering::SeqCst) > 0)
                });
                assert!(result.is_ok());
                (depth.load(Ordering::SeqCst), flag.load(Ordering::SeqCst))
            })
            .unwrap();

        assert_eq!(observed_depth, 1);
        assert!(ran_nested);
        assert_eq!(event_loop.pump_depth(), 0);

        event_loop.shutdown();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_pump_depth_limit() {
        let (event_loop, handle) = spawn_loop(&SpinConfig::new().max_pump_depth(1));
        let inner = event_loop.clone();

        let nested = event_loop
            .invoke_and_wait(move || {
                let deeper = inner.clone();
                let result = Arc::new(Mutex::new(None));
                let slot = Arc::clone(&result);
                inner
                    .invoke_later(move || {
                        *slot.lock().unwrap() = Some(deeper.pump(&|| true));
                    })
                    .unwrap();
                let outer = inner.pump(&|| result.lock().unwrap().is_none());
                assert!(outer.is_ok());
                let nested = result.lock().unwrap().take();
                nested
            })
            .unwrap();

        assert_eq!(nested, Some(Err(PumpRefused::DepthExceeded(1))));
        event_loop.shutdown();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_shutdown_mid_pump_keeps_running_queued_tasks() {
        let (event_loop, handle) = spawn_loop(&SpinConfig::new());
        let inner = event_loop.clone();
        let done = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let flag = Arc::clone(&done);
        event_loop
            .invoke_later(move || {
                let flag = Arc::clone(&flag);
                let _ = tx.send(inner.pump(&move || !flag.load(Ordering::SeqCst)));
            })
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        // Queued before shutdown; the pump must still run it
        let flag = Arc::clone(&done);
        event_loop
            .invoke_later(move || {
                thread::sleep(Duration::from_millis(100));
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();
        event_loop.shutdown();
        assert!(event_loop.invoke_later(|| ()).is_err());

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Ok(()));
        assert!(done.load(Ordering::SeqCst));
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_pump_after_shutdown_drains_until_predicate_clears() {
        let event_loop = EventLoop::new();
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);
        event_loop
            .invoke_later(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let inner = event_loop.clone();
        let seen = Arc::clone(&count);
        event_loop
            .invoke_later(move || {
                let seen = Arc::clone(&seen);
                inner.shutdown();
                let pumped = inner.pump(&move || seen.load(Ordering::SeqCst) < 2);
                assert_eq!(pumped, Ok(()));
            })
            .unwrap();
        let seen = Arc::clone(&count);
        event_loop
            .invoke_later(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        event_loop.run().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_idle_loop_wakes_on_enqueue() {
        let config = SpinConfig::new().idle_park(Duration::from_secs(10));
        let (event_loop, handle) = spawn_loop(&config);

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        event_loop.invoke_and_wait(|| ()).unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));

        event_loop.shutdown();
        handle.join().unwrap().unwrap();
    }
}
