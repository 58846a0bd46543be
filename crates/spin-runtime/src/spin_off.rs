//! Spin-off: run the call on a worker thread
//!
//! On the owner thread the caller waits inside a fresh dispatcher, so the
//! owner loop keeps running (including spin-overs issued by the worker
//! itself). Anywhere else the caller simply blocks on the worker.
//!
//! The invocation travels to the worker by ownership and comes back the
//! same way before the caller resumes.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use spin_core::{
    current_thread_name, evaluate_contained, Chain, Dispatcher, DispatcherFactory, Evaluator,
    Invocation, OwnerLoop, SpinError, SpinResult, Starter,
};
use tracing::{trace, warn};

type Handback = (Invocation, SpinResult<()>);

/// Stops the dispatcher when the worker task finishes, panics, or is
/// dropped without running
struct StopOnDrop(Arc<dyn Dispatcher>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

pub struct SpinOff {
    owner: Arc<dyn OwnerLoop>,
    starter: Arc<dyn Starter>,
    dispatchers: Arc<dyn DispatcherFactory>,
    next: Chain,
    call_timeout: Option<Duration>,
}

impl SpinOff {
    pub fn new(
        owner: Arc<dyn OwnerLoop>,
        starter: Arc<dyn Starter>,
        dispatchers: Arc<dyn DispatcherFactory>,
        next: Chain,
    ) -> Self {
        Self {
            owner,
            starter,
            dispatchers,
            next,
            call_timeout: None,
        }
    }

    /// Give up waiting off the owner thread after `timeout`
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Start the worker; the invocation comes back through the receiver
    fn launch(
        &self,
        invocation: &mut Invocation,
        guard: Option<StopOnDrop>,
    ) -> SpinResult<Receiver<Handback>> {
        let (tx, rx) = mpsc::sync_channel(1);
        let mut handed = invocation.take();
        let next = Arc::clone(&self.next);

        self.starter.start(Box::new(move || {
            let _guard = guard;
            trace!(
                method = handed.method().name(),
                thread = %current_thread_name(),
                "spin-off running"
            );
            let result = evaluate_contained(next.as_ref(), &mut handed);
            let _ = tx.send((handed, result));
        }))?;
        Ok(rx)
    }

    fn evaluate_pumping(&self, invocation: &mut Invocation) -> SpinResult<()> {
        let method = invocation.method().name();
        let dispatcher = self.dispatchers.create_dispatcher();
        let guard = StopOnDrop(Arc::clone(&dispatcher));

        let rx = self.launch(invocation, Some(guard))?;
        dispatcher.start()?;

        // The worker sent before its guard stopped the dispatcher
        let (returned, result) = rx.recv().map_err(|_| SpinError::WorkerLost { method })?;
        *invocation = returned;
        result
    }

    fn evaluate_blocking(&self, invocation: &mut Invocation) -> SpinResult<()> {
        let method = invocation.method().name();
        let rx = self.launch(invocation, None)?;

        let (returned, result) = match self.call_timeout {
            Some(after) => rx.recv_timeout(after).map_err(|err| match err {
                RecvTimeoutError::Timeout => {
                    warn!(method, ?after, "spin-off timed out, detaching");
                    SpinError::Timeout { method, after }
                }
                RecvTimeoutError::Disconnected => SpinError::WorkerLost { method },
            })?,
            None => rx.recv().map_err(|_| SpinError::WorkerLost { method })?,
        };
        *invocation = returned;
        result
    }
}

impl Evaluator for SpinOff {
    fn evaluate(&self, invocation: &mut Invocation) -> SpinResult<()> {
        if self.owner.is_owner_thread() {
            trace!(method = invocation.method().name(), "spin-off from owner thread, pumping");
            self.evaluate_pumping(invocation)
        } else {
            trace!(
                method = invocation.method().name(),
                thread = %current_thread_name(),
                "spin-off from worker thread, blocking"
            );
            self.evaluate_blocking(invocation)
        }
    }
}
