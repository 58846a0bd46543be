//! Spin-over: run the call on the owner thread
//!
//! Calls already on the owner thread go straight to the next stage.
//! Otherwise the call is queued on the owner loop and, depending on the
//! per-call mode, the caller either waits for the outcome or continues
//! at once while failures go to a [`FailureSink`].

use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use spin_core::{
    current_thread_name, evaluate_contained, Chain, Evaluator, Failure, FailureSink, Invocation,
    Method, OwnerLoop, SpinError, SpinResult,
};
use tracing::{error, trace, warn};

/// Whether a spin-over caller waits for the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverMode {
    Synchronous,
    /// Fire-and-forget; the caller sees `()`
    Asynchronous,
}

impl FromStr for OverMode {
    type Err = SpinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" | "synchronous" => Ok(OverMode::Synchronous),
            "async" | "asynchronous" => Ok(OverMode::Asynchronous),
            other => Err(SpinError::Config(format!("unknown spin-over mode `{}`", other))),
        }
    }
}

/// Chooses the mode for each call
#[derive(Clone, Copy)]
pub enum OverPolicy {
    Fixed(OverMode),
    PerMethod(fn(&Method) -> OverMode),
}

impl OverPolicy {
    pub fn mode_for(&self, method: &Method) -> OverMode {
        match self {
            OverPolicy::Fixed(mode) => *mode,
            OverPolicy::PerMethod(choose) => choose(method),
        }
    }

    /// Wait for calls that return something, fire-and-forget the rest
    pub fn by_return_type() -> Self {
        OverPolicy::PerMethod(|method| {
            if method.returns_value() {
                OverMode::Synchronous
            } else {
                OverMode::Asynchronous
            }
        })
    }
}

impl From<OverMode> for OverPolicy {
    fn from(mode: OverMode) -> Self {
        OverPolicy::Fixed(mode)
    }
}

impl fmt::Debug for OverPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverPolicy::Fixed(mode) => f.debug_tuple("Fixed").field(mode).finish(),
            OverPolicy::PerMethod(_) => f.write_str("PerMethod"),
        }
    }
}

/// Default sink: logs at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FailureSink for LogSink {
    fn report(&self, method: &Method, failure: Failure) {
        error!(method = %method, %failure, "spin-over call failed with nobody waiting");
    }
}

/// Reports `OwnerUnavailable` if an async task is dropped unrun
struct ReportOnDrop {
    method: Method,
    sink: Option<Arc<dyn FailureSink>>,
}

impl ReportOnDrop {
    fn disarm(mut self) -> Option<Arc<dyn FailureSink>> {
        self.sink.take()
    }
}

impl Drop for ReportOnDrop {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.report(&self.method, Failure::error(SpinError::OwnerUnavailable));
        }
    }
}

pub struct SpinOver {
    owner: Arc<dyn OwnerLoop>,
    next: Chain,
    policy: OverPolicy,
    sink: Arc<dyn FailureSink>,
    call_timeout: Option<Duration>,
}

impl SpinOver {
    /// Synchronous spin-over logging async failures
    pub fn new(owner: Arc<dyn OwnerLoop>, next: Chain) -> Self {
        Self {
            owner,
            next,
            policy: OverPolicy::Fixed(OverMode::Synchronous),
            sink: Arc::new(LogSink),
            call_timeout: None,
        }
    }

    pub fn policy(mut self, policy: impl Into<OverPolicy>) -> Self {
        self.policy = policy.into();
        self
    }

    pub fn sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Give up a synchronous wait after `timeout`
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn evaluate_sync(&self, invocation: &mut Invocation) -> SpinResult<()> {
        let method = invocation.method().name();
        let (tx, rx) = mpsc::sync_channel(1);
        let mut handed = invocation.take();
        let next = Arc::clone(&self.next);

        self.owner.enqueue(Box::new(move || {
            let result = evaluate_contained(next.as_ref(), &mut handed);
            let _ = tx.send((handed, result));
        }))?;

        let (returned, result) = match self.call_timeout {
            Some(after) => rx.recv_timeout(after).map_err(|err| match err {
                RecvTimeoutError::Timeout => {
                    warn!(method, ?after, "spin-over timed out, detaching");
                    SpinError::Timeout { method, after }
                }
                RecvTimeoutError::Disconnected => SpinError::OwnerUnavailable,
            })?,
            None => rx.recv().map_err(|_| SpinError::OwnerUnavailable)?,
        };
        *invocation = returned;
        result
    }

    fn evaluate_async(&self, invocation: &mut Invocation) -> SpinResult<()> {
        let method = invocation.method();
        let mut handed = invocation.take();
        invocation.set_result(Box::new(()))?;

        let next = Arc::clone(&self.next);
        let guard = ReportOnDrop {
            method,
            sink: Some(Arc::clone(&self.sink)),
        };

        let queued = self.owner.enqueue(Box::new(move || {
            let Some(sink) = guard.disarm() else {
                return;
            };
            let failure = match evaluate_contained(next.as_ref(), &mut handed) {
                Ok(()) => match handed.take_outcome() {
                    Some(Ok(_)) => return,
                    Some(Err(failure)) => failure,
                    None => Failure::error(SpinError::Unevaluated {
                        method: method.name(),
                    }),
                },
                Err(err) => Failure::error(err),
            };
            sink.report(&method, failure);
        }));
        // A refused task was dropped, and its guard already reported
        if let Err(err) = queued {
            trace!(%err, method = method.name(), "async spin-over not queued");
        }
        Ok(())
    }
}

impl Evaluator for SpinOver {
    fn evaluate(&self, invocation: &mut Invocation) -> SpinResult<()> {
        if self.owner.is_owner_thread() {
            trace!(method = invocation.method().name(), "already on owner thread");
            return self.next.evaluate(invocation);
        }

        let mode = self.policy.mode_for(&invocation.method());
        trace!(
            method = invocation.method().name(),
            thread = %current_thread_name(),
            ?mode,
            "spin-over"
        );
        match mode {
            OverMode::Synchronous => self.evaluate_sync(invocation),
            OverMode::Asynchronous => self.evaluate_async(invocation),
        }
    }
}
