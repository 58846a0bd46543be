//! Error types for Spin
//!
//! Two families live here. [`SpinError`] covers failures of the bridge
//! itself (wrong thread, shut-down owner loop, malformed calls). [`Failure`]
//! is the outcome of a real call that went wrong; it travels inside an
//! invocation's outcome slot and is only wrapped into `SpinError::Failed`
//! when it reaches the original caller.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

/// Result type for bridge operations
pub type SpinResult<T> = Result<T, SpinError>;

/// Errors raised by the bridge
#[derive(Debug, Error)]
pub enum SpinError {
    /// An owner-thread-only operation was attempted elsewhere
    #[error("illegal thread access: {operation} called on thread `{thread}`")]
    IllegalThreadAccess {
        operation: &'static str,
        thread: String,
    },

    /// The call surface cannot be represented by a stand-in
    #[error("cannot create stand-in for `{surface}`: {reason}")]
    ProxyCreation {
        surface: &'static str,
        reason: String,
    },

    /// The real call failed; carries the original failure untouched
    #[error("propagated failure: {0}")]
    Failed(#[from] Failure),

    /// The owner loop is shut down or dropped the task unrun
    #[error("owner loop is not accepting tasks")]
    OwnerUnavailable,

    /// A worker dropped a spin-off task without reporting back
    #[error("worker for `{method}` exited without an outcome")]
    WorkerLost { method: &'static str },

    /// A starter could not launch a worker thread
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A one-shot dispatcher was started a second time
    #[error("dispatcher already started")]
    DispatcherReused,

    /// An argument did not have the type the call expected
    #[error("argument {index} of `{method}` is not a `{expected}`")]
    ArgumentType {
        method: &'static str,
        index: usize,
        expected: &'static str,
    },

    /// The call produced a value of an unexpected type
    #[error("`{method}` did not produce a `{expected}`")]
    ReturnType {
        method: &'static str,
        expected: &'static str,
    },

    /// The chain returned without setting the outcome slot
    #[error("`{method}` returned without an outcome")]
    Unevaluated { method: &'static str },

    /// The outcome slot was already written
    #[error("invocation of `{method}` already has an outcome")]
    AlreadyEvaluated { method: &'static str },

    /// The waiting side gave up; the call keeps running detached
    #[error("gave up waiting for `{method}` after {after:?}")]
    Timeout {
        method: &'static str,
        after: Duration,
    },

    /// Owner-thread rule violated (audit stage)
    #[error("thread rule violation: {0}")]
    ThreadRule(ThreadRuleViolation),

    /// Invalid configuration
    #[error("invalid config: {0}")]
    Config(String),
}

impl SpinError {
    /// Build an `IllegalThreadAccess` naming the current thread
    pub fn illegal_thread(operation: &'static str) -> Self {
        SpinError::IllegalThreadAccess {
            operation,
            thread: current_thread_name(),
        }
    }

    /// The propagated failure, if this error carries one
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            SpinError::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Why an owner loop refused to re-enter its pump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PumpRefused {
    #[error("not on the owner thread")]
    NotOwnerThread,

    #[error("pump nesting depth {0} exceeded")]
    DepthExceeded(usize),
}

/// A call issued off the owner thread against an owner-affine object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRuleViolation {
    /// Method that was called
    pub method: &'static str,
    /// Type name of the object it was called on
    pub surface: &'static str,
    /// Name of the offending thread
    pub thread: String,
}

impl fmt::Display for ThreadRuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` on `{}` called from thread `{}`",
            self.method, self.surface, self.thread
        )
    }
}

/// Outcome of a real call that did not return normally
///
/// Moved, never cloned: the caller receives the exact error value or panic
/// payload that the callee produced, on whichever thread it ran.
pub enum Failure {
    /// The call reported an error
    Error(Box<dyn StdError + Send + Sync>),
    /// The call panicked
    Panic(PanicPayload),
}

impl Failure {
    /// Wrap an error value
    pub fn error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Failure::Error(Box::new(error))
    }

    /// Wrap a panic payload as returned by `catch_unwind`
    pub fn panic(payload: Box<dyn Any + Send>) -> Self {
        Failure::Panic(PanicPayload::new(payload))
    }

    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self, Failure::Panic(_))
    }

    /// Human-readable description
    pub fn message(&self) -> String {
        match self {
            Failure::Error(err) => err.to_string(),
            Failure::Panic(payload) => payload.message(),
        }
    }

    /// Borrow the error value if it is an `E`
    pub fn downcast_error_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Failure::Error(err) => err.downcast_ref::<E>(),
            Failure::Panic(_) => None,
        }
    }

    /// Re-raise on the current thread
    ///
    /// A panic resumes with its original payload; an error panics with
    /// its message.
    pub fn raise(self) -> ! {
        match self {
            Failure::Panic(payload) => std::panic::resume_unwind(payload.into_inner()),
            Failure::Error(err) => panic!("{}", err),
        }
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Failure::Panic(payload) => f.debug_tuple("Panic").field(&payload.message()).finish(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Error(err) => write!(f, "{}", err),
            Failure::Panic(payload) => write!(f, "panicked: {}", payload.message()),
        }
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Failure::Error(err) => Some(err.as_ref()),
            Failure::Panic(_) => None,
        }
    }
}

/// Panic payload made shareable
///
/// `catch_unwind` payloads are only `Send`; the mutex makes the failure
/// `Sync` so it can sit inside ordinary error types.
pub struct PanicPayload(Mutex<Box<dyn Any + Send>>);

impl PanicPayload {
    pub fn new(payload: Box<dyn Any + Send>) -> Self {
        Self(Mutex::new(payload))
    }

    /// Panic message when the payload is a string, a placeholder otherwise
    pub fn message(&self) -> String {
        let payload = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "Box<dyn Any>".to_string()
        }
    }

    /// Check the payload type
    pub fn is<T: Any>(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is::<T>()
    }

    /// Recover the original payload
    pub fn into_inner(self) -> Box<dyn Any + Send> {
        self.0.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Name of the current thread, or its id when unnamed
pub fn current_thread_name() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[derive(Debug, PartialEq)]
    struct Marker(u32);

    #[test]
    fn test_error_display() {
        let e = SpinError::DispatcherReused;
        assert_eq!(format!("{}", e), "dispatcher already started");

        let e = SpinError::ArgumentType {
            method: "set_width",
            index: 1,
            expected: "u32",
        };
        assert_eq!(format!("{}", e), "argument 1 of `set_width` is not a `u32`");

        let e = SpinError::ThreadRule(ThreadRuleViolation {
            method: "repaint",
            surface: "dyn Canvas",
            thread: "spin-3".into(),
        });
        assert_eq!(
            format!("{}", e),
            "thread rule violation: `repaint` on `dyn Canvas` called from thread `spin-3`"
        );
    }

    #[test]
    fn test_illegal_thread_names_caller() {
        let handle = std::thread::Builder::new()
            .name("not-the-owner".into())
            .spawn(|| SpinError::illegal_thread("Dispatcher::start"))
            .unwrap();
        match handle.join().unwrap() {
            SpinError::IllegalThreadAccess { operation, thread } => {
                assert_eq!(operation, "Dispatcher::start");
                assert_eq!(thread, "not-the-owner");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failure_keeps_panic_payload() {
        let payload = panic::catch_unwind(|| panic::panic_any(Marker(7))).unwrap_err();
        let failure = Failure::panic(payload);
        assert!(failure.is_panic());

        let Failure::Panic(payload) = failure else {
            panic!("expected panic failure");
        };
        assert!(payload.is::<Marker>());
        let inner = payload.into_inner();
        assert_eq!(inner.downcast_ref::<Marker>(), Some(&Marker(7)));
    }

    #[test]
    fn test_failure_message() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 3)).unwrap_err();
        assert_eq!(Failure::panic(payload).message(), "boom 3");

        let failure = Failure::error(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(failure.message(), "disk");
        assert!(failure.downcast_error_ref::<std::io::Error>().is_some());
        assert!(failure.source().is_some());
    }

    #[test]
    fn test_raise_resumes_original_payload() {
        let payload = panic::catch_unwind(|| panic::panic_any(Marker(11))).unwrap_err();
        let failure = Failure::panic(payload);

        let resumed = panic::catch_unwind(panic::AssertUnwindSafe(|| failure.raise())).unwrap_err();
        assert_eq!(resumed.downcast_ref::<Marker>(), Some(&Marker(11)));
    }

    #[test]
    fn test_failed_conversion() {
        let err: SpinError = Failure::error(std::fmt::Error).into();
        assert!(err.failure().is_some());
        assert!(SpinError::OwnerUnavailable.failure().is_none());
    }
}
