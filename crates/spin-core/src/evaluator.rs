//! Evaluator chains
//!
//! Stages are nested by delegation: each holds the next [`Chain`] and
//! decides whether, when, and on which thread to call it. [`Terminal`]
//! sits at the bottom and performs the real call. A built chain is
//! immutable and may be shared by any number of concurrent invocations.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{Failure, SpinResult};
use crate::invocation::Invocation;

/// One call-handling stage
///
/// On `Ok(())` the invocation's outcome slot must be set. Errors from
/// later stages are returned unchanged.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, invocation: &mut Invocation) -> SpinResult<()>;
}

/// Shared handle to the head of a chain
pub type Chain = Arc<dyn Evaluator>;

/// Bottom of every chain: performs the real call on the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct Terminal;

impl Evaluator for Terminal {
    #[inline]
    fn evaluate(&self, invocation: &mut Invocation) -> SpinResult<()> {
        invocation.evaluate()
    }
}

/// A chain consisting only of [`Terminal`]
pub fn terminal() -> Chain {
    Arc::new(Terminal)
}

impl<F> Evaluator for F
where
    F: Fn(&mut Invocation) -> SpinResult<()> + Send + Sync,
{
    fn evaluate(&self, invocation: &mut Invocation) -> SpinResult<()> {
        self(invocation)
    }
}

/// Evaluate `next`, containing panics raised by the stages themselves
///
/// Used by routing stages on the thread they hop to: a panicking stage
/// becomes the invocation's failure instead of unwinding through a worker
/// or the owner loop.
pub fn evaluate_contained(next: &dyn Evaluator, invocation: &mut Invocation) -> SpinResult<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| next.evaluate(invocation))) {
        Ok(result) => result,
        Err(payload) => {
            if !invocation.has_outcome() {
                invocation.set_failure(Failure::panic(payload))?;
            }
            Ok(())
        }
    }
}
