//! Listener spin-over
//!
//! Registration calls (`add_*_listener` / `remove_*_listener`) get their
//! listener arguments replaced by stand-ins routed through a spin-over
//! chain, so callbacks fired from a worker land on the owner thread.

use spin_core::{Chain, Evaluator, Invocation, SpinResult};
use tracing::trace;

pub struct ListenerSpinOver {
    over: Chain,
    next: Chain,
}

impl ListenerSpinOver {
    /// `over` wraps listeners, `next` performs the call
    pub fn new(over: Chain, next: Chain) -> Self {
        Self { over, next }
    }
}

impl Evaluator for ListenerSpinOver {
    fn evaluate(&self, invocation: &mut Invocation) -> SpinResult<()> {
        let method = invocation.method();
        if method.is_listener_registration() {
            let mut wrapped = 0;
            for argument in invocation.arguments_mut().iter_mut() {
                if argument.spin_over(&self.over)? {
                    wrapped += 1;
                }
            }
            trace!(method = method.name(), wrapped, "listener arguments spun over");
        }
        self.next.evaluate(invocation)
    }
}
