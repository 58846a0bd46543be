//! # spin-core
//!
//! Core types and traits for Spin, the cross-thread invocation bridge.
//!
//! This crate is platform-agnostic and never spawns a thread. The owner
//! loop, starters, dispatchers and the routing stages live in
//! `spin-runtime`.
//!
//! ## Modules
//!
//! - `invocation` - Reified calls with a write-once outcome slot
//! - `evaluator` - Evaluator chains and the terminal stage
//! - `proxy` - Stand-ins, call surfaces and the proxy factory
//! - `macros` - The `stand_in!` generator
//! - `traits` - Owner loop, starter, dispatcher and failure sink traits
//! - `error` - Error types
//! - `env` - Environment variable helpers

pub mod env;
pub mod error;
pub mod evaluator;
pub mod invocation;
pub mod macros;
pub mod proxy;
pub mod traits;

// Re-exports for convenience
pub use env::{env_get, env_get_opt, env_millis, env_timeout};
pub use error::{
    current_thread_name, Failure, PanicPayload, PumpRefused, SpinError, SpinResult,
    ThreadRuleViolation,
};
pub use evaluator::{evaluate_contained, terminal, Chain, Evaluator, Terminal};
pub use invocation::{
    Argument, ArgumentCursor, Arguments, Call, Invocation, Method, ObjectId, Outcome, Target,
    Value,
};
pub use proxy::{Proxy, ProxyFactory, StandIn, Surface, TraitProxyFactory};
pub use traits::{
    Dispatcher, DispatcherFactory, DispatcherState, FailureSink, OwnerLoop, Starter, Task,
};
