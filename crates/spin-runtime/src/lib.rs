//! # spin-runtime
//!
//! Concrete runtime for the Spin invocation bridge.
//!
//! This crate provides:
//! - `EventLoop`, an owner loop that can be pumped reentrantly
//! - Starters that launch spin-off work (`SimpleStarter`, `PooledStarter`)
//! - Dispatchers that keep the owner thread serviced while it waits
//! - The routing stages: `SpinOff`, `SpinOver`, `ListenerSpinOver` and
//!   `AffinityAudit`
//! - Futex (Linux) or condvar parking for the idle owner loop
//! - `SpinConfig`, library defaults with environment overrides

pub mod audit;
pub mod config;
pub mod dispatcher;
pub mod event_loop;
pub mod listener;
pub mod parking;
pub mod spin_off;
pub mod spin_over;
pub mod starter;

// Re-exports
pub use audit::{AffinityAudit, AuditPolicy};
pub use config::{DispatcherKind, SpinConfig, StarterKind};
pub use dispatcher::{PumpDispatcher, PumpDispatcherFactory, WaitDispatcher, WaitDispatcherFactory};
pub use event_loop::EventLoop;
pub use listener::ListenerSpinOver;
pub use parking::{new_parking, LoopParking};
pub use spin_off::SpinOff;
pub use spin_over::{LogSink, OverMode, OverPolicy, SpinOver};
pub use starter::{PooledStarter, SimpleStarter};
