//! # spin
//!
//! Run calls on worker threads, or on a single owner thread, without the
//! caller noticing.
//!
//! A stand-in implements the same trait as the real object. Every call on
//! it is reified and routed:
//!
//! - **spin-off** (`Spin::off`): the call runs on a worker thread. When the
//!   caller is the owner thread it keeps servicing its loop while it waits,
//!   so work the worker sends back to the owner still gets done.
//! - **spin-over** (`Spin::over`, `Spin::over_async`): the call runs on the
//!   owner thread, either waited for or fire-and-forget.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use spin::{stand_in, OwnerThread, Spin, SpinConfig, StandIn};
//!
//! pub trait Catalog: Send + Sync {
//!     fn lookup(&self, key: String) -> Option<u64>;
//! }
//!
//! stand_in! {
//!     pub struct CatalogStandIn for dyn Catalog {
//!         fn lookup(&self, key: String) -> Option<u64>;
//!     }
//! }
//!
//! let config = SpinConfig::from_env();
//! let owner = OwnerThread::spawn(&config)?;
//! let spin = Spin::with_config(owner.owner(), &config)?;
//!
//! // Slow lookups never freeze the owner loop
//! let catalog = spin.off::<CatalogStandIn>(Arc::new(DiskCatalog::open()?))?.into_target();
//! owner.event_loop().invoke_later(move || {
//!     let price = catalog.lookup("tea".into());
//! })?;
//! ```
//!
//! ## Crates
//!
//! - `spin-core` - invocations, evaluator chains, stand-ins, traits, errors
//! - `spin-runtime` - owner loop, starters, dispatchers, routing stages, config

pub mod bridge;
pub mod owner;

pub use bridge::{Spin, SpinBuilder};
pub use owner::OwnerThread;

pub use spin_core::{
    current_thread_name, stand_in, terminal, Argument, Arguments, Chain, Dispatcher,
    DispatcherFactory, DispatcherState, Evaluator, Failure, FailureSink, Invocation, Method,
    ObjectId, OwnerLoop, PanicPayload, Proxy, ProxyFactory, SpinError, SpinResult, StandIn,
    Starter, Surface, Target, Task, ThreadRuleViolation, TraitProxyFactory,
};
pub use spin_runtime::{
    AffinityAudit, AuditPolicy, DispatcherKind, EventLoop, ListenerSpinOver, LogSink, OverMode,
    OverPolicy, PooledStarter, PumpDispatcher, PumpDispatcherFactory, SimpleStarter, SpinConfig,
    SpinOff, SpinOver, StarterKind, WaitDispatcher, WaitDispatcherFactory,
};
