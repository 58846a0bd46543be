//! Chain assembly
//!
//! `Spin` owns the pieces every chain needs (owner loop, starter,
//! dispatcher factory, failure sink) and hands out stand-ins wired to the
//! right chain.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use spin_core::{
    terminal, Chain, DispatcherFactory, FailureSink, OwnerLoop, ProxyFactory, SpinResult,
    StandIn, Starter, TraitProxyFactory,
};
use spin_runtime::{
    AffinityAudit, AuditPolicy, DispatcherKind, ListenerSpinOver, LogSink, OverMode, OverPolicy,
    PooledStarter, PumpDispatcherFactory, SimpleStarter, SpinConfig, SpinOff, SpinOver,
    StarterKind, WaitDispatcherFactory,
};
use tracing::debug;

/// Factory for spin-off, spin-over and checked stand-ins bound to one
/// owner loop
pub struct Spin {
    owner: Arc<dyn OwnerLoop>,
    starter: Arc<dyn Starter>,
    dispatchers: Arc<dyn DispatcherFactory>,
    factory: TraitProxyFactory,
    policy: OverPolicy,
    sink: Arc<dyn FailureSink>,
    audit: AuditPolicy,
    call_timeout: Option<Duration>,
}

impl Spin {
    /// Bridge for `owner`, configured from the environment
    pub fn new(owner: Arc<dyn OwnerLoop>) -> SpinResult<Self> {
        Self::with_config(owner, &SpinConfig::from_env())
    }

    pub fn with_config(owner: Arc<dyn OwnerLoop>, config: &SpinConfig) -> SpinResult<Self> {
        SpinBuilder::new(owner).config(config.clone()).build()
    }

    pub fn builder(owner: Arc<dyn OwnerLoop>) -> SpinBuilder {
        SpinBuilder::new(owner)
    }

    /// Stand-in whose calls run on a worker thread
    ///
    /// Listener arguments of `add_*_listener` / `remove_*_listener` calls
    /// are wrapped so their callbacks come back on the owner thread.
    pub fn off<S: StandIn>(&self, object: Arc<S::Target>) -> SpinResult<S> {
        self.factory.create_proxy(object, self.off_chain())
    }

    /// Stand-in whose calls run on the owner thread
    pub fn over<S: StandIn>(&self, object: Arc<S::Target>) -> SpinResult<S> {
        self.factory.create_proxy(object, self.over_chain())
    }

    /// Fire-and-forget spin-over; only suits methods returning `()`
    pub fn over_async<S: StandIn>(&self, object: Arc<S::Target>) -> SpinResult<S> {
        let chain = self.over_chain_with(OverMode::Asynchronous.into());
        self.factory.create_proxy(object, chain)
    }

    /// Stand-in that audits off-owner calls under the configured policy
    pub fn checked<S: StandIn>(&self, object: Arc<S::Target>) -> SpinResult<S> {
        let chain: Chain = match self.audit {
            AuditPolicy::Off => terminal(),
            policy => Arc::new(AffinityAudit::new(Arc::clone(&self.owner), policy, terminal())),
        };
        self.factory.create_proxy(object, chain)
    }

    /// Listener rewriting followed by the spin-off bridge
    pub fn off_chain(&self) -> Chain {
        let off = SpinOff::new(
            Arc::clone(&self.owner),
            Arc::clone(&self.starter),
            Arc::clone(&self.dispatchers),
            terminal(),
        )
        .call_timeout(self.call_timeout);
        Arc::new(ListenerSpinOver::new(self.over_chain(), Arc::new(off)))
    }

    /// The spin-over bridge under the configured policy
    pub fn over_chain(&self) -> Chain {
        self.over_chain_with(self.policy)
    }

    fn over_chain_with(&self, policy: OverPolicy) -> Chain {
        Arc::new(
            SpinOver::new(Arc::clone(&self.owner), terminal())
                .policy(policy)
                .sink(Arc::clone(&self.sink))
                .call_timeout(self.call_timeout),
        )
    }

    /// Whether `candidate` is a stand-in produced by this bridge
    pub fn is_proxy(&self, candidate: &dyn Any) -> bool {
        self.factory.is_proxy(candidate)
    }

    #[inline]
    pub fn owner(&self) -> &Arc<dyn OwnerLoop> {
        &self.owner
    }
}

impl fmt::Debug for Spin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spin")
            .field("policy", &self.policy)
            .field("audit", &self.audit)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

/// Builder for [`Spin`]
///
/// Anything not set explicitly follows the [`SpinConfig`].
pub struct SpinBuilder {
    owner: Arc<dyn OwnerLoop>,
    config: SpinConfig,
    starter: Option<Arc<dyn Starter>>,
    dispatchers: Option<Arc<dyn DispatcherFactory>>,
    policy: Option<OverPolicy>,
    sink: Option<Arc<dyn FailureSink>>,
}

impl SpinBuilder {
    pub fn new(owner: Arc<dyn OwnerLoop>) -> Self {
        Self {
            owner,
            config: SpinConfig::from_env(),
            starter: None,
            dispatchers: None,
            policy: None,
            sink: None,
        }
    }

    pub fn config(mut self, config: SpinConfig) -> Self {
        self.config = config;
        self
    }

    pub fn starter(mut self, starter: Arc<dyn Starter>) -> Self {
        self.starter = Some(starter);
        self
    }

    pub fn dispatchers(mut self, factory: Arc<dyn DispatcherFactory>) -> Self {
        self.dispatchers = Some(factory);
        self
    }

    pub fn over_policy(mut self, policy: impl Into<OverPolicy>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    pub fn sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn audit(mut self, policy: AuditPolicy) -> Self {
        self.config.audit = policy;
        self
    }

    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    pub fn build(self) -> SpinResult<Spin> {
        let config = self.config;
        config.validate()?;
        config.log();

        let starter: Arc<dyn Starter> = match self.starter {
            Some(starter) => starter,
            None => match config.starter {
                StarterKind::Simple => Arc::new(SimpleStarter::with_config(&config)),
                StarterKind::Pooled => Arc::new(PooledStarter::with_config(&config)),
            },
        };
        let dispatchers: Arc<dyn DispatcherFactory> = match self.dispatchers {
            Some(factory) => factory,
            None => match config.dispatcher {
                DispatcherKind::Pump => Arc::new(PumpDispatcherFactory::new(Arc::clone(&self.owner))),
                DispatcherKind::Wait => Arc::new(WaitDispatcherFactory::new(Arc::clone(&self.owner))),
            },
        };
        let policy = self.policy.unwrap_or(OverPolicy::Fixed(config.over_mode));
        debug!(?policy, starter = %config.starter, dispatcher = %config.dispatcher, "spin bridge ready");

        Ok(Spin {
            owner: self.owner,
            starter,
            dispatchers,
            factory: TraitProxyFactory::new(),
            policy,
            sink: self.sink.unwrap_or_else(|| Arc::new(LogSink) as Arc<dyn FailureSink>),
            audit: config.audit,
            call_timeout: config.call_timeout,
        })
    }
}
