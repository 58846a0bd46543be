//! Spin configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use spin_runtime::config::{SpinConfig, StarterKind};
//!
//! // Defaults with env overrides
//! let config = SpinConfig::from_env();
//!
//! // Or customize programmatically
//! let config = SpinConfig::from_env()
//!     .starter(StarterKind::Pooled)
//!     .call_timeout(Some(Duration::from_secs(5)));
//! ```

pub mod defaults;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use spin_core::env::{env_get, env_millis, env_timeout};
use spin_core::{SpinError, SpinResult};
use tracing::debug;

use crate::audit::AuditPolicy;
use crate::spin_over::OverMode;

/// Which starter launches spin-off work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarterKind {
    /// One fresh thread per call
    Simple,
    /// Reuse idle worker threads
    Pooled,
}

impl FromStr for StarterKind {
    type Err = SpinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(StarterKind::Simple),
            "pooled" | "pool" => Ok(StarterKind::Pooled),
            other => Err(SpinError::Config(format!("unknown starter `{}`", other))),
        }
    }
}

impl fmt::Display for StarterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StarterKind::Simple => "simple",
            StarterKind::Pooled => "pooled",
        })
    }
}

/// Which dispatcher keeps the owner thread busy during a spin-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherKind {
    /// Re-enter the owner loop
    Pump,
    /// Plain wait (owner loop not serviced)
    Wait,
}

impl FromStr for DispatcherKind {
    type Err = SpinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pump" => Ok(DispatcherKind::Pump),
            "wait" => Ok(DispatcherKind::Wait),
            other => Err(SpinError::Config(format!("unknown dispatcher `{}`", other))),
        }
    }
}

impl fmt::Display for DispatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DispatcherKind::Pump => "pump",
            DispatcherKind::Wait => "wait",
        })
    }
}

/// Spin configuration with builder pattern.
///
/// Use `from_env()` to start from library defaults plus any environment
/// variable overrides.
#[derive(Debug, Clone)]
pub struct SpinConfig {
    /// Name of the owner thread spawned by `OwnerThread`
    pub owner_thread_name: String,
    /// Worker threads are named `<prefix>-<n>`
    pub worker_name_prefix: String,
    pub starter: StarterKind,
    pub dispatcher: DispatcherKind,
    /// Default spin-over mode
    pub over_mode: OverMode,
    /// Policy for `checked` stand-ins
    pub audit: AuditPolicy,
    /// Maximum nesting of owner-loop pumps
    pub max_pump_depth: usize,
    /// How long an idle owner loop parks before re-checking
    pub idle_park: Duration,
    /// How long a pooled worker idles before it retires
    pub pool_keep_alive: Duration,
    /// Detaching timeout for blocking waits off the owner thread
    pub call_timeout: Option<Duration>,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SpinConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SPIN_OWNER_NAME` - Owner thread name
    /// - `SPIN_WORKER_PREFIX` - Worker thread name prefix
    /// - `SPIN_STARTER` - `simple` or `pooled`
    /// - `SPIN_DISPATCHER` - `pump` or `wait`
    /// - `SPIN_OVER_MODE` - `sync` or `async`
    /// - `SPIN_AUDIT` - `off`, `log` or `fail`
    /// - `SPIN_MAX_PUMP_DEPTH` - Pump nesting limit
    /// - `SPIN_IDLE_PARK_MS` - Owner loop idle park in milliseconds
    /// - `SPIN_POOL_KEEP_ALIVE_MS` - Pooled worker keep-alive in milliseconds
    /// - `SPIN_CALL_TIMEOUT_MS` - Call timeout in milliseconds (0 = none)
    pub fn from_env() -> Self {
        let base = Self::new();
        Self {
            owner_thread_name: env_get("SPIN_OWNER_NAME", base.owner_thread_name),
            worker_name_prefix: env_get("SPIN_WORKER_PREFIX", base.worker_name_prefix),
            starter: env_get("SPIN_STARTER", base.starter),
            dispatcher: env_get("SPIN_DISPATCHER", base.dispatcher),
            over_mode: env_get("SPIN_OVER_MODE", base.over_mode),
            audit: env_get("SPIN_AUDIT", base.audit),
            max_pump_depth: env_get("SPIN_MAX_PUMP_DEPTH", base.max_pump_depth),
            idle_park: env_millis("SPIN_IDLE_PARK_MS", base.idle_park),
            pool_keep_alive: env_millis("SPIN_POOL_KEEP_ALIVE_MS", base.pool_keep_alive),
            call_timeout: env_timeout("SPIN_CALL_TIMEOUT_MS", base.call_timeout),
        }
    }

    /// Create config with library defaults (no env override).
    pub fn new() -> Self {
        Self {
            owner_thread_name: defaults::OWNER_THREAD_NAME.to_string(),
            worker_name_prefix: defaults::WORKER_NAME_PREFIX.to_string(),
            starter: StarterKind::Simple,
            dispatcher: DispatcherKind::Pump,
            over_mode: OverMode::Synchronous,
            audit: AuditPolicy::Off,
            max_pump_depth: defaults::MAX_PUMP_DEPTH,
            idle_park: Duration::from_millis(defaults::IDLE_PARK_MS),
            pool_keep_alive: Duration::from_millis(defaults::POOL_KEEP_ALIVE_MS),
            call_timeout: None,
        }
    }

    // Builder methods

    pub fn owner_thread_name(mut self, name: impl Into<String>) -> Self {
        self.owner_thread_name = name.into();
        self
    }

    pub fn worker_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_name_prefix = prefix.into();
        self
    }

    pub fn starter(mut self, kind: StarterKind) -> Self {
        self.starter = kind;
        self
    }

    pub fn dispatcher(mut self, kind: DispatcherKind) -> Self {
        self.dispatcher = kind;
        self
    }

    pub fn over_mode(mut self, mode: OverMode) -> Self {
        self.over_mode = mode;
        self
    }

    pub fn audit(mut self, policy: AuditPolicy) -> Self {
        self.audit = policy;
        self
    }

    pub fn max_pump_depth(mut self, depth: usize) -> Self {
        self.max_pump_depth = depth;
        self
    }

    pub fn idle_park(mut self, d: Duration) -> Self {
        self.idle_park = d;
        self
    }

    pub fn pool_keep_alive(mut self, d: Duration) -> Self {
        self.pool_keep_alive = d;
        self
    }

    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> SpinResult<()> {
        if self.max_pump_depth == 0 {
            return Err(SpinError::Config("max_pump_depth must be > 0".into()));
        }
        if self.idle_park.is_zero() {
            return Err(SpinError::Config("idle_park must be > 0".into()));
        }
        if self.pool_keep_alive.is_zero() {
            return Err(SpinError::Config("pool_keep_alive must be > 0".into()));
        }
        if self.owner_thread_name.trim().is_empty() {
            return Err(SpinError::Config("owner_thread_name must not be empty".into()));
        }
        if self.worker_name_prefix.trim().is_empty() {
            return Err(SpinError::Config("worker_name_prefix must not be empty".into()));
        }
        Ok(())
    }

    /// Log the effective configuration at debug level
    pub fn log(&self) {
        debug!(
            owner = %self.owner_thread_name,
            workers = %self.worker_name_prefix,
            starter = %self.starter,
            dispatcher = %self.dispatcher,
            over_mode = ?self.over_mode,
            audit = ?self.audit,
            max_pump_depth = self.max_pump_depth,
            idle_park = ?self.idle_park,
            pool_keep_alive = ?self.pool_keep_alive,
            call_timeout = ?self.call_timeout,
            "spin configuration"
        );
    }
}
