//! Library defaults, overridable through `SPIN_*` environment variables

pub const OWNER_THREAD_NAME: &str = "spin-owner";
pub const WORKER_NAME_PREFIX: &str = "spin";
pub const MAX_PUMP_DEPTH: usize = 32;
pub const IDLE_PARK_MS: u64 = 50;
pub const POOL_KEEP_ALIVE_MS: u64 = 30_000;
