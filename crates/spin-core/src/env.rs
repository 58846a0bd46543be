//! Environment variable helpers
//!
//! ```ignore
//! use spin_core::env::{env_get, env_millis};
//!
//! let depth: usize = env_get("SPIN_MAX_PUMP_DEPTH", 32);
//! let park = env_millis("SPIN_IDLE_PARK_MS", Duration::from_millis(50));
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Variable parsed as `T`, or `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Variable parsed as `T`, if set and parsable
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Milliseconds as a `Duration`
#[inline]
pub fn env_millis(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Optional timeout in milliseconds; `0` means none
pub fn env_timeout(key: &str, default: Option<Duration>) -> Option<Duration> {
    match env_get_opt::<u64>(key) {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => default,
    }
}
