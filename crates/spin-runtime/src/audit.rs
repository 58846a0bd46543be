//! Thread-affinity audit
//!
//! Flags calls made off the owner thread against objects that must only be
//! touched there. `Log` warns and lets the call through; `Fail` refuses it.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use spin_core::{
    current_thread_name, Chain, Evaluator, Invocation, OwnerLoop, SpinError, SpinResult,
    ThreadRuleViolation,
};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditPolicy {
    /// No checks
    Off,
    /// Warn and continue
    Log,
    /// Refuse the call with `SpinError::ThreadRule`
    Fail,
}

impl FromStr for AuditPolicy {
    type Err = SpinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(AuditPolicy::Off),
            "log" | "warn" => Ok(AuditPolicy::Log),
            "fail" | "deny" => Ok(AuditPolicy::Fail),
            other => Err(SpinError::Config(format!("unknown audit policy `{}`", other))),
        }
    }
}

pub struct AffinityAudit {
    owner: Arc<dyn OwnerLoop>,
    policy: AuditPolicy,
    next: Chain,
    violations: AtomicU64,
}

impl AffinityAudit {
    pub fn new(owner: Arc<dyn OwnerLoop>, policy: AuditPolicy, next: Chain) -> Self {
        Self {
            owner,
            policy,
            next,
            violations: AtomicU64::new(0),
        }
    }

    /// Off-owner calls seen so far (refused or not)
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn policy(&self) -> AuditPolicy {
        self.policy
    }
}

impl Evaluator for AffinityAudit {
    fn evaluate(&self, invocation: &mut Invocation) -> SpinResult<()> {
        if self.policy == AuditPolicy::Off || self.owner.is_owner_thread() {
            return self.next.evaluate(invocation);
        }

        self.violations.fetch_add(1, Ordering::Relaxed);
        let violation = ThreadRuleViolation {
            method: invocation.method().name(),
            surface: invocation.target().type_name(),
            thread: current_thread_name(),
        };

        match self.policy {
            AuditPolicy::Fail => Err(SpinError::ThreadRule(violation)),
            _ => {
                warn!(%violation, "owner-thread object used off the owner thread");
                self.next.evaluate(invocation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpinConfig;
    use crate::event_loop::EventLoop;
    use spin_core::{terminal, Arguments, Method, Target};
    use std::thread;

    struct Window;

    const TITLE: Method = Method::new("title", &[], "String");

    fn title() -> Invocation {
        Invocation::new(
            Target::new(Arc::new(Window)),
            TITLE,
            Arguments::new(),
            Box::new(|_, _| Ok(Box::new("main".to_string()))),
        )
    }

    #[test]
    fn test_fail_policy_refuses_off_owner_call() {
        let audit = AffinityAudit::new(Arc::new(EventLoop::new()), AuditPolicy::Fail, terminal());

        let mut invocation = title();
        match audit.evaluate(&mut invocation) {
            Err(SpinError::ThreadRule(violation)) => {
                assert_eq!(violation.method, "title");
                assert!(violation.surface.ends_with("Window"));
                assert_eq!(violation.thread, current_thread_name());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!invocation.has_outcome());
        assert_eq!(audit.violations(), 1);
    }

    #[test]
    fn test_log_policy_lets_call_through() {
        let audit = AffinityAudit::new(Arc::new(EventLoop::new()), AuditPolicy::Log, terminal());

        let mut invocation = title();
        audit.evaluate(&mut invocation).unwrap();
        assert!(matches!(invocation.outcome(), Some(Ok(_))));
        assert_eq!(audit.violations(), 1);
    }

    #[test]
    fn test_off_policy_is_silent() {
        let audit = AffinityAudit::new(Arc::new(EventLoop::new()), AuditPolicy::Off, terminal());
        audit.evaluate(&mut title()).unwrap();
        assert_eq!(audit.violations(), 0);
    }

    #[test]
    fn test_owner_thread_call_is_not_a_violation() {
        let event_loop = EventLoop::with_config(&SpinConfig::new());
        let runner = event_loop.clone();
        let handle = thread::spawn(move || runner.run());

        let audit = Arc::new(AffinityAudit::new(
            Arc::new(event_loop.clone()),
            AuditPolicy::Fail,
            terminal(),
        ));
        let on_owner = Arc::clone(&audit);
        let ok = event_loop
            .invoke_and_wait(move || on_owner.evaluate(&mut title()).is_ok())
            .unwrap();

        assert!(ok);
        assert_eq!(audit.violations(), 0);
        event_loop.shutdown();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("LOG".parse::<AuditPolicy>().unwrap(), AuditPolicy::Log);
        assert_eq!("fail".parse::<AuditPolicy>().unwrap(), AuditPolicy::Fail);
        assert!("strict".parse::<AuditPolicy>().is_err());
    }
}
