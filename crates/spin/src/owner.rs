//! Dedicated owner thread

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use spin_core::{OwnerLoop, SpinError, SpinResult};
use spin_runtime::{EventLoop, SpinConfig};
use tracing::debug;

/// A named thread running an [`EventLoop`]
///
/// Shut down (and joined) explicitly with [`shutdown`](Self::shutdown) or
/// on drop. Must not be dropped on its own owner thread.
pub struct OwnerThread {
    event_loop: EventLoop,
    handle: Option<JoinHandle<SpinResult<()>>>,
}

impl OwnerThread {
    /// Spawn the owner thread; returns once its loop is running
    pub fn spawn(config: &SpinConfig) -> SpinResult<Self> {
        config.validate()?;
        let event_loop = EventLoop::with_config(config);
        let runner = event_loop.clone();
        let handle = thread::Builder::new()
            .name(config.owner_thread_name.clone())
            .spawn(move || runner.run())?;

        let owner = Self {
            event_loop,
            handle: Some(handle),
        };
        owner.event_loop.invoke_and_wait(|| ())?;
        debug!(thread = %config.owner_thread_name, "owner thread started");
        Ok(owner)
    }

    #[inline]
    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// The loop as the bridge sees it
    pub fn owner(&self) -> Arc<dyn OwnerLoop> {
        Arc::new(self.event_loop.clone())
    }

    /// Stop the loop, run what is still queued, and join the thread
    pub fn shutdown(mut self) -> SpinResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> SpinResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.event_loop.shutdown();
        handle.join().map_err(|_| SpinError::OwnerUnavailable)?
    }
}

impl Drop for OwnerThread {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            debug!(%err, "owner thread stopped with error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spin_core::current_thread_name;

    #[test]
    fn test_spawn_binds_named_thread() {
        let owner = OwnerThread::spawn(&SpinConfig::new().owner_thread_name("unit-owner")).unwrap();
        assert!(owner.event_loop().owner_thread().is_some());
        assert!(!owner.owner().is_owner_thread());

        let name = owner.event_loop().invoke_and_wait(current_thread_name).unwrap();
        assert_eq!(name, "unit-owner");
        owner.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_runs_queued_tasks() {
        let owner = OwnerThread::spawn(&SpinConfig::new()).unwrap();
        let event_loop = owner.event_loop().clone();
        let (tx, rx) = std::sync::mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            event_loop.invoke_later(move || tx.send(i).unwrap()).unwrap();
        }
        owner.shutdown().unwrap();

        let got: Vec<i32> = rx.try_iter().collect();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
        assert!(event_loop.invoke_later(|| ()).is_err());
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let result = OwnerThread::spawn(&SpinConfig::new().owner_thread_name(""));
        assert!(matches!(result, Err(SpinError::Config(_))));
    }
}
