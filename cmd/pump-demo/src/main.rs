//! Owner loop stays responsive during a slow spin-off
//!
//! The owner thread asks a worker for a slow report while a heartbeat keeps
//! ticking on the owner loop. The worker reads the window title back from
//! the owner thread halfway through.
//!
//! # Environment Variables
//!
//! - `RUST_LOG=spin_runtime=debug` - Log level filter
//! - `SPIN_DISPATCHER=wait` - Use the blocking dispatcher (the heartbeat
//!   stalls and the nested title read times out)
//! - `SPIN_CALL_TIMEOUT_MS`, `SPIN_STARTER`, ... - See `SpinConfig::from_env`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use spin::{current_thread_name, stand_in, OwnerThread, Spin, SpinConfig, SpinResult, StandIn};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub trait Reports: Send + Sync {
    fn build(&self, window: Arc<dyn Window>, millis: u64) -> String;
}

pub trait Window: Send + Sync {
    fn title(&self) -> String;
}

stand_in! {
    pub struct ReportsStandIn for dyn Reports {
        fn build(&self, window: Arc<dyn Window>, millis: u64) -> String;
    }
}

stand_in! {
    pub struct WindowStandIn for dyn Window {
        fn title(&self) -> String;
    }
}

struct SlowReports;

impl Reports for SlowReports {
    fn build(&self, window: Arc<dyn Window>, millis: u64) -> String {
        thread::sleep(Duration::from_millis(millis / 2));
        let title = window.title();
        thread::sleep(Duration::from_millis(millis / 2));
        format!("report for {} built on {}", title, current_thread_name())
    }
}

struct MainWindow(Mutex<String>);

impl Window for MainWindow {
    fn title(&self) -> String {
        let title = self.0.lock().unwrap_or_else(|e| e.into_inner());
        format!("'{}' (read on {})", title, current_thread_name())
    }
}

fn heartbeat(event_loop: spin::EventLoop, beats: Arc<AtomicUsize>, until: Instant) {
    if Instant::now() >= until {
        return;
    }
    beats.fetch_add(1, Ordering::Relaxed);
    let next = event_loop.clone();
    // Re-queue; sleeping between beats keeps the demo output readable
    let queued = event_loop.invoke_later(move || {
        thread::sleep(Duration::from_millis(100));
        heartbeat(next, beats, until);
    });
    if let Err(err) = queued {
        debug!(%err, "heartbeat not requeued");
    }
}

fn main() -> SpinResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_thread_names(true)
        .init();

    let config = SpinConfig::from_env();
    config.validate()?;

    let owner = OwnerThread::spawn(&config)?;
    let spin = Spin::with_config(owner.owner(), &config)?;

    let reports = spin.off::<ReportsStandIn>(Arc::new(SlowReports))?.into_target();
    let window = spin
        .over::<WindowStandIn>(Arc::new(MainWindow(Mutex::new("Quarterly".into()))))?
        .into_target();

    let beats = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    let event_loop = owner.event_loop().clone();
    let counter = Arc::clone(&beats);

    owner.event_loop().invoke_later(move || {
        let begin = Instant::now();
        heartbeat(event_loop, Arc::clone(&counter), begin + Duration::from_secs(2));

        let report = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            reports.build(window, 2000)
        }));
        let _ = tx.send((report, counter.load(Ordering::Relaxed), begin.elapsed()));
    })?;

    match rx.recv() {
        Ok((Ok(report), beats, elapsed)) => {
            info!(%report, beats, ?elapsed, "spin-off finished");
        }
        Ok((Err(_), beats, elapsed)) => {
            info!(beats, ?elapsed, "spin-off failed (see log above)");
        }
        Err(_) => info!("owner loop went away"),
    }

    info!(total_beats = beats.load(Ordering::Relaxed), "shutting down");
    owner.shutdown()
}
