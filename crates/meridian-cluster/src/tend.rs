//! The cluster tend loop: one dedicated thread, refreshing node state
//! and the partition map on an interval (§4.6).
//!
//! Grounded on `warp-runtime::pool`'s condvar-gated-wait shape for the
//! interruptible sleep, translated from `tokio::sync::Mutex`/async to
//! `std::sync::{Mutex, Condvar}`/blocking — this is the one deliberate
//! stack divergence from the async-first teacher (see `DESIGN.md`).

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Every 30 iterations, pool sizes are rebalanced to their configured
/// minimum.
pub const POOL_BALANCE_INTERVAL: u64 = 30;

/// Shared wake signal: `Cluster::wake_tend()` sets the flag and notifies
/// the condvar so the tend thread's sleep returns immediately (used
/// after a login-required signal from the command engine).
#[derive(Default)]
pub struct WakeSignal {
    state: Mutex<bool>,
    condvar: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn wake(&self) {
        let mut woken = self.state.lock().unwrap();
        *woken = true;
        self.condvar.notify_one();
    }

    /// Sleep for up to `interval`, returning early if woken. Always
    /// clears the flag before returning so the next sleep starts fresh.
    pub fn sleep(&self, interval: Duration) {
        let guard = self.state.lock().unwrap();
        let (mut guard, _timeout_result) = self
            .condvar
            .wait_timeout_while(guard, interval, |woken| !*woken)
            .unwrap();
        *guard = false;
    }
}

/// Per-iteration bookkeeping the tend thread drives; the actual network
/// calls (info batch, peers fetch, replicas fetch) are injected by the
/// caller as closures so this module stays testable without sockets.
pub struct TendIteration {
    pub count: u64,
}

impl TendIteration {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    pub fn advance(&mut self) -> u64 {
        self.count += 1;
        self.count
    }

    /// §4.6 step 7: "every 30 iterations, balance each pool to its min
    /// size".
    pub fn should_balance_pools(&self) -> bool {
        self.count > 0 && self.count % POOL_BALANCE_INTERVAL == 0
    }

    /// §4.6 step 7: "every `errorRateWindow` iterations, reset per-node
    /// error counters".
    pub fn should_reset_error_window(&self, error_rate_window: u64) -> bool {
        error_rate_window > 0 && self.count > 0 && self.count % error_rate_window == 0
    }
}

impl Default for TendIteration {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the tend loop on the calling thread until `should_stop` returns
/// `true`, calling `run_iteration` once per pass. §4.6's Open Question
/// decision ("tend once per iteration, continue on failure") means a
/// failing iteration is logged, not retried inline — the thread simply
/// sleeps and calls `run_iteration` again next interval.
pub fn run<F, S>(wake: &WakeSignal, interval: Duration, mut should_stop: S, mut run_iteration: F)
where
    F: FnMut(&mut TendIteration),
    S: FnMut() -> bool,
{
    let mut iteration = TendIteration::new();
    loop {
        if should_stop() {
            debug!("tend loop stopping");
            return;
        }
        let n = iteration.advance();
        if let Err(panic_like) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run_iteration(&mut iteration))) {
            warn!(iteration = n, ?panic_like, "tend iteration panicked; continuing on next interval");
        }
        wake.sleep(interval);
    }
}

/// Spawn the tend loop on a dedicated `std::thread`, matching
/// `warpd`'s pattern of owning one background thread per long-running
/// subsystem rather than a bare `tokio::spawn`.
pub fn spawn<F, S>(wake: Arc<WakeSignal>, interval: Duration, should_stop: S, run_iteration: F) -> std::thread::JoinHandle<()>
where
    F: FnMut(&mut TendIteration) + Send + 'static,
    S: FnMut() -> bool + Send + 'static,
{
    std::thread::Builder::new()
        .name("meridian-tend".into())
        .spawn(move || run(&wake, interval, should_stop, run_iteration))
        .expect("failed to spawn tend thread")
}
