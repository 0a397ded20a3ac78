//! Thread-safe progress counter with tick-driven updates: a ticking thread
//! plus a mutex-protected accumulator, no async runtime involved.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default ticker interval.
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);
/// Minimum time between externally-triggered (non-ticker) updates.
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(16);

/// Accumulated counters for one action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    pub items: u64,
    pub bytes: u64,
    pub storage: u64,
    pub errors: u64,
    pub item_names: Vec<String>,
}

/// Delta applied to a [`Stat`] by one [`ProgressReporter::report`] call.
#[derive(Debug, Clone, Default)]
pub struct Delta {
    pub items: u64,
    pub bytes: u64,
    pub storage: u64,
    pub errors: u64,
    pub item_name: Option<String>,
}

struct Shared {
    stat: Mutex<Stat>,
    last_update: Mutex<Instant>,
    stop: Mutex<bool>,
    stop_cv: Condvar,
}

/// Callbacks invoked on progress. `on_update(stat, elapsed, is_ticker)` may
/// fire from the ticker thread or from `report()` itself; `on_done` fires
/// exactly once.
pub struct ProgressReporter {
    shared: Arc<Shared>,
    start: Mutex<Option<Instant>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    on_update: Arc<dyn Fn(&Stat, Duration, bool) + Send + Sync>,
    on_done: Arc<dyn Fn(&Stat, Duration) + Send + Sync>,
    tick: Duration,
}

impl ProgressReporter {
    pub fn new<U, D>(on_update: U, on_done: D) -> Self
    where
        U: Fn(&Stat, Duration, bool) + Send + Sync + 'static,
        D: Fn(&Stat, Duration) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                stat: Mutex::new(Stat::default()),
                last_update: Mutex::new(Instant::now()),
                stop: Mutex::new(false),
                stop_cv: Condvar::new(),
            }),
            start: Mutex::new(None),
            ticker: Mutex::new(None),
            on_update: Arc::new(on_update),
            on_done: Arc::new(on_done),
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Resets counters and begins the ticker thread.
    pub fn start(&self) {
        *self.shared.stat.lock().unwrap() = Stat::default();
        *self.shared.last_update.lock().unwrap() = Instant::now();
        *self.shared.stop.lock().unwrap() = false;
        let started_at = Instant::now();
        *self.start.lock().unwrap() = Some(started_at);

        let shared = Arc::clone(&self.shared);
        let on_update = Arc::clone(&self.on_update);
        let tick = self.tick;
        let handle = std::thread::Builder::new()
            .name("progress-ticker".into())
            .spawn(move || loop {
                let mut stop = shared.stop.lock().unwrap();
                let (guard, timeout) = shared.stop_cv.wait_timeout(stop, tick).unwrap();
                stop = guard;
                if *stop {
                    return;
                }
                drop(stop);
                if timeout.timed_out() {
                    let stat = shared.stat.lock().unwrap().clone();
                    on_update(&stat, started_at.elapsed(), true);
                }
            })
            .expect("spawn progress ticker");
        *self.ticker.lock().unwrap() = Some(handle);
    }

    /// Accumulates `delta`. If the last external update is older than
    /// [`MIN_UPDATE_INTERVAL`], also invokes `on_update` with `ticker =
    /// false`.
    pub fn report(&self, delta: Delta) {
        let stat = {
            let mut stat = self.shared.stat.lock().unwrap();
            stat.items += delta.items;
            stat.bytes += delta.bytes;
            stat.storage += delta.storage;
            stat.errors += delta.errors;
            if let Some(name) = delta.item_name {
                stat.item_names.push(name);
            }
            stat.clone()
        };

        let mut last = self.shared.last_update.lock().unwrap();
        if last.elapsed() >= MIN_UPDATE_INTERVAL {
            *last = Instant::now();
            drop(last);
            let elapsed = self
                .start
                .lock()
                .unwrap()
                .map(|s| s.elapsed())
                .unwrap_or_default();
            (self.on_update)(&stat, elapsed, false);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.shared.stat.lock().unwrap().errors > 0
    }

    pub fn snapshot(&self) -> Stat {
        self.shared.stat.lock().unwrap().clone()
    }

    /// Stops the ticker and invokes `on_done` exactly once.
    pub fn done(&self) {
        *self.shared.stop.lock().unwrap() = true;
        self.shared.stop_cv.notify_all();
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            let _ = handle.join();
        }
        let elapsed = self
            .start
            .lock()
            .unwrap()
            .map(|s| s.elapsed())
            .unwrap_or_default();
        let stat = self.shared.stat.lock().unwrap().clone();
        (self.on_done)(&stat, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn accumulates_deltas_under_mutex() {
        let done_calls = Arc::new(AtomicU64::new(0));
        let done_calls2 = Arc::clone(&done_calls);
        let reporter = ProgressReporter::new(
            |_, _, _| {},
            move |_, _| {
                done_calls2.fetch_add(1, Ordering::SeqCst);
            },
        )
        .with_tick_interval(Duration::from_millis(5));
        reporter.start();
        reporter.report(Delta {
            items: 1,
            bytes: 100,
            ..Default::default()
        });
        reporter.report(Delta {
            items: 1,
            bytes: 50,
            errors: 1,
            ..Default::default()
        });
        let stat = reporter.snapshot();
        assert_eq!(stat.items, 2);
        assert_eq!(stat.bytes, 150);
        assert!(reporter.has_errors());

        reporter.done();
        assert_eq!(done_calls.load(Ordering::SeqCst), 1);
    }
}
