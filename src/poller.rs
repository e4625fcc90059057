//! Polling controller - periodic refresh driver

use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// Poll loop states.
///
/// enable(): Idle -> Fetching (immediate first fetch) -> Scheduled, then
/// every tick Scheduled -> Fetching -> Scheduled. disable() returns to
/// Idle from any state without aborting an in-flight fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Scheduled,
    Fetching,
}

/// Fetch callback driven by the poller. Initial, tick and manual refresh
/// paths all funnel through this one closure, so overlapping executions
/// coalesce in the layer below (cache / coalescer).
pub type PollFetch = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct PollGeneration {
    cancelled: Arc<AtomicBool>,
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

pub struct PollingController {
    interval: Duration,
    fetch: PollFetch,
    state: Arc<Mutex<PollState>>,
    generation: Mutex<Option<PollGeneration>>,
}

impl PollingController {
    pub fn new(interval: Duration, fetch: PollFetch) -> Self {
        Self {
            interval,
            fetch,
            state: Arc::new(Mutex::new(PollState::Idle)),
            generation: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PollState {
        *self.state.lock().unwrap()
    }

    /// Starts polling. The first fetch fires immediately without waiting
    /// for the interval; afterwards a fixed-interval timer drives the
    /// Scheduled/Fetching cycle. A zero interval performs only the initial
    /// fetch and returns to Idle.
    pub fn enable(&self) {
        let mut generation = self.generation.lock().unwrap();
        if let Some(current) = generation.as_ref() {
            if !current.cancelled.load(Ordering::SeqCst) && !current.task.is_finished() {
                return; // already polling
            }
            // A previous generation is still draining; make sure it stops.
            current.cancelled.store(true, Ordering::SeqCst);
            current.stop.notify_waiters();
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(Notify::new());
        let fetch = self.fetch.clone();
        let state = self.state.clone();
        let interval = self.interval;
        let task_cancelled = cancelled.clone();
        let task_stop = stop.clone();

        let task = tokio::spawn(async move {
            // Initial fetch fires immediately.
            *state.lock().unwrap() = PollState::Fetching;
            fetch().await;
            if task_cancelled.load(Ordering::SeqCst) {
                return;
            }
            if interval.is_zero() {
                // No timer to arm; only explicit fetches from here on.
                *state.lock().unwrap() = PollState::Idle;
                return;
            }
            *state.lock().unwrap() = PollState::Scheduled;

            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            timer.tick().await; // first tick completes immediately
            loop {
                if task_cancelled.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = task_stop.notified() => break,
                    _ = timer.tick() => {
                        *state.lock().unwrap() = PollState::Fetching;
                        // Never aborted mid-fetch; cancellation is observed after.
                        fetch().await;
                        if task_cancelled.load(Ordering::SeqCst) {
                            break;
                        }
                        *state.lock().unwrap() = PollState::Scheduled;
                    }
                }
            }
        });

        debug!(interval_ms = interval.as_millis() as u64, "Polling enabled");
        *generation = Some(PollGeneration {
            cancelled,
            stop,
            task,
        });
    }

    /// Clears the timer and returns to Idle. An already-started fetch is
    /// left to complete; its result still lands in the caches below.
    pub fn disable(&self) {
        let generation = self.generation.lock().unwrap();
        if let Some(current) = generation.as_ref() {
            current.cancelled.store(true, Ordering::SeqCst);
            current.stop.notify_waiters();
        }
        *self.state.lock().unwrap() = PollState::Idle;
        debug!("Polling disabled");
    }

    /// Manual refresh, independent of the timer: transitions to Fetching
    /// if not already there, funnels through the same fetch closure, and
    /// does not reset the timer phase.
    pub async fn refresh(&self) {
        let was = {
            let mut state = self.state.lock().unwrap();
            let was = *state;
            *state = PollState::Fetching;
            was
        };

        (self.fetch)().await;

        let mut state = self.state.lock().unwrap();
        if *state == PollState::Fetching {
            *state = match was {
                PollState::Idle => PollState::Idle,
                // Timer still armed (or its own fetch will re-arm it)
                _ => PollState::Scheduled,
            };
        }
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        self.disable();
    }
}
