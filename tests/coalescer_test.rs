//! StatusCoalescer tests - single-flight, TTL and failure semantics

use fleet_monitor::clock::FakeClock;
use fleet_monitor::coalescer::{StatusCoalescer, StatusFetch, STATUS_CACHE_TTL};
use fleet_monitor::runner::{ExecError, ExecOutput};
use fleet_monitor::status::StatusSnapshot;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FLEET_JSON: &str =
    r#"{"name": "editor-fleet", "agents": [{"name": "coordinator", "running": true}]}"#;

/// Scripted fetch outcome for one call
enum Step {
    Ok(&'static str),
    NonZeroExit,
    TimeoutErr,
}

/// Counting fetcher that replays scripted steps, then keeps returning
/// the fallback stdout
struct ScriptedFetch {
    calls: AtomicUsize,
    delay: Duration,
    steps: Mutex<VecDeque<Step>>,
    fallback: &'static str,
}

impl ScriptedFetch {
    fn ok(stdout: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            steps: Mutex::new(VecDeque::new()),
            fallback: stdout,
        })
    }

    fn scripted(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(10),
            steps: Mutex::new(steps.into()),
            fallback: FLEET_JSON,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StatusFetch for ScriptedFetch {
    fn fetch(&self) -> BoxFuture<'static, Result<ExecOutput, ExecError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        let delay = self.delay;
        let fallback = self.fallback;
        async move {
            tokio::time::sleep(delay).await;
            match step {
                None | Some(Step::Ok(_)) => {
                    let stdout = match step {
                        Some(Step::Ok(stdout)) => stdout,
                        _ => fallback,
                    };
                    Ok(ExecOutput {
                        stdout: stdout.to_string(),
                        stderr: String::new(),
                    })
                }
                Some(Step::NonZeroExit) => Err(ExecError::Failure {
                    status: 1,
                    stdout: String::new(),
                    stderr: "fleet: no workspace".to_string(),
                }),
                Some(Step::TimeoutErr) => Err(ExecError::Timeout { timeout_ms: 15_000 }),
            }
        }
        .boxed()
    }
}

#[tokio::test]
async fn concurrent_callers_share_one_execution() {
    let fetch = ScriptedFetch::ok(FLEET_JSON, Duration::from_millis(50));
    let coalescer = StatusCoalescer::new(fetch.clone());

    let (a, b, c) = tokio::join!(coalescer.get(), coalescer.get(), coalescer.get());

    // N concurrent callers, exactly one underlying execution
    assert_eq!(fetch.calls(), 1);
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&b, &c));
    assert_eq!(a.name, "editor-fleet");
}

#[tokio::test]
async fn cached_within_ttl_refetched_after_expiry() {
    let clock = Arc::new(FakeClock::new());
    let fetch = ScriptedFetch::ok(FLEET_JSON, Duration::from_millis(1));
    let coalescer = StatusCoalescer::with_parts(fetch.clone(), clock.clone(), STATUS_CACHE_TTL);

    let first = coalescer.get().await.unwrap();
    let second = coalescer.get().await.unwrap();
    assert_eq!(fetch.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));

    clock.advance(STATUS_CACHE_TTL + Duration::from_millis(1));
    let third = coalescer.get().await.unwrap();
    assert_eq!(fetch.calls(), 2);
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(*first, *third);
}

#[tokio::test]
async fn malformed_output_yields_cached_empty_snapshot() {
    let fetch = ScriptedFetch::ok("definitely not json", Duration::from_millis(1));
    let coalescer = StatusCoalescer::new(fetch.clone());

    let snapshot = coalescer
        .get()
        .await
        .expect("parse failures degrade to the empty snapshot, not None");
    assert_eq!(*snapshot, StatusSnapshot::empty());

    // The empty snapshot is cached like any other value
    let again = coalescer.get().await.unwrap();
    assert_eq!(fetch.calls(), 1);
    assert!(Arc::ptr_eq(&snapshot, &again));
}

#[tokio::test]
async fn non_zero_exit_falls_back_to_empty_json() {
    let fetch = ScriptedFetch::scripted(vec![Step::NonZeroExit]);
    let coalescer = StatusCoalescer::new(fetch.clone());

    let snapshot = coalescer.get().await.unwrap();
    assert_eq!(*snapshot, StatusSnapshot::empty());
}

#[tokio::test]
async fn timeout_resolves_none_and_next_call_retries_immediately() {
    let fetch = ScriptedFetch::scripted(vec![Step::TimeoutErr, Step::Ok(FLEET_JSON)]);
    let coalescer = StatusCoalescer::new(fetch.clone());

    assert!(coalescer.get().await.is_none());
    // The failure is not cached
    assert!(!coalescer.is_cached());

    let snapshot = coalescer.get().await.unwrap();
    assert_eq!(fetch.calls(), 2);
    assert_eq!(snapshot.name, "editor-fleet");
}

#[tokio::test]
async fn all_waiters_observe_the_failure() {
    let fetch = ScriptedFetch::scripted(vec![Step::TimeoutErr]);
    let coalescer = StatusCoalescer::new(fetch.clone());

    let (a, b) = tokio::join!(coalescer.get(), coalescer.get());

    assert_eq!(fetch.calls(), 1);
    assert!(a.is_none());
    assert!(b.is_none());
}

#[tokio::test]
async fn reset_clears_cache() {
    let fetch = ScriptedFetch::ok(FLEET_JSON, Duration::from_millis(1));
    let coalescer = StatusCoalescer::new(fetch.clone());

    coalescer.get().await.unwrap();
    assert!(coalescer.is_cached());

    coalescer.reset();
    assert!(!coalescer.is_cached());

    coalescer.get().await.unwrap();
    assert_eq!(fetch.calls(), 2);
}
