//! Scheduler behavior: coalescing, notification dedup, dispose semantics.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

use bicep_restore::{
    CompilationManager, ModuleReference, ModuleRestoreScheduler, RestoreDispatch, RestoreError,
};

/// Dispatcher that records every restore call.
struct RecordingDispatch {
    calls: Mutex<Vec<Vec<ModuleReference>>>,
    result: bool,
}

impl RecordingDispatch {
    fn new(result: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            result,
        })
    }

    fn calls(&self) -> Vec<Vec<ModuleReference>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RestoreDispatch for RecordingDispatch {
    async fn restore(&self, references: &[ModuleReference]) -> bool {
        self.calls.lock().unwrap().push(references.to_vec());
        self.result
    }
}

/// Dispatcher that signals entry and then takes a while.
struct SlowDispatch {
    started: Notify,
    finished: AtomicBool,
}

impl SlowDispatch {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Notify::new(),
            finished: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl RestoreDispatch for SlowDispatch {
    async fn restore(&self, _references: &[ModuleReference]) -> bool {
        self.started.notify_one();
        sleep(Duration::from_millis(100)).await;
        self.finished.store(true, Ordering::SeqCst);
        true
    }
}

struct CountingManager {
    refreshes: AtomicUsize,
}

impl CountingManager {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            refreshes: AtomicUsize::new(0),
        })
    }

    fn count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompilationManager for CountingManager {
    async fn refresh(&self, _document_uri: &str) -> Result<(), String> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Manager whose refreshes always fail; the scheduler must shrug them off.
struct FailingManager;

#[async_trait]
impl CompilationManager for FailingManager {
    async fn refresh(&self, _document_uri: &str) -> Result<(), String> {
        Err("compilation backend unavailable".to_string())
    }
}

fn reference(tag: &str) -> ModuleReference {
    ModuleReference::parse(
        &format!("oci:example.com/test/module:{tag}"),
        Path::new("/workspace"),
    )
    .unwrap()
}

async fn wait_until(check: impl Fn() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn coalesces_one_drain_into_one_dispatch() {
    let dispatch = RecordingDispatch::new(true);
    let scheduler = ModuleRestoreScheduler::new(dispatch.clone());

    let managers = [CountingManager::new(), CountingManager::new()];
    let uris = ["file:///a.bicep", "file:///b.bicep", "file:///c.bicep"];

    // Everything queued before the consumer exists drains in one cycle.
    let mut expected = Vec::new();
    for i in 0..100 {
        let manager = &managers[i % 2];
        let uri = uris[i % 3];
        let r = reference(&format!("v{}", i % 5));
        expected.push(r.clone());
        scheduler
            .request_restore(manager.clone(), uri, vec![r])
            .unwrap();
    }

    scheduler.start();
    wait_until(|| managers.iter().map(|m| m.count()).sum::<usize>() == 6).await;
    scheduler.dispose().await;

    // One dispatcher call, references in enqueue order, duplicates kept.
    let calls = dispatch.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], expected);

    // Exactly one notification per distinct (manager, uri) pair.
    assert_eq!(managers[0].count(), 3);
    assert_eq!(managers[1].count(), 3);
}

#[tokio::test]
async fn enqueue_after_drain_triggers_another_cycle() {
    let dispatch = RecordingDispatch::new(true);
    let scheduler = ModuleRestoreScheduler::new(dispatch.clone());
    scheduler.start();

    let manager = CountingManager::new();
    scheduler
        .request_restore(manager.clone(), "file:///a.bicep", vec![reference("v1")])
        .unwrap();
    wait_until(|| manager.count() == 1).await;

    scheduler
        .request_restore(manager.clone(), "file:///a.bicep", vec![reference("v2")])
        .unwrap();
    wait_until(|| manager.count() == 2).await;

    scheduler.dispose().await;
    assert_eq!(dispatch.calls().len(), 2);
}

#[tokio::test]
async fn no_work_means_no_notifications() {
    let dispatch = RecordingDispatch::new(false);
    let scheduler = ModuleRestoreScheduler::new(dispatch.clone());
    scheduler.start();

    let manager = CountingManager::new();
    scheduler
        .request_restore(manager.clone(), "file:///a.bicep", vec![reference("v1")])
        .unwrap();
    wait_until(|| !dispatch.calls().is_empty()).await;

    // Give the notification path a chance to (wrongly) run.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.count(), 0);

    scheduler.dispose().await;
}

#[tokio::test]
async fn refresh_failures_are_swallowed() {
    let dispatch = RecordingDispatch::new(true);
    let scheduler = ModuleRestoreScheduler::new(dispatch.clone());
    scheduler.start();

    let counting = CountingManager::new();
    scheduler
        .request_restore(Arc::new(FailingManager), "file:///a.bicep", vec![reference("v1")])
        .unwrap();
    scheduler
        .request_restore(counting.clone(), "file:///b.bicep", vec![reference("v2")])
        .unwrap();

    // The failing refresh must not stop the healthy one.
    wait_until(|| counting.count() >= 1).await;
    scheduler.dispose().await;
}

#[tokio::test]
async fn dispose_awaits_inflight_work() {
    let dispatch = SlowDispatch::new();
    let scheduler = ModuleRestoreScheduler::new(dispatch.clone());
    scheduler.start();

    let manager = CountingManager::new();
    scheduler
        .request_restore(manager.clone(), "file:///a.bicep", vec![reference("v1")])
        .unwrap();

    // Wait for the dispatcher call to be in flight, then dispose.
    timeout(Duration::from_secs(5), dispatch.started.notified())
        .await
        .expect("dispatch never started");
    scheduler.dispose().await;

    assert!(dispatch.finished.load(Ordering::SeqCst));

    let err = scheduler
        .request_restore(manager, "file:///a.bicep", vec![reference("v1")])
        .unwrap_err();
    assert_eq!(err, RestoreError::AlreadyDisposed);
}

#[tokio::test]
async fn dispose_without_start_returns() {
    let dispatch = RecordingDispatch::new(true);
    let scheduler = ModuleRestoreScheduler::new(dispatch);
    scheduler.dispose().await;

    let manager = CountingManager::new();
    assert_eq!(
        scheduler
            .request_restore(manager, "file:///a.bicep", vec![reference("v1")])
            .unwrap_err(),
        RestoreError::AlreadyDisposed
    );
}
