//! Restore scheduler.
//!
//! A long-running consumer serves restore requests from any number of
//! editor sessions. Producers enqueue under a short critical section and
//! set a wake flag; the consumer drains the whole queue per cycle,
//! coalesces the references into one dispatcher call, and notifies each
//! affected document once.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{RestoreError, Result};
use crate::reference::ModuleReference;

/// The restore operation the consumer drives each cycle.
///
/// Returns whether any work was done; `false` means recompilation would
/// observe nothing new and notifications are skipped.
#[async_trait]
pub trait RestoreDispatch: Send + Sync {
    async fn restore(&self, references: &[ModuleReference]) -> bool;
}

/// Receiver of completion notifications, one per editor session.
#[async_trait]
pub trait CompilationManager: Send + Sync {
    /// Recompile the given document. Best-effort; failures are ignored by
    /// the scheduler.
    async fn refresh(&self, document_uri: &str) -> std::result::Result<(), String>;
}

struct QueueItem {
    manager: Arc<dyn CompilationManager>,
    document_uri: String,
    references: Vec<ModuleReference>,
}

struct State {
    queue: VecDeque<QueueItem>,
    /// Manual-reset wake flag; set with the queue lock held on enqueue,
    /// cleared with the lock held after a full drain.
    woken: bool,
    disposed: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Notify,
}

/// Queue-driven scheduler owning the single restore consumer task.
pub struct ModuleRestoreScheduler {
    dispatcher: Arc<dyn RestoreDispatch>,
    shared: Arc<Shared>,
    cancel_tx: watch::Sender<bool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl ModuleRestoreScheduler {
    pub fn new(dispatcher: Arc<dyn RestoreDispatch>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            dispatcher,
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    woken: false,
                    disposed: false,
                }),
                wake: Notify::new(),
            }),
            cancel_tx,
            consumer: Mutex::new(None),
        }
    }

    /// Spawn the consumer task. Must be called exactly once.
    pub fn start(&self) {
        let mut slot = self.consumer.lock().unwrap();
        assert!(slot.is_none(), "restore scheduler started twice");

        let dispatcher = self.dispatcher.clone();
        let shared = self.shared.clone();
        let cancel_rx = self.cancel_tx.subscribe();
        *slot = Some(tokio::spawn(consume(dispatcher, shared, cancel_rx)));
    }

    /// Enqueue a restore request for one document. Returns immediately.
    pub fn request_restore(
        &self,
        manager: Arc<dyn CompilationManager>,
        document_uri: impl Into<String>,
        references: Vec<ModuleReference>,
    ) -> Result<()> {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.disposed {
                return Err(RestoreError::AlreadyDisposed);
            }
            state.queue.push_back(QueueItem {
                manager,
                document_uri: document_uri.into(),
                references,
            });
            state.woken = true;
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Cancel the consumer and wait for it to terminate. Subsequent
    /// enqueues fail with `AlreadyDisposed`.
    pub async fn dispose(&self) {
        self.shared.state.lock().unwrap().disposed = true;
        let _ = self.cancel_tx.send(true);
        self.shared.wake.notify_one();

        let handle = self.consumer.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Restore scheduler disposed");
    }
}

/// One notification target per distinct (manager, document) pair.
struct Drain {
    targets: Vec<(Arc<dyn CompilationManager>, String)>,
    references: Vec<ModuleReference>,
}

async fn consume(
    dispatcher: Arc<dyn RestoreDispatch>,
    shared: Arc<Shared>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    loop {
        // Block until woken or cancelled.
        tokio::select! {
            _ = shared.wake.notified() => {}
            _ = cancel_rx.changed() => {}
        }
        if *cancel_rx.borrow() {
            break;
        }

        let drain = drain_queue(&shared);
        if *cancel_rx.borrow() {
            break;
        }
        if drain.references.is_empty() && drain.targets.is_empty() {
            continue;
        }

        debug!(
            references = drain.references.len(),
            targets = drain.targets.len(),
            "Dispatching restore cycle"
        );

        let did_work = dispatcher.restore(&drain.references).await;
        if !did_work {
            continue;
        }

        if *cancel_rx.borrow() {
            break;
        }
        for (manager, document_uri) in drain.targets {
            if let Err(err) = manager.refresh(&document_uri).await {
                debug!(document_uri = %document_uri, error = %err, "Refresh failed");
            }
        }
    }

    debug!("Restore consumer terminated");
}

/// Drain every queued item and clear the wake flag, all under the queue
/// lock, so an enqueue racing the drain either lands in this cycle or
/// leaves the flag set for the next one.
fn drain_queue(shared: &Shared) -> Drain {
    let mut state = shared.state.lock().unwrap();

    let mut targets: Vec<(Arc<dyn CompilationManager>, String)> = Vec::new();
    let mut seen: HashSet<(usize, String)> = HashSet::new();
    let mut references = Vec::new();

    while let Some(item) = state.queue.pop_front() {
        let key = (
            Arc::as_ptr(&item.manager) as *const () as usize,
            item.document_uri.clone(),
        );
        if seen.insert(key) {
            targets.push((item.manager, item.document_uri));
        }
        references.extend(item.references);
    }
    state.woken = false;

    Drain { targets, references }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingManager {
        refreshes: AtomicUsize,
    }

    impl CountingManager {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                refreshes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompilationManager for CountingManager {
        async fn refresh(&self, _document_uri: &str) -> std::result::Result<(), String> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn oci_reference(tag: &str) -> ModuleReference {
        ModuleReference::parse(
            &format!("oci:example.com/test/module:{tag}"),
            std::path::Path::new("/workspace"),
        )
        .unwrap()
    }

    #[test]
    fn drain_empties_queue_and_clears_flag() {
        let shared = Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                woken: false,
                disposed: false,
            }),
            wake: Notify::new(),
        };

        let manager = CountingManager::new();
        {
            let mut state = shared.state.lock().unwrap();
            for _ in 0..3 {
                state.queue.push_back(QueueItem {
                    manager: manager.clone(),
                    document_uri: "file:///main.bicep".to_string(),
                    references: vec![oci_reference("v1")],
                });
            }
            state.woken = true;
        }

        let drain = drain_queue(&shared);
        assert_eq!(drain.references.len(), 3);
        assert_eq!(drain.targets.len(), 1);

        let state = shared.state.lock().unwrap();
        assert!(state.queue.is_empty());
        assert!(!state.woken);
    }

    #[test]
    fn drain_preserves_enqueue_order_and_duplicates() {
        let shared = Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                woken: false,
                disposed: false,
            }),
            wake: Notify::new(),
        };

        let manager = CountingManager::new();
        {
            let mut state = shared.state.lock().unwrap();
            for tag in ["v1", "v2", "v1"] {
                state.queue.push_back(QueueItem {
                    manager: manager.clone(),
                    document_uri: format!("file:///{tag}.bicep"),
                    references: vec![oci_reference(tag)],
                });
            }
        }

        let drain = drain_queue(&shared);
        assert_eq!(
            drain.references,
            vec![oci_reference("v1"), oci_reference("v2"), oci_reference("v1")]
        );
    }
}
