//! Controller — the work queue in front of the actuator.
//!
//! A single dispatcher task owns all queue bookkeeping, so no locks guard
//! it. Reconciliations run on spawned tasks and report back over the same
//! channel that carries enqueue requests.
//!
//! ```text
//! ControllerHandle::enqueue ─┐
//! resync tick ───────────────┼─► dispatcher ──(permit)──► reconcile task
//! requeue timers ────────────┤                              │
//!                            └──────────── Done ◄───────────┘
//! ```
//!
//! A key is never reconciled twice at once. Enqueueing a key that is
//! running marks it dirty; it runs again as soon as the current pass ends.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use poolgrid_core::ClusterState;
use poolgrid_core::config::ControllerConfig;
use poolgrid_health::shutdown_signalled;
use poolgrid_state::{Cluster, ObjectStore, StateResult, Worker};

use crate::actuator::Actuator;
use crate::delegate::DelegateFactory;
use crate::error::ErrorKind;
use crate::status;

/// Identity of a worker in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerKey {
    pub namespace: String,
    pub name: String,
}

impl WorkerKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The cluster snapshot for a namespace. Cluster objects are named after
/// the namespace they describe; a missing one means an awake cluster.
pub fn cluster_state<S: ObjectStore>(store: &S, namespace: &str) -> StateResult<ClusterState> {
    let cluster: Option<Cluster> = store.get(namespace, namespace)?;
    Ok(ClusterState {
        hibernated: cluster.is_some_and(|c| c.hibernated),
    })
}

enum Event {
    Enqueue(WorkerKey),
    Done {
        key: WorkerKey,
        requeue: Option<Duration>,
    },
}

/// Cloneable sender side of the queue.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl ControllerHandle {
    /// Queue a worker for reconciliation. Returns false once the controller
    /// has stopped.
    pub fn enqueue(&self, namespace: &str, name: &str) -> bool {
        self.tx
            .send(Event::Enqueue(WorkerKey::new(namespace, name)))
            .is_ok()
    }
}

// ── Queue bookkeeping ─────────────────────────────────────────────

#[derive(Default)]
struct WorkQueue {
    pending: VecDeque<WorkerKey>,
    queued: HashSet<WorkerKey>,
    in_flight: HashSet<WorkerKey>,
    dirty: HashSet<WorkerKey>,
}

impl WorkQueue {
    fn add(&mut self, key: WorkerKey) {
        if self.in_flight.contains(&key) {
            self.dirty.insert(key);
        } else if self.queued.insert(key.clone()) {
            self.pending.push_back(key);
        }
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn start_next(&mut self) -> Option<WorkerKey> {
        let key = self.pending.pop_front()?;
        self.queued.remove(&key);
        self.in_flight.insert(key.clone());
        Some(key)
    }

    /// Mark a run finished. Returns true if the key was re-queued because
    /// it was enqueued while running.
    fn finish(&mut self, key: &WorkerKey) -> bool {
        self.in_flight.remove(key);
        if self.dirty.remove(key) {
            self.add(key.clone());
            true
        } else {
            false
        }
    }
}

/// Reports a finished run to the dispatcher, including when the run
/// panicked.
struct Completion {
    key: Option<WorkerKey>,
    requeue: Option<Duration>,
    permit: Option<OwnedSemaphorePermit>,
    tx: mpsc::UnboundedSender<Event>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        // Release the slot before the dispatcher hears about it.
        drop(self.permit.take());
        if let Some(key) = self.key.take() {
            let _ = self.tx.send(Event::Done {
                key,
                requeue: self.requeue,
            });
        }
    }
}

// ── Controller ────────────────────────────────────────────────────

/// Runs the actuator for queued workers with bounded parallelism.
pub struct Controller<S, F> {
    actuator: Arc<Actuator<S, F>>,
    settings: ControllerConfig,
    permits: Arc<Semaphore>,
    queue: WorkQueue,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl<S: ObjectStore, F: DelegateFactory> Controller<S, F> {
    pub fn new(actuator: Actuator<S, F>) -> Self {
        let settings = actuator.config().controller.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            actuator: Arc::new(actuator),
            permits: Arc::new(Semaphore::new(settings.max_concurrent_reconciles.max(1))),
            settings,
            queue: WorkQueue::default(),
            tx,
            rx,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            tx: self.tx.clone(),
        }
    }

    /// Dispatch until shutdown, then wait for running reconciliations to
    /// finish. Those see the same signal and abort their long waits.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            max_concurrent = self.settings.max_concurrent_reconciles,
            resync_secs = self.settings.resync_interval.as_secs(),
            "controller started"
        );

        let mut resync = tokio::time::interval(self.settings.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(event) = self.rx.recv() => self.handle_event(event, &shutdown),
                _ = resync.tick() => self.resync(),
                _ = shutdown_signalled(&mut shutdown) => break,
            }
            self.dispatch(&shutdown);
        }

        info!(in_flight = self.queue.in_flight.len(), "controller stopping");
        while !self.queue.in_flight.is_empty() {
            match self.rx.recv().await {
                Some(Event::Done { key, .. }) => {
                    self.queue.in_flight.remove(&key);
                }
                Some(Event::Enqueue(_)) => {}
                None => break,
            }
        }
        info!("controller stopped");
    }

    fn handle_event(&mut self, event: Event, shutdown: &watch::Receiver<bool>) {
        match event {
            Event::Enqueue(key) => {
                debug!(worker = %key, "worker enqueued");
                self.queue.add(key);
            }
            Event::Done { key, requeue } => {
                if self.queue.finish(&key) {
                    debug!(worker = %key, "worker changed while reconciling, queued again");
                } else if let Some(delay) = requeue {
                    self.requeue_after(key, delay, shutdown.clone());
                }
            }
        }
    }

    fn resync(&mut self) {
        match self.actuator.store().list_all::<Worker>() {
            Ok(workers) => {
                debug!(workers = workers.len(), "resyncing workers");
                for worker in workers {
                    self.queue
                        .add(WorkerKey::new(&worker.meta.namespace, &worker.meta.name));
                }
            }
            Err(e) => warn!(error = %e, "failed to list workers for resync"),
        }
    }

    fn requeue_after(&self, key: WorkerKey, delay: Duration, mut shutdown: watch::Receiver<bool>) {
        debug!(worker = %key, delay_ms = delay.as_millis() as u64, "requeue scheduled");
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(Event::Enqueue(key));
                }
                _ = shutdown_signalled(&mut shutdown) => {}
            }
        });
    }

    fn dispatch(&mut self, shutdown: &watch::Receiver<bool>) {
        while self.queue.has_pending() {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };
            let Some(key) = self.queue.start_next() else {
                break;
            };

            let actuator = Arc::clone(&self.actuator);
            let settings = self.settings.clone();
            let shutdown = shutdown.clone();
            let completion = Completion {
                key: Some(key.clone()),
                requeue: None,
                permit: Some(permit),
                tx: self.tx.clone(),
            };
            tokio::spawn(async move {
                // Owns the guard, so the permit is held until the run ends.
                let mut completion = completion;
                completion.requeue = reconcile_worker(&actuator, &key, &settings, shutdown).await;
            });
        }
    }
}

/// One pass for one worker. Returns the requeue delay, if any.
async fn reconcile_worker<S: ObjectStore, F: DelegateFactory>(
    actuator: &Actuator<S, F>,
    key: &WorkerKey,
    settings: &ControllerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Option<Duration> {
    let store = actuator.store();
    let worker: Worker = match store.get(&key.namespace, &key.name) {
        Ok(Some(worker)) => worker,
        Ok(None) => {
            debug!(worker = %key, "worker no longer exists");
            return None;
        }
        Err(e) => {
            error!(worker = %key, error = %e, "failed to read worker");
            return Some(settings.error_requeue);
        }
    };
    let cluster = match cluster_state(store, &key.namespace) {
        Ok(cluster) => cluster,
        Err(e) => {
            error!(worker = %key, error = %e, "failed to read cluster");
            return Some(settings.error_requeue);
        }
    };

    let err = match actuator.reconcile(&worker, &cluster, &mut shutdown).await {
        Ok(_) => return None,
        Err(err) => err,
    };

    let kind = err.kind();
    if kind == ErrorKind::Cancelled {
        info!(worker = %key, phase = %err.phase, "reconciliation cancelled");
        return None;
    }

    warn!(worker = %key, phase = %err.phase, ?kind, error = %err, "reconciliation failed");
    let message = err.to_string();
    if let Err(e) =
        status::record_error(store, &key.namespace, &key.name, &message, &actuator.config().status).await
    {
        warn!(worker = %key, error = %e, "failed to record error on worker");
    }

    Some(match kind {
        ErrorKind::ConvergenceTimedOut => settings.timeout_requeue,
        _ => settings.error_requeue,
    })
}
