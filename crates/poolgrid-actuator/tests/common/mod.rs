//! Shared fixtures: a fake provider, a simulated fleet manager and a
//! fault-injecting store.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use poolgrid_actuator::{DelegateFactory, WorkerDelegate};
use poolgrid_core::{ClusterState, DesiredPool, IntOrPercent, PoolgridConfig};
use poolgrid_state::*;

pub const CLASS_KIND: &str = "FakeMachineClass";
pub const AUTOSCALER: &str = "cluster-autoscaler";
pub const FLEET_MANAGER: &str = "machine-controller-manager";

pub fn test_config() -> PoolgridConfig {
    let mut config = PoolgridConfig::default();
    config.convergence.poll_interval = Duration::from_millis(10);
    config.convergence.timeout = Duration::from_secs(5);
    config.autoscaler.removal_poll_interval = Duration::from_millis(5);
    config.autoscaler.removal_timeout = Duration::from_secs(1);
    config.status.retry_initial = Duration::from_millis(1);
    config.controller.error_requeue = Duration::from_millis(20);
    config.controller.timeout_requeue = Duration::from_millis(20);
    config.controller.resync_interval = Duration::from_secs(3600);
    config
}

pub fn pool(name: &str, class: &str, minimum: i32, maximum: i32) -> DesiredPool {
    DesiredPool {
        name: name.to_string(),
        class_name: class.to_string(),
        minimum,
        maximum,
        max_surge: IntOrPercent::Int(1),
        max_unavailable: IntOrPercent::Int(0),
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        taints: Vec::new(),
    }
}

/// Store a worker and the components that run next to its fleet.
pub fn seed_worker<S: ObjectStore>(store: &S, namespace: &str) -> Worker {
    for name in [AUTOSCALER, FLEET_MANAGER] {
        store
            .create(&ComponentDeployment {
                meta: ObjectMeta::new(namespace, name),
                replicas: 1,
            })
            .unwrap();
    }
    store
        .create(&Worker {
            meta: ObjectMeta::new(namespace, "worker"),
            spec: WorkerSpec {
                secret_ref: "cloudprovider".to_string(),
                region: "eu-1".to_string(),
                pools: Vec::new(),
            },
            status: WorkerStatus::default(),
        })
        .unwrap()
}

pub fn group<S: ObjectStore>(store: &S, namespace: &str, name: &str) -> Option<MachineGroup> {
    store.get(namespace, name).unwrap()
}

pub fn component<S: ObjectStore>(store: &S, namespace: &str, name: &str) -> Option<ComponentDeployment> {
    store.get(namespace, name).unwrap()
}

// ── Fake provider ─────────────────────────────────────────────────

/// Counts how many reconciliations overlap, globally and per worker.
#[derive(Default)]
pub struct Probe {
    active: Mutex<HashMap<String, usize>>,
    active_total: AtomicUsize,
    pub max_total: AtomicUsize,
    pub max_per_worker: AtomicUsize,
    pub runs: AtomicUsize,
}

impl Probe {
    fn enter(&self, worker: &str) {
        let total = self.active_total.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_total.fetch_max(total, Ordering::SeqCst);
        let mut active = self.active.lock().unwrap();
        let count = active.entry(worker.to_string()).or_default();
        *count += 1;
        self.max_per_worker.fetch_max(*count, Ordering::SeqCst);
    }

    fn exit(&self, worker: &str) {
        self.active_total.fetch_sub(1, Ordering::SeqCst);
        let mut active = self.active.lock().unwrap();
        if let Some(count) = active.get_mut(worker) {
            *count -= 1;
        }
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}

/// Provider whose desired pools are set directly by the test.
#[derive(Clone)]
pub struct FakeProvider<S> {
    store: S,
    pools: Arc<Mutex<Vec<DesiredPool>>>,
    failure: Arc<Mutex<Option<String>>>,
    delay: Duration,
    pub probe: Arc<Probe>,
}

impl<S: ObjectStore> FakeProvider<S> {
    pub fn new(store: S, pools: Vec<DesiredPool>) -> Self {
        Self {
            store,
            pools: Arc::new(Mutex::new(pools)),
            failure: Arc::new(Mutex::new(None)),
            delay: Duration::ZERO,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_pools(&self, pools: Vec<DesiredPool>) {
        *self.pools.lock().unwrap() = pools;
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap() = None;
    }
}

pub struct FakeDelegate<S> {
    store: S,
    namespace: String,
    worker: String,
    pools: Vec<DesiredPool>,
    failure: Option<String>,
    delay: Duration,
    probe: Arc<Probe>,
}

impl<S: ObjectStore> DelegateFactory for FakeProvider<S> {
    type Delegate = FakeDelegate<S>;

    fn resolve(&self, worker: &Worker, _cluster: &ClusterState) -> anyhow::Result<FakeDelegate<S>> {
        Ok(FakeDelegate {
            store: self.store.clone(),
            namespace: worker.meta.namespace.clone(),
            worker: worker.meta.key(),
            pools: self.pools.lock().unwrap().clone(),
            failure: self.failure.lock().unwrap().clone(),
            delay: self.delay,
            probe: Arc::clone(&self.probe),
        })
    }
}

impl<S: ObjectStore> WorkerDelegate for FakeDelegate<S> {
    async fn generate_deployments(&self) -> anyhow::Result<Vec<DesiredPool>> {
        self.probe.enter(&self.worker);
        tokio::time::sleep(self.delay).await;
        self.probe.exit(&self.worker);

        if let Some(message) = &self.failure {
            anyhow::bail!("{message}");
        }
        Ok(self.pools.clone())
    }

    async fn deploy_machine_classes(&self) -> anyhow::Result<()> {
        for pool in &self.pools {
            let existing: Option<MachineClass> = self.store.get(&self.namespace, &pool.class_name)?;
            if existing.is_some() {
                continue;
            }
            self.store.create(&MachineClass {
                meta: ObjectMeta::new(&self.namespace, &pool.class_name),
                kind: CLASS_KIND.to_string(),
                provider_spec: serde_json::json!({ "pool": pool.name }),
                secret_ref: pool.class_name.clone(),
            })?;
            self.store.create(&Secret {
                meta: ObjectMeta::new(&self.namespace, &pool.class_name)
                    .with_label(PURPOSE_LABEL, PURPOSE_MACHINE_CLASS),
                data: BTreeMap::from([("userData".to_string(), "#!/bin/sh".to_string())]),
            })?;
        }
        Ok(())
    }

    fn machine_class_kind(&self) -> &str {
        CLASS_KIND
    }
}

// ── Simulated fleet manager ───────────────────────────────────────

#[derive(Debug, Clone)]
pub enum FleetBehaviour {
    /// Every group becomes fully available at its spec replicas.
    Healthy,
    /// Acknowledges specs but never brings machines up.
    Stalled,
    /// Reports a failed machine in every group.
    FailMachine { machine: String, description: String },
}

/// Background task playing the fleet manager. Aborted on drop.
pub struct FleetSim {
    handle: JoinHandle<()>,
}

impl Drop for FleetSim {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn simulate_fleet<S: ObjectStore>(store: S, behaviour: FleetBehaviour) -> FleetSim {
    let handle = tokio::spawn(async move {
        loop {
            settle(&store, &behaviour);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });
    FleetSim { handle }
}

fn settle<S: ObjectStore>(store: &S, behaviour: &FleetBehaviour) {
    let Ok(groups) = store.list_all::<MachineGroup>() else {
        return;
    };
    for mut group in groups {
        let mut status = group.status.clone();
        status.observed_generation = group.meta.generation;
        match behaviour {
            FleetBehaviour::Healthy => {
                let replicas = group.spec.replicas;
                status.replicas = replicas;
                status.updated_replicas = replicas;
                status.ready_replicas = replicas;
                status.available_replicas = replicas;
                status.failed_machines.clear();
                status.conditions = vec![
                    GroupCondition {
                        kind: GroupConditionType::Available,
                        status: ConditionStatus::True,
                        message: None,
                    },
                    GroupCondition {
                        kind: GroupConditionType::Progressing,
                        status: ConditionStatus::True,
                        message: None,
                    },
                ];
            }
            FleetBehaviour::Stalled => {}
            FleetBehaviour::FailMachine {
                machine,
                description,
            } => {
                status.failed_machines = vec![FailedMember {
                    name: machine.clone(),
                    description: description.clone(),
                }];
            }
        }
        if status != group.status {
            group.status = status;
            let _ = store.update(&group);
        }
    }
}

// ── Fault-injecting store ─────────────────────────────────────────

/// Wraps a real store and injects write conflicts on workers or keeps
/// component deployments around after deletion.
#[derive(Clone)]
pub struct FaultyStore {
    pub inner: StateStore,
    worker_conflicts: Arc<AtomicU32>,
    sticky_components: bool,
}

impl FaultyStore {
    pub fn new(inner: StateStore) -> Self {
        Self {
            inner,
            worker_conflicts: Arc::new(AtomicU32::new(0)),
            sticky_components: false,
        }
    }

    /// Fail the next `n` worker updates with a conflict. `u32::MAX`
    /// fails every update.
    pub fn conflict_worker_updates(self, n: u32) -> Self {
        self.worker_conflicts.store(n, Ordering::SeqCst);
        self
    }

    /// Component deletes report success but leave the object in place.
    pub fn sticky_components(mut self) -> Self {
        self.sticky_components = true;
        self
    }
}

impl ObjectStore for FaultyStore {
    fn get<R: Resource>(&self, namespace: &str, name: &str) -> StateResult<Option<R>> {
        self.inner.get(namespace, name)
    }

    fn list<R: Resource>(&self, namespace: &str) -> StateResult<Vec<R>> {
        self.inner.list(namespace)
    }

    fn list_all<R: Resource>(&self) -> StateResult<Vec<R>> {
        self.inner.list_all()
    }

    fn create<R: Resource>(&self, obj: &R) -> StateResult<R> {
        self.inner.create(obj)
    }

    fn update<R: Resource>(&self, obj: &R) -> StateResult<R> {
        if R::KIND == Worker::KIND {
            let remaining = self.worker_conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                if remaining != u32::MAX {
                    self.worker_conflicts.fetch_sub(1, Ordering::SeqCst);
                }
                let version = obj.meta().resource_version;
                return Err(StateError::Conflict {
                    kind: R::KIND,
                    key: obj.table_key(),
                    expected: version,
                    actual: version + 1,
                });
            }
        }
        self.inner.update(obj)
    }

    fn delete<R: Resource>(&self, namespace: &str, name: &str) -> StateResult<bool> {
        if self.sticky_components && R::KIND == ComponentDeployment::KIND {
            let present: Option<R> = self.inner.get(namespace, name)?;
            return Ok(present.is_some());
        }
        self.inner.delete::<R>(namespace, name)
    }
}
