//! Actuator — one full reconciliation of a worker.
//!
//! Phases run strictly in order and the first failure ends the pass:
//!
//! ```text
//! delegate → inventory → autoscaler → machine-classes → machine-groups
//!   → convergence → garbage-collection → hibernation → status
//! ```
//!
//! Nothing is rolled back on failure. Every phase is idempotent, so the
//! next pass picks up where this one stopped.

use std::collections::BTreeSet;

use tokio::sync::watch;
use tracing::{debug, info};

use poolgrid_core::{ClusterState, DesiredPool, PoolgridConfig, autoscaler_required};
use poolgrid_health::ConvergenceMonitor;
use poolgrid_rollout::{ApplyOutcome, DeploymentApplier};
use poolgrid_scaling::{ScalingDecision, ScalingInput, decide};
use poolgrid_state::{MachineGroup, ObjectStore, Worker};

use crate::components::{remove_component, scale_component};
use crate::delegate::{DelegateFactory, WorkerDelegate};
use crate::error::{ActuatorError, InPhase, Phase, ReconcileError};
use crate::gc::{self, GarbageReport};
use crate::status;

/// What happened to one desired pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOutcome {
    pub name: String,
    pub decision: ScalingDecision,
    pub outcome: ApplyOutcome,
}

/// Summary of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub pools: Vec<PoolOutcome>,
    pub autoscaler_removed: bool,
    pub garbage: GarbageReport,
    pub status_written: bool,
}

/// Drives workers towards their desired pools.
pub struct Actuator<S, F> {
    store: S,
    factory: F,
    config: PoolgridConfig,
}

impl<S: ObjectStore, F: DelegateFactory> Actuator<S, F> {
    pub fn new(store: S, factory: F, config: PoolgridConfig) -> Self {
        Self {
            store,
            factory,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PoolgridConfig {
        &self.config
    }

    /// Reconcile one worker against the given cluster snapshot.
    ///
    /// `shutdown` aborts the long waits (autoscaler removal, convergence)
    /// with a `Cancelled` error.
    pub async fn reconcile(
        &self,
        worker: &Worker,
        cluster: &ClusterState,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let namespace = worker.meta.namespace.as_str();
        let worker_key = worker.meta.key();
        let hibernated = cluster.hibernated;
        let config = &self.config;

        info!(worker = %worker_key, hibernated, generation = worker.meta.generation, "reconciling worker");

        // ── Delegate ───────────────────────────────────────────────
        let delegate = self
            .factory
            .resolve(worker, cluster)
            .map_err(ActuatorError::Delegate)
            .in_phase(Phase::Delegate)?;
        let desired = delegate
            .generate_deployments()
            .await
            .map_err(ActuatorError::Delegate)
            .in_phase(Phase::Delegate)?;
        let class_kind = delegate.machine_class_kind().to_string();
        info!(worker = %worker_key, phase = %Phase::Delegate, pools = desired.len(), "desired pools generated");

        // ── Inventory ──────────────────────────────────────────────
        let existing_groups: Vec<MachineGroup> = self.store.list(namespace).in_phase(Phase::Inventory)?;
        let existing_classes =
            gc::class_names(&self.store, namespace, &class_kind).in_phase(Phase::Inventory)?;
        debug!(
            worker = %worker_key,
            phase = %Phase::Inventory,
            groups = existing_groups.len(),
            classes = existing_classes.len(),
            "inventory listed"
        );

        // ── Autoscaler ─────────────────────────────────────────────
        let autoscaler_removed = self
            .pause_autoscaler(&worker_key, namespace, &desired, &existing_classes, hibernated, shutdown)
            .await
            .in_phase(Phase::Autoscaler)?;

        // ── Machine classes ────────────────────────────────────────
        info!(worker = %worker_key, phase = %Phase::MachineClasses, kind = %class_kind, "deploying machine classes");
        delegate
            .deploy_machine_classes()
            .await
            .map_err(ActuatorError::Delegate)
            .in_phase(Phase::MachineClasses)?;

        // ── Machine groups ─────────────────────────────────────────
        info!(worker = %worker_key, phase = %Phase::MachineGroups, "deploying machine groups");
        let applier = DeploymentApplier::new(
            self.store.clone(),
            namespace,
            &class_kind,
            config.rollout.min_ready_seconds,
        );
        let mut pools = Vec::with_capacity(desired.len());
        for pool in &desired {
            let decision = decide(&ScalingInput {
                pool,
                existing: &existing_groups,
                hibernated,
                autoscaler_required: pool.autoscaler_required(),
            });
            let (_, outcome) = applier
                .apply(pool, decision.replicas)
                .in_phase(Phase::MachineGroups)?;
            info!(
                worker = %worker_key,
                pool = %pool.name,
                replicas = decision.replicas,
                rule = %decision.rule,
                ?outcome,
                "machine group reconciled"
            );
            pools.push(PoolOutcome {
                name: pool.name.clone(),
                decision,
                outcome,
            });
        }

        // ── Convergence ────────────────────────────────────────────
        info!(worker = %worker_key, phase = %Phase::Convergence, "waiting for machine groups");
        let wanted: Vec<String> = desired.iter().map(|p| p.name.clone()).collect();
        ConvergenceMonitor::new(
            self.store.clone(),
            namespace,
            config.convergence.poll_interval,
            config.convergence.timeout,
        )
        .wait(&wanted, hibernated, shutdown)
        .await
        .in_phase(Phase::Convergence)?;

        // ── Garbage collection ─────────────────────────────────────
        let garbage = gc::collect_garbage(&self.store, namespace, &class_kind, &desired)
            .in_phase(Phase::GarbageCollection)?;
        if !garbage.is_empty() {
            info!(
                worker = %worker_key,
                phase = %Phase::GarbageCollection,
                groups = garbage.machine_groups.len(),
                classes = garbage.machine_classes.len(),
                secrets = garbage.secrets.len(),
                "garbage collected"
            );
        }

        // ── Hibernation ────────────────────────────────────────────
        if hibernated {
            info!(worker = %worker_key, phase = %Phase::Hibernation, "scaling down fleet manager");
            scale_component(&self.store, namespace, &config.fleet_manager.deployment_name, 0)
                .in_phase(Phase::Hibernation)?;
        }

        // ── Status ─────────────────────────────────────────────────
        let status_written = status::publish(
            &self.store,
            namespace,
            &worker.meta.name,
            worker.meta.generation,
            &desired,
            &config.status,
        )
        .await
        .in_phase(Phase::Status)?;

        info!(worker = %worker_key, pools = pools.len(), status_written, "worker reconciled");
        Ok(ReconcileReport {
            pools,
            autoscaler_removed,
            garbage,
            status_written,
        })
    }

    /// Remove the autoscaler when a rolling update is about to start or the
    /// cluster is hibernating. Returns whether a removal was performed.
    async fn pause_autoscaler(
        &self,
        worker_key: &str,
        namespace: &str,
        desired: &[DesiredPool],
        existing_classes: &BTreeSet<String>,
        hibernated: bool,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<bool, ActuatorError> {
        if !autoscaler_required(desired) {
            return Ok(false);
        }

        let rolling_update = desired.iter().any(|p| !existing_classes.contains(&p.class_name));
        if !(hibernated || rolling_update) {
            return Ok(false);
        }

        let settings = &self.config.autoscaler;
        info!(
            worker = %worker_key,
            phase = %Phase::Autoscaler,
            rolling_update,
            hibernated,
            "removing autoscaler"
        );
        remove_component(
            &self.store,
            namespace,
            &settings.deployment_name,
            settings.removal_poll_interval,
            settings.removal_timeout,
            shutdown,
        )
        .await?;
        Ok(true)
    }
}
