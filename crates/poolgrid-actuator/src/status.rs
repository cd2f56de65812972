//! Worker status writes under optimistic concurrency.
//!
//! Every write re-reads the worker, applies a mutation to its status and
//! updates with the version it read. Conflicts are retried with
//! exponential backoff; a mutation that changes nothing skips the write.

use std::time::Duration;

use tracing::{debug, warn};

use poolgrid_core::DesiredPool;
use poolgrid_core::config::StatusConfig;
use poolgrid_state::{ObjectStore, PoolStatus, Resource, StateError, Worker, WorkerStatus, tables};

use crate::error::{ActuatorError, ActuatorResult};

/// The ordered pool summary persisted for a set of desired pools.
pub fn pool_statuses(desired: &[DesiredPool]) -> Vec<PoolStatus> {
    desired
        .iter()
        .map(|p| PoolStatus {
            name: p.name.clone(),
            minimum: p.minimum,
            maximum: p.maximum,
        })
        .collect()
}

/// Read-modify-write a worker's status. Returns whether a write happened.
pub async fn update_worker_status<S, F>(
    store: &S,
    namespace: &str,
    name: &str,
    backoff: &StatusConfig,
    mut mutate: F,
) -> ActuatorResult<bool>
where
    S: ObjectStore,
    F: FnMut(&mut WorkerStatus),
{
    let key = tables::object_key(namespace, name);
    let steps = backoff.retry_steps.max(1);
    let mut delay = backoff.retry_initial;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let mut worker: Worker = store.get(namespace, name)?.ok_or_else(|| StateError::NotFound {
            kind: Worker::KIND,
            key: key.clone(),
        })?;

        let before = worker.status.clone();
        mutate(&mut worker.status);
        if worker.status == before {
            debug!(worker = %key, "worker status already current");
            return Ok(false);
        }

        match store.update(&worker) {
            Ok(_) => {
                debug!(worker = %key, attempt, "worker status written");
                return Ok(true);
            }
            Err(e) if e.is_conflict() && attempt < steps => {
                warn!(worker = %key, attempt, retry_in = ?delay, "worker status write conflicted");
                tokio::time::sleep(delay).await;
                delay = Duration::try_from_secs_f64(delay.as_secs_f64() * backoff.retry_factor)
                    .unwrap_or(delay);
            }
            Err(e) if e.is_conflict() => {
                return Err(ActuatorError::ConflictRetryExhausted {
                    key,
                    attempts: attempt,
                    last: e,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Publish the outcome of a successful reconciliation of generation
/// `generation`.
pub async fn publish<S: ObjectStore>(
    store: &S,
    namespace: &str,
    name: &str,
    generation: i64,
    desired: &[DesiredPool],
    backoff: &StatusConfig,
) -> ActuatorResult<bool> {
    let pools = pool_statuses(desired);
    update_worker_status(store, namespace, name, backoff, |status| {
        status.machine_deployments = pools.clone();
        status.observed_generation = generation;
        status.last_error = None;
    })
    .await
}

/// Record a reconciliation failure on the worker.
pub async fn record_error<S: ObjectStore>(
    store: &S,
    namespace: &str,
    name: &str,
    message: &str,
    backoff: &StatusConfig,
) -> ActuatorResult<bool> {
    update_worker_status(store, namespace, name, backoff, |status| {
        status.last_error = Some(message.to_string());
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use poolgrid_core::IntOrPercent;
    use poolgrid_state::{ObjectMeta, StateStore, WorkerSpec};

    fn worker() -> Worker {
        Worker {
            meta: ObjectMeta::new("shoot--a", "worker"),
            spec: WorkerSpec {
                secret_ref: "cloudprovider".to_string(),
                region: "eu-1".to_string(),
                pools: Vec::new(),
            },
            status: WorkerStatus::default(),
        }
    }

    fn pool(name: &str, min: i32, max: i32) -> DesiredPool {
        DesiredPool {
            name: name.to_string(),
            class_name: format!("{name}-v1"),
            minimum: min,
            maximum: max,
            max_surge: IntOrPercent::Int(1),
            max_unavailable: IntOrPercent::Int(0),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            taints: Vec::new(),
        }
    }

    fn backoff() -> StatusConfig {
        StatusConfig {
            retry_steps: 4,
            retry_initial: Duration::from_millis(1),
            retry_factor: 2.0,
        }
    }

    #[tokio::test]
    async fn publishes_pools_in_order() {
        let store = StateStore::open_in_memory().unwrap();
        let created = store.create(&worker()).unwrap();
        let desired = [pool("pool-b", 1, 3), pool("pool-a", 2, 2)];

        let written = publish(&store, "shoot--a", "worker", created.meta.generation, &desired, &backoff())
            .await
            .unwrap();
        assert!(written);

        let stored: Worker = store.get("shoot--a", "worker").unwrap().unwrap();
        let names: Vec<&str> = stored
            .status
            .machine_deployments
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["pool-b", "pool-a"]);
        assert_eq!(stored.status.observed_generation, 1);
    }

    #[tokio::test]
    async fn unchanged_status_is_not_rewritten() {
        let store = StateStore::open_in_memory().unwrap();
        store.create(&worker()).unwrap();
        let desired = [pool("pool-a", 2, 2)];

        publish(&store, "shoot--a", "worker", 1, &desired, &backoff()).await.unwrap();
        let first: Worker = store.get("shoot--a", "worker").unwrap().unwrap();

        let written = publish(&store, "shoot--a", "worker", 1, &desired, &backoff()).await.unwrap();
        let second: Worker = store.get("shoot--a", "worker").unwrap().unwrap();

        assert!(!written);
        assert_eq!(first.meta.resource_version, second.meta.resource_version);
    }

    #[tokio::test]
    async fn success_clears_recorded_error() {
        let store = StateStore::open_in_memory().unwrap();
        store.create(&worker()).unwrap();

        record_error(&store, "shoot--a", "worker", "convergence phase failed", &backoff())
            .await
            .unwrap();
        let failed: Worker = store.get("shoot--a", "worker").unwrap().unwrap();
        assert_eq!(failed.status.last_error.as_deref(), Some("convergence phase failed"));

        publish(&store, "shoot--a", "worker", 1, &[], &backoff()).await.unwrap();
        let recovered: Worker = store.get("shoot--a", "worker").unwrap().unwrap();
        assert_eq!(recovered.status.last_error, None);
    }

    #[tokio::test]
    async fn missing_worker_is_a_store_error() {
        let store = StateStore::open_in_memory().unwrap();
        let err = publish(&store, "shoot--a", "worker", 1, &[], &backoff()).await.unwrap_err();
        assert!(matches!(err, ActuatorError::Store(ref e) if e.is_not_found()), "got {err:?}");
    }
}
