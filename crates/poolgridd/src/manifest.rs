//! Loading declared objects into the store.
//!
//! A manifest is a JSON array of objects tagged with their `kind`:
//!
//! ```json
//! [
//!   { "kind": "Secret", "meta": { "namespace": "shoot--a", "name": "cloudprovider" }, "data": { ... } },
//!   { "kind": "Worker", "meta": { ... }, "spec": { "secret_ref": "cloudprovider", "pools": [ ... ] } }
//! ]
//! ```
//!
//! Applying is create-or-update. Status and versions already in the store
//! are kept; a worker's generation is bumped only when its spec changes.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

use poolgrid_state::{Cluster, ComponentDeployment, ObjectStore, Resource, Secret, StateResult, Worker};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum ManifestObject {
    Worker(Worker),
    Cluster(Cluster),
    Secret(Secret),
    ComponentDeployment(ComponentDeployment),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for Applied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Applied::Created => "created",
            Applied::Updated => "updated",
            Applied::Unchanged => "unchanged",
        })
    }
}

pub fn load(path: &Path) -> anyhow::Result<Vec<ManifestObject>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    parse(&content).with_context(|| format!("failed to parse manifest {}", path.display()))
}

pub fn parse(content: &str) -> serde_json::Result<Vec<ManifestObject>> {
    serde_json::from_str(content)
}

/// Apply every object in order. Returns `(kind, key, outcome)` per object.
pub fn apply_all<S: ObjectStore>(
    store: &S,
    objects: Vec<ManifestObject>,
) -> StateResult<Vec<(&'static str, String, Applied)>> {
    let mut results = Vec::with_capacity(objects.len());
    for object in objects {
        let result = match object {
            ManifestObject::Worker(worker) => upsert(store, worker, |next, current| {
                next.status = current.status.clone();
                next.meta.generation = if next.spec == current.spec {
                    current.meta.generation
                } else {
                    current.meta.generation + 1
                };
            })?,
            ManifestObject::Cluster(cluster) => upsert(store, cluster, keep_generation)?,
            ManifestObject::Secret(secret) => upsert(store, secret, keep_generation)?,
            ManifestObject::ComponentDeployment(component) => upsert(store, component, keep_generation)?,
        };
        info!(kind = result.0, key = %result.1, outcome = %result.2, "manifest object applied");
        results.push(result);
    }
    Ok(results)
}

fn keep_generation<R: Resource>(next: &mut R, current: &R) {
    next.meta_mut().generation = current.meta().generation;
}

fn upsert<S, R, F>(store: &S, mut next: R, merge: F) -> StateResult<(&'static str, String, Applied)>
where
    S: ObjectStore,
    R: Resource + PartialEq,
    F: FnOnce(&mut R, &R),
{
    let key = next.table_key();
    let current: Option<R> = store.get(next.namespace(), next.name())?;
    let outcome = match current {
        None => {
            store.create(&next)?;
            Applied::Created
        }
        Some(current) => {
            next.meta_mut().resource_version = current.meta().resource_version;
            merge(&mut next, &current);
            if next == current {
                Applied::Unchanged
            } else {
                store.update(&next)?;
                Applied::Updated
            }
        }
    };
    Ok((R::KIND, key, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolgrid_state::{PoolStatus, StateStore};

    const MANIFEST: &str = r#"[
        { "kind": "Secret",
          "meta": { "namespace": "shoot--a", "name": "cloudprovider" },
          "data": { "accessKeyID": "AKIA" } },
        { "kind": "Cluster",
          "meta": { "namespace": "shoot--a", "name": "shoot--a" },
          "hibernated": false },
        { "kind": "ComponentDeployment",
          "meta": { "namespace": "shoot--a", "name": "machine-controller-manager" },
          "replicas": 1 },
        { "kind": "Worker",
          "meta": { "namespace": "shoot--a", "name": "worker" },
          "spec": {
            "secret_ref": "cloudprovider",
            "region": "eu-west-1",
            "pools": [{
              "name": "cpu",
              "machine_type": "m5.large",
              "machine_image": { "name": "gardenlinux", "version": "1443.3" },
              "minimum": 2,
              "maximum": 5,
              "max_surge": 1,
              "max_unavailable": "25%",
              "zones": ["eu-west-1a", "eu-west-1b"]
            }]
          } }
    ]"#;

    #[test]
    fn parses_tagged_objects() {
        let objects = parse(MANIFEST).unwrap();
        assert_eq!(objects.len(), 4);
        let ManifestObject::Worker(worker) = &objects[3] else {
            panic!("expected a worker, got {:?}", objects[3]);
        };
        assert_eq!(worker.spec.pools[0].zones.len(), 2);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = parse(r#"[{ "kind": "Pod", "meta": { "namespace": "a", "name": "b" } }]"#);
        assert!(err.is_err());
    }

    #[test]
    fn first_apply_creates_everything() {
        let store = StateStore::open_in_memory().unwrap();
        let results = apply_all(&store, parse(MANIFEST).unwrap()).unwrap();
        assert!(results.iter().all(|(_, _, outcome)| *outcome == Applied::Created));

        let worker: Worker = store.get("shoot--a", "worker").unwrap().unwrap();
        assert_eq!(worker.meta.generation, 1);
    }

    #[test]
    fn reapply_is_unchanged_and_keeps_status() {
        let store = StateStore::open_in_memory().unwrap();
        apply_all(&store, parse(MANIFEST).unwrap()).unwrap();

        let mut worker: Worker = store.get("shoot--a", "worker").unwrap().unwrap();
        worker.status.machine_deployments.push(PoolStatus {
            name: "cpu-z1".to_string(),
            minimum: 1,
            maximum: 3,
        });
        store.update(&worker).unwrap();

        let results = apply_all(&store, parse(MANIFEST).unwrap()).unwrap();
        assert!(results.iter().all(|(_, _, outcome)| *outcome == Applied::Unchanged));

        let worker: Worker = store.get("shoot--a", "worker").unwrap().unwrap();
        assert_eq!(worker.status.machine_deployments.len(), 1);
        assert_eq!(worker.meta.generation, 1);
    }

    #[test]
    fn spec_change_bumps_worker_generation() {
        let store = StateStore::open_in_memory().unwrap();
        apply_all(&store, parse(MANIFEST).unwrap()).unwrap();

        let changed = MANIFEST.replace("\"maximum\": 5", "\"maximum\": 6");
        let results = apply_all(&store, parse(&changed).unwrap()).unwrap();
        assert_eq!(results[3].2, Applied::Updated);

        let worker: Worker = store.get("shoot--a", "worker").unwrap().unwrap();
        assert_eq!(worker.meta.generation, 2);
        assert_eq!(worker.spec.pools[0].maximum, 6);
    }

    #[test]
    fn slash_in_namespace_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let objects = parse(
            r#"[{ "kind": "Cluster", "meta": { "namespace": "shoot--a/x", "name": "shoot--a" } }]"#,
        )
        .unwrap();
        let err = apply_all(&store, objects).unwrap_err();
        assert!(matches!(err, poolgrid_state::StateError::InvalidKey { .. }), "{err}");
        assert!(store.list_all::<Cluster>().unwrap().is_empty());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, MANIFEST).unwrap();
        assert_eq!(load(&path).unwrap().len(), 4);
        assert!(load(&dir.path().join("missing.json")).is_err());
    }
}
