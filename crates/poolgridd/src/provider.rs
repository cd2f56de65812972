//! Static provider — machine classes straight from the worker spec.
//!
//! Each worker pool becomes one desired pool per zone. The machine class
//! name embeds a digest of the machine type and image, so changing either
//! produces a new class and the fleet manager rolls the pool onto it.

use std::collections::BTreeMap;

use anyhow::{Context, bail};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use poolgrid_actuator::{DelegateFactory, WorkerDelegate};
use poolgrid_core::{ClusterState, DesiredPool};
use poolgrid_scaling::{distribute_over_zones, distribute_positive_int_or_percent};
use poolgrid_state::{
    MachineClass, ObjectMeta, ObjectStore, PURPOSE_LABEL, PURPOSE_MACHINE_CLASS, Resource, Secret,
    StateResult, Worker, WorkerPool,
};

/// Node label carrying the zone a machine runs in.
pub const ZONE_LABEL: &str = "poolgrid.io/zone";

#[derive(Clone)]
pub struct StaticProvider<S> {
    store: S,
    class_kind: String,
}

impl<S: ObjectStore> StaticProvider<S> {
    pub fn new(store: S, class_kind: &str) -> Self {
        Self {
            store,
            class_kind: class_kind.to_string(),
        }
    }
}

impl<S: ObjectStore> DelegateFactory for StaticProvider<S> {
    type Delegate = StaticDelegate<S>;

    fn resolve(&self, worker: &Worker, _cluster: &ClusterState) -> anyhow::Result<StaticDelegate<S>> {
        for pool in &worker.spec.pools {
            if pool.minimum < 0 || pool.maximum < pool.minimum {
                bail!(
                    "pool {} has invalid bounds (minimum {}, maximum {})",
                    pool.name,
                    pool.minimum,
                    pool.maximum
                );
            }
        }
        Ok(StaticDelegate {
            store: self.store.clone(),
            worker: worker.clone(),
            class_kind: self.class_kind.clone(),
        })
    }
}

/// One zone's share of a worker pool.
struct ZonedPool<'a> {
    pool: &'a WorkerPool,
    zone: Option<&'a str>,
    desired: DesiredPool,
}

pub struct StaticDelegate<S> {
    store: S,
    worker: Worker,
    class_kind: String,
}

impl<S: ObjectStore> StaticDelegate<S> {
    fn zoned_pools(&self) -> Vec<ZonedPool<'_>> {
        let mut out = Vec::new();
        for pool in &self.worker.spec.pools {
            if pool.zones.is_empty() {
                out.push(ZonedPool {
                    pool,
                    zone: None,
                    desired: desired_pool(pool, &pool.name, None, 0, 1),
                });
                continue;
            }
            let zone_count = pool.zones.len();
            for (index, zone) in pool.zones.iter().enumerate() {
                let name = format!("{}-z{}", pool.name, index + 1);
                out.push(ZonedPool {
                    pool,
                    zone: Some(zone.as_str()),
                    desired: desired_pool(pool, &name, Some(zone.as_str()), index, zone_count),
                });
            }
        }
        out
    }

    fn upsert<R: Resource + PartialEq>(&self, mut obj: R) -> StateResult<()> {
        let existing: Option<R> = self.store.get(obj.namespace(), obj.name())?;
        match existing {
            None => {
                self.store.create(&obj)?;
                debug!(kind = R::KIND, name = %obj.name(), "provider object created");
            }
            Some(current) => {
                obj.meta_mut().resource_version = current.meta().resource_version;
                obj.meta_mut().generation = current.meta().generation;
                if obj != current {
                    self.store.update(&obj)?;
                    debug!(kind = R::KIND, name = %obj.name(), "provider object updated");
                }
            }
        }
        Ok(())
    }
}

impl<S: ObjectStore> WorkerDelegate for StaticDelegate<S> {
    async fn generate_deployments(&self) -> anyhow::Result<Vec<DesiredPool>> {
        Ok(self.zoned_pools().into_iter().map(|z| z.desired).collect())
    }

    async fn deploy_machine_classes(&self) -> anyhow::Result<()> {
        let namespace = self.worker.meta.namespace.as_str();
        let credentials: Secret = self
            .store
            .get(namespace, &self.worker.spec.secret_ref)?
            .with_context(|| format!("cloud provider secret {namespace}/{} not found", self.worker.spec.secret_ref))?;

        let zoned = self.zoned_pools();
        for z in &zoned {
            let class_name = &z.desired.class_name;
            self.upsert(Secret {
                meta: ObjectMeta::new(namespace, class_name).with_label(PURPOSE_LABEL, PURPOSE_MACHINE_CLASS),
                data: credentials.data.clone(),
            })?;
            self.upsert(MachineClass {
                meta: ObjectMeta::new(namespace, class_name),
                kind: self.class_kind.clone(),
                provider_spec: json!({
                    "machineType": z.pool.machine_type,
                    "image": {
                        "name": z.pool.machine_image.name,
                        "version": z.pool.machine_image.version,
                    },
                    "region": self.worker.spec.region,
                    "zone": z.zone,
                }),
                secret_ref: class_name.clone(),
            })?;
        }
        info!(worker = %self.worker.meta.key(), classes = zoned.len(), "machine classes deployed");
        Ok(())
    }

    fn machine_class_kind(&self) -> &str {
        &self.class_kind
    }
}

fn desired_pool(
    pool: &WorkerPool,
    name: &str,
    zone: Option<&str>,
    zone_index: usize,
    zone_count: usize,
) -> DesiredPool {
    let mut labels = pool.labels.clone();
    if let Some(zone) = zone {
        labels.insert(ZONE_LABEL.to_string(), zone.to_string());
    }
    DesiredPool {
        name: name.to_string(),
        class_name: format!("{name}-{}", class_digest(pool)),
        minimum: distribute_over_zones(zone_index, pool.minimum, zone_count),
        maximum: distribute_over_zones(zone_index, pool.maximum, zone_count),
        max_surge: distribute_positive_int_or_percent(zone_index, pool.max_surge, zone_count),
        max_unavailable: distribute_positive_int_or_percent(zone_index, pool.max_unavailable, zone_count),
        labels,
        annotations: pool.annotations.clone(),
        taints: pool.taints.clone(),
    }
}

/// First 8 hex chars of sha256 over the machine type and image.
fn class_digest(pool: &WorkerPool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pool.machine_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(pool.machine_image.name.as_bytes());
    hasher.update(b"\0");
    hasher.update(pool.machine_image.version.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..8].to_string()
}
