//! Deployment reconciler — idempotent create-or-update of machine groups.
//!
//! Reads the live group, overlays the fields the reconciler owns and
//! writes only if the result differs. The group's status belongs to the
//! fleet manager and is carried through untouched. Write conflicts are
//! returned to the caller rather than retried here.

use tracing::{debug, info};

use poolgrid_core::DesiredPool;
use poolgrid_state::{MachineGroup, MachineGroupStatus, ObjectMeta, ObjectStore, StateResult};

use crate::template::desired_spec;

/// What `apply` did to the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Writes machine groups for one worker namespace.
#[derive(Clone)]
pub struct DeploymentApplier<S> {
    store: S,
    namespace: String,
    class_kind: String,
    min_ready_seconds: u32,
}

impl<S: ObjectStore> DeploymentApplier<S> {
    pub fn new(store: S, namespace: &str, class_kind: &str, min_ready_seconds: u32) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            class_kind: class_kind.to_string(),
            min_ready_seconds,
        }
    }

    /// Make the group for `pool` match the pool with `replicas` replicas.
    pub fn apply(&self, pool: &DesiredPool, replicas: i32) -> StateResult<(MachineGroup, ApplyOutcome)> {
        let spec = desired_spec(pool, &self.class_kind, replicas, self.min_ready_seconds);

        let existing: Option<MachineGroup> = self.store.get(&self.namespace, &pool.name)?;
        match existing {
            None => {
                let group = MachineGroup {
                    meta: ObjectMeta::new(&self.namespace, &pool.name),
                    spec,
                    status: MachineGroupStatus::default(),
                };
                let created = self.store.create(&group)?;
                info!(
                    namespace = %self.namespace,
                    group = %pool.name,
                    replicas,
                    class = %pool.class_name,
                    "machine group created"
                );
                Ok((created, ApplyOutcome::Created))
            }
            Some(group) if group.spec == spec => {
                debug!(namespace = %self.namespace, group = %pool.name, "machine group up to date");
                Ok((group, ApplyOutcome::Unchanged))
            }
            Some(mut group) => {
                let previous_replicas = group.spec.replicas;
                let class_changed = group.spec.template.class != spec.template.class;
                group.spec = spec;
                group.meta.generation += 1;
                let updated = self.store.update(&group)?;
                info!(
                    namespace = %self.namespace,
                    group = %pool.name,
                    from = previous_replicas,
                    to = replicas,
                    class_changed,
                    generation = updated.meta.generation,
                    "machine group updated"
                );
                Ok((updated, ApplyOutcome::Updated))
            }
        }
    }
}
