//! Desired machine group spec for a pool.

use std::collections::BTreeMap;

use poolgrid_core::DesiredPool;
use poolgrid_state::{ClassRef, MachineGroupSpec, MachineTemplate, NodeTemplate, RollingUpdateStrategy};

/// Label tying machines to the group that owns them.
pub const POOL_NAME_LABEL: &str = "name";

/// Selector and template labels for a pool's group.
pub fn selector_labels(pool_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(POOL_NAME_LABEL.to_string(), pool_name.to_string())])
}

/// Build the full spec the reconciler owns for a pool's machine group.
pub fn desired_spec(
    pool: &DesiredPool,
    class_kind: &str,
    replicas: i32,
    min_ready_seconds: u32,
) -> MachineGroupSpec {
    let labels = selector_labels(&pool.name);
    MachineGroupSpec {
        replicas,
        min_ready_seconds,
        strategy: RollingUpdateStrategy {
            max_surge: pool.max_surge,
            max_unavailable: pool.max_unavailable,
        },
        selector: labels.clone(),
        template: MachineTemplate {
            labels,
            class: ClassRef {
                kind: class_kind.to_string(),
                name: pool.class_name.clone(),
            },
            node_template: NodeTemplate {
                labels: pool.labels.clone(),
                annotations: pool.annotations.clone(),
                taints: pool.taints.clone(),
            },
        },
    }
}
