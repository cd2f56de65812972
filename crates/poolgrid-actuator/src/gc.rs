//! Garbage collection of objects the desired state no longer mentions.
//!
//! Runs only after the fleet has converged on the desired groups, so the
//! machines of a replaced group have already moved. Order matters: groups
//! go first so no live group ever references a deleted class, and classes
//! go before the secrets they point at.

use std::collections::BTreeSet;

use tracing::info;

use poolgrid_core::DesiredPool;
use poolgrid_state::{MachineClass, MachineGroup, ObjectStore, Secret, StateResult};

/// What one collection pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GarbageReport {
    pub machine_groups: Vec<String>,
    pub machine_classes: Vec<String>,
    pub secrets: Vec<String>,
}

impl GarbageReport {
    pub fn is_empty(&self) -> bool {
        self.machine_groups.is_empty() && self.machine_classes.is_empty() && self.secrets.is_empty()
    }
}

/// Names of the machine classes of `kind` in a namespace.
pub fn class_names<S: ObjectStore>(store: &S, namespace: &str, kind: &str) -> StateResult<BTreeSet<String>> {
    let classes: Vec<MachineClass> = store.list(namespace)?;
    Ok(classes
        .into_iter()
        .filter(|c| c.kind == kind)
        .map(|c| c.meta.name)
        .collect())
}

/// Delete groups, classes of `class_kind` and class secrets that `desired`
/// does not account for.
pub fn collect_garbage<S: ObjectStore>(
    store: &S,
    namespace: &str,
    class_kind: &str,
    desired: &[DesiredPool],
) -> StateResult<GarbageReport> {
    let mut report = GarbageReport::default();

    let wanted_groups: BTreeSet<&str> = desired.iter().map(|p| p.name.as_str()).collect();
    let groups: Vec<MachineGroup> = store.list(namespace)?;
    for group in groups.iter().filter(|g| !wanted_groups.contains(g.meta.name.as_str())) {
        store.delete::<MachineGroup>(namespace, &group.meta.name)?;
        info!(%namespace, group = %group.meta.name, "orphaned machine group deleted");
        report.machine_groups.push(group.meta.name.clone());
    }

    let wanted_classes: BTreeSet<&str> = desired.iter().map(|p| p.class_name.as_str()).collect();
    let classes: Vec<MachineClass> = store.list(namespace)?;
    let mut referenced_secrets = BTreeSet::new();
    for class in classes.iter().filter(|c| c.kind == class_kind) {
        if wanted_classes.contains(class.meta.name.as_str()) {
            referenced_secrets.insert(class.secret_ref.as_str());
            continue;
        }
        store.delete::<MachineClass>(namespace, &class.meta.name)?;
        info!(%namespace, class = %class.meta.name, "orphaned machine class deleted");
        report.machine_classes.push(class.meta.name.clone());
    }

    let secrets: Vec<Secret> = store.list(namespace)?;
    for secret in secrets
        .iter()
        .filter(|s| s.is_machine_class_secret() && !referenced_secrets.contains(s.meta.name.as_str()))
    {
        store.delete::<Secret>(namespace, &secret.meta.name)?;
        info!(%namespace, secret = %secret.meta.name, "orphaned machine class secret deleted");
        report.secrets.push(secret.meta.name.clone());
    }

    Ok(report)
}
