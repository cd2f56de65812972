//! Object types held in the poolgrid object store.
//!
//! These mirror the cluster-resident objects the reconciler reads and
//! writes. All types are serializable to/from JSON for storage in redb
//! tables.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use poolgrid_core::{IntOrPercent, Taint, TaintEffect};

use crate::tables;

/// Label marking secrets that exist only to back a machine class.
pub const PURPOSE_LABEL: &str = "poolgrid.io/purpose";
/// Value of [`PURPOSE_LABEL`] on machine class secrets.
pub const PURPOSE_MACHINE_CLASS: &str = "machineclass";

/// Identity and versioning shared by every stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    /// Bumped by the store on every successful write.
    #[serde(default)]
    pub resource_version: u64,
    /// Bumped by writers when the object's spec changes.
    #[serde(default)]
    pub generation: i64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn key(&self) -> String {
        tables::object_key(&self.namespace, &self.name)
    }
}

/// A kind of object the store knows how to persist.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Human-readable kind, used in errors and logs.
    const KIND: &'static str;
    /// redb table holding this kind.
    const TABLE: &'static str;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn namespace(&self) -> &str {
        &self.meta().namespace
    }

    fn table_key(&self) -> String {
        self.meta().key()
    }
}

macro_rules! impl_resource {
    ($ty:ty, $kind:literal, $table:expr) => {
        impl Resource for $ty {
            const KIND: &'static str = $kind;
            const TABLE: &'static str = $table;

            fn meta(&self) -> &ObjectMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.meta
            }
        }
    };
}

// ── Machine groups ────────────────────────────────────────────────

/// A replicated set of machines sharing one template, rolled by the
/// fleet manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineGroup {
    pub meta: ObjectMeta,
    pub spec: MachineGroupSpec,
    /// Written by the fleet manager, never by the reconciler.
    #[serde(default)]
    pub status: MachineGroupStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineGroupSpec {
    pub replicas: i32,
    pub min_ready_seconds: u32,
    pub strategy: RollingUpdateStrategy,
    pub selector: BTreeMap<String, String>,
    pub template: MachineTemplate,
}

/// Rolling update parameters for a machine group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingUpdateStrategy {
    pub max_surge: IntOrPercent,
    pub max_unavailable: IntOrPercent,
}

/// Template every machine in the group is created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineTemplate {
    pub labels: BTreeMap<String, String>,
    pub class: ClassRef,
    pub node_template: NodeTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRef {
    pub kind: String,
    pub name: String,
}

/// Metadata and taints stamped onto the node each machine registers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTemplate {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineGroupStatus {
    /// Generation of the spec the fleet manager last acted on.
    pub observed_generation: i64,
    pub replicas: i32,
    pub updated_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    #[serde(default)]
    pub failed_machines: Vec<FailedMember>,
    #[serde(default)]
    pub conditions: Vec<GroupCondition>,
}

/// A machine the fleet manager gave up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMember {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCondition {
    #[serde(rename = "type")]
    pub kind: GroupConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupConditionType {
    Available,
    Progressing,
    ReplicaFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl MachineGroupStatus {
    pub fn condition(&self, kind: GroupConditionType) -> Option<&GroupCondition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }
}

impl_resource!(MachineGroup, "MachineGroup", tables::MACHINE_GROUPS);

// ── Machine classes and their secrets ─────────────────────────────

/// Provider-specific machine configuration referenced by a group template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineClass {
    pub meta: ObjectMeta,
    /// Provider kind; each delegate only manages classes of its own kind.
    pub kind: String,
    /// Opaque provider configuration.
    #[serde(default)]
    pub provider_spec: serde_json::Value,
    /// Name of the secret holding the credentials this class uses.
    pub secret_ref: String,
}

impl_resource!(MachineClass, "MachineClass", tables::MACHINE_CLASSES);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    pub fn is_machine_class_secret(&self) -> bool {
        self.meta.labels.get(PURPOSE_LABEL).map(String::as_str) == Some(PURPOSE_MACHINE_CLASS)
    }
}

impl_resource!(Secret, "Secret", tables::SECRETS);

// ── Components ────────────────────────────────────────────────────

/// A control-plane component running next to the fleet (the external
/// autoscaler, the fleet manager itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDeployment {
    pub meta: ObjectMeta,
    pub replicas: i32,
}

impl_resource!(ComponentDeployment, "ComponentDeployment", tables::COMPONENTS);

// ── Workers ───────────────────────────────────────────────────────

/// The declared worker-pool specification for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub meta: ObjectMeta,
    pub spec: WorkerSpec,
    #[serde(default)]
    pub status: WorkerStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Secret holding the cloud credentials machine classes are built from.
    pub secret_ref: String,
    #[serde(default)]
    pub region: String,
    pub pools: Vec<WorkerPool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPool {
    pub name: String,
    pub machine_type: String,
    pub machine_image: MachineImage,
    pub minimum: i32,
    pub maximum: i32,
    pub max_surge: IntOrPercent,
    pub max_unavailable: IntOrPercent,
    /// Zones the pool is spread across; empty means a single unzoned group.
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineImage {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Realized pools, in the order the delegate produced them.
    #[serde(default)]
    pub machine_deployments: Vec<PoolStatus>,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// The persisted outcome for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
}

impl_resource!(Worker, "Worker", tables::WORKERS);

// ── Clusters ──────────────────────────────────────────────────────

/// Cluster-level facts the daemon turns into a `ClusterState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub hibernated: bool,
}

impl_resource!(Cluster, "Cluster", tables::CLUSTERS);
