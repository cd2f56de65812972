//! Provider seam.
//!
//! Everything provider-specific lives behind these two traits: turning a
//! worker into desired pools and writing the machine classes those pools
//! reference. The actuator never names a provider.

use std::future::Future;

use poolgrid_core::{ClusterState, DesiredPool};
use poolgrid_state::Worker;

/// Provider logic bound to one worker for one reconciliation.
pub trait WorkerDelegate: Send + Sync {
    /// The desired pools, one per machine group.
    fn generate_deployments(&self) -> impl Future<Output = anyhow::Result<Vec<DesiredPool>>> + Send;

    /// Create or update every machine class (and class secret) the desired
    /// pools reference.
    fn deploy_machine_classes(&self) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Kind of the machine classes this provider manages. Only classes of
    /// this kind are inventoried and garbage collected.
    fn machine_class_kind(&self) -> &str;
}

/// Builds a [`WorkerDelegate`] for a worker.
pub trait DelegateFactory: Send + Sync + 'static {
    type Delegate: WorkerDelegate;

    fn resolve(&self, worker: &Worker, cluster: &ClusterState) -> anyhow::Result<Self::Delegate>;
}
