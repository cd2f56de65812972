//! Control of the components running next to the fleet.
//!
//! The external autoscaler is removed while a rolling update or
//! hibernation is in progress so it cannot fight the reconciler over
//! replica counts. The fleet manager is scaled to zero once a hibernated
//! cluster has no machines left.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use poolgrid_health::shutdown_signalled;
use poolgrid_state::{ComponentDeployment, ObjectStore, Resource, StateError, tables};

use crate::error::{ActuatorError, ActuatorResult};

/// Delete a component and wait until it is observed gone.
///
/// A component that is already absent counts as removed.
pub async fn remove_component<S: ObjectStore>(
    store: &S,
    namespace: &str,
    name: &str,
    poll_interval: Duration,
    timeout: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> ActuatorResult<()> {
    let existed = store.delete::<ComponentDeployment>(namespace, name)?;
    if existed {
        info!(%namespace, component = %name, "component deletion requested");
    } else {
        debug!(%namespace, component = %name, "component already absent");
    }

    let deadline = Instant::now() + timeout;
    loop {
        let current: Option<ComponentDeployment> = store.get(namespace, name)?;
        if current.is_none() {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ActuatorError::DeletionTimedOut {
                kind: ComponentDeployment::KIND,
                key: tables::object_key(namespace, name),
                after: timeout,
            });
        }

        debug!(%namespace, component = %name, "waiting for component to disappear");
        tokio::select! {
            _ = tokio::time::sleep_until((now + poll_interval).min(deadline)) => {}
            _ = shutdown_signalled(shutdown) => return Err(ActuatorError::Cancelled),
        }
    }
}

/// Set a component's replica count. The component must exist.
pub fn scale_component<S: ObjectStore>(
    store: &S,
    namespace: &str,
    name: &str,
    replicas: i32,
) -> ActuatorResult<()> {
    let mut component: ComponentDeployment =
        store
            .get(namespace, name)?
            .ok_or_else(|| StateError::NotFound {
                kind: ComponentDeployment::KIND,
                key: tables::object_key(namespace, name),
            })?;

    if component.replicas == replicas {
        debug!(%namespace, component = %name, replicas, "component already at scale");
        return Ok(());
    }

    let from = component.replicas;
    component.replicas = replicas;
    store.update(&component)?;
    info!(%namespace, component = %name, from, to = replicas, "component scaled");
    Ok(())
}
