//! Convergence monitor — waits for machine groups to settle.
//!
//! Polls the machine groups of one namespace at a fixed interval until
//! the desired groups are healthy and fully rolled out (or, for a
//! hibernated cluster, until no machine is left running). A failed machine
//! ends the wait immediately. The wait is bounded by a ceiling and
//! abandoned promptly when the shutdown signal fires.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use poolgrid_state::{MachineGroup, ObjectStore, StateError};

use crate::checker::check_machine_group;

/// Terminal outcomes of a convergence wait other than success.
#[derive(Debug, Error)]
pub enum ConvergenceError {
    #[error("Machine {machine} failed: {description}")]
    Failed { machine: String, description: String },

    #[error("timed out after {after:?} waiting for machine groups ({progress})")]
    TimedOut { after: Duration, progress: Progress },

    #[error("convergence wait cancelled")]
    Cancelled,

    #[error("failed to list machine groups: {0}")]
    Store(#[from] StateError),
}

/// How far along the fleet is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Awake {
        updated: i32,
        desired: i32,
        healthy_groups: usize,
        wanted_groups: usize,
    },
    Hibernating {
        awake_machines: i32,
    },
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Awake {
                updated,
                desired,
                healthy_groups,
                wanted_groups,
            } => write!(
                f,
                "{updated}/{desired} machines up-to-date, {healthy_groups}/{wanted_groups} groups available"
            ),
            Progress::Hibernating { awake_machines } => {
                write!(f, "{awake_machines} machines still awake")
            }
        }
    }
}

/// Result of looking at the groups once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Converged,
    Waiting(Progress),
    Failed { machine: String, description: String },
}

/// Evaluate one snapshot of the namespace's machine groups.
///
/// `existing` is every group in the namespace, `desired` the names of the
/// groups this reconciliation wants.
pub fn observe(existing: &[MachineGroup], desired: &[String], hibernated: bool) -> Observation {
    if hibernated {
        let awake_machines: i32 = existing.iter().map(|g| g.status.replicas).sum();
        return if awake_machines == 0 {
            Observation::Converged
        } else {
            Observation::Waiting(Progress::Hibernating { awake_machines })
        };
    }

    if let Some(failed) = existing.iter().flat_map(|g| &g.status.failed_machines).next() {
        return Observation::Failed {
            machine: failed.name.clone(),
            description: failed.description.clone(),
        };
    }

    let mut healthy_groups = 0;
    let mut updated = 0;
    let mut desired_replicas = 0;
    for group in existing.iter().filter(|g| desired.contains(&g.meta.name)) {
        match check_machine_group(group) {
            Ok(()) => healthy_groups += 1,
            Err(reason) => debug!(group = %group.meta.name, %reason, "machine group not healthy yet"),
        }
        desired_replicas += group.spec.replicas;
        updated += group.status.updated_replicas;
    }

    if updated >= desired_replicas && healthy_groups == desired.len() {
        Observation::Converged
    } else {
        Observation::Waiting(Progress::Awake {
            updated,
            desired: desired_replicas,
            healthy_groups,
            wanted_groups: desired.len(),
        })
    }
}

/// Polls one namespace until its machine groups converge.
pub struct ConvergenceMonitor<S> {
    store: S,
    namespace: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl<S: ObjectStore> ConvergenceMonitor<S> {
    pub fn new(store: S, namespace: &str, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            poll_interval,
            timeout,
        }
    }

    /// Block until converged, failed, timed out or cancelled.
    pub async fn wait(
        &self,
        desired: &[String],
        hibernated: bool,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ConvergenceError> {
        let started = Instant::now();
        let deadline = started + self.timeout;

        loop {
            let groups: Vec<MachineGroup> = self.store.list(&self.namespace)?;
            let progress = match observe(&groups, desired, hibernated) {
                Observation::Converged => {
                    info!(
                        namespace = %self.namespace,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "machine groups converged"
                    );
                    return Ok(());
                }
                Observation::Failed {
                    machine,
                    description,
                } => {
                    warn!(namespace = %self.namespace, %machine, %description, "machine failed");
                    return Err(ConvergenceError::Failed {
                        machine,
                        description,
                    });
                }
                Observation::Waiting(progress) => progress,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(ConvergenceError::TimedOut {
                    after: self.timeout,
                    progress,
                });
            }

            match progress {
                Progress::Awake { .. } => {
                    info!(namespace = %self.namespace, %progress, "waiting until all desired machines are ready")
                }
                Progress::Hibernating { .. } => {
                    info!(namespace = %self.namespace, %progress, "waiting until all machines are hibernated")
                }
            }

            let wake = (now + self.poll_interval).min(deadline);
            tokio::select! {
                _ = tokio::time::sleep_until(wake) => {}
                _ = shutdown_signalled(shutdown) => {
                    info!(namespace = %self.namespace, "convergence wait cancelled");
                    return Err(ConvergenceError::Cancelled);
                }
            }
        }
    }
}

/// Resolves once the shutdown flag is set.
///
/// Never resolves if the sender is gone without having signalled.
pub async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
