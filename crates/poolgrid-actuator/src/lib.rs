//! poolgrid-actuator — reconciling workers into machine groups.
//!
//! Ties the pieces together: a provider delegate produces desired pools,
//! the scaling engine picks replica counts, the rollout crate writes
//! machine groups, the health crate waits for the fleet to settle, and
//! this crate cleans up and reports.
//!
//! # Architecture
//!
//! ```text
//! Controller (work queue, bounded parallelism, requeue)
//!   └── Actuator::reconcile(worker, cluster)
//!       ├── DelegateFactory → WorkerDelegate (desired pools, classes)
//!       ├── components (autoscaler removal, fleet manager scale-down)
//!       ├── poolgrid-scaling::decide + poolgrid-rollout::DeploymentApplier
//!       ├── poolgrid-health::ConvergenceMonitor
//!       ├── gc (groups → classes → secrets)
//!       └── status (worker status, CAS with backoff)
//! ```

pub mod actuator;
pub mod components;
pub mod controller;
pub mod delegate;
pub mod error;
pub mod gc;
pub mod status;

pub use actuator::{Actuator, PoolOutcome, ReconcileReport};
pub use controller::{cluster_state, Controller, ControllerHandle, WorkerKey};
pub use delegate::{DelegateFactory, WorkerDelegate};
pub use error::{ActuatorError, ActuatorResult, ErrorKind, Phase, ReconcileError};
pub use gc::GarbageReport;
