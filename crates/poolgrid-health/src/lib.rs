//! poolgrid-health — deciding when a fleet has settled.
//!
//! After the reconciler writes machine groups, the fleet manager rolls
//! machines in the background. The convergence monitor polls the groups
//! until they are all healthy and fully updated, a machine fails, the
//! ceiling is reached, or the caller shuts down.
//!
//! # Architecture
//!
//! ```text
//! ConvergenceMonitor::wait
//!   ├── list MachineGroups every poll_interval
//!   ├── observe() → Converged | Waiting(progress) | Failed(machine)
//!   │   └── check_machine_group() per desired group
//!   └── ceiling → TimedOut, shutdown signal → Cancelled
//! ```

pub mod checker;
pub mod monitor;

pub use checker::{check_machine_group, GroupUnhealthy};
pub use monitor::{observe, shutdown_signalled, ConvergenceError, ConvergenceMonitor, Observation, Progress};
