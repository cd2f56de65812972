//! Actuator error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use poolgrid_health::ConvergenceError;
use poolgrid_state::StateError;

/// The fixed phases of one reconciliation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Delegate,
    Inventory,
    Autoscaler,
    MachineClasses,
    MachineGroups,
    Convergence,
    GarbageCollection,
    Hibernation,
    Status,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Delegate => "delegate",
            Phase::Inventory => "inventory",
            Phase::Autoscaler => "autoscaler",
            Phase::MachineClasses => "machine-classes",
            Phase::MachineGroups => "machine-groups",
            Phase::Convergence => "convergence",
            Phase::GarbageCollection => "garbage-collection",
            Phase::Hibernation => "hibernation",
            Phase::Status => "status",
        };
        f.write_str(name)
    }
}

/// Coarse classification callers branch on (requeue delay, reporting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Delegate,
    Store,
    ConvergenceFailed,
    ConvergenceTimedOut,
    ConflictRetryExhausted,
    DeletionTimedOut,
    Cancelled,
}

/// Errors raised inside a phase.
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("delegate error: {0:#}")]
    Delegate(anyhow::Error),

    #[error("store error: {0}")]
    Store(#[from] StateError),

    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    #[error("gave up updating {key} after {attempts} conflicting attempts: {last}")]
    ConflictRetryExhausted {
        key: String,
        attempts: u32,
        last: StateError,
    },

    #[error("{kind} {key} still present after {after:?}")]
    DeletionTimedOut {
        kind: &'static str,
        key: String,
        after: Duration,
    },

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ActuatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActuatorError::Delegate(_) => ErrorKind::Delegate,
            ActuatorError::Store(_) => ErrorKind::Store,
            ActuatorError::Convergence(e) => match e {
                ConvergenceError::Failed { .. } => ErrorKind::ConvergenceFailed,
                ConvergenceError::TimedOut { .. } => ErrorKind::ConvergenceTimedOut,
                ConvergenceError::Cancelled => ErrorKind::Cancelled,
                ConvergenceError::Store(_) => ErrorKind::Store,
            },
            ActuatorError::ConflictRetryExhausted { .. } => ErrorKind::ConflictRetryExhausted,
            ActuatorError::DeletionTimedOut { .. } => ErrorKind::DeletionTimedOut,
            ActuatorError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

pub type ActuatorResult<T> = Result<T, ActuatorError>;

/// A failed reconciliation: the phase that failed and why.
#[derive(Debug, Error)]
#[error("{phase} phase failed: {source}")]
pub struct ReconcileError {
    pub phase: Phase,
    pub source: ActuatorError,
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Tag a phase result with the phase it came from.
pub(crate) trait InPhase<T> {
    fn in_phase(self, phase: Phase) -> Result<T, ReconcileError>;
}

impl<T, E: Into<ActuatorError>> InPhase<T> for Result<T, E> {
    fn in_phase(self, phase: Phase) -> Result<T, ReconcileError> {
        self.map_err(|e| ReconcileError {
            phase,
            source: e.into(),
        })
    }
}
