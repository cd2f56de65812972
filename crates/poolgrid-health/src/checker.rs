//! Health check for a single machine group.
//!
//! A group is healthy when the fleet manager has acted on its latest spec,
//! reports it available, and reports no stalled progress or replica
//! failures.

use thiserror::Error;

use poolgrid_state::{ConditionStatus, GroupConditionType, MachineGroup};

/// Why a machine group is not healthy yet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupUnhealthy {
    #[error("observed generation outdated ({observed}/{generation})")]
    StaleGeneration { observed: i64, generation: i64 },

    #[error("condition {0:?} is missing")]
    MissingCondition(GroupConditionType),

    #[error("condition {kind:?} has status {actual:?}, expected {expected:?}")]
    ConditionMismatch {
        kind: GroupConditionType,
        actual: ConditionStatus,
        expected: ConditionStatus,
    },
}

/// Conditions that must be present and true.
const REQUIRED_TRUE: &[GroupConditionType] = &[GroupConditionType::Available];
/// Conditions that must be true if the fleet manager reports them.
const OPTIONAL_TRUE: &[GroupConditionType] = &[GroupConditionType::Progressing];
/// Conditions that must be false if the fleet manager reports them.
const OPTIONAL_FALSE: &[GroupConditionType] = &[GroupConditionType::ReplicaFailure];

/// Check whether a machine group is healthy.
pub fn check_machine_group(group: &MachineGroup) -> Result<(), GroupUnhealthy> {
    let status = &group.status;
    if status.observed_generation < group.meta.generation {
        return Err(GroupUnhealthy::StaleGeneration {
            observed: status.observed_generation,
            generation: group.meta.generation,
        });
    }

    for kind in REQUIRED_TRUE {
        let condition = status
            .condition(*kind)
            .ok_or(GroupUnhealthy::MissingCondition(*kind))?;
        expect_status(*kind, condition.status, ConditionStatus::True)?;
    }
    for kind in OPTIONAL_TRUE {
        if let Some(condition) = status.condition(*kind) {
            expect_status(*kind, condition.status, ConditionStatus::True)?;
        }
    }
    for kind in OPTIONAL_FALSE {
        if let Some(condition) = status.condition(*kind) {
            expect_status(*kind, condition.status, ConditionStatus::False)?;
        }
    }
    Ok(())
}

fn expect_status(
    kind: GroupConditionType,
    actual: ConditionStatus,
    expected: ConditionStatus,
) -> Result<(), GroupUnhealthy> {
    if actual == expected {
        Ok(())
    } else {
        Err(GroupUnhealthy::ConditionMismatch {
            kind,
            actual,
            expected,
        })
    }
}
