//! Scaling decision engine — target replicas for one desired pool.
//!
//! Pure: reads the desired pool, the live groups and the cluster state,
//! and returns the replica count the reconciler should write together with
//! the rule that produced it.

use std::fmt;

use tracing::debug;

use poolgrid_core::DesiredPool;
use poolgrid_state::MachineGroup;

/// Everything a decision may look at.
#[derive(Debug, Clone, Copy)]
pub struct ScalingInput<'a> {
    pub pool: &'a DesiredPool,
    /// Every machine group currently in the worker's namespace.
    pub existing: &'a [MachineGroup],
    pub hibernated: bool,
    pub autoscaler_required: bool,
}

impl<'a> ScalingInput<'a> {
    fn existing_group(&self) -> Option<&'a MachineGroup> {
        self.existing.iter().find(|g| g.meta.name == self.pool.name)
    }
}

/// One row of the decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Hibernated,
    AutoscalerNotRequired,
    NewGroup,
    WokeUp,
    BelowMinimum,
    AboveMaximum,
    AutoscalerOwned,
}

/// Precedence order. The first rule returning a target wins.
pub const RULES: [Rule; 7] = [
    Rule::Hibernated,
    Rule::AutoscalerNotRequired,
    Rule::NewGroup,
    Rule::WokeUp,
    Rule::BelowMinimum,
    Rule::AboveMaximum,
    Rule::AutoscalerOwned,
];

impl Rule {
    /// Target replicas if this rule applies, `None` otherwise.
    pub fn evaluate(self, input: &ScalingInput<'_>) -> Option<i32> {
        let pool = input.pool;
        match self {
            Rule::Hibernated => input.hibernated.then_some(0),
            Rule::AutoscalerNotRequired => (!input.autoscaler_required).then_some(pool.minimum),
            Rule::NewGroup => input.existing_group().is_none().then_some(pool.minimum),
            Rule::WokeUp => woke_up(input.hibernated, input.existing).then_some(pool.minimum),
            Rule::BelowMinimum => input
                .existing_group()
                .filter(|g| g.spec.replicas < pool.minimum)
                .map(|_| pool.minimum),
            Rule::AboveMaximum => input
                .existing_group()
                .filter(|g| g.spec.replicas > pool.maximum)
                .map(|_| pool.maximum),
            Rule::AutoscalerOwned => Some(
                input
                    .existing_group()
                    .map(|g| g.spec.replicas)
                    .unwrap_or(pool.minimum),
            ),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rule::Hibernated => "hibernated",
            Rule::AutoscalerNotRequired => "autoscaler-not-required",
            Rule::NewGroup => "new-group",
            Rule::WokeUp => "woke-up",
            Rule::BelowMinimum => "below-minimum",
            Rule::AboveMaximum => "above-maximum",
            Rule::AutoscalerOwned => "autoscaler-owned",
        };
        f.write_str(name)
    }
}

/// Outcome of the decision table for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingDecision {
    pub replicas: i32,
    pub rule: Rule,
}

/// Run the decision table for one pool.
pub fn decide(input: &ScalingInput<'_>) -> ScalingDecision {
    let decision = RULES
        .iter()
        .find_map(|rule| {
            rule.evaluate(input).map(|replicas| ScalingDecision {
                replicas,
                rule: *rule,
            })
        })
        // The last rule always matches.
        .unwrap_or(ScalingDecision {
            replicas: input.pool.minimum,
            rule: Rule::AutoscalerOwned,
        });

    debug!(
        pool = %input.pool.name,
        replicas = decision.replicas,
        rule = %decision.rule,
        "scaling decision"
    );
    decision
}

/// The cluster is awake but every existing group still sits at zero
/// replicas, which is what a hibernated cluster leaves behind.
///
/// There is no persisted wake-up marker, so a fleet the autoscaler has
/// legitimately scaled to zero while awake looks the same.
fn woke_up(hibernated: bool, existing: &[MachineGroup]) -> bool {
    !hibernated && existing.iter().all(|g| g.spec.replicas == 0)
}
