//! poolgrid-scaling — who gets to set a machine group's replica count.
//!
//! The reconciler and an external autoscaler both want to write
//! `spec.replicas`. The decision engine settles it with an ordered rule
//! list evaluated per pool; the first rule that matches decides:
//!
//! ```text
//! 1. cluster hibernated                     -> 0
//! 2. pool has no autoscaler (min == max)    -> minimum
//! 3. group does not exist yet               -> minimum
//! 4. cluster just woke up (all groups at 0) -> minimum
//! 5. replicas below minimum                 -> minimum
//! 6. replicas above maximum                 -> maximum
//! 7. otherwise                              -> keep current (autoscaler owns it)
//! ```
//!
//! `distribute` splits a pool's bounds across availability zones.

pub mod decision;
pub mod distribute;

pub use decision::{decide, Rule, ScalingDecision, ScalingInput, RULES};
pub use distribute::{distribute_over_zones, distribute_positive_int_or_percent};
