//! poolgrid rolling updates — turning a desired pool into a machine group.
//!
//! The fleet manager performs the actual rolling replacement of machines;
//! this crate only writes the machine group objects that drive it.
//!
//! # Components
//!
//! - **`template`** — Desired group spec for a pool (selector, rolling update, node template)
//! - **`apply`** — Create-or-update of one group, writing only when something changed

pub mod apply;
pub mod template;

pub use apply::{ApplyOutcome, DeploymentApplier};
pub use template::{desired_spec, selector_labels, POOL_NAME_LABEL};
