//! Shared types used across poolgrid crates.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A quantity that is either an absolute count or a percentage.
///
/// Serialized as a plain integer (`1`) or a percent string (`"25%"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawIntOrPercent", into = "RawIntOrPercent")]
pub enum IntOrPercent {
    Int(i32),
    Percent(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid int-or-percent value: {0:?}")]
pub struct InvalidIntOrPercent(pub String);

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawIntOrPercent {
    Int(i32),
    Str(String),
}

impl TryFrom<RawIntOrPercent> for IntOrPercent {
    type Error = InvalidIntOrPercent;

    fn try_from(raw: RawIntOrPercent) -> Result<Self, Self::Error> {
        match raw {
            RawIntOrPercent::Int(n) => Ok(IntOrPercent::Int(n)),
            RawIntOrPercent::Str(s) => s.parse(),
        }
    }
}

impl From<IntOrPercent> for RawIntOrPercent {
    fn from(value: IntOrPercent) -> Self {
        match value {
            IntOrPercent::Int(n) => RawIntOrPercent::Int(n),
            IntOrPercent::Percent(p) => RawIntOrPercent::Str(format!("{p}%")),
        }
    }
}

impl std::str::FromStr for IntOrPercent {
    type Err = InvalidIntOrPercent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(pct) = trimmed.strip_suffix('%') {
            return pct
                .parse::<u32>()
                .map(IntOrPercent::Percent)
                .map_err(|_| InvalidIntOrPercent(s.to_string()));
        }
        trimmed
            .parse::<i32>()
            .map(IntOrPercent::Int)
            .map_err(|_| InvalidIntOrPercent(s.to_string()))
    }
}

impl fmt::Display for IntOrPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntOrPercent::Int(n) => write!(f, "{n}"),
            IntOrPercent::Percent(p) => write!(f, "{p}%"),
        }
    }
}

/// Scheduling effect of a node taint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

/// A taint placed on every node created from a machine group template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub effect: TaintEffect,
}

/// One machine pool as the worker delegate wants it to exist.
///
/// Regenerated on every reconciliation. Correlated with the live machine
/// group purely by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredPool {
    pub name: String,
    pub class_name: String,
    pub minimum: i32,
    pub maximum: i32,
    pub max_surge: IntOrPercent,
    pub max_unavailable: IntOrPercent,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
}

impl DesiredPool {
    /// An external autoscaler only has room to act when the bounds differ.
    pub fn autoscaler_required(&self) -> bool {
        self.maximum > self.minimum
    }
}

/// Whether any of the given pools needs the external autoscaler.
pub fn autoscaler_required(pools: &[DesiredPool]) -> bool {
    pools.iter().any(DesiredPool::autoscaler_required)
}

/// Read-only snapshot of the cluster facts that steer one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    pub hibernated: bool,
}
