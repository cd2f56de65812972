//! redb table names for the poolgrid object store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized objects).
//! Keys follow the pattern `{namespace}/{name}`.

use redb::TableDefinition;

use crate::types::Resource;

pub const MACHINE_GROUPS: &str = "machine_groups";
pub const MACHINE_CLASSES: &str = "machine_classes";
pub const SECRETS: &str = "secrets";
pub const COMPONENTS: &str = "components";
pub const WORKERS: &str = "workers";
pub const CLUSTERS: &str = "clusters";

/// Every table the store creates on open.
pub const ALL: [&str; 6] = [
    MACHINE_GROUPS,
    MACHINE_CLASSES,
    SECRETS,
    COMPONENTS,
    WORKERS,
    CLUSTERS,
];

/// Table definition for a resource kind.
pub fn table_for<R: Resource>() -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(R::TABLE)
}

/// Table definition by raw name.
pub fn table_named(name: &'static str) -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

/// Whether a namespace or name can be embedded in a key without making
/// namespace prefix scans ambiguous.
pub fn valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains('/')
}

/// Build the composite `{namespace}/{name}` key.
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
