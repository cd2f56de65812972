//! poolgrid-state — the object store the reconciler talks to.
//!
//! Backed by [redb](https://docs.rs/redb). Every cluster-resident object
//! (machine groups, machine classes, secrets, component deployments,
//! workers, clusters) is a [`Resource`] stored as JSON under the key
//! `{namespace}/{name}` in its kind's table.
//!
//! # Concurrency
//!
//! Each object carries a `resource_version` that the store bumps on every
//! write. [`ObjectStore::update`] is a compare-and-swap on that version and
//! fails with [`StateError::Conflict`] when another writer got there first.
//! Callers decide whether to retry; the store never does.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{ObjectStore, StateStore};
pub use types::*;
