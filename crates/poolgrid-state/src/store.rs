//! StateStore — redb-backed object persistence for poolgrid.
//!
//! Provides generic CRUD over every [`Resource`] kind. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::{self, table_for, table_named};
use crate::types::Resource;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// The create/read/update/delete capability the reconciler consumes.
///
/// Reads observe every write that completed before them. `update` is a
/// compare-and-swap on `meta.resource_version`.
pub trait ObjectStore: Clone + Send + Sync + 'static {
    fn get<R: Resource>(&self, namespace: &str, name: &str) -> StateResult<Option<R>>;

    /// All objects of a kind in one namespace, ordered by name.
    fn list<R: Resource>(&self, namespace: &str) -> StateResult<Vec<R>>;

    /// All objects of a kind across namespaces.
    fn list_all<R: Resource>(&self) -> StateResult<Vec<R>>;

    /// Store a new object. Fails with `AlreadyExists` if the key is taken.
    fn create<R: Resource>(&self, obj: &R) -> StateResult<R>;

    /// Replace an object whose `resource_version` still matches the stored one.
    fn update<R: Resource>(&self, obj: &R) -> StateResult<R>;

    /// Remove an object. Returns true if it existed.
    fn delete<R: Resource>(&self, namespace: &str, name: &str) -> StateResult<bool>;
}

/// Thread-safe object store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "object store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory object store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for name in tables::ALL {
            txn.open_table(table_named(name)).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn scan<R: Resource>(&self, prefix: Option<&str>) -> StateResult<Vec<R>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for::<R>()).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if prefix.is_some_and(|p| !key.value().starts_with(p)) {
                continue;
            }
            let obj: R = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(obj);
        }
        Ok(results)
    }

    fn write<R: Resource>(&self, obj: &R, expect_existing: bool) -> StateResult<R> {
        let key = obj.table_key();
        if !(tables::valid_segment(obj.namespace()) && tables::valid_segment(obj.name())) {
            return Err(StateError::InvalidKey { kind: R::KIND, key });
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored = {
            let mut table = txn.open_table(table_for::<R>()).map_err(map_err!(Table))?;
            let current = table
                .get(key.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec());

            let mut next = obj.clone();
            match (current, expect_existing) {
                (Some(_), false) => {
                    return Err(StateError::AlreadyExists {
                        kind: R::KIND,
                        key,
                    });
                }
                (None, true) => {
                    return Err(StateError::NotFound {
                        kind: R::KIND,
                        key,
                    });
                }
                (None, false) => {
                    let meta = next.meta_mut();
                    meta.resource_version = 1;
                    meta.generation = meta.generation.max(1);
                }
                (Some(bytes), true) => {
                    let existing: R =
                        serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
                    let actual = existing.meta().resource_version;
                    let expected = obj.meta().resource_version;
                    if actual != expected {
                        return Err(StateError::Conflict {
                            kind: R::KIND,
                            key,
                            expected,
                            actual,
                        });
                    }
                    next.meta_mut().resource_version = actual + 1;
                }
            }

            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            next
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            kind = R::KIND,
            %key,
            version = stored.meta().resource_version,
            "object stored"
        );
        Ok(stored)
    }
}

impl ObjectStore for StateStore {
    fn get<R: Resource>(&self, namespace: &str, name: &str) -> StateResult<Option<R>> {
        let key = tables::object_key(namespace, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for::<R>()).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let obj: R =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(obj))
            }
            None => Ok(None),
        }
    }

    fn list<R: Resource>(&self, namespace: &str) -> StateResult<Vec<R>> {
        let prefix = format!("{namespace}/");
        self.scan(Some(&prefix))
    }

    fn list_all<R: Resource>(&self) -> StateResult<Vec<R>> {
        self.scan(None)
    }

    fn create<R: Resource>(&self, obj: &R) -> StateResult<R> {
        self.write(obj, false)
    }

    fn update<R: Resource>(&self, obj: &R) -> StateResult<R> {
        self.write(obj, true)
    }

    fn delete<R: Resource>(&self, namespace: &str, name: &str) -> StateResult<bool> {
        let key = tables::object_key(namespace, name);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table_for::<R>()).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = R::KIND, %key, existed, "object deleted");
        Ok(existed)
    }
}
