//! Common test utilities for integration tests.
//!
//! Provides the shared dataset fixture and a store double that counts calls.

#![allow(dead_code)]

use scopegraph_core::{
    Dataset, Element, ElementId, ElementStore, FacetSet, ScopeId, SqliteStore, StoreError, TypeId,
};
use std::cell::Cell;
use std::path::{Path, PathBuf};

/// Path of the shared dataset fixture
pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/risk_scopes.json")
}

/// Load the shared dataset fixture
pub fn fixture_dataset() -> Dataset {
    Dataset::load(&fixture_path()).expect("Failed to load fixture dataset")
}

/// In-memory store seeded with the fixture
pub fn seeded_store() -> SqliteStore {
    let store = SqliteStore::in_memory().expect("Failed to create store");
    store
        .import_dataset(&fixture_dataset())
        .expect("Failed to import fixture");
    store
}

/// On-disk store seeded with the fixture
pub fn seeded_store_at(path: &Path) -> SqliteStore {
    let store = SqliteStore::create(path).expect("Failed to create store");
    store
        .import_dataset(&fixture_dataset())
        .expect("Failed to import fixture");
    store
}

/// Store wrapper counting every call to the inner store
pub struct CountingStore<'a> {
    inner: &'a dyn ElementStore,
    pub queries: Cell<usize>,
    pub fetches: Cell<usize>,
    pub batches: Cell<usize>,
}

impl<'a> CountingStore<'a> {
    pub fn new(inner: &'a dyn ElementStore) -> Self {
        Self {
            inner,
            queries: Cell::new(0),
            fetches: Cell::new(0),
            batches: Cell::new(0),
        }
    }

    /// Total number of store round trips
    pub fn calls(&self) -> usize {
        self.queries.get() + self.fetches.get() + self.batches.get()
    }
}

impl ElementStore for CountingStore<'_> {
    fn query_by_type_and_scope(
        &self,
        type_ids: &[TypeId],
        scope_id: Option<ScopeId>,
    ) -> Result<Vec<Element>, StoreError> {
        self.queries.set(self.queries.get() + 1);
        self.inner.query_by_type_and_scope(type_ids, scope_id)
    }

    fn fetch(&self, id: ElementId, facets: FacetSet) -> Result<Element, StoreError> {
        self.fetches.set(self.fetches.get() + 1);
        self.inner.fetch(id, facets)
    }

    fn fetch_many(&self, ids: &[ElementId], facets: FacetSet) -> Result<Vec<Element>, StoreError> {
        self.batches.set(self.batches.get() + 1);
        self.inner.fetch_many(ids, facets)
    }
}

/// Ids of a list of elements
pub fn ids<'a>(elements: impl IntoIterator<Item = &'a Element>) -> Vec<i64> {
    elements.into_iter().map(|e| e.id.0).collect()
}
