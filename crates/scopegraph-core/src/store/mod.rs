//! Element Store
//!
//! This module provides the storage boundary for elements:
//! - [`ElementStore`]: the query/fetch interface consumed by the retriever
//!   and the graph builder
//! - [`SqliteStore`]: the bundled SQLite implementation
//! - [`Dataset`]: a JSON interchange format for seeding a store
//!
//! # Architecture
//!
//! ```text
//! ElementStore (trait)
//! ├── query_by_type_and_scope  → shallow elements (all facets unfetched)
//! ├── fetch                    → one element with the requested facets
//! └── fetch_many               → batch variant, order preserved
//!
//! SqliteStore
//! ├── elements     (base rows, parent reference, child position)
//! ├── properties   (attribute groups)
//! ├── links        (typed relations)
//! └── permissions  (role grants)
//! ```

pub mod dataset;
pub mod schema;
pub mod sqlite;

use crate::element::{Element, ElementId, FacetSet, ScopeId, TypeId};
use thiserror::Error;

pub use dataset::{Dataset, DatasetElement, DatasetLink};
pub use schema::STORE_SCHEMA_VERSION;
pub use sqlite::{NewElement, SqliteStore, StoreCounts};

/// Errors raised by element store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: String, found: String },

    #[error("Element not found: {0}")]
    ElementNotFound(ElementId),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Query and fetch interface of the backing store.
///
/// Both operations are treated as opaque, potentially failing remote calls.
pub trait ElementStore {
    /// Find every element whose type is in `type_ids` inside `scope_id`.
    ///
    /// An empty `type_ids` slice matches every type; a `None` scope matches
    /// every scope. Returned elements are shallow: no facet is fetched.
    fn query_by_type_and_scope(
        &self,
        type_ids: &[TypeId],
        scope_id: Option<ScopeId>,
    ) -> Result<Vec<Element>, StoreError>;

    /// Fetch one element with the requested facets materialized.
    fn fetch(&self, id: ElementId, facets: FacetSet) -> Result<Element, StoreError>;

    /// Fetch several elements with the same facet request.
    ///
    /// The result has one element per id, in the order of `ids`.
    fn fetch_many(&self, ids: &[ElementId], facets: FacetSet) -> Result<Vec<Element>, StoreError> {
        ids.iter().map(|id| self.fetch(*id, facets)).collect()
    }
}
