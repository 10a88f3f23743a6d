//! Scopegraph Core - Partially materialized elements and graph commands
//!
//! This crate provides:
//! - The element model with per-facet load state
//! - A materialization tracker issuing minimal fetches
//! - An element store interface with a SQLite implementation
//! - Immutable, filtered graph snapshots built from type/scope loaders
//! - Graph-consuming commands, including orphan scenario cleanup

pub mod builder;
pub mod cleanup;
pub mod command;
pub mod element;
pub mod graph;
pub mod loader;
pub mod retriever;
pub mod store;

// Element model re-exports
pub use element::{
    Element, ElementId, Entity, Facet, FacetKind, FacetSet, Link, Materialized, Permission,
    Property, PropertyGroup, RelationId, ScopeId, TypeId,
};

// Store re-exports
pub use store::{
    Dataset, DatasetElement, DatasetLink, ElementStore, NewElement, SqliteStore, StoreCounts,
    StoreError, STORE_SCHEMA_VERSION,
};

// Graph re-exports
pub use builder::GraphBuilder;
pub use graph::{ElementGraph, GraphStats};
pub use loader::{Loader, RelationFilter};
pub use retriever::{RetrievalError, Retriever, RetrieverStats};

// Command re-exports
pub use cleanup::{Cleaner, CleanupReport, CleanupSchema, RemovedElement};
pub use command::{
    CommandError, CommandService, GraphCommand, GraphSpec, Mutation, RecordingCommandService,
    RemoveElement,
};
