//! Graph Builder
//!
//! This module provides the `GraphBuilder` struct for constructing an
//! [`ElementGraph`] from a set of [`Loader`]s and a [`RelationFilter`].
//!
//! ## Usage
//!
//! ```ignore
//! use scopegraph_core::{GraphBuilder, Loader, RelationFilter, SqliteStore};
//!
//! let store = SqliteStore::open(path)?;
//! let builder = GraphBuilder::new(&store);
//! let graph = builder.build(
//!     &[Loader::for_type("asset").in_scope(7)],
//!     RelationFilter::NodesOnly,
//! )?;
//! ```

use std::collections::HashSet;

use tracing::{debug, info};

use crate::element::{Element, ElementId, FacetSet};
use crate::graph::ElementGraph;
use crate::loader::{Loader, RelationFilter};
use crate::retriever::{RetrievalError, Retriever};
use crate::store::ElementStore;

/// Builds immutable graph snapshots from the element store.
///
/// Each loader costs one store query. Link facets of the whole node set are
/// then materialized with a single batch fetch, skipped entirely for
/// node-only graphs.
pub struct GraphBuilder<'a> {
    retriever: Retriever<'a>,
}

impl<'a> GraphBuilder<'a> {
    /// Create a builder over `store`
    pub fn new(store: &'a dyn ElementStore) -> Self {
        Self {
            retriever: Retriever::new(store),
        }
    }

    /// Create a builder sharing an existing retriever's store
    pub fn with_retriever(retriever: Retriever<'a>) -> Self {
        Self { retriever }
    }

    /// The retriever used for link materialization
    pub fn retriever(&self) -> &Retriever<'a> {
        &self.retriever
    }

    /// The backing store
    pub fn store(&self) -> &'a dyn ElementStore {
        self.retriever.store()
    }

    /// Build a graph over the union of `loaders`, with edges restricted to
    /// `relations`.
    pub fn build(
        &self,
        loaders: &[Loader],
        relations: RelationFilter,
    ) -> Result<ElementGraph, RetrievalError> {
        let relations = relations.normalized();

        // Phase 1: select nodes (first occurrence wins)
        let mut seen: HashSet<ElementId> = HashSet::new();
        let mut nodes: Vec<Element> = Vec::new();
        for loader in loaders {
            let found = self
                .store()
                .query_by_type_and_scope(&loader.type_list(), loader.scope_id)
                .map_err(|source| RetrievalError::Query { source })?;
            debug!("Loader {} matched {} elements", loader, found.len());

            for element in found {
                if seen.insert(element.id) {
                    nodes.push(element);
                }
            }
        }

        // Phase 2: materialize links unless edges are not wanted
        if relations.loads_links() {
            nodes = self.retriever.ensure_all(nodes, FacetSet::links())?;
        } else {
            debug!("Node-only graph, skipping link materialization");
        }

        let mut graph = ElementGraph::new(relations.clone());
        let mut links = Vec::new();
        for element in nodes {
            if relations.loads_links() {
                links.extend(element.links_down().unwrap_or_default().iter().cloned());
                links.extend(element.links_up().unwrap_or_default().iter().cloned());
            }
            graph.insert_element(element);
        }

        // Phase 3: edge index
        let mut filtered = 0usize;
        let mut dangling = 0usize;
        for link in links {
            if !relations.accepts(&link.relation_id) {
                filtered += 1;
                continue;
            }
            if !graph.contains(link.source) || !graph.contains(link.target) {
                dangling += 1;
                continue;
            }
            graph.insert_edge(link.source, link.target, link.relation_id);
        }

        if filtered > 0 || dangling > 0 {
            debug!(
                "Dropped links: {} outside relation filter, {} with endpoint outside graph",
                filtered, dangling
            );
        }
        info!(
            "Built graph: {} nodes, {} edges ({})",
            graph.node_count(),
            graph.edge_count(),
            relations
        );

        Ok(graph)
    }
}
