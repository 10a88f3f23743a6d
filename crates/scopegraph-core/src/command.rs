//! Graph-consuming commands and the mutation service
//!
//! A [`GraphCommand`] declares which graph it needs through a [`GraphSpec`],
//! receives the built snapshot, and runs its logic against it. Writes go
//! through a [`CommandService`], never through the graph.

use crate::builder::GraphBuilder;
use crate::element::{Element, ElementId, RelationId, TypeId};
use crate::graph::ElementGraph;
use crate::loader::{Loader, RelationFilter};
use crate::retriever::RetrievalError;
use crate::store::{SqliteStore, StoreError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Errors raised by graph commands and mutation services
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command '{command}' failed: {source}")]
    Execution {
        command: String,
        #[source]
        source: StoreError,
    },

    #[error("Command '{command}' rejected: {reason}")]
    Rejected { command: String, reason: String },

    #[error("Graph construction failed: {0}")]
    Retrieval(#[from] RetrievalError),
}

// ============================================================================
// Graph requirements
// ============================================================================

/// Declared graph requirements of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSpec {
    pub loaders: Vec<Loader>,
    /// Resolve edges at all
    pub load_links: bool,
    /// Relation types to keep; empty keeps every relation
    pub relation_ids: Vec<RelationId>,
}

impl Default for GraphSpec {
    fn default() -> Self {
        Self {
            loaders: Vec::new(),
            load_links: true,
            relation_ids: Vec::new(),
        }
    }
}

impl GraphSpec {
    /// Create an empty graph spec that loads every relation
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_loader(&mut self, loader: Loader) -> &mut Self {
        self.loaders.push(loader);
        self
    }

    pub fn add_relation_id(&mut self, relation_id: impl Into<RelationId>) -> &mut Self {
        let relation_id = relation_id.into();
        if !self.relation_ids.contains(&relation_id) {
            self.relation_ids.push(relation_id);
        }
        self
    }

    pub fn set_load_links(&mut self, load_links: bool) -> &mut Self {
        self.load_links = load_links;
        self
    }

    /// Edge filter implied by this graph spec
    pub fn relation_filter(&self) -> RelationFilter {
        if !self.load_links {
            RelationFilter::NodesOnly
        } else if self.relation_ids.is_empty() {
            RelationFilter::All
        } else {
            RelationFilter::only(self.relation_ids.iter().cloned())
        }
    }
}

/// A command that runs against a freshly built graph snapshot.
///
/// Implementors provide [`graph_spec`](Self::graph_spec) and
/// [`execute_with_graph`](Self::execute_with_graph); the provided
/// [`execute`](Self::execute) builds the graph and hands it over.
pub trait GraphCommand {
    type Output;

    /// Graph this command needs
    fn graph_spec(&self) -> &GraphSpec;

    /// Command logic; the graph is the only data source
    fn execute_with_graph(&mut self, graph: &ElementGraph) -> Result<Self::Output, CommandError>;

    /// Build the declared graph, then run the command against it
    fn execute(&mut self, builder: &GraphBuilder<'_>) -> Result<Self::Output, CommandError> {
        let spec = self.graph_spec();
        let graph = builder.build(&spec.loaders, spec.relation_filter())?;
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Graph ready for command"
        );
        self.execute_with_graph(&graph)
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// Remove an element with its subtree and links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveElement {
    pub element_id: ElementId,
    pub type_id: TypeId,
    pub title: String,
    /// Number of elements deleted, set by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
}

impl RemoveElement {
    pub fn new(element: &Element) -> Self {
        Self {
            element_id: element.id,
            type_id: element.type_id.clone(),
            title: element.title.clone(),
            removed: None,
        }
    }
}

/// A write request handled by a [`CommandService`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Mutation {
    RemoveElement(RemoveElement),
}

impl Mutation {
    /// Command name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::RemoveElement(_) => "RemoveElement",
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::RemoveElement(r) => write!(
                f,
                "RemoveElement({} #{} '{}')",
                r.type_id, r.element_id, r.title
            ),
        }
    }
}

/// Executes mutations synchronously; the returned mutation carries the
/// result state.
pub trait CommandService {
    fn execute(&self, mutation: Mutation) -> Result<Mutation, CommandError>;
}

impl CommandService for SqliteStore {
    fn execute(&self, mutation: Mutation) -> Result<Mutation, CommandError> {
        match mutation {
            Mutation::RemoveElement(mut remove) => {
                let removed = self.remove_element(remove.element_id).map_err(|source| {
                    CommandError::Execution {
                        command: Mutation::RemoveElement(remove.clone()).to_string(),
                        source,
                    }
                })?;
                remove.removed = Some(removed);
                Ok(Mutation::RemoveElement(remove))
            }
        }
    }
}

/// Dry-run service: records mutations in order and never touches a store
#[derive(Debug, Default)]
pub struct RecordingCommandService {
    recorded: Mutex<Vec<Mutation>>,
}

impl RecordingCommandService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutations received so far, in order
    pub fn mutations(&self) -> Vec<Mutation> {
        self.recorded.lock().clone()
    }

    /// Ids of the elements that removal was requested for, in order
    pub fn removed_ids(&self) -> Vec<ElementId> {
        self.recorded
            .lock()
            .iter()
            .map(|m| match m {
                Mutation::RemoveElement(r) => r.element_id,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.recorded.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.lock().is_empty()
    }
}

impl CommandService for RecordingCommandService {
    fn execute(&self, mutation: Mutation) -> Result<Mutation, CommandError> {
        debug!("Dry run: {}", mutation);
        self.recorded.lock().push(mutation.clone());
        Ok(mutation)
    }
}
