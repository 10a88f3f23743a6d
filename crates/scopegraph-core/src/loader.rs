//! Graph selectors
//!
//! A [`Loader`] says which elements belong in a graph (type and scope
//! filter); a [`RelationFilter`] says which relations become edges.

use crate::element::{RelationId, ScopeId, TypeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Type and scope selection of graph nodes.
///
/// An empty type set selects every type; a `None` scope selects every scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loader {
    pub type_ids: BTreeSet<TypeId>,
    pub scope_id: Option<ScopeId>,
}

impl Loader {
    /// Select elements of the given types in any scope
    pub fn new<I, T>(type_ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeId>,
    {
        Self {
            type_ids: type_ids.into_iter().map(Into::into).collect(),
            scope_id: None,
        }
    }

    /// Select elements of a single type in any scope
    pub fn for_type(type_id: impl Into<TypeId>) -> Self {
        Self::new([type_id])
    }

    /// Restrict the selection to a scope
    pub fn in_scope(mut self, scope_id: impl Into<ScopeId>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    /// Add a type to the selection
    pub fn with_type(mut self, type_id: impl Into<TypeId>) -> Self {
        self.type_ids.insert(type_id.into());
        self
    }

    /// Type ids as a slice-friendly vector, in sorted order
    pub fn type_list(&self) -> Vec<TypeId> {
        self.type_ids.iter().cloned().collect()
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<&str> = self.type_ids.iter().map(TypeId::as_str).collect();
        let types = if types.is_empty() {
            "*".to_string()
        } else {
            types.join(",")
        };
        match self.scope_id {
            Some(scope) => write!(f, "[{types}] in scope {scope}"),
            None => write!(f, "[{types}] in all scopes"),
        }
    }
}

/// Which relations are resolved into graph edges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationFilter {
    /// No edge materialization at all
    #[default]
    NodesOnly,
    /// Every relation between selected nodes
    All,
    /// Only the listed relation types
    Only(BTreeSet<RelationId>),
}

impl RelationFilter {
    /// Build a filter from a relation list; an empty list means nodes only
    pub fn only<I, R>(relations: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RelationId>,
    {
        RelationFilter::Only(relations.into_iter().map(Into::into).collect()).normalized()
    }

    /// Collapse `Only(∅)` into `NodesOnly`
    pub fn normalized(self) -> Self {
        match self {
            RelationFilter::Only(set) if set.is_empty() => RelationFilter::NodesOnly,
            other => other,
        }
    }

    /// Whether any links need to be fetched
    pub fn loads_links(&self) -> bool {
        match self {
            RelationFilter::NodesOnly => false,
            RelationFilter::All => true,
            RelationFilter::Only(set) => !set.is_empty(),
        }
    }

    /// Whether a relation type becomes an edge
    pub fn accepts(&self, relation_id: &RelationId) -> bool {
        match self {
            RelationFilter::NodesOnly => false,
            RelationFilter::All => true,
            RelationFilter::Only(set) => set.contains(relation_id),
        }
    }
}

impl fmt::Display for RelationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationFilter::NodesOnly => f.write_str("nodes only"),
            RelationFilter::All => f.write_str("all relations"),
            RelationFilter::Only(set) => {
                let names: Vec<&str> = set.iter().map(RelationId::as_str).collect();
                f.write_str(&names.join(", "))
            }
        }
    }
}
