//! Element Graph
//!
//! This module provides `ElementGraph`, an immutable snapshot of selected
//! elements and the relations between them, backed by petgraph.
//!
//! Nodes are keyed by [`ElementId`]; edges carry their [`RelationId`]. Every
//! edge connects two nodes of the snapshot. Lookups for unknown ids return
//! empty results instead of failing.

use crate::element::{Element, ElementId, RelationId, TypeId};
use crate::loader::RelationFilter;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Summary counts of a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// Node count per element type
    pub nodes_by_type: BTreeMap<String, usize>,
    /// Edge count per relation type
    pub edges_by_relation: BTreeMap<String, usize>,
    pub relation_filter: String,
}

/// An immutable, filtered snapshot of elements and typed relations.
///
/// Built by [`GraphBuilder`](crate::builder::GraphBuilder); consumers only
/// get read access.
#[derive(Debug, Clone)]
pub struct ElementGraph {
    /// The underlying petgraph instance
    graph: StableGraph<Element, RelationId, petgraph::Directed>,

    /// Map from element id to petgraph NodeIndex for O(1) lookup
    node_index_map: HashMap<ElementId, NodeIndex>,

    /// Node indices per type, in insertion order
    type_index: HashMap<TypeId, Vec<NodeIndex>>,

    /// Node indices in insertion order
    order: Vec<NodeIndex>,

    relation_filter: RelationFilter,
}

impl ElementGraph {
    pub(crate) fn new(relation_filter: RelationFilter) -> Self {
        Self {
            graph: StableGraph::new(),
            node_index_map: HashMap::new(),
            type_index: HashMap::new(),
            order: Vec::new(),
            relation_filter,
        }
    }

    /// Add a node; returns `false` if an element with the same id is present
    pub(crate) fn insert_element(&mut self, element: Element) -> bool {
        if self.node_index_map.contains_key(&element.id) {
            return false;
        }
        let id = element.id;
        let type_id = element.type_id.clone();
        let idx = self.graph.add_node(element);
        self.node_index_map.insert(id, idx);
        self.type_index.entry(type_id).or_default().push(idx);
        self.order.push(idx);
        true
    }

    /// Add an edge between two present nodes.
    ///
    /// Returns `false` when an endpoint is missing or the same edge exists.
    pub(crate) fn insert_edge(
        &mut self,
        source: ElementId,
        target: ElementId,
        relation_id: RelationId,
    ) -> bool {
        let (Some(&s), Some(&t)) = (
            self.node_index_map.get(&source),
            self.node_index_map.get(&target),
        ) else {
            return false;
        };
        let exists = self
            .graph
            .edges_connecting(s, t)
            .any(|edge| *edge.weight() == relation_id);
        if exists {
            return false;
        }
        self.graph.add_edge(s, t, relation_id);
        true
    }

    // ------------------------------------------------------------------------
    // Node Queries
    // ------------------------------------------------------------------------

    /// Get an element by id
    pub fn get_element(&self, id: ElementId) -> Option<&Element> {
        self.node_index_map
            .get(&id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Check if the graph contains an element
    pub fn contains(&self, id: ElementId) -> bool {
        self.node_index_map.contains_key(&id)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate over all elements in insertion order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.order
            .iter()
            .filter_map(|&idx| self.graph.node_weight(idx))
    }

    /// Elements of a type, in store return order; empty for unknown types
    pub fn get_elements(&self, type_id: &TypeId) -> Vec<&Element> {
        self.type_index
            .get(type_id)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The relation filter the graph was built with
    pub fn relation_filter(&self) -> &RelationFilter {
        &self.relation_filter
    }

    // ------------------------------------------------------------------------
    // Edge Queries
    // ------------------------------------------------------------------------

    /// Targets of outgoing `relation_id` edges; empty for unknown ids
    pub fn get_link_targets(
        &self,
        id: impl Into<ElementId>,
        relation_id: &RelationId,
    ) -> Vec<&Element> {
        self.neighbors(id.into(), relation_id, &[Direction::Outgoing])
    }

    /// Sources of incoming `relation_id` edges; empty for unknown ids
    pub fn get_link_sources(
        &self,
        id: impl Into<ElementId>,
        relation_id: &RelationId,
    ) -> Vec<&Element> {
        self.neighbors(id.into(), relation_id, &[Direction::Incoming])
    }

    /// Elements linked by `relation_id` in either direction
    pub fn get_linked(&self, id: impl Into<ElementId>, relation_id: &RelationId) -> Vec<&Element> {
        self.neighbors(
            id.into(),
            relation_id,
            &[Direction::Outgoing, Direction::Incoming],
        )
    }

    /// Iterate over all edges as `(source, target, relation)`
    pub fn edges(&self) -> impl Iterator<Item = (ElementId, ElementId, &RelationId)> + '_ {
        self.graph.edge_references().filter_map(move |edge_ref| {
            let source = self.graph.node_weight(edge_ref.source())?;
            let target = self.graph.node_weight(edge_ref.target())?;
            Some((source.id, target.id, edge_ref.weight()))
        })
    }

    /// Compute summary counts
    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_type = BTreeMap::new();
        for (type_id, indices) in &self.type_index {
            nodes_by_type.insert(type_id.to_string(), indices.len());
        }
        let mut edges_by_relation = BTreeMap::new();
        for (_, _, relation) in self.edges() {
            *edges_by_relation.entry(relation.to_string()).or_insert(0) += 1;
        }

        GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            nodes_by_type,
            edges_by_relation,
            relation_filter: self.relation_filter.to_string(),
        }
    }

    fn neighbors(
        &self,
        id: ElementId,
        relation_id: &RelationId,
        directions: &[Direction],
    ) -> Vec<&Element> {
        let Some(&idx) = self.node_index_map.get(&id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for &direction in directions {
            // petgraph yields the newest edge first
            let mut edges: Vec<_> = self
                .graph
                .edges_directed(idx, direction)
                .filter(|edge| edge.weight() == relation_id)
                .collect();
            edges.reverse();

            for edge in edges {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                if seen.insert(other) {
                    if let Some(element) = self.graph.node_weight(other) {
                        result.push(element);
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ScopeId;
    use pretty_assertions::assert_eq;

    fn element(id: i64, type_id: &str) -> Element {
        Element::new(
            ElementId(id),
            format!("u{id}"),
            type_id,
            Some(ScopeId(1)),
            format!("E{id}"),
        )
    }

    fn ids(elements: Vec<&Element>) -> Vec<i64> {
        elements.into_iter().map(|e| e.id.0).collect()
    }

    fn sample() -> ElementGraph {
        let mut graph = ElementGraph::new(RelationFilter::All);
        graph.insert_element(element(1, "incident_scenario"));
        graph.insert_element(element(2, "asset"));
        graph.insert_element(element(3, "asset"));
        graph.insert_element(element(4, "control"));
        graph.insert_edge(ElementId(1), ElementId(3), "rel_incscen_asset".into());
        graph.insert_edge(ElementId(1), ElementId(2), "rel_incscen_asset".into());
        graph.insert_edge(ElementId(4), ElementId(1), "rel_control_incscen".into());
        graph
    }

    #[test]
    fn test_duplicate_nodes_and_edges_rejected() {
        let mut graph = sample();
        assert!(!graph.insert_element(element(1, "asset")));
        assert!(!graph.insert_edge(ElementId(1), ElementId(2), "rel_incscen_asset".into()));
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
        // Original type kept
        assert_eq!(
            graph.get_element(ElementId(1)).unwrap().type_id.as_str(),
            "incident_scenario"
        );
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let mut graph = sample();
        assert!(!graph.insert_edge(ElementId(1), ElementId(99), "rel_incscen_asset".into()));
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_get_elements_by_type() {
        let graph = sample();
        assert_eq!(ids(graph.get_elements(&"asset".into())), vec![2, 3]);
        assert!(graph.get_elements(&"vulnerability".into()).is_empty());
    }

    #[test]
    fn test_link_targets_in_insertion_order() {
        let graph = sample();
        let rel = RelationId::new("rel_incscen_asset");
        assert_eq!(ids(graph.get_link_targets(ElementId(1), &rel)), vec![3, 2]);
        assert!(graph.get_link_targets(ElementId(2), &rel).is_empty());
        assert!(graph
            .get_link_targets(ElementId(1), &"rel_control_incscen".into())
            .is_empty());
    }

    #[test]
    fn test_unknown_element_has_no_links() {
        let graph = sample();
        let rel = RelationId::new("rel_incscen_asset");
        assert!(graph.get_link_targets(ElementId(42), &rel).is_empty());
        assert!(graph.get_link_sources(ElementId(42), &rel).is_empty());
        assert!(graph.get_linked(ElementId(42), &rel).is_empty());
    }

    #[test]
    fn test_sources_and_linked() {
        let graph = sample();
        let rel = RelationId::new("rel_control_incscen");
        assert_eq!(ids(graph.get_link_sources(ElementId(1), &rel)), vec![4]);
        assert_eq!(ids(graph.get_linked(ElementId(4), &rel)), vec![1]);
        assert_eq!(ids(graph.get_linked(ElementId(1), &rel)), vec![4]);
    }

    #[test]
    fn test_stats() {
        let stats = sample().stats();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.edge_count, 3);
        assert_eq!(stats.nodes_by_type["asset"], 2);
        assert_eq!(stats.edges_by_relation["rel_incscen_asset"], 2);
        assert_eq!(stats.relation_filter, "all relations");
    }

    #[test]
    fn test_edges_iterator() {
        let graph = sample();
        let mut edges: Vec<(i64, i64, String)> = graph
            .edges()
            .map(|(s, t, r)| (s.0, t.0, r.to_string()))
            .collect();
        edges.sort();
        assert_eq!(
            edges,
            vec![
                (1, 2, "rel_incscen_asset".to_string()),
                (1, 3, "rel_incscen_asset".to_string()),
                (4, 1, "rel_control_incscen".to_string()),
            ]
        );
    }
}
