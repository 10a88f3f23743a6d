//! Orphan scenario cleanup
//!
//! An incident scenario without any link to an asset is an orphan. Orphans
//! are removed together with their dependents, dependents first:
//!
//! 1. controls linked to the scenario (`control → scenario`, incoming)
//! 2. vulnerabilities of the scenario (`scenario → vulnerability`, outgoing)
//! 3. the scenario itself
//!
//! The first failed removal stops the run and is returned to the caller.

use crate::builder::GraphBuilder;
use crate::command::{
    CommandError, CommandService, GraphCommand, GraphSpec, Mutation, RemoveElement,
};
use crate::element::{Element, ElementId, RelationId, ScopeId, TypeId};
use crate::graph::ElementGraph;
use crate::loader::Loader;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Type and relation ids the cleanup works on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSchema {
    pub asset_type: TypeId,
    pub scenario_type: TypeId,
    pub control_type: TypeId,
    pub vulnerability_type: TypeId,
    /// scenario → asset
    pub scenario_asset: RelationId,
    /// scenario → vulnerability
    pub scenario_vulnerability: RelationId,
    /// control → scenario
    pub control_scenario: RelationId,
}

impl Default for CleanupSchema {
    fn default() -> Self {
        Self {
            asset_type: TypeId::new("asset"),
            scenario_type: TypeId::new("incident_scenario"),
            control_type: TypeId::new("control"),
            vulnerability_type: TypeId::new("vulnerability"),
            scenario_asset: RelationId::new("rel_incscen_asset"),
            scenario_vulnerability: RelationId::new("rel_incscen_vulnerability"),
            control_scenario: RelationId::new("rel_control_incscen"),
        }
    }
}

impl CleanupSchema {
    /// The four node types of the cleanup graph
    pub fn type_ids(&self) -> [TypeId; 4] {
        [
            self.asset_type.clone(),
            self.scenario_type.clone(),
            self.control_type.clone(),
            self.vulnerability_type.clone(),
        ]
    }

    /// The three relations of the cleanup graph
    pub fn relation_ids(&self) -> [RelationId; 3] {
        [
            self.scenario_asset.clone(),
            self.scenario_vulnerability.clone(),
            self.control_scenario.clone(),
        ]
    }
}

/// One element removed by the cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedElement {
    pub element_id: ElementId,
    pub type_id: TypeId,
    pub title: String,
    /// Scenario whose removal caused this one
    pub orphan: ElementId,
    /// Elements deleted by the service; `None` for dry runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<usize>,
}

/// Outcome of a cleanup run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub scope_id: ScopeId,
    pub scenarios_scanned: usize,
    /// Orphan scenario ids, in scan order
    pub orphans: Vec<ElementId>,
    /// Removals in execution order
    pub removed: Vec<RemovedElement>,
}

impl CleanupReport {
    /// Ids of removed elements, in removal order
    pub fn removed_ids(&self) -> Vec<ElementId> {
        self.removed.iter().map(|r| r.element_id).collect()
    }
}

/// Removes orphan scenarios of one scope
pub struct Cleaner<'s> {
    spec: GraphSpec,
    schema: CleanupSchema,
    scope_id: ScopeId,
    commands: &'s dyn CommandService,
}

impl<'s> Cleaner<'s> {
    pub fn new(scope_id: ScopeId, schema: CleanupSchema, commands: &'s dyn CommandService) -> Self {
        let mut spec = GraphSpec::new();
        spec.add_loader(Loader::new(schema.type_ids()).in_scope(scope_id));
        for relation in schema.relation_ids() {
            spec.add_relation_id(relation);
        }

        Self {
            spec,
            schema,
            scope_id,
            commands,
        }
    }

    /// Run the cleanup for `scope_id` with the default schema
    pub fn clean_up_scope(
        builder: &GraphBuilder<'_>,
        commands: &'s dyn CommandService,
        scope_id: ScopeId,
    ) -> Result<CleanupReport, CommandError> {
        Cleaner::new(scope_id, CleanupSchema::default(), commands).execute(builder)
    }

    pub fn schema(&self) -> &CleanupSchema {
        &self.schema
    }

    fn remove(
        &self,
        element: &Element,
        orphan: ElementId,
        removed_ids: &mut HashSet<ElementId>,
        report: &mut CleanupReport,
    ) -> Result<(), CommandError> {
        if !removed_ids.insert(element.id) {
            debug!("Already removed in this run: {}", element);
            return Ok(());
        }

        let result = self
            .commands
            .execute(Mutation::RemoveElement(RemoveElement::new(element)))?;
        let Mutation::RemoveElement(done) = result;

        debug!("Removed {}", element);
        report.removed.push(RemovedElement {
            element_id: done.element_id,
            type_id: done.type_id,
            title: done.title,
            orphan,
            deleted: done.removed,
        });
        Ok(())
    }
}

impl GraphCommand for Cleaner<'_> {
    type Output = CleanupReport;

    fn graph_spec(&self) -> &GraphSpec {
        &self.spec
    }

    fn execute_with_graph(&mut self, graph: &ElementGraph) -> Result<CleanupReport, CommandError> {
        let scenarios = graph.get_elements(&self.schema.scenario_type);
        let mut report = CleanupReport {
            scope_id: self.scope_id,
            scenarios_scanned: scenarios.len(),
            orphans: Vec::new(),
            removed: Vec::new(),
        };
        let mut removed_ids = HashSet::new();

        for scenario in scenarios {
            if removed_ids.contains(&scenario.id) {
                continue;
            }
            if !graph
                .get_link_targets(scenario, &self.schema.scenario_asset)
                .is_empty()
            {
                continue;
            }

            debug!(
                "Deleting orphan scenario (incl. linked controls and vulnerabilities): {}",
                scenario
            );
            report.orphans.push(scenario.id);

            for control in graph.get_link_sources(scenario, &self.schema.control_scenario) {
                self.remove(control, scenario.id, &mut removed_ids, &mut report)?;
            }
            for vulnerability in graph.get_link_targets(
                scenario,
                &self.schema.scenario_vulnerability,
            ) {
                self.remove(vulnerability, scenario.id, &mut removed_ids, &mut report)?;
            }
            self.remove(scenario, scenario.id, &mut removed_ids, &mut report)?;
        }

        info!(
            "Cleanup of scope {}: {} scenarios scanned, {} orphans, {} elements removed",
            self.scope_id,
            report.scenarios_scanned,
            report.orphans.len(),
            report.removed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RecordingCommandService;
    use crate::loader::RelationFilter;
    use crate::store::StoreError;
    use pretty_assertions::assert_eq;

    fn element(id: i64, type_id: &str, title: &str) -> Element {
        Element::new(
            ElementId(id),
            format!("u{id}"),
            type_id,
            Some(ScopeId(1)),
            title,
        )
    }

    fn graph(nodes: &[(i64, &str)], edges: &[(i64, i64, &str)]) -> ElementGraph {
        let mut graph = ElementGraph::new(RelationFilter::All);
        for (id, type_id) in nodes {
            graph.insert_element(element(*id, type_id, &format!("E{id}")));
        }
        for (source, target, relation) in edges {
            graph.insert_edge(
                ElementId(*source),
                ElementId(*target),
                RelationId::new(*relation),
            );
        }
        graph
    }

    /// Fails every removal of one element id
    struct FailingService {
        inner: RecordingCommandService,
        fail_on: ElementId,
    }

    impl CommandService for FailingService {
        fn execute(&self, mutation: Mutation) -> Result<Mutation, CommandError> {
            let Mutation::RemoveElement(ref remove) = mutation;
            if remove.element_id == self.fail_on {
                return Err(CommandError::Execution {
                    command: mutation.to_string(),
                    source: StoreError::InvalidData("constraint violated".to_string()),
                });
            }
            self.inner.execute(mutation)
        }
    }

    #[test]
    fn test_orphan_removed_with_dependents_in_order() {
        // S1 = 1, C1 = 2, V1 = 3
        let graph = graph(
            &[
                (1, "incident_scenario"),
                (2, "control"),
                (3, "vulnerability"),
            ],
            &[
                (2, 1, "rel_control_incscen"),
                (1, 3, "rel_incscen_vulnerability"),
            ],
        );
        let service = RecordingCommandService::new();
        let mut cleaner = Cleaner::new(ScopeId(1), CleanupSchema::default(), &service);

        let report = cleaner.execute_with_graph(&graph).unwrap();
        assert_eq!(
            service.removed_ids(),
            vec![ElementId(2), ElementId(3), ElementId(1)]
        );
        assert_eq!(
            report.removed_ids(),
            vec![ElementId(2), ElementId(3), ElementId(1)]
        );
        assert_eq!(report.orphans, vec![ElementId(1)]);
        assert!(report.removed.iter().all(|r| r.orphan == ElementId(1)));
    }

    #[test]
    fn test_scenario_with_asset_is_kept() {
        let graph = graph(
            &[(1, "incident_scenario"), (2, "asset"), (3, "control")],
            &[(1, 2, "rel_incscen_asset"), (3, 1, "rel_control_incscen")],
        );
        let service = RecordingCommandService::new();
        let mut cleaner = Cleaner::new(ScopeId(1), CleanupSchema::default(), &service);

        let report = cleaner.execute_with_graph(&graph).unwrap();
        assert!(service.is_empty());
        assert_eq!(report.scenarios_scanned, 1);
        assert!(report.orphans.is_empty());
    }

    #[test]
    fn test_shared_dependent_removed_once() {
        // Control 3 covers both orphan scenarios 1 and 2
        let graph = graph(
            &[
                (1, "incident_scenario"),
                (2, "incident_scenario"),
                (3, "control"),
            ],
            &[(3, 1, "rel_control_incscen"), (3, 2, "rel_control_incscen")],
        );
        let service = RecordingCommandService::new();
        let mut cleaner = Cleaner::new(ScopeId(1), CleanupSchema::default(), &service);

        let report = cleaner.execute_with_graph(&graph).unwrap();
        assert_eq!(
            service.removed_ids(),
            vec![ElementId(3), ElementId(1), ElementId(2)]
        );
        assert_eq!(report.orphans, vec![ElementId(1), ElementId(2)]);
    }

    #[test]
    fn test_failed_removal_aborts_run() {
        let graph = graph(
            &[
                (1, "incident_scenario"),
                (2, "control"),
                (3, "vulnerability"),
                (4, "incident_scenario"),
            ],
            &[
                (2, 1, "rel_control_incscen"),
                (1, 3, "rel_incscen_vulnerability"),
            ],
        );
        let service = FailingService {
            inner: RecordingCommandService::new(),
            fail_on: ElementId(3),
        };
        let mut cleaner = Cleaner::new(ScopeId(1), CleanupSchema::default(), &service);

        let err = cleaner.execute_with_graph(&graph).unwrap_err();
        assert!(err.to_string().contains("constraint violated"));
        // Control went first; nothing after the failure was attempted
        assert_eq!(service.inner.removed_ids(), vec![ElementId(2)]);
    }

    #[test]
    fn test_graph_spec_covers_schema() {
        let service = RecordingCommandService::new();
        let cleaner = Cleaner::new(ScopeId(9), CleanupSchema::default(), &service);
        let spec = cleaner.graph_spec();

        assert_eq!(spec.loaders.len(), 1);
        assert_eq!(spec.loaders[0].scope_id, Some(ScopeId(9)));
        assert_eq!(spec.loaders[0].type_ids.len(), 4);
        assert_eq!(
            spec.relation_filter(),
            RelationFilter::only([
                "rel_incscen_asset",
                "rel_incscen_vulnerability",
                "rel_control_incscen",
            ])
        );
    }
}
