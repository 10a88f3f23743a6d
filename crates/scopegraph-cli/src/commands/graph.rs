//! Graph command - Build and print a filtered graph snapshot

use anyhow::{Context, Result};
use clap::Args;
use scopegraph_config::CleanupConfig;
use scopegraph_core::{ElementGraph, GraphBuilder, GraphStats, Loader, RelationFilter, ScopeId};
use serde::Serialize;

use super::{cleanup_schema, open_store};
use crate::progress::{finish_spinner, spinner};
use crate::GlobalOptions;

/// Arguments for the graph command
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Only elements of this scope
    #[arg(long, short = 's')]
    scope: Option<i64>,

    /// Element types to load (repeatable; defaults to all types)
    #[arg(long = "type", short = 't')]
    types: Vec<String>,

    /// Relation types to resolve into edges (repeatable; defaults to all)
    #[arg(long = "relation", short = 'r', conflicts_with = "nodes_only")]
    relations: Vec<String>,

    /// Load nodes without resolving any relation
    #[arg(long)]
    nodes_only: bool,

    /// Use the configured cleanup types and relations
    #[arg(long, conflicts_with_all = ["types", "relations", "nodes_only"])]
    cleanup: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Graph node as printed
#[derive(Debug, Serialize)]
struct NodeOutput<'a> {
    id: i64,
    #[serde(rename = "type")]
    type_id: &'a str,
    title: &'a str,
}

/// Graph edge as printed
#[derive(Debug, Serialize)]
struct EdgeOutput<'a> {
    source: i64,
    target: i64,
    relation: &'a str,
}

#[derive(Debug, Serialize)]
struct GraphOutput<'a> {
    stats: GraphStats,
    nodes: Vec<NodeOutput<'a>>,
    edges: Vec<EdgeOutput<'a>>,
}

impl GraphArgs {
    fn selection(&self, cleanup: &CleanupConfig) -> (Loader, RelationFilter) {
        let (loader, relations) = if self.cleanup {
            let schema = cleanup_schema(cleanup);
            (
                Loader::new(schema.type_ids()),
                RelationFilter::only(schema.relation_ids()),
            )
        } else if self.nodes_only {
            (Loader::new(self.types.iter().cloned()), RelationFilter::NodesOnly)
        } else if self.relations.is_empty() {
            (Loader::new(self.types.iter().cloned()), RelationFilter::All)
        } else {
            (
                Loader::new(self.types.iter().cloned()),
                RelationFilter::only(self.relations.iter().cloned()),
            )
        };

        let loader = match self.scope {
            Some(scope) => loader.in_scope(ScopeId(scope)),
            None => loader,
        };
        (loader, relations)
    }
}

/// Execute the graph command
pub fn execute(args: GraphArgs, global: GlobalOptions) -> Result<()> {
    let (config, store) = open_store(&global)?;
    let (loader, relations) = args.selection(&config.cleanup);

    let pb = spinner(
        &format!("Building graph for {} ({})...", loader, relations),
        global.quiet || args.json,
    );
    let builder = GraphBuilder::new(&store);
    let graph = builder
        .build(&[loader], relations)
        .context("Failed to build graph")?;
    finish_spinner(
        pb,
        &format!(
            "Built graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        ),
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&graph_output(&graph))?);
    } else {
        print_graph(&graph);
    }

    Ok(())
}

fn graph_output(graph: &ElementGraph) -> GraphOutput<'_> {
    GraphOutput {
        stats: graph.stats(),
        nodes: graph
            .elements()
            .map(|e| NodeOutput {
                id: e.id.0,
                type_id: e.type_id.as_str(),
                title: &e.title,
            })
            .collect(),
        edges: graph
            .edges()
            .map(|(source, target, relation)| EdgeOutput {
                source: source.0,
                target: target.0,
                relation: relation.as_str(),
            })
            .collect(),
    }
}

fn print_graph(graph: &ElementGraph) {
    let stats = graph.stats();
    println!(
        "Graph: {} nodes, {} edges ({})",
        stats.node_count, stats.edge_count, stats.relation_filter
    );

    println!("\nNodes:");
    for (type_id, count) in &stats.nodes_by_type {
        println!("  {:<24} {}", type_id, count);
    }
    for element in graph.elements() {
        println!("  {}", element);
    }

    if graph.edge_count() > 0 {
        println!("\nEdges:");
        for (relation, count) in &stats.edges_by_relation {
            println!("  {:<24} {}", relation, count);
        }
        for (source, target, relation) in graph.edges() {
            println!("  #{} -[{}]-> #{}", source, relation, target);
        }
    }
}
