//! Element command - Show one element with selected facets

use anyhow::{Context, Result};
use clap::Args;
use scopegraph_core::{
    Element, ElementId, ElementStore, Facet, FacetKind, FacetSet, Retriever, SqliteStore,
    StoreError,
};

use super::open_store;
use crate::GlobalOptions;

/// Arguments for the element command
#[derive(Args, Debug)]
pub struct ElementArgs {
    /// Element id or uuid
    target: String,

    /// Facets to load (defaults to all)
    #[arg(long, short = 'f', value_delimiter = ',')]
    facets: Vec<FacetKind>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the element command
pub fn execute(args: ElementArgs, global: GlobalOptions) -> Result<()> {
    let (_, store) = open_store(&global)?;

    let element = find_element(&store, &args.target)?;
    let facets = if args.facets.is_empty() {
        FacetSet::all()
    } else {
        args.facets.iter().copied().collect()
    };

    let retriever = Retriever::new(&store);
    let element = retriever.ensure_or_mark_failed(element, facets);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&element)?);
    } else {
        print_element(&element, facets);
    }

    Ok(())
}

/// Look up a shallow element by numeric id, falling back to uuid
fn find_element(store: &SqliteStore, target: &str) -> Result<Element> {
    if let Ok(id) = target.parse::<i64>() {
        if let Some(element) = by_id(store.fetch(ElementId(id), FacetSet::EMPTY), id)? {
            return Ok(element);
        }
    }

    store
        .find_by_uuid(target)
        .context("Failed to query element store")?
        .ok_or_else(|| anyhow::anyhow!("Element not found: {}", target))
}

/// Outcome of an id lookup; `None` only when no element has that id
fn by_id(result: Result<Element, StoreError>, id: i64) -> Result<Option<Element>> {
    match result {
        Ok(element) => Ok(Some(element)),
        Err(StoreError::ElementNotFound(_)) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to fetch element {id}")),
    }
}

fn print_element(element: &Element, facets: FacetSet) {
    println!("{}", element);
    println!("  uuid:  {}", element.uuid);
    match element.scope_id {
        Some(scope) => println!("  scope: {}", scope),
        None => println!("  scope: -"),
    }

    for kind in facets.iter() {
        let body = match kind {
            FacetKind::Attributes => describe(&element.attributes, |entity| {
                let Some(groups) = entity.groups.get() else {
                    return vec!["(groups not loaded)".to_string()];
                };
                groups
                    .iter()
                    .flat_map(|(name, group)| {
                        group
                            .properties
                            .get()
                            .into_iter()
                            .flatten()
                            .map(move |p| format!("{}.{} = {}", name, p.key, p.value))
                    })
                    .collect()
            }),
            FacetKind::Parent => describe(&element.parent, |parent| match parent {
                Some(id) => vec![format!("#{}", id)],
                None => vec!["(root)".to_string()],
            }),
            FacetKind::Children => describe(&element.children, |children| {
                children.iter().map(|id| format!("#{}", id)).collect()
            }),
            FacetKind::Permissions => describe(&element.permissions, |permissions| {
                permissions
                    .iter()
                    .map(|p| {
                        format!(
                            "{} ({}{})",
                            p.role,
                            if p.read { "r" } else { "-" },
                            if p.write { "w" } else { "-" }
                        )
                    })
                    .collect()
            }),
            FacetKind::LinksDown => describe(&element.links_down, |links| {
                links
                    .iter()
                    .map(|l| format!("{} -> #{}", l.relation_id, l.target))
                    .collect()
            }),
            FacetKind::LinksUp => describe(&element.links_up, |links| {
                links
                    .iter()
                    .map(|l| format!("{} <- #{}", l.relation_id, l.source))
                    .collect()
            }),
        };

        println!("  [{}]", kind);
        for line in body {
            println!("    {}", line);
        }
    }
}

fn describe<T>(facet: &Facet<T>, render: impl FnOnce(&T) -> Vec<String>) -> Vec<String> {
    match facet {
        Facet::Unfetched => vec!["(not loaded)".to_string()],
        Facet::FetchFailed(reason) => vec![format!("(failed: {})", reason)],
        Facet::Fetched(value) => {
            let lines = render(value);
            if lines.is_empty() {
                vec!["(none)".to_string()]
            } else {
                lines
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_describe_states() {
        let unfetched: Facet<Vec<ElementId>> = Facet::Unfetched;
        assert_eq!(describe(&unfetched, |_| vec![]), vec!["(not loaded)"]);

        let failed: Facet<Vec<ElementId>> = Facet::FetchFailed("gone".to_string());
        assert_eq!(describe(&failed, |_| vec![]), vec!["(failed: gone)"]);

        let empty: Facet<Vec<ElementId>> = Facet::Fetched(vec![]);
        assert_eq!(
            describe(&empty, |ids| ids.iter().map(|i| i.to_string()).collect()),
            vec!["(none)"]
        );
    }

    #[test]
    fn test_find_element_by_id_and_uuid() {
        let store = SqliteStore::in_memory().unwrap();
        let dataset = scopegraph_core::Dataset::from_json_str(
            r#"{"elements": [{"id": 5, "uuid": "abc", "type": "asset", "title": "Laptop"}]}"#,
        )
        .unwrap();
        store.import_dataset(&dataset).unwrap();

        assert_eq!(find_element(&store, "5").unwrap().title, "Laptop");
        assert_eq!(find_element(&store, "abc").unwrap().id, ElementId(5));
        assert!(find_element(&store, "6").is_err());
    }

    #[test]
    fn test_numeric_uuid_found_after_id_miss() {
        let store = SqliteStore::in_memory().unwrap();
        let dataset = scopegraph_core::Dataset::from_json_str(
            r#"{"elements": [{"id": 5, "uuid": "42", "type": "asset", "title": "Laptop"}]}"#,
        )
        .unwrap();
        store.import_dataset(&dataset).unwrap();

        assert_eq!(find_element(&store, "42").unwrap().id, ElementId(5));
    }

    #[test]
    fn test_id_lookup_propagates_store_failures() {
        let missing = by_id(Err(StoreError::ElementNotFound(ElementId(5))), 5).unwrap();
        assert!(missing.is_none());

        let err = by_id(Err(StoreError::InvalidData("bad row".to_string())), 5).unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch element 5");
        assert!(format!("{err:#}").contains("bad row"));
    }
}
