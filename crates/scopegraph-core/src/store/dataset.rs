//! JSON dataset interchange format
//!
//! A dataset is a flat list of elements plus links, used to seed a store:
//!
//! ```json
//! {
//!   "elements": [
//!     {"id": 1, "type": "organization", "title": "Org", "scope": 1},
//!     {"id": 10, "type": "asset", "title": "Server", "scope": 1, "parent": 1,
//!      "properties": {"asset": {"asset_name": "Server"}}}
//!   ],
//!   "links": [{"source": 10, "target": 11, "relation": "rel_asset_asset"}]
//! }
//! ```

use crate::element::{ElementId, Link, Permission, RelationId, ScopeId, TypeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::sqlite::NewElement;
use super::StoreError;

/// A complete dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub elements: Vec<DatasetElement>,
    #[serde(default)]
    pub links: Vec<DatasetLink>,
}

/// One element row of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetElement {
    pub id: i64,
    /// Defaults to `element-<id>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<i64>,
    #[serde(default)]
    pub title: String,
    /// Property group → key → value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
}

impl DatasetElement {
    /// Effective uuid of the element
    pub fn uuid(&self) -> String {
        self.uuid
            .clone()
            .unwrap_or_else(|| format!("element-{}", self.id))
    }

    pub(crate) fn to_new_element(&self, position: i64) -> NewElement {
        NewElement {
            id: Some(ElementId(self.id)),
            uuid: self.uuid(),
            type_id: TypeId::new(self.type_id.as_str()),
            scope_id: self.scope.map(ScopeId),
            parent_id: self.parent.map(ElementId),
            position,
            title: self.title.clone(),
        }
    }
}

/// One link row of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLink {
    pub source: i64,
    pub target: i64,
    pub relation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl DatasetLink {
    pub(crate) fn to_link(&self) -> Link {
        Link {
            source: ElementId(self.source),
            target: ElementId(self.target),
            relation_id: RelationId::new(self.relation.as_str()),
            comment: self.comment.clone(),
        }
    }
}

impl Dataset {
    /// Load a dataset from a JSON file
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parse a dataset from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check structural consistency before import.
    ///
    /// Ids and uuids must be unique, types non-empty, and parents and link
    /// endpoints must refer to elements of the dataset.
    pub fn validate(&self) -> Result<(), StoreError> {
        let mut ids = HashSet::new();
        let mut uuids = HashSet::new();

        for element in &self.elements {
            if !ids.insert(element.id) {
                return Err(StoreError::InvalidData(format!(
                    "duplicate element id {}",
                    element.id
                )));
            }
            if !uuids.insert(element.uuid()) {
                return Err(StoreError::InvalidData(format!(
                    "duplicate element uuid '{}'",
                    element.uuid()
                )));
            }
            if element.type_id.trim().is_empty() {
                return Err(StoreError::InvalidData(format!(
                    "element {} has an empty type",
                    element.id
                )));
            }
        }

        for element in &self.elements {
            if let Some(parent) = element.parent {
                if !ids.contains(&parent) {
                    return Err(StoreError::InvalidData(format!(
                        "element {} refers to unknown parent {}",
                        element.id, parent
                    )));
                }
            }
        }

        for link in &self.links {
            for endpoint in [link.source, link.target] {
                if !ids.contains(&endpoint) {
                    return Err(StoreError::InvalidData(format!(
                        "link {} -> {} ({}) refers to unknown element {}",
                        link.source, link.target, link.relation, endpoint
                    )));
                }
            }
        }

        Ok(())
    }
}
