//! Element Model
//!
//! This module defines the partially loaded element model:
//! - Identifier newtypes (`ElementId`, `TypeId`, `RelationId`, `ScopeId`)
//! - The tri-state [`Facet`] wrapper tracking whether a slice of an element
//!   has been fetched from the store
//! - [`FacetKind`] / [`FacetSet`] naming the independently loadable slices
//! - The [`Element`] view itself, with attributes, tree and link facets
//!
//! Cross references between elements are always ids, never embedded values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable database identity of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub i64);

impl ElementId {
    /// Get the raw database id
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ElementId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<&Element> for ElementId {
    fn from(element: &Element) -> Self {
        element.id
    }
}

/// Identity of the scope (organization or subtree root) an element lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub i64);

impl ScopeId {
    /// Get the raw scope id
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ScopeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Element type identifier (e.g. "asset", "incident_scenario").
    TypeId
);

string_id!(
    /// Relation type identifier (e.g. "rel_incscen_asset").
    RelationId
);

// ============================================================================
// Facet State
// ============================================================================

/// Load state of one independently fetchable slice of an element.
///
/// `Unfetched` means unknown: the value must not be read. `Fetched` is an
/// authoritative snapshot taken at fetch time. `FetchFailed` records that a
/// fetch was attempted and did not produce the facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Facet<T> {
    Unfetched,
    Fetched(T),
    FetchFailed(String),
}

impl<T> Default for Facet<T> {
    fn default() -> Self {
        Facet::Unfetched
    }
}

impl<T> Facet<T> {
    /// Check if the facet holds a fetched value (nested state not inspected)
    pub fn is_fetched(&self) -> bool {
        matches!(self, Facet::Fetched(_))
    }

    /// Get the fetched value, if any
    pub fn get(&self) -> Option<&T> {
        match self {
            Facet::Fetched(value) => Some(value),
            Facet::Unfetched | Facet::FetchFailed(_) => None,
        }
    }

    /// Get the fetched value mutably, if any
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Facet::Fetched(value) => Some(value),
            Facet::Unfetched | Facet::FetchFailed(_) => None,
        }
    }

    /// Consume the facet, returning the fetched value if any
    pub fn into_fetched(self) -> Option<T> {
        match self {
            Facet::Fetched(value) => Some(value),
            Facet::Unfetched | Facet::FetchFailed(_) => None,
        }
    }

    /// Failure reason if the last fetch of this facet failed
    pub fn failure(&self) -> Option<&str> {
        match self {
            Facet::FetchFailed(reason) => Some(reason),
            Facet::Unfetched | Facet::Fetched(_) => None,
        }
    }
}

/// Recursive "fully loaded" check.
///
/// A value is materialized only when every nested facet reachable from it is
/// fetched. A shallow check that stops at the first fetched level is wrong.
pub trait Materialized {
    /// Check whether this value and everything nested in it is loaded
    fn is_materialized(&self) -> bool;
}

impl<T: Materialized> Materialized for Facet<T> {
    fn is_materialized(&self) -> bool {
        match self {
            Facet::Fetched(value) => value.is_materialized(),
            Facet::Unfetched | Facet::FetchFailed(_) => false,
        }
    }
}

impl Materialized for Option<ElementId> {
    fn is_materialized(&self) -> bool {
        true
    }
}

impl Materialized for Vec<ElementId> {
    fn is_materialized(&self) -> bool {
        true
    }
}

impl Materialized for Vec<Link> {
    fn is_materialized(&self) -> bool {
        true
    }
}

impl Materialized for Vec<Permission> {
    fn is_materialized(&self) -> bool {
        true
    }
}

impl Materialized for Vec<Property> {
    fn is_materialized(&self) -> bool {
        true
    }
}

// ============================================================================
// Facet Kinds
// ============================================================================

/// The independently materializable slices of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetKind {
    /// Typed attribute payload (entity with property groups)
    Attributes,
    /// Ordered child references
    Children,
    /// Access permission set
    Permissions,
    /// Parent reference
    Parent,
    /// Outgoing relation links
    LinksDown,
    /// Incoming relation links
    LinksUp,
}

impl FacetKind {
    /// All facet kinds in canonical order
    pub const ALL: [FacetKind; 6] = [
        FacetKind::Attributes,
        FacetKind::Children,
        FacetKind::Permissions,
        FacetKind::Parent,
        FacetKind::LinksDown,
        FacetKind::LinksUp,
    ];

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FacetKind::Attributes => "attributes",
            FacetKind::Children => "children",
            FacetKind::Permissions => "permissions",
            FacetKind::Parent => "parent",
            FacetKind::LinksDown => "links_down",
            FacetKind::LinksUp => "links_up",
        }
    }

    /// Whether this facet is only meaningful for an existing element
    pub fn requires_element(&self) -> bool {
        matches!(self, FacetKind::LinksDown | FacetKind::LinksUp)
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "attributes" | "properties" => Ok(FacetKind::Attributes),
            "children" => Ok(FacetKind::Children),
            "permissions" => Ok(FacetKind::Permissions),
            "parent" => Ok(FacetKind::Parent),
            "links_down" | "links" => Ok(FacetKind::LinksDown),
            "links_up" => Ok(FacetKind::LinksUp),
            _ => Err(format!(
                "Unknown facet: '{}'. Valid values: attributes, children, permissions, parent, links_down, links_up",
                s
            )),
        }
    }
}

/// A set of facet kinds, used to describe fetch requests.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FacetSet(u8);

impl FacetSet {
    /// The empty set
    pub const EMPTY: FacetSet = FacetSet(0);

    /// Create a set from a slice of kinds
    pub fn of(kinds: &[FacetKind]) -> Self {
        kinds.iter().copied().collect()
    }

    /// Every facet
    pub fn all() -> Self {
        Self::of(&FacetKind::ALL)
    }

    /// Attributes only
    pub fn attributes() -> Self {
        Self::of(&[FacetKind::Attributes])
    }

    /// Children only
    pub fn children() -> Self {
        Self::of(&[FacetKind::Children])
    }

    /// Permissions only
    pub fn permissions() -> Self {
        Self::of(&[FacetKind::Permissions])
    }

    /// Parent only
    pub fn parent() -> Self {
        Self::of(&[FacetKind::Parent])
    }

    /// Outgoing and incoming links
    pub fn links() -> Self {
        Self::of(&[FacetKind::LinksDown, FacetKind::LinksUp])
    }

    /// Return a copy with `kind` added
    pub fn with(mut self, kind: FacetKind) -> Self {
        self.insert(kind);
        self
    }

    /// Add a kind
    pub fn insert(&mut self, kind: FacetKind) {
        self.0 |= kind.bit();
    }

    /// Check membership
    pub fn contains(&self, kind: FacetKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Set union
    pub fn union(self, other: FacetSet) -> FacetSet {
        FacetSet(self.0 | other.0)
    }

    /// Kinds in `self` that are not in `other`
    pub fn difference(self, other: FacetSet) -> FacetSet {
        FacetSet(self.0 & !other.0)
    }

    /// Check if no kind is present
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of kinds in the set
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate over the kinds in canonical order
    pub fn iter(&self) -> impl Iterator<Item = FacetKind> + '_ {
        FacetKind::ALL.into_iter().filter(|k| self.contains(*k))
    }
}

impl FromIterator<FacetKind> for FacetSet {
    fn from_iter<I: IntoIterator<Item = FacetKind>>(iter: I) -> Self {
        let mut set = FacetSet::EMPTY;
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl From<FacetKind> for FacetSet {
    fn from(kind: FacetKind) -> Self {
        FacetSet::EMPTY.with(kind)
    }
}

impl std::ops::BitOr for FacetSet {
    type Output = FacetSet;

    fn bitor(self, rhs: FacetSet) -> FacetSet {
        self.union(rhs)
    }
}

impl fmt::Debug for FacetSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for FacetSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(|k| k.as_str()).collect();
        f.write_str(&names.join(", "))
    }
}

// ============================================================================
// Attribute Payload
// ============================================================================

/// A single key/value attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

impl Property {
    /// Create a new property
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A typed group of attributes (one property list per property type).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyGroup {
    pub properties: Facet<Vec<Property>>,
}

impl PropertyGroup {
    /// Create a fully fetched group
    pub fn fetched(properties: Vec<Property>) -> Self {
        Self {
            properties: Facet::Fetched(properties),
        }
    }
}

impl Materialized for PropertyGroup {
    fn is_materialized(&self) -> bool {
        self.properties.is_materialized()
    }
}

impl Materialized for BTreeMap<String, PropertyGroup> {
    fn is_materialized(&self) -> bool {
        self.values().all(Materialized::is_materialized)
    }
}

/// The attribute payload of an element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub groups: Facet<BTreeMap<String, PropertyGroup>>,
}

impl Entity {
    /// Create a fully fetched entity
    pub fn fetched(groups: BTreeMap<String, PropertyGroup>) -> Self {
        Self {
            groups: Facet::Fetched(groups),
        }
    }

    /// Get the first value of `key` in `group`
    pub fn property(&self, group: &str, key: &str) -> Option<&str> {
        self.groups
            .get()?
            .get(group)?
            .properties
            .get()?
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Get the first value of `key` in any group
    pub fn value(&self, key: &str) -> Option<&str> {
        self.groups.get()?.values().find_map(|group| {
            group
                .properties
                .get()?
                .iter()
                .find(|p| p.key == key)
                .map(|p| p.value.as_str())
        })
    }
}

impl Materialized for Entity {
    fn is_materialized(&self) -> bool {
        self.groups.is_materialized()
    }
}

// ============================================================================
// Links and Permissions
// ============================================================================

/// A typed directed relation between two elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Source element id
    pub source: ElementId,
    /// Target element id
    pub target: ElementId,
    /// Relation type
    pub relation_id: RelationId,
    /// Optional free text attached to the link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Link {
    /// Create a new link
    pub fn new(
        source: impl Into<ElementId>,
        target: impl Into<ElementId>,
        relation_id: impl Into<RelationId>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation_id: relation_id.into(),
            comment: None,
        }
    }

    /// Set the link comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Access permission of a role on an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub role: String,
    pub read: bool,
    pub write: bool,
}

impl Permission {
    /// Create a permission entry
    pub fn new(role: impl Into<String>, read: bool, write: bool) -> Self {
        Self {
            role: role.into(),
            read,
            write,
        }
    }
}

// ============================================================================
// Element
// ============================================================================

/// A partially loaded view of a persisted element.
///
/// The base row (id, uuid, type, scope, title) is always present. Every other
/// slice is a [`Facet`] that starts `Unfetched` and is filled by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub uuid: String,
    pub type_id: TypeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<ScopeId>,
    pub title: String,

    #[serde(default)]
    pub attributes: Facet<Entity>,
    #[serde(default)]
    pub parent: Facet<Option<ElementId>>,
    #[serde(default)]
    pub children: Facet<Vec<ElementId>>,
    #[serde(default)]
    pub permissions: Facet<Vec<Permission>>,
    #[serde(default)]
    pub links_down: Facet<Vec<Link>>,
    #[serde(default)]
    pub links_up: Facet<Vec<Link>>,
}

impl Element {
    /// Create a shallow element with every facet unfetched
    pub fn new(
        id: impl Into<ElementId>,
        uuid: impl Into<String>,
        type_id: impl Into<TypeId>,
        scope_id: Option<ScopeId>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            uuid: uuid.into(),
            type_id: type_id.into(),
            scope_id,
            title: title.into(),
            attributes: Facet::Unfetched,
            parent: Facet::Unfetched,
            children: Facet::Unfetched,
            permissions: Facet::Unfetched,
            links_down: Facet::Unfetched,
            links_up: Facet::Unfetched,
        }
    }

    /// Set fetched attributes
    pub fn with_attributes(mut self, entity: Entity) -> Self {
        self.attributes = Facet::Fetched(entity);
        self
    }

    /// Set fetched parent reference
    pub fn with_parent(mut self, parent: Option<ElementId>) -> Self {
        self.parent = Facet::Fetched(parent);
        self
    }

    /// Set fetched children
    pub fn with_children(mut self, children: Vec<ElementId>) -> Self {
        self.children = Facet::Fetched(children);
        self
    }

    /// Set fetched permissions
    pub fn with_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.permissions = Facet::Fetched(permissions);
        self
    }

    /// Set fetched outgoing and incoming links
    pub fn with_links(mut self, down: Vec<Link>, up: Vec<Link>) -> Self {
        self.links_down = Facet::Fetched(down);
        self.links_up = Facet::Fetched(up);
        self
    }

    /// Check whether `kind` is fully materialized on this element
    pub fn has_facet(&self, kind: FacetKind) -> bool {
        match kind {
            FacetKind::Attributes => self.attributes.is_materialized(),
            FacetKind::Children => self.children.is_materialized(),
            FacetKind::Permissions => self.permissions.is_materialized(),
            FacetKind::Parent => self.parent.is_materialized(),
            FacetKind::LinksDown => self.links_down.is_materialized(),
            FacetKind::LinksUp => self.links_up.is_materialized(),
        }
    }

    /// Set of facets that are fully materialized
    pub fn present_facets(&self) -> FacetSet {
        FacetKind::ALL
            .into_iter()
            .filter(|k| self.has_facet(*k))
            .collect()
    }

    /// Mark every facet in `kinds` that is not present as failed
    pub fn mark_failed(&mut self, kinds: FacetSet, reason: &str) {
        let missing: Vec<FacetKind> = kinds.iter().filter(|k| !self.has_facet(*k)).collect();
        for kind in missing {
            let failed = reason.to_string();
            match kind {
                FacetKind::Attributes => self.attributes = Facet::FetchFailed(failed),
                FacetKind::Children => self.children = Facet::FetchFailed(failed),
                FacetKind::Permissions => self.permissions = Facet::FetchFailed(failed),
                FacetKind::Parent => self.parent = Facet::FetchFailed(failed),
                FacetKind::LinksDown => self.links_down = Facet::FetchFailed(failed),
                FacetKind::LinksUp => self.links_up = Facet::FetchFailed(failed),
            }
        }
    }

    /// Combine a freshly fetched copy of this element with the facets already
    /// present on `self`.
    ///
    /// Base fields and every facet present on `fresh` win; facets that `fresh`
    /// does not carry are kept from `self`.
    pub fn absorb(self, fresh: Element) -> Element {
        Element {
            id: fresh.id,
            uuid: fresh.uuid,
            type_id: fresh.type_id,
            scope_id: fresh.scope_id,
            title: fresh.title,
            attributes: keep_present(fresh.attributes, self.attributes),
            parent: keep_present(fresh.parent, self.parent),
            children: keep_present(fresh.children, self.children),
            permissions: keep_present(fresh.permissions, self.permissions),
            links_down: keep_present(fresh.links_down, self.links_down),
            links_up: keep_present(fresh.links_up, self.links_up),
        }
    }

    /// Fetched attributes, if present
    pub fn attributes(&self) -> Option<&Entity> {
        self.attributes.get()
    }

    /// Fetched parent reference; `Some(None)` for a root element
    pub fn parent(&self) -> Option<Option<ElementId>> {
        self.parent.get().copied()
    }

    /// Fetched children, if present
    pub fn children(&self) -> Option<&[ElementId]> {
        self.children.get().map(Vec::as_slice)
    }

    /// Fetched permissions, if present
    pub fn permissions(&self) -> Option<&[Permission]> {
        self.permissions.get().map(Vec::as_slice)
    }

    /// Fetched outgoing links, if present
    pub fn links_down(&self) -> Option<&[Link]> {
        self.links_down.get().map(Vec::as_slice)
    }

    /// Fetched incoming links, if present
    pub fn links_up(&self) -> Option<&[Link]> {
        self.links_up.get().map(Vec::as_slice)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} '{}'", self.type_id, self.id, self.title)
    }
}

fn keep_present<T: Materialized>(fresh: Facet<T>, old: Facet<T>) -> Facet<T> {
    if !fresh.is_materialized() && old.is_materialized() {
        old
    } else {
        fresh
    }
}
