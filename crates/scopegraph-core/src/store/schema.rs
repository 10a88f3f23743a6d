//! SQLite Schema Definitions for the Element Store
//!
//! One database holds every element of every scope. Facets map to tables:
//! attributes → `properties`, links → `links`, permissions → `permissions`;
//! parent and children are derived from `elements.parent_id`.

/// Schema version for element store databases
pub const STORE_SCHEMA_VERSION: &str = "1.0";

/// SQL to create the elements table
///
/// Base rows: identity, type, scope and tree position.
pub const SCHEMA_CREATE_ELEMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS elements (
    -- Stable database identity
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,

    -- Element type (e.g., "asset", "incident_scenario")
    type_id TEXT NOT NULL,

    -- Owning scope (organization); NULL for unscoped elements
    scope_id INTEGER,

    -- Containment tree
    parent_id INTEGER,
    position INTEGER NOT NULL DEFAULT 0,

    title TEXT NOT NULL DEFAULT ''
)
"#;

/// SQL to create the properties table
///
/// Attribute values grouped by property type. Multi-valued keys keep their
/// insertion order through the autoincrement id.
pub const SCHEMA_CREATE_PROPERTIES: &str = r#"
CREATE TABLE IF NOT EXISTS properties (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    element_id INTEGER NOT NULL,
    group_type TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL
)
"#;

/// SQL to create the links table
pub const SCHEMA_CREATE_LINKS: &str = r#"
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source INTEGER NOT NULL,
    target INTEGER NOT NULL,
    relation_id TEXT NOT NULL,
    comment TEXT,

    -- One link per relation type between the same pair
    UNIQUE(source, target, relation_id)
)
"#;

/// SQL to create the permissions table
pub const SCHEMA_CREATE_PERMISSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS permissions (
    element_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    read_allowed INTEGER NOT NULL DEFAULT 0,
    write_allowed INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (element_id, role)
)
"#;

/// SQL to create the metadata table
pub const SCHEMA_CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS store_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

/// SQL to create indexes for efficient queries
pub const SCHEMA_CREATE_INDEXES: &str = r#"
-- Type/scope selection used by graph loaders
CREATE INDEX IF NOT EXISTS idx_elements_type_scope ON elements(type_id, scope_id);

-- Children lookup
CREATE INDEX IF NOT EXISTS idx_elements_parent ON elements(parent_id, position);

-- Attribute lookup
CREATE INDEX IF NOT EXISTS idx_properties_element ON properties(element_id);

-- Outgoing and incoming link lookup
CREATE INDEX IF NOT EXISTS idx_links_source ON links(source);
CREATE INDEX IF NOT EXISTS idx_links_target ON links(target);
"#;

/// Outgoing links of an element, in insertion order
pub const SELECT_LINKS_DOWN: &str =
    "SELECT source, target, relation_id, comment FROM links WHERE source = ?1 ORDER BY id";

/// Incoming links of an element, in insertion order
pub const SELECT_LINKS_UP: &str =
    "SELECT source, target, relation_id, comment FROM links WHERE target = ?1 ORDER BY id";

/// Column names for base row queries (in order for row mapping)
pub const ELEMENT_COLUMNS: &str = "id, uuid, type_id, scope_id, title";
