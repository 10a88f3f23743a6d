//! SQLite Element Store
//!
//! This module provides a wrapper around rusqlite implementing [`ElementStore`]
//! plus the write operations needed to seed and mutate a store. The single
//! connection is guarded by a mutex so the store can be shared by reference
//! between the retriever and the command service.

use crate::element::{
    Element, ElementId, Entity, Facet, FacetKind, FacetSet, Link, Permission, Property,
    PropertyGroup, ScopeId, TypeId,
};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqliteResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::dataset::Dataset;
use super::schema::{
    ELEMENT_COLUMNS, SCHEMA_CREATE_ELEMENTS, SCHEMA_CREATE_INDEXES, SCHEMA_CREATE_LINKS,
    SCHEMA_CREATE_METADATA, SCHEMA_CREATE_PERMISSIONS, SCHEMA_CREATE_PROPERTIES, SELECT_LINKS_DOWN,
    SELECT_LINKS_UP, STORE_SCHEMA_VERSION,
};
use super::{ElementStore, StoreError};

/// Base row of an element to insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewElement {
    /// Explicit id; assigned by SQLite when `None`
    pub id: Option<ElementId>,
    pub uuid: String,
    pub type_id: TypeId,
    pub scope_id: Option<ScopeId>,
    pub parent_id: Option<ElementId>,
    /// Position among the parent's children
    pub position: i64,
    pub title: String,
}

impl NewElement {
    /// Create a new unscoped root element row
    pub fn new(
        uuid: impl Into<String>,
        type_id: impl Into<TypeId>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            uuid: uuid.into(),
            type_id: type_id.into(),
            scope_id: None,
            parent_id: None,
            position: 0,
            title: title.into(),
        }
    }

    /// Use an explicit id
    pub fn with_id(mut self, id: impl Into<ElementId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Place the element in a scope
    pub fn in_scope(mut self, scope_id: impl Into<ScopeId>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    /// Place the element under a parent at a position
    pub fn under(mut self, parent_id: impl Into<ElementId>, position: i64) -> Self {
        self.parent_id = Some(parent_id.into());
        self.position = position;
        self
    }
}

/// Row counts of a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub elements: usize,
    pub properties: usize,
    pub links: usize,
    pub permissions: usize,
}

/// SQLite-backed element store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// Database file, `None` for in-memory stores
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open an existing store, initializing the schema if the file is new
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;

        let initialized: bool = conn.query_row(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'store_metadata'
            )
            "#,
            [],
            |row| row.get(0),
        )?;
        let version = if initialized {
            read_metadata(&conn, "schema_version")?
        } else {
            None
        };

        match version {
            Some(version) if version == STORE_SCHEMA_VERSION => {}
            Some(version) => {
                return Err(StoreError::SchemaVersionMismatch {
                    expected: STORE_SCHEMA_VERSION.to_string(),
                    found: version,
                });
            }
            None => {
                debug!("Initializing element store schema at {:?}", path);
                Self::initialize_schema(&conn)?;
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create a new store database with schema
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;
        Self::initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Configure connection with optimal settings
    fn configure_connection(conn: &Connection) -> SqliteResult<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        // 16MB page cache (negative value = KB)
        conn.pragma_update(None, "cache_size", -16000)?;
        Ok(())
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(SCHEMA_CREATE_ELEMENTS, [])?;
        conn.execute(SCHEMA_CREATE_PROPERTIES, [])?;
        conn.execute(SCHEMA_CREATE_LINKS, [])?;
        conn.execute(SCHEMA_CREATE_PERMISSIONS, [])?;
        conn.execute(SCHEMA_CREATE_METADATA, [])?;
        conn.execute_batch(SCHEMA_CREATE_INDEXES)?;
        write_metadata(conn, "schema_version", STORE_SCHEMA_VERSION)?;
        Ok(())
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // =========================================================================
    // Metadata Operations
    // =========================================================================

    /// Get a metadata value
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        Ok(read_metadata(&conn, key)?)
    }

    /// Set a metadata value
    pub fn set_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        write_metadata(&conn, key, value)?;
        Ok(())
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Insert an element base row, returning its id
    pub fn insert_element(&self, element: &NewElement) -> Result<ElementId, StoreError> {
        let conn = self.conn.lock();
        insert_element_row(&conn, element)
    }

    /// Append an attribute value to a property group
    pub fn set_property(
        &self,
        id: ElementId,
        group: &str,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        insert_property_row(&conn, id, group, key, value)?;
        Ok(())
    }

    /// Insert a link; returns `false` if the same link already existed
    pub fn insert_link(&self, link: &Link) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        Ok(insert_link_row(&conn, link)? > 0)
    }

    /// Grant (or replace) a role permission on an element
    pub fn grant_permission(
        &self,
        id: ElementId,
        permission: &Permission,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        upsert_permission_row(&conn, id, permission)?;
        Ok(())
    }

    /// Remove an element, its whole subtree and every link touching it.
    ///
    /// Returns the number of elements deleted.
    pub fn remove_element(&self, id: ElementId) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM elements WHERE id = ?1)",
            [id.0],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::ElementNotFound(id));
        }

        let subtree: Vec<i64> = {
            let mut stmt = tx.prepare(
                r#"
                WITH RECURSIVE subtree(id) AS (
                    SELECT ?1
                    UNION
                    SELECT e.id FROM elements e JOIN subtree s ON e.parent_id = s.id
                )
                SELECT id FROM subtree
                "#,
            )?;
            let ids = stmt
                .query_map([id.0], |row| row.get(0))?
                .collect::<SqliteResult<Vec<i64>>>()?;
            ids
        };

        {
            let mut delete_properties = tx.prepare("DELETE FROM properties WHERE element_id = ?1")?;
            let mut delete_permissions =
                tx.prepare("DELETE FROM permissions WHERE element_id = ?1")?;
            let mut delete_links =
                tx.prepare("DELETE FROM links WHERE source = ?1 OR target = ?1")?;
            let mut delete_element = tx.prepare("DELETE FROM elements WHERE id = ?1")?;

            for element_id in &subtree {
                delete_properties.execute([element_id])?;
                delete_permissions.execute([element_id])?;
                delete_links.execute([element_id])?;
                delete_element.execute([element_id])?;
            }
        }

        tx.commit()?;
        debug!(element_id = %id, removed = subtree.len(), "Removed element subtree");
        Ok(subtree.len())
    }

    /// Load every row of a dataset in one transaction
    pub fn import_dataset(&self, dataset: &Dataset) -> Result<StoreCounts, StoreError> {
        dataset.validate()?;

        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;

            let mut positions: HashMap<Option<i64>, i64> = HashMap::new();
            for element in &dataset.elements {
                let position = positions.entry(element.parent).or_insert(0);
                let id = insert_element_row(&tx, &element.to_new_element(*position))?;
                *position += 1;

                for (group, values) in &element.properties {
                    for (key, value) in values {
                        insert_property_row(&tx, id, group, key, value)?;
                    }
                }
                for permission in &element.permissions {
                    upsert_permission_row(&tx, id, permission)?;
                }
            }

            for link in &dataset.links {
                insert_link_row(&tx, &link.to_link())?;
            }

            tx.commit()?;
        }

        debug!(
            elements = dataset.elements.len(),
            links = dataset.links.len(),
            "Imported dataset"
        );
        self.counts()
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Find a shallow element by uuid
    pub fn find_by_uuid(&self, uuid: &str) -> Result<Option<Element>, StoreError> {
        let conn = self.conn.lock();
        let element = conn
            .query_row(
                &format!("SELECT {ELEMENT_COLUMNS} FROM elements WHERE uuid = ?1"),
                [uuid],
                row_to_element,
            )
            .optional()?;
        Ok(element)
    }

    /// Get row counts
    pub fn counts(&self) -> Result<StoreCounts, StoreError> {
        let conn = self.conn.lock();
        let count = |table: &str| -> SqliteResult<usize> {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as usize)
        };

        Ok(StoreCounts {
            elements: count("elements")?,
            properties: count("properties")?,
            links: count("links")?,
            permissions: count("permissions")?,
        })
    }
}

impl ElementStore for SqliteStore {
    fn query_by_type_and_scope(
        &self,
        type_ids: &[TypeId],
        scope_id: Option<ScopeId>,
    ) -> Result<Vec<Element>, StoreError> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if !type_ids.is_empty() {
            let placeholders = vec!["?"; type_ids.len()].join(", ");
            clauses.push(format!("type_id IN ({placeholders})"));
            values.extend(type_ids.iter().map(|t| Value::Text(t.to_string())));
        }
        if let Some(scope) = scope_id {
            clauses.push("scope_id = ?".to_string());
            values.push(Value::Integer(scope.0));
        }

        let mut sql = format!("SELECT {ELEMENT_COLUMNS} FROM elements");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let elements = stmt
            .query_map(params_from_iter(values.iter()), row_to_element)?
            .collect::<SqliteResult<Vec<_>>>()?;

        trace!(
            types = type_ids.len(),
            scope = ?scope_id,
            found = elements.len(),
            "Queried elements by type and scope"
        );
        Ok(elements)
    }

    fn fetch(&self, id: ElementId, facets: FacetSet) -> Result<Element, StoreError> {
        let conn = self.conn.lock();
        fetch_element(&conn, id, facets)
    }

    fn fetch_many(&self, ids: &[ElementId], facets: FacetSet) -> Result<Vec<Element>, StoreError> {
        let conn = self.conn.lock();
        ids.iter()
            .map(|id| fetch_element(&conn, *id, facets))
            .collect()
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

/// Convert a base row to a shallow Element
fn row_to_element(row: &rusqlite::Row<'_>) -> SqliteResult<Element> {
    Ok(Element::new(
        ElementId(row.get(0)?),
        row.get::<_, String>(1)?,
        TypeId::new(row.get::<_, String>(2)?),
        row.get::<_, Option<i64>>(3)?.map(ScopeId),
        row.get::<_, String>(4)?,
    ))
}

fn fetch_element(
    conn: &Connection,
    id: ElementId,
    facets: FacetSet,
) -> Result<Element, StoreError> {
    let mut element = conn
        .query_row(
            &format!("SELECT {ELEMENT_COLUMNS} FROM elements WHERE id = ?1"),
            [id.0],
            row_to_element,
        )
        .optional()?
        .ok_or(StoreError::ElementNotFound(id))?;

    for kind in facets.iter() {
        match kind {
            FacetKind::Attributes => element.attributes = Facet::Fetched(load_entity(conn, id)?),
            FacetKind::Children => element.children = Facet::Fetched(load_children(conn, id)?),
            FacetKind::Permissions => {
                element.permissions = Facet::Fetched(load_permissions(conn, id)?)
            }
            FacetKind::Parent => element.parent = Facet::Fetched(load_parent(conn, id)?),
            FacetKind::LinksDown => {
                element.links_down = Facet::Fetched(load_links(conn, SELECT_LINKS_DOWN, id)?)
            }
            FacetKind::LinksUp => {
                element.links_up = Facet::Fetched(load_links(conn, SELECT_LINKS_UP, id)?)
            }
        }
    }

    Ok(element)
}

fn load_entity(conn: &Connection, id: ElementId) -> Result<Entity, StoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT group_type, key, value FROM properties
        WHERE element_id = ?1
        ORDER BY group_type, id
        "#,
    )?;
    let rows = stmt
        .query_map([id.0], |row| {
            Ok((
                row.get::<_, String>(0)?,
                Property::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
            ))
        })?
        .collect::<SqliteResult<Vec<_>>>()?;

    let mut grouped: BTreeMap<String, Vec<Property>> = BTreeMap::new();
    for (group, property) in rows {
        grouped.entry(group).or_default().push(property);
    }

    Ok(Entity::fetched(
        grouped
            .into_iter()
            .map(|(group, properties)| (group, PropertyGroup::fetched(properties)))
            .collect(),
    ))
}

fn load_children(conn: &Connection, id: ElementId) -> Result<Vec<ElementId>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT id FROM elements WHERE parent_id = ?1 ORDER BY position, id")?;
    let children = stmt
        .query_map([id.0], |row| row.get::<_, i64>(0).map(ElementId))?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(children)
}

fn load_parent(conn: &Connection, id: ElementId) -> Result<Option<ElementId>, StoreError> {
    let parent: Option<i64> = conn.query_row(
        "SELECT parent_id FROM elements WHERE id = ?1",
        [id.0],
        |row| row.get(0),
    )?;
    Ok(parent.map(ElementId))
}

fn load_permissions(conn: &Connection, id: ElementId) -> Result<Vec<Permission>, StoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT role, read_allowed, write_allowed FROM permissions
        WHERE element_id = ?1
        ORDER BY role
        "#,
    )?;
    let permissions = stmt
        .query_map([id.0], |row| {
            Ok(Permission::new(
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(permissions)
}

fn load_links(conn: &Connection, sql: &str, id: ElementId) -> Result<Vec<Link>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let links = stmt
        .query_map([id.0], |row| {
            Ok(Link {
                source: ElementId(row.get(0)?),
                target: ElementId(row.get(1)?),
                relation_id: row.get::<_, String>(2)?.into(),
                comment: row.get(3)?,
            })
        })?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(links)
}

fn insert_element_row(conn: &Connection, element: &NewElement) -> Result<ElementId, StoreError> {
    conn.execute(
        r#"
        INSERT INTO elements (id, uuid, type_id, scope_id, parent_id, position, title)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            element.id.map(|id| id.0),
            element.uuid,
            element.type_id.as_str(),
            element.scope_id.map(|s| s.0),
            element.parent_id.map(|p| p.0),
            element.position,
            element.title,
        ],
    )?;
    Ok(ElementId(conn.last_insert_rowid()))
}

fn insert_property_row(
    conn: &Connection,
    id: ElementId,
    group: &str,
    key: &str,
    value: &str,
) -> SqliteResult<usize> {
    conn.execute(
        "INSERT INTO properties (element_id, group_type, key, value) VALUES (?1, ?2, ?3, ?4)",
        params![id.0, group, key, value],
    )
}

fn insert_link_row(conn: &Connection, link: &Link) -> SqliteResult<usize> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO links (source, target, relation_id, comment)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![
            link.source.0,
            link.target.0,
            link.relation_id.as_str(),
            link.comment,
        ],
    )
}

fn upsert_permission_row(
    conn: &Connection,
    id: ElementId,
    permission: &Permission,
) -> SqliteResult<usize> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO permissions (element_id, role, read_allowed, write_allowed)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![id.0, permission.role, permission.read, permission.write],
    )
}

fn read_metadata(conn: &Connection, key: &str) -> SqliteResult<Option<String>> {
    conn.query_row(
        "SELECT value FROM store_metadata WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
}

fn write_metadata(conn: &Connection, key: &str, value: &str) -> SqliteResult<usize> {
    conn.execute(
        "INSERT OR REPLACE INTO store_metadata (key, value) VALUES (?1, ?2)",
        params![key, value],
    )
}
