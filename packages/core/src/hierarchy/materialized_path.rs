//! Materialized Path Strategy
//!
//! Each node stores the ids from its root down to itself as a delimited
//! string, e.g. `/1/4/9/`. Descendant queries become prefix matches and
//! ancestors are read straight off the node's own path.
//!
//! Paths are rewritten in bulk when a subtree moves. A move under the node's
//! own subtree is rejected by a prefix check before anything is written.

use crate::db::rows::{decode_node, execute, query_all, query_one, NODE_COLUMNS};
use crate::db::{DatabaseError, DatabaseService};
use crate::hierarchy::paging::{check_page, page_in_memory, NodeScan};
use crate::hierarchy::{
    CreateNode, DeleteOutcome, HierarchyError, HierarchyStrategy, StrategyKind, UpdateNode,
};
use crate::models::{EntityType, NameRules, Node, Page, PageRequest};
use async_trait::async_trait;
use libsql::{Connection, Row, Value};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

const TABLE: &str = "path_nodes";

const SEPARATOR: char = '/';

/// Number of separators in `n.path`; one more than the node's depth
const SEPARATOR_COUNT_SQL: &str = "(LENGTH(n.path) - LENGTH(REPLACE(n.path, '/', '')))";

/// Path of a node created under `parent_path` (or as a root when `None`)
pub fn child_path(parent_path: Option<&str>, id: i64) -> String {
    match parent_path {
        Some(parent) => format!("{}{}{}", parent, id, SEPARATOR),
        None => format!("{}{}{}", SEPARATOR, id, SEPARATOR),
    }
}

/// Split a stored path into its ids, root first
///
/// # Errors
///
/// `DataIntegrity` if the path is not of the form `/id/.../id/`.
pub fn parse_path(path: &str) -> Result<Vec<i64>, HierarchyError> {
    let malformed = || HierarchyError::data_integrity(format!("Malformed path '{}'", path));

    let inner = path
        .strip_prefix(SEPARATOR)
        .and_then(|rest| rest.strip_suffix(SEPARATOR))
        .filter(|inner| !inner.is_empty())
        .ok_or_else(malformed)?;

    inner
        .split(SEPARATOR)
        .map(|segment| segment.parse::<i64>().map_err(|_| malformed()))
        .collect()
}

/// Parse the path of `node_id`, checking it ends in the node and never
/// repeats an id
fn checked_path(node_id: i64, path: &str) -> Result<Vec<i64>, HierarchyError> {
    let ids = parse_path(path)?;

    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(repeated) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(HierarchyError::data_integrity(format!(
            "Path '{}' of node {} repeats id {}",
            path, node_id, repeated
        )));
    }
    if ids.last() != Some(&node_id) {
        return Err(HierarchyError::data_integrity(format!(
            "Path '{}' does not end in its own node {}",
            path, node_id
        )));
    }

    Ok(ids)
}

/// A node together with its stored path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEntry {
    pub node: Node,
    pub path: String,
}

impl PathEntry {
    /// Number of ids in the path (1 for a root)
    pub fn depth(&self) -> usize {
        self.path.matches(SEPARATOR).count().saturating_sub(1)
    }

    fn subtree_pattern(&self) -> String {
        format!("{}%", self.path)
    }
}

fn decode_entry(row: &Row) -> Result<PathEntry, DatabaseError> {
    Ok(PathEntry {
        node: decode_node(row)?,
        path: row.get(4)?,
    })
}

/// Delimited-path tree encoding
pub struct MaterializedPathStrategy {
    db: Arc<DatabaseService>,
    rules: NameRules,
}

impl MaterializedPathStrategy {
    pub fn new(db: Arc<DatabaseService>, rules: NameRules) -> Self {
        Self { db, rules }
    }

    /// Every node of `entity` with its path, ordered by id
    pub async fn paths(&self, entity: EntityType) -> Result<Vec<PathEntry>, HierarchyError> {
        let conn = self.db.connection().await;
        let entries = query_all(
            &conn,
            &format!(
                "SELECT {}, n.path FROM {} n WHERE n.entity_type = ? ORDER BY n.id",
                NODE_COLUMNS, TABLE
            ),
            [entity.as_str()],
            decode_entry,
        )
        .await?;
        Ok(entries)
    }

    async fn fetch(
        conn: &Connection,
        entity: EntityType,
        id: i64,
    ) -> Result<Option<PathEntry>, DatabaseError> {
        query_one(
            conn,
            &format!(
                "SELECT {}, n.path FROM {} n WHERE n.entity_type = ? AND n.id = ?",
                NODE_COLUMNS, TABLE
            ),
            (entity.as_str(), id),
            decode_entry,
        )
        .await
    }

    async fn require(
        conn: &Connection,
        entity: EntityType,
        id: i64,
    ) -> Result<PathEntry, HierarchyError> {
        Self::fetch(conn, entity, id)
            .await?
            .ok_or_else(|| HierarchyError::entity_not_found(entity, id))
    }

    /// Scan over the strict descendants of `entry`
    fn subtree_scan(entity: EntityType, entry: &PathEntry, filter_depth: bool) -> NodeScan {
        let mut filter = String::from("n.entity_type = ? AND n.path LIKE ? AND n.id <> ?");
        let mut params = vec![
            Value::from(entity.as_str()),
            Value::from(entry.subtree_pattern()),
            Value::Integer(entry.node.id),
        ];
        if filter_depth {
            filter.push_str(&format!(" AND {} = ?", SEPARATOR_COUNT_SQL));
            params.push(Value::Integer(entry.depth() as i64 + 2));
        }
        NodeScan::new(format!("{} n", TABLE), filter, params)
    }

    async fn create_in(
        conn: &Connection,
        entity: EntityType,
        command: CreateNode,
    ) -> Result<Node, HierarchyError> {
        let parent = match command.parent_id {
            Some(parent_id) => Some(
                Self::fetch(conn, entity, parent_id)
                    .await?
                    .ok_or_else(|| HierarchyError::parent_not_found(entity, parent_id))?,
            ),
            None => None,
        };

        // The path embeds the generated id, so it is written after the insert
        execute(
            conn,
            "INSERT INTO path_nodes (entity_type, name, parent_id, path) VALUES (?, ?, ?, '')",
            (entity.as_str(), command.name.as_str(), command.parent_id),
        )
        .await?;
        let id = conn.last_insert_rowid();

        let path = child_path(parent.as_ref().map(|p| p.path.as_str()), id);
        execute(
            conn,
            "UPDATE path_nodes SET path = ? WHERE id = ?",
            (path.as_str(), id),
        )
        .await?;

        Ok(Node {
            id,
            entity_type: entity,
            name: command.name,
            parent_id: command.parent_id,
        })
    }

    async fn update_in(
        conn: &Connection,
        entity: EntityType,
        id: i64,
        command: UpdateNode,
    ) -> Result<Node, HierarchyError> {
        let entry = Self::require(conn, entity, id).await?;

        let target = command.apply_to(&entry.node);
        if target == entry.node {
            return Ok(entry.node);
        }

        if entry.node.parent_id == target.parent_id {
            execute(
                conn,
                "UPDATE path_nodes SET name = ? WHERE id = ?",
                (target.name.as_str(), id),
            )
            .await?;
        } else {
            let new_path = match target.parent_id {
                Some(parent_id) => {
                    if parent_id == id {
                        return Err(HierarchyError::cycle(id, parent_id));
                    }
                    let parent = Self::fetch(conn, entity, parent_id)
                        .await?
                        .ok_or_else(|| HierarchyError::parent_not_found(entity, parent_id))?;
                    if parent.path.starts_with(&entry.path) {
                        return Err(HierarchyError::cycle(id, parent_id));
                    }
                    child_path(Some(&parent.path), id)
                }
                None => child_path(None, id),
            };

            // Rewrite the old prefix of every descendant, then the node itself
            let rewritten = execute(
                conn,
                "UPDATE path_nodes SET path = ? || substr(path, ?)
                 WHERE entity_type = ? AND path LIKE ? AND id <> ?",
                (
                    new_path.as_str(),
                    entry.path.len() as i64 + 1,
                    entity.as_str(),
                    entry.subtree_pattern(),
                    id,
                ),
            )
            .await?;
            execute(
                conn,
                "UPDATE path_nodes SET path = ?, parent_id = ?, name = ? WHERE id = ?",
                (
                    new_path.as_str(),
                    target.parent_id,
                    target.name.as_str(),
                    id,
                ),
            )
            .await?;

            tracing::debug!(
                "Rewrote {} -> {} for {} and {} descendants",
                entry.path,
                new_path,
                id,
                rewritten
            );
        }

        Ok(target)
    }

    async fn delete_in(
        conn: &Connection,
        entity: EntityType,
        id: i64,
    ) -> Result<DeleteOutcome, HierarchyError> {
        let entry = Self::require(conn, entity, id).await?;

        let subtree = query_all(
            conn,
            &format!(
                "SELECT {}, n.path FROM {} n WHERE n.entity_type = ? AND n.path LIKE ?
                 ORDER BY {} ASC, n.id ASC",
                NODE_COLUMNS, TABLE, SEPARATOR_COUNT_SQL
            ),
            (entity.as_str(), entry.subtree_pattern()),
            decode_entry,
        )
        .await?;

        for member in &subtree {
            checked_path(member.node.id, &member.path)?;
        }

        execute(
            conn,
            "DELETE FROM path_nodes WHERE entity_type = ? AND path LIKE ?",
            (entity.as_str(), entry.subtree_pattern()),
        )
        .await?;

        Ok(DeleteOutcome {
            deleted: subtree.into_iter().map(|member| member.node.id).collect(),
            orphaned: Vec::new(),
        })
    }
}

#[async_trait]
impl HierarchyStrategy for MaterializedPathStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MaterializedPath
    }

    async fn create(
        &self,
        entity: EntityType,
        command: CreateNode,
    ) -> Result<Node, HierarchyError> {
        self.rules.validate(&command.name)?;

        let tx = self.db.begin().await?;
        let result = Self::create_in(&tx, entity, command).await;
        let node = tx.finish(result).await?;

        tracing::info!("Created {} {} (parent {:?})", entity, node.id, node.parent_id);
        Ok(node)
    }

    async fn update(
        &self,
        entity: EntityType,
        id: i64,
        command: UpdateNode,
    ) -> Result<Node, HierarchyError> {
        command.validate(&self.rules)?;

        let tx = self.db.begin().await?;
        let result = Self::update_in(&tx, entity, id, command).await;
        let node = tx.finish(result).await?;

        tracing::info!("Updated {} {} (parent {:?})", entity, id, node.parent_id);
        Ok(node)
    }

    async fn delete(&self, entity: EntityType, id: i64) -> Result<DeleteOutcome, HierarchyError> {
        let tx = self.db.begin().await?;
        let result = Self::delete_in(&tx, entity, id).await;
        let outcome = tx.finish(result).await?;

        tracing::info!(
            "Deleted {} {} with {} nodes in its subtree",
            entity,
            id,
            outcome.deleted.len()
        );
        Ok(outcome)
    }

    async fn get_by_id(&self, entity: EntityType, id: i64) -> Result<Node, HierarchyError> {
        let conn = self.db.connection().await;
        Ok(Self::require(&conn, entity, id).await?.node)
    }

    async fn get_children(
        &self,
        entity: EntityType,
        id: i64,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError> {
        let conn = self.db.connection().await;
        let entry = Self::require(&conn, entity, id).await?;

        Self::subtree_scan(entity, &entry, true)
            .fetch(&conn, page)
            .await
    }

    async fn get_descendants(
        &self,
        entity: EntityType,
        id: i64,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError> {
        let conn = self.db.connection().await;
        let entry = Self::require(&conn, entity, id).await?;

        Self::subtree_scan(entity, &entry, false)
            .natural_order(format!("{} ASC", SEPARATOR_COUNT_SQL))
            .fetch(&conn, page)
            .await
    }

    async fn get_ancestors(
        &self,
        entity: EntityType,
        id: i64,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError> {
        check_page(page)?;
        let conn = self.db.connection().await;
        let entry = Self::require(&conn, entity, id).await?;

        let ids = checked_path(id, &entry.path)?;
        let mut ancestors = Vec::with_capacity(ids.len().saturating_sub(1));
        for ancestor_id in ids.iter().rev().skip(1) {
            let ancestor = Self::fetch(&conn, entity, *ancestor_id)
                .await?
                .ok_or_else(|| {
                    HierarchyError::data_integrity(format!(
                        "Path '{}' of node {} references missing node {}",
                        entry.path, id, ancestor_id
                    ))
                })?;
            ancestors.push(ancestor.node);
        }

        Ok(page_in_memory(ancestors, page))
    }

    async fn search_by_name(
        &self,
        entity: EntityType,
        fragment: &str,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError> {
        let scan = NodeScan::search(TABLE, entity, fragment)?;
        let conn = self.db.connection().await;
        scan.fetch(&conn, page).await
    }

    async fn list_roots(
        &self,
        entity: EntityType,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError> {
        let conn = self.db.connection().await;
        NodeScan::roots(TABLE, entity).fetch(&conn, page).await
    }

    async fn list_all(
        &self,
        entity: EntityType,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError> {
        let conn = self.db.connection().await;
        NodeScan::all(TABLE, entity).fetch(&conn, page).await
    }
}
