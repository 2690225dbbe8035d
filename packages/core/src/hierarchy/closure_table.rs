//! Closure Table Strategy
//!
//! Stores one `closure_entries` row for every (ancestor, descendant) pair,
//! self pairs included at level 0. Every traversal is a single join with no
//! recursion: children are level 1, descendants level > 0, ancestors the rows
//! where the node is the descendant.
//!
//! A chain R -> C -> G therefore holds six rows: three self pairs plus
//! (R, C), (C, G) and (R, G).
//!
//! # Moves
//!
//! Rows internal to the moved subtree stay as they are. Only the rows linking
//! subtree members to their old outside ancestors are removed, and the rows
//! linking them to the new parent's ancestor chain are inserted.

use crate::db::rows::{decode_node, execute, query_all, query_i64, query_one, NODE_COLUMNS};
use crate::db::{DatabaseError, DatabaseService};
use crate::hierarchy::paging::NodeScan;
use crate::hierarchy::{
    CreateNode, DeleteOutcome, HierarchyError, HierarchyStrategy, StrategyKind, UpdateNode,
};
use crate::models::{EntityType, NameRules, Node, Page, PageRequest};
use async_trait::async_trait;
use libsql::{Connection, Value};
use serde::Serialize;
use std::sync::Arc;

const TABLE: &str = "closure_nodes";

/// One (ancestor, descendant) pair with its distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureEntry {
    pub ancestor_id: i64,
    pub descendant_id: i64,
    pub level: i64,
}

impl ClosureEntry {
    pub fn new(ancestor_id: i64, descendant_id: i64, level: i64) -> Self {
        Self {
            ancestor_id,
            descendant_id,
            level,
        }
    }
}

/// Transitive-closure tree encoding
pub struct ClosureTableStrategy {
    db: Arc<DatabaseService>,
    rules: NameRules,
}

impl ClosureTableStrategy {
    pub fn new(db: Arc<DatabaseService>, rules: NameRules) -> Self {
        Self { db, rules }
    }

    /// Every closure row whose descendant belongs to `entity`, sorted
    pub async fn closure_rows(&self, entity: EntityType) -> Result<Vec<ClosureEntry>, HierarchyError> {
        let conn = self.db.connection().await;
        let rows = query_all(
            &conn,
            "SELECT c.ancestor_id, c.descendant_id, c.level
             FROM closure_entries c JOIN closure_nodes n ON n.id = c.descendant_id
             WHERE n.entity_type = ?
             ORDER BY c.ancestor_id, c.descendant_id",
            [entity.as_str()],
            |row| {
                Ok(ClosureEntry::new(
                    row.get::<i64>(0)?,
                    row.get::<i64>(1)?,
                    row.get::<i64>(2)?,
                ))
            },
        )
        .await?;
        Ok(rows)
    }

    async fn fetch(
        conn: &Connection,
        entity: EntityType,
        id: i64,
    ) -> Result<Option<Node>, DatabaseError> {
        query_one(
            conn,
            &format!(
                "SELECT {} FROM {} n WHERE n.entity_type = ? AND n.id = ?",
                NODE_COLUMNS, TABLE
            ),
            (entity.as_str(), id),
            decode_node,
        )
        .await
    }

    async fn require(
        conn: &Connection,
        entity: EntityType,
        id: i64,
    ) -> Result<Node, HierarchyError> {
        Self::fetch(conn, entity, id)
            .await?
            .ok_or_else(|| HierarchyError::entity_not_found(entity, id))
    }

    /// Subtree members with their distance from `id`, `id` itself first
    async fn subtree_of(conn: &Connection, id: i64) -> Result<Vec<(i64, i64)>, DatabaseError> {
        query_all(
            conn,
            "SELECT descendant_id, level FROM closure_entries
             WHERE ancestor_id = ? ORDER BY level, descendant_id",
            [id],
            |row| Ok((row.get::<i64>(0)?, row.get::<i64>(1)?)),
        )
        .await
    }

    /// Copy the ancestor chain of `parent_id` onto `descendant_id`, `offset`
    /// levels further down
    async fn link_under(
        conn: &Connection,
        parent_id: i64,
        descendant_id: i64,
        offset: i64,
    ) -> Result<u64, DatabaseError> {
        execute(
            conn,
            "INSERT INTO closure_entries (ancestor_id, descendant_id, level)
             SELECT ancestor_id, ?, level + 1 + ? FROM closure_entries WHERE descendant_id = ?",
            [descendant_id, offset, parent_id],
        )
        .await
    }

    async fn create_in(
        conn: &Connection,
        entity: EntityType,
        command: CreateNode,
    ) -> Result<Node, HierarchyError> {
        if let Some(parent_id) = command.parent_id {
            if Self::fetch(conn, entity, parent_id).await?.is_none() {
                return Err(HierarchyError::parent_not_found(entity, parent_id));
            }
        }

        execute(
            conn,
            "INSERT INTO closure_nodes (entity_type, name, parent_id) VALUES (?, ?, ?)",
            (entity.as_str(), command.name.as_str(), command.parent_id),
        )
        .await?;
        let id = conn.last_insert_rowid();

        execute(
            conn,
            "INSERT INTO closure_entries (ancestor_id, descendant_id, level) VALUES (?, ?, 0)",
            [id, id],
        )
        .await?;
        if let Some(parent_id) = command.parent_id {
            // A parent without closure rows cannot pass its chain on
            if Self::link_under(conn, parent_id, id, 0).await? == 0 {
                return Err(HierarchyError::parent_not_found(entity, parent_id));
            }
        }

        Ok(Node {
            id,
            entity_type: entity,
            name: command.name,
            parent_id: command.parent_id,
        })
    }

    async fn move_subtree(
        conn: &Connection,
        entity: EntityType,
        id: i64,
        new_parent_id: Option<i64>,
    ) -> Result<(), HierarchyError> {
        if let Some(parent_id) = new_parent_id {
            if parent_id == id {
                return Err(HierarchyError::cycle(id, parent_id));
            }
            if Self::fetch(conn, entity, parent_id).await?.is_none() {
                return Err(HierarchyError::parent_not_found(entity, parent_id));
            }
            let inside = query_i64(
                conn,
                "SELECT COUNT(*) FROM closure_entries WHERE ancestor_id = ? AND descendant_id = ?",
                [id, parent_id],
            )
            .await?;
            if inside > 0 {
                return Err(HierarchyError::cycle(id, parent_id));
            }
            let chain = query_i64(
                conn,
                "SELECT COUNT(*) FROM closure_entries WHERE descendant_id = ?",
                [parent_id],
            )
            .await?;
            if chain == 0 {
                return Err(HierarchyError::parent_not_found(entity, parent_id));
            }
        }

        let subtree = Self::subtree_of(conn, id).await?;
        if subtree.first() != Some(&(id, 0)) {
            return Err(HierarchyError::data_integrity(format!(
                "Closure rows of node {} lack its self pair",
                id
            )));
        }

        // Detach: for a member `rel` levels below the node, rows deeper than
        // `rel` point at ancestors outside the subtree
        let mut detached = 0;
        for (member, rel) in &subtree {
            detached += execute(
                conn,
                "DELETE FROM closure_entries WHERE descendant_id = ? AND level > ?",
                [*member, *rel],
            )
            .await?;
        }

        let mut attached = 0;
        if let Some(parent_id) = new_parent_id {
            for (member, rel) in &subtree {
                attached += Self::link_under(conn, parent_id, *member, *rel).await?;
            }
        }

        execute(
            conn,
            "UPDATE closure_nodes SET parent_id = ? WHERE id = ?",
            (new_parent_id, id),
        )
        .await?;

        tracing::debug!(
            "Moved {} {} with {} members: -{} +{} closure rows",
            entity,
            id,
            subtree.len(),
            detached,
            attached
        );
        Ok(())
    }

    async fn update_in(
        conn: &Connection,
        entity: EntityType,
        id: i64,
        command: UpdateNode,
    ) -> Result<Node, HierarchyError> {
        let node = Self::require(conn, entity, id).await?;

        let target = command.apply_to(&node);
        if target == node {
            return Ok(node);
        }

        if node.parent_id != target.parent_id {
            Self::move_subtree(conn, entity, id, target.parent_id).await?;
        }

        if node.name != target.name {
            execute(
                conn,
                "UPDATE closure_nodes SET name = ? WHERE id = ?",
                (target.name.as_str(), id),
            )
            .await?;
        }

        Ok(target)
    }

    async fn delete_in(
        conn: &Connection,
        entity: EntityType,
        id: i64,
    ) -> Result<DeleteOutcome, HierarchyError> {
        Self::require(conn, entity, id).await?;

        let deleted: Vec<i64> = Self::subtree_of(conn, id)
            .await?
            .into_iter()
            .map(|(member, _)| member)
            .collect();

        let mut removed_rows = 0;
        for member in &deleted {
            removed_rows += execute(
                conn,
                "DELETE FROM closure_entries WHERE ancestor_id = ? OR descendant_id = ?",
                [*member, *member],
            )
            .await?;
            execute(
                conn,
                "DELETE FROM closure_nodes WHERE entity_type = ? AND id = ?",
                (entity.as_str(), *member),
            )
            .await?;
        }

        tracing::debug!(
            "Removed {} closure rows under {} {}",
            removed_rows,
            entity,
            id
        );

        Ok(DeleteOutcome {
            deleted,
            orphaned: Vec::new(),
        })
    }

    fn joined(on: &str) -> String {
        format!("{} n JOIN closure_entries c ON c.{} = n.id", TABLE, on)
    }
}

#[async_trait]
impl HierarchyStrategy for ClosureTableStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ClosureTable
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
        Self::require(&conn, entity, id).await
    }

    async fn get_children(
        &self,
        entity: EntityType,
        id: i64,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError> {
        let conn = self.db.connection().await;
        Self::require(&conn, entity, id).await?;

        NodeScan::new(
            Self::joined("descendant_id"),
            "n.entity_type = ? AND c.ancestor_id = ? AND c.level = 1",
            vec![Value::from(entity.as_str()), Value::Integer(id)],
        )
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
        Self::require(&conn, entity, id).await?;

        NodeScan::new(
            Self::joined("descendant_id"),
            "n.entity_type = ? AND c.ancestor_id = ? AND c.level > 0",
            vec![Value::from(entity.as_str()), Value::Integer(id)],
        )
        .natural_order("c.level ASC")
        .fetch(&conn, page)
        .await
    }

    async fn get_ancestors(
        &self,
        entity: EntityType,
        id: i64,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError> {
        let conn = self.db.connection().await;
        Self::require(&conn, entity, id).await?;

        NodeScan::new(
            Self::joined("ancestor_id"),
            "n.entity_type = ? AND c.descendant_id = ? AND c.level > 0",
            vec![Value::from(entity.as_str()), Value::Integer(id)],
        )
        .natural_order("c.level ASC")
        .fetch(&conn, page)
        .await
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
