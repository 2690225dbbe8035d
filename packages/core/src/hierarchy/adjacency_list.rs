//! Adjacency List Strategy
//!
//! Stores only `parent_id` per node. Every traversal is computed at query
//! time: ancestors by walking parent pointers, descendants by fanning out over
//! child scans. Both walks use explicit worklists and a visited set, so stack
//! depth stays bounded and a corrupted (cyclic) parent chain is reported as
//! `DataIntegrity` instead of looping.
//!
//! # Delete Policy
//!
//! Deleting a node promotes its direct children to roots (`parent_id = NULL`)
//! rather than cascading. The other three strategies cascade.

use crate::db::rows::{decode_node, execute, query_all, query_one, NODE_COLUMNS};
use crate::db::{DatabaseError, DatabaseService};
use crate::hierarchy::paging::{check_page, page_in_memory, NodeScan};
use crate::hierarchy::{
    CreateNode, DeleteOutcome, HierarchyError, HierarchyStrategy, StrategyKind, UpdateNode,
};
use crate::models::{EntityType, NameRules, Node, Page, PageRequest};
use async_trait::async_trait;
use libsql::{Connection, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

const TABLE: &str = "adjacency_nodes";

/// Parent-pointer tree encoding
pub struct AdjacencyListStrategy {
    db: Arc<DatabaseService>,
    rules: NameRules,
}

impl AdjacencyListStrategy {
    pub fn new(db: Arc<DatabaseService>, rules: NameRules) -> Self {
        Self { db, rules }
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

    async fn children_of(
        conn: &Connection,
        entity: EntityType,
        id: i64,
    ) -> Result<Vec<Node>, DatabaseError> {
        query_all(
            conn,
            &format!(
                "SELECT {} FROM {} n WHERE n.entity_type = ? AND n.parent_id = ? ORDER BY n.id",
                NODE_COLUMNS, TABLE
            ),
            (entity.as_str(), id),
            decode_node,
        )
        .await
    }

    /// Walk upward from `new_parent_id`; reaching `node_id` means the move
    /// would close a cycle.
    async fn ensure_not_own_ancestor(
        conn: &Connection,
        entity: EntityType,
        node_id: i64,
        new_parent_id: i64,
    ) -> Result<(), HierarchyError> {
        let mut visited = HashSet::new();
        let mut cursor = Some(new_parent_id);

        while let Some(current) = cursor {
            if current == node_id {
                return Err(HierarchyError::cycle(node_id, new_parent_id));
            }
            if !visited.insert(current) {
                tracing::warn!("Parent chain of {} {} loops at {}", entity, new_parent_id, current);
                return Err(HierarchyError::data_integrity(format!(
                    "Parent chain starting at {} loops at {}",
                    new_parent_id, current
                )));
            }
            cursor = Self::fetch(conn, entity, current)
                .await?
                .ok_or_else(|| {
                    HierarchyError::data_integrity(format!(
                        "Parent chain starting at {} references missing node {}",
                        new_parent_id, current
                    ))
                })?
                .parent_id;
        }

        Ok(())
    }

    /// Breadth-first subtree walk excluding the root, ordered by depth then id
    async fn collect_descendants(
        conn: &Connection,
        entity: EntityType,
        root_id: i64,
    ) -> Result<Vec<Node>, HierarchyError> {
        let mut visited = HashSet::from([root_id]);
        let mut queue = VecDeque::from([(root_id, 0usize)]);
        let mut descendants = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            for child in Self::children_of(conn, entity, current).await? {
                if !visited.insert(child.id) {
                    tracing::warn!("Subtree of {} {} revisits node {}", entity, root_id, child.id);
                    return Err(HierarchyError::data_integrity(format!(
                        "Subtree of {} contains a cycle through node {}",
                        root_id, child.id
                    )));
                }
                queue.push_back((child.id, depth + 1));
                descendants.push((depth + 1, child));
            }
        }

        descendants.sort_by_key(|(depth, node)| (*depth, node.id));
        Ok(descendants.into_iter().map(|(_, node)| node).collect())
    }

    /// Parent walk, nearest ancestor first
    async fn collect_ancestors(
        conn: &Connection,
        entity: EntityType,
        node: &Node,
    ) -> Result<Vec<Node>, HierarchyError> {
        let mut visited = HashSet::from([node.id]);
        let mut ancestors = Vec::new();
        let mut cursor = node.parent_id;

        while let Some(parent_id) = cursor {
            if !visited.insert(parent_id) {
                return Err(HierarchyError::data_integrity(format!(
                    "Ancestor chain of {} loops at {}",
                    node.id, parent_id
                )));
            }
            let parent = Self::fetch(conn, entity, parent_id).await?.ok_or_else(|| {
                HierarchyError::data_integrity(format!(
                    "Node {} references missing parent {}",
                    node.id, parent_id
                ))
            })?;
            cursor = parent.parent_id;
            ancestors.push(parent);
        }

        Ok(ancestors)
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
            "INSERT INTO adjacency_nodes (entity_type, name, parent_id) VALUES (?, ?, ?)",
            (entity.as_str(), command.name.as_str(), command.parent_id),
        )
        .await?;

        Ok(Node {
            id: conn.last_insert_rowid(),
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
        let node = Self::require(conn, entity, id).await?;

        let target = command.apply_to(&node);
        if target == node {
            return Ok(node);
        }

        if node.parent_id != target.parent_id {
            if let Some(new_parent_id) = target.parent_id {
                if new_parent_id == id {
                    return Err(HierarchyError::cycle(id, new_parent_id));
                }
                if Self::fetch(conn, entity, new_parent_id).await?.is_none() {
                    return Err(HierarchyError::parent_not_found(entity, new_parent_id));
                }
                Self::ensure_not_own_ancestor(conn, entity, id, new_parent_id).await?;
            }
        }

        execute(
            conn,
            "UPDATE adjacency_nodes SET name = ?, parent_id = ? WHERE entity_type = ? AND id = ?",
            (target.name.as_str(), target.parent_id, entity.as_str(), id),
        )
        .await?;

        Ok(target)
    }

    async fn delete_in(
        conn: &Connection,
        entity: EntityType,
        id: i64,
    ) -> Result<DeleteOutcome, HierarchyError> {
        Self::require(conn, entity, id).await?;

        // Confirms the subtree is acyclic before touching it
        let subtree = Self::collect_descendants(conn, entity, id).await?;
        let orphaned: Vec<i64> = subtree
            .iter()
            .filter(|node| node.parent_id == Some(id))
            .map(|node| node.id)
            .collect();

        execute(
            conn,
            "UPDATE adjacency_nodes SET parent_id = NULL WHERE entity_type = ? AND parent_id = ?",
            (entity.as_str(), id),
        )
        .await?;
        execute(
            conn,
            "DELETE FROM adjacency_nodes WHERE entity_type = ? AND id = ?",
            (entity.as_str(), id),
        )
        .await?;

        Ok(DeleteOutcome {
            deleted: vec![id],
            orphaned,
        })
    }
}

#[async_trait]
impl HierarchyStrategy for AdjacencyListStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AdjacencyList
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
            "Deleted {} {}, promoted {} children to roots",
            entity,
            id,
            outcome.orphaned.len()
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
            format!("{} n", TABLE),
            "n.entity_type = ? AND n.parent_id = ?",
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
        check_page(page)?;
        let conn = self.db.connection().await;
        Self::require(&conn, entity, id).await?;

        let descendants = Self::collect_descendants(&conn, entity, id).await?;
        tracing::debug!("Walked {} descendants of {} {}", descendants.len(), entity, id);
        Ok(page_in_memory(descendants, page))
    }

    async fn get_ancestors(
        &self,
        entity: EntityType,
        id: i64,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError> {
        check_page(page)?;
        let conn = self.db.connection().await;
        let node = Self::require(&conn, entity, id).await?;

        let ancestors = Self::collect_ancestors(&conn, entity, &node).await?;
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
