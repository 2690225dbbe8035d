//! Nested Set Strategy
//!
//! Maintains a pre-order interval labeling (`left_index`, `right_index`) per
//! entity type so that ancestor and descendant questions become range
//! comparisons with no recursion.
//!
//! # Invariants
//!
//! - `left_index < right_index` for every node
//! - A node's descendants are exactly the nodes whose interval lies strictly
//!   inside its own; sibling intervals never overlap
//! - The forest of one entity type is numbered `1..=2n` without gaps
//! - `level` is 0 for roots and grows by one per generation; `root_id` names
//!   the top ancestor
//!
//! # Mutations
//!
//! Inserts and moves shift every interval to the right of the affected
//! boundary. Those wide updates are read-then-write, so each mutation runs in
//! one transaction holding the connection lock.

use crate::db::rows::{decode_node, execute, query_all, query_i64, query_one, NODE_COLUMNS};
use crate::db::{DatabaseError, DatabaseService};
use crate::hierarchy::paging::NodeScan;
use crate::hierarchy::{
    CreateNode, DeleteOutcome, HierarchyError, HierarchyStrategy, StrategyKind, UpdateNode,
};
use crate::models::{EntityType, NameRules, Node, Page, PageRequest};
use async_trait::async_trait;
use libsql::{Connection, Row, Value};
use serde::Serialize;
use std::sync::Arc;

const TABLE: &str = "nested_set_nodes";

/// A node together with its nested set labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedInterval {
    pub node: Node,
    pub left: i64,
    pub right: i64,
    pub level: i64,
    pub root_id: i64,
}

impl NestedInterval {
    /// Number of labels the subtree occupies (two per node)
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Whether `other` lies inside this interval (or is this node)
    pub fn encloses(&self, other: &NestedInterval) -> bool {
        other.left >= self.left && other.right <= self.right
    }
}

fn decode_interval(row: &Row) -> Result<NestedInterval, DatabaseError> {
    let node = decode_node(row)?;
    let left: i64 = row.get(4)?;
    let right: i64 = row.get(5)?;
    let level: i64 = row.get(6)?;
    let root_id: Option<i64> = row.get(7)?;
    let root_id = root_id
        .ok_or_else(|| DatabaseError::row_decode(format!("node {} has no root id", node.id)))?;

    Ok(NestedInterval {
        node,
        left,
        right,
        level,
        root_id,
    })
}

fn interval_columns() -> String {
    format!(
        "{}, n.left_index, n.right_index, n.level, n.root_id",
        NODE_COLUMNS
    )
}

/// Interval-labeled tree encoding
pub struct NestedSetStrategy {
    db: Arc<DatabaseService>,
    rules: NameRules,
}

impl NestedSetStrategy {
    pub fn new(db: Arc<DatabaseService>, rules: NameRules) -> Self {
        Self { db, rules }
    }

    /// Every interval of `entity`, in label order
    pub async fn intervals(&self, entity: EntityType) -> Result<Vec<NestedInterval>, HierarchyError> {
        let conn = self.db.connection().await;
        let intervals = query_all(
            &conn,
            &format!(
                "SELECT {} FROM {} n WHERE n.entity_type = ? ORDER BY n.left_index",
                interval_columns(),
                TABLE
            ),
            [entity.as_str()],
            decode_interval,
        )
        .await?;
        Ok(intervals)
    }

    /// Renumber the forest of `entity` to `1..=2n`, preserving nesting
    ///
    /// Returns the number of rows whose labels changed.
    pub async fn repack(&self, entity: EntityType) -> Result<usize, HierarchyError> {
        let tx = self.db.begin().await?;
        let result = Self::repack_in(&tx, entity).await;
        tx.finish(result).await
    }

    async fn fetch(
        conn: &Connection,
        entity: EntityType,
        id: i64,
    ) -> Result<Option<NestedInterval>, DatabaseError> {
        query_one(
            conn,
            &format!(
                "SELECT {} FROM {} n WHERE n.entity_type = ? AND n.id = ?",
                interval_columns(),
                TABLE
            ),
            (entity.as_str(), id),
            decode_interval,
        )
        .await
    }

    async fn require(
        conn: &Connection,
        entity: EntityType,
        id: i64,
    ) -> Result<NestedInterval, HierarchyError> {
        Self::fetch(conn, entity, id)
            .await?
            .ok_or_else(|| HierarchyError::entity_not_found(entity, id))
    }

    async fn max_right(conn: &Connection, entity: EntityType) -> Result<i64, DatabaseError> {
        query_i64(
            conn,
            "SELECT MAX(right_index) FROM nested_set_nodes WHERE entity_type = ?",
            [entity.as_str()],
        )
        .await
    }

    /// Add `delta` to every label of `entity` at or beyond `boundary`
    async fn shift_from(
        conn: &Connection,
        entity: EntityType,
        boundary: i64,
        delta: i64,
    ) -> Result<(), DatabaseError> {
        execute(
            conn,
            "UPDATE nested_set_nodes SET left_index = left_index + ? WHERE entity_type = ? AND left_index >= ?",
            (delta, entity.as_str(), boundary),
        )
        .await?;
        execute(
            conn,
            "UPDATE nested_set_nodes SET right_index = right_index + ? WHERE entity_type = ? AND right_index >= ?",
            (delta, entity.as_str(), boundary),
        )
        .await?;
        Ok(())
    }

    async fn create_in(
        conn: &Connection,
        entity: EntityType,
        command: CreateNode,
    ) -> Result<Node, HierarchyError> {
        let id = match command.parent_id {
            None => {
                let max_right = Self::max_right(conn, entity).await?;
                execute(
                    conn,
                    "INSERT INTO nested_set_nodes (entity_type, name, parent_id, left_index, right_index, level, root_id)
                     VALUES (?, ?, NULL, ?, ?, 0, NULL)",
                    (
                        entity.as_str(),
                        command.name.as_str(),
                        max_right + 1,
                        max_right + 2,
                    ),
                )
                .await?;
                let id = conn.last_insert_rowid();
                execute(
                    conn,
                    "UPDATE nested_set_nodes SET root_id = ? WHERE id = ?",
                    [id, id],
                )
                .await?;
                id
            }
            Some(parent_id) => {
                let parent = Self::fetch(conn, entity, parent_id)
                    .await?
                    .ok_or_else(|| HierarchyError::parent_not_found(entity, parent_id))?;

                // Open a two-label gap right before the parent's closing label
                let gap = parent.right;
                Self::shift_from(conn, entity, gap, 2).await?;

                execute(
                    conn,
                    "INSERT INTO nested_set_nodes (entity_type, name, parent_id, left_index, right_index, level, root_id)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                    (
                        entity.as_str(),
                        command.name.as_str(),
                        parent_id,
                        gap,
                        gap + 1,
                        parent.level + 1,
                        parent.root_id,
                    ),
                )
                .await?;
                conn.last_insert_rowid()
            }
        };

        Ok(Node {
            id,
            entity_type: entity,
            name: command.name,
            parent_id: command.parent_id,
        })
    }

    /// Relocate the subtree of `node` under `new_parent_id` (or to a new root)
    async fn move_subtree(
        conn: &Connection,
        entity: EntityType,
        node: &NestedInterval,
        new_parent_id: Option<i64>,
    ) -> Result<(), HierarchyError> {
        let node_id = node.node.id;
        let size = node.width();

        let (destination, new_level, new_root_id) = match new_parent_id {
            Some(parent_id) => {
                if parent_id == node_id {
                    return Err(HierarchyError::cycle(node_id, parent_id));
                }
                let parent = Self::fetch(conn, entity, parent_id)
                    .await?
                    .ok_or_else(|| HierarchyError::parent_not_found(entity, parent_id))?;
                if node.encloses(&parent) || parent.node.parent_id == Some(node_id) {
                    return Err(HierarchyError::cycle(node_id, parent_id));
                }
                (parent.right, parent.level + 1, parent.root_id)
            }
            None => (Self::max_right(conn, entity).await? + 1, 0, node_id),
        };
        let level_delta = new_level - node.level;

        // 1. Make room at the destination
        Self::shift_from(conn, entity, destination, size).await?;

        // 2. Where the subtree sits after the shift
        let (old_left, old_right) = if node.left >= destination {
            (node.left + size, node.right + size)
        } else {
            (node.left, node.right)
        };

        // 3. Relocate the subtree into the gap
        let distance = destination - old_left;
        execute(
            conn,
            "UPDATE nested_set_nodes
             SET left_index = left_index + ?, right_index = right_index + ?, level = level + ?
             WHERE entity_type = ? AND left_index >= ? AND right_index <= ?",
            (
                distance,
                distance,
                level_delta,
                entity.as_str(),
                old_left,
                old_right,
            ),
        )
        .await?;

        // 4. Close the vacated range
        Self::shift_from(conn, entity, old_right + 1, -size).await?;

        // 5. Propagate root and parent
        let new_left = if destination > old_right {
            destination - size
        } else {
            destination
        };
        let new_right = new_left + size - 1;
        execute(
            conn,
            "UPDATE nested_set_nodes SET root_id = ?
             WHERE entity_type = ? AND left_index >= ? AND right_index <= ?",
            (new_root_id, entity.as_str(), new_left, new_right),
        )
        .await?;
        execute(
            conn,
            "UPDATE nested_set_nodes SET parent_id = ? WHERE id = ?",
            (new_parent_id, node_id),
        )
        .await?;

        tracing::debug!(
            "Moved {} {} ({} labels) to [{}, {}]",
            entity,
            node_id,
            size,
            new_left,
            new_right
        );
        Ok(())
    }

    async fn update_in(
        conn: &Connection,
        entity: EntityType,
        id: i64,
        command: UpdateNode,
    ) -> Result<Node, HierarchyError> {
        let current = Self::require(conn, entity, id).await?;

        let target = command.apply_to(&current.node);
        if target == current.node {
            return Ok(current.node);
        }

        if current.node.parent_id != target.parent_id {
            Self::move_subtree(conn, entity, &current, target.parent_id).await?;
        }

        if current.node.name != target.name {
            execute(
                conn,
                "UPDATE nested_set_nodes SET name = ? WHERE id = ?",
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
        let node = Self::require(conn, entity, id).await?;

        let deleted = query_all(
            conn,
            "SELECT id FROM nested_set_nodes
             WHERE entity_type = ? AND left_index >= ? AND right_index <= ?
             ORDER BY level, id",
            (entity.as_str(), node.left, node.right),
            |row| Ok(row.get::<i64>(0)?),
        )
        .await?;

        execute(
            conn,
            "DELETE FROM nested_set_nodes WHERE entity_type = ? AND left_index >= ? AND right_index <= ?",
            (entity.as_str(), node.left, node.right),
        )
        .await?;

        let relabeled = Self::repack_in(conn, entity).await?;
        tracing::debug!(
            "Removed {} nodes under {} {}, relabeled {}",
            deleted.len(),
            entity,
            id,
            relabeled
        );

        Ok(DeleteOutcome {
            deleted,
            orphaned: Vec::new(),
        })
    }

    /// Global re-pack: map every label, in order, onto `1..=2n`
    async fn repack_in(conn: &Connection, entity: EntityType) -> Result<usize, HierarchyError> {
        let labels = query_all(
            conn,
            "SELECT id, left_index, right_index FROM nested_set_nodes WHERE entity_type = ?",
            [entity.as_str()],
            |row| Ok((row.get::<i64>(0)?, row.get::<i64>(1)?, row.get::<i64>(2)?)),
        )
        .await?;

        // (label, node slot, is_left)
        let mut endpoints: Vec<(i64, usize, bool)> = Vec::with_capacity(labels.len() * 2);
        for (slot, (_, left, right)) in labels.iter().enumerate() {
            endpoints.push((*left, slot, true));
            endpoints.push((*right, slot, false));
        }
        endpoints.sort_unstable_by_key(|(label, _, _)| *label);

        if let Some(pair) = endpoints.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            tracing::warn!("Nested set of {} reuses label {}", entity, pair[0].0);
            return Err(HierarchyError::data_integrity(format!(
                "Nested set of {} reuses label {}",
                entity, pair[0].0
            )));
        }

        let mut packed: Vec<(i64, i64)> = labels.iter().map(|(_, l, r)| (*l, *r)).collect();
        for (position, (_, slot, is_left)) in endpoints.iter().enumerate() {
            let label = position as i64 + 1;
            if *is_left {
                packed[*slot].0 = label;
            } else {
                packed[*slot].1 = label;
            }
        }

        let mut changed = 0;
        for ((id, left, right), (new_left, new_right)) in labels.iter().zip(packed) {
            if *left != new_left || *right != new_right {
                execute(
                    conn,
                    "UPDATE nested_set_nodes SET left_index = ?, right_index = ? WHERE id = ?",
                    [new_left, new_right, *id],
                )
                .await?;
                changed += 1;
            }
        }

        Ok(changed)
    }
}

#[async_trait]
impl HierarchyStrategy for NestedSetStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NestedSet
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
        let node = Self::require(&conn, entity, id).await?;

        NodeScan::new(
            format!("{} n", TABLE),
            "n.entity_type = ? AND n.left_index > ? AND n.right_index < ? AND n.level = ?",
            vec![
                Value::from(entity.as_str()),
                Value::Integer(node.left),
                Value::Integer(node.right),
                Value::Integer(node.level + 1),
            ],
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
        let node = Self::require(&conn, entity, id).await?;

        NodeScan::new(
            format!("{} n", TABLE),
            "n.entity_type = ? AND n.left_index > ? AND n.right_index < ?",
            vec![
                Value::from(entity.as_str()),
                Value::Integer(node.left),
                Value::Integer(node.right),
            ],
        )
        .natural_order("n.level ASC")
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
        let node = Self::require(&conn, entity, id).await?;

        NodeScan::new(
            format!("{} n", TABLE),
            "n.entity_type = ? AND n.left_index < ? AND n.right_index > ?",
            vec![
                Value::from(entity.as_str()),
                Value::Integer(node.left),
                Value::Integer(node.right),
            ],
        )
        .natural_order("n.left_index DESC")
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
