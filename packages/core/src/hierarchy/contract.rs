//! HierarchyStrategy Trait - Shared Contract
//!
//! This module defines the `HierarchyStrategy` trait that all four tree
//! encodings implement. Callers (the hierarchy service, tests, benches) depend
//! only on this trait; which encoding backs an entity type is configuration.
//!
//! # Method Categories
//!
//! - **Mutation**: create, update (rename and/or move), delete with subtree
//! - **Lookup**: get by id, search by name, list roots, list all
//! - **Traversal**: children, descendants, ancestors
//!
//! Every listing takes an optional [`PageRequest`]. `None` returns the whole
//! result as one page in the natural order of the operation.
//!
//! # Transactions
//!
//! Each mutation runs as one transaction. An error at any step (validation,
//! cycle detection, storage) rolls back every write the mutation made.

use crate::hierarchy::HierarchyError;
use crate::models::{EntityType, NameRules, Node, Page, PageRequest, ValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tree encoding used for an entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    AdjacencyList,
    NestedSet,
    MaterializedPath,
    ClosureTable,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::AdjacencyList,
        StrategyKind::NestedSet,
        StrategyKind::MaterializedPath,
        StrategyKind::ClosureTable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::AdjacencyList => "adjacency_list",
            StrategyKind::NestedSet => "nested_set",
            StrategyKind::MaterializedPath => "materialized_path",
            StrategyKind::ClosureTable => "closure_table",
        }
    }

    /// Whether deleting a node removes its whole subtree
    ///
    /// The adjacency list promotes direct children to roots instead.
    pub fn cascades_delete(&self) -> bool {
        !matches!(self, StrategyKind::AdjacencyList)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown strategy: {}", s))
    }
}

/// Command to create a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNode {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

impl CreateNode {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_id: None,
        }
    }

    pub fn child(name: impl Into<String>, parent_id: i64) -> Self {
        Self {
            name: name.into(),
            parent_id: Some(parent_id),
        }
    }
}

/// Command to rename and/or move a node
///
/// A field left as `None` keeps the node's stored value, read inside the
/// update's transaction. `parent_id: Some(None)` makes the node a root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(
        default,
        deserialize_with = "explicit_parent",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<i64>>,
}

/// `"parentId": null` means "make root", an absent key means "keep parent"
fn explicit_parent<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}

impl UpdateNode {
    /// Full desired state: both name and parent are written
    pub fn new(name: impl Into<String>, parent_id: Option<i64>) -> Self {
        Self {
            name: Some(name.into()),
            parent_id: Some(parent_id),
        }
    }

    /// Change only the name
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            parent_id: None,
        }
    }

    /// Change only the parent
    pub fn move_to(parent_id: Option<i64>) -> Self {
        Self {
            name: None,
            parent_id: Some(parent_id),
        }
    }

    /// Validate the new name, if one is given
    pub fn validate(&self, rules: &NameRules) -> Result<(), ValidationError> {
        match &self.name {
            Some(name) => rules.validate(name),
            None => Ok(()),
        }
    }

    /// The node as it looks after this update
    pub fn apply_to(self, current: &Node) -> Node {
        Node {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            parent_id: self.parent_id.unwrap_or(current.parent_id),
            ..current.clone()
        }
    }
}

/// What a delete removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    /// Ids of every removed node, by depth then id
    pub deleted: Vec<i64>,

    /// Ids of direct children promoted to roots (adjacency list only)
    pub orphaned: Vec<i64>,
}

/// Abstraction over the four tree encodings
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the service shares them behind `Arc`.
#[async_trait]
pub trait HierarchyStrategy: Send + Sync {
    /// Encoding implemented by this strategy
    fn kind(&self) -> StrategyKind;

    /// Create a node, optionally under an existing parent
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank or oversized name
    /// - `ParentNotFound` if `parent_id` is given but missing
    async fn create(&self, entity: EntityType, command: CreateNode)
        -> Result<Node, HierarchyError>;

    /// Rename and/or move a node
    ///
    /// Renaming to the current name under the current parent writes nothing.
    ///
    /// # Errors
    ///
    /// - `EntityNotFound` if the node is missing
    /// - `ParentNotFound` if the new parent is missing
    /// - `DataIntegrity` if the new parent is the node or one of its descendants
    async fn update(
        &self,
        entity: EntityType,
        id: i64,
        command: UpdateNode,
    ) -> Result<Node, HierarchyError>;

    /// Delete a node together with its subtree (see [`StrategyKind::cascades_delete`])
    async fn delete(&self, entity: EntityType, id: i64) -> Result<DeleteOutcome, HierarchyError>;

    async fn get_by_id(&self, entity: EntityType, id: i64) -> Result<Node, HierarchyError>;

    /// Direct children, ordered by id unless sorted explicitly
    async fn get_children(
        &self,
        entity: EntityType,
        id: i64,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError>;

    /// Whole subtree excluding the node, shallowest first
    async fn get_descendants(
        &self,
        entity: EntityType,
        id: i64,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError>;

    /// Ancestors excluding the node, nearest first (parent, ..., root)
    async fn get_ancestors(
        &self,
        entity: EntityType,
        id: i64,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError>;

    /// Case-insensitive substring match on the name
    async fn search_by_name(
        &self,
        entity: EntityType,
        fragment: &str,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError>;

    /// Nodes without a parent
    async fn list_roots(
        &self,
        entity: EntityType,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError>;

    /// Every node of the entity type, ordered by id
    async fn list_all(
        &self,
        entity: EntityType,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError>;
}
