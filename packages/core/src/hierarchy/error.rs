//! Hierarchy Error Types
//!
//! Every strategy reports failures through [`HierarchyError`]. None of them
//! are retried internally: each failure is deterministic given the input and
//! the current state, so only a caller with corrected input should retry.

use crate::config::ConfigError;
use crate::db::DatabaseError;
use crate::models::{EntityType, ValidationError};
use thiserror::Error;

/// Hierarchy operation errors
#[derive(Error, Debug)]
pub enum HierarchyError {
    /// Command failed validation (blank name, oversized page, ...)
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Referenced parent does not exist
    #[error("Parent {entity_type} not found: {parent_id}")]
    ParentNotFound {
        entity_type: EntityType,
        parent_id: i64,
    },

    /// Target node does not exist
    #[error("{entity_type} not found: {id}")]
    EntityNotFound { entity_type: EntityType, id: i64 },

    /// Cycle attempt or corrupted side state; the mutation was rolled back
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    /// Storage layer failure
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    /// Rejected service configuration
    #[error("Configuration rejected: {0}")]
    Config(#[from] ConfigError),
}

impl HierarchyError {
    /// Create a parent not found error
    pub fn parent_not_found(entity_type: EntityType, parent_id: i64) -> Self {
        Self::ParentNotFound {
            entity_type,
            parent_id,
        }
    }

    /// Create an entity not found error
    pub fn entity_not_found(entity_type: EntityType, id: i64) -> Self {
        Self::EntityNotFound { entity_type, id }
    }

    /// Create a data integrity error
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    /// Create the error for moving a node under itself or its own subtree
    pub fn cycle(node_id: i64, new_parent_id: i64) -> Self {
        Self::DataIntegrity(format!(
            "Cannot move node {} under {}: the target is the node itself or one of its descendants",
            node_id, new_parent_id
        ))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntityNotFound { .. } | Self::ParentNotFound { .. }
        )
    }

    pub fn is_data_integrity(&self) -> bool {
        matches!(self, Self::DataIntegrity(_))
    }
}
