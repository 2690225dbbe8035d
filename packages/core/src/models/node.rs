//! Node Data Structures
//!
//! This module defines the `Node` struct shared by every hierarchy strategy,
//! the `EntityType` tag that discriminates entity families inside one physical
//! table, and the name rules applied on every create/update.
//!
//! # Architecture
//!
//! - **Ids, not references**: A node points at its parent by id only. Trees are
//!   never represented with embedded child references, so no reference cycle can
//!   exist in memory.
//! - **Shared tables**: Departments, jobs, projects and teams that use the same
//!   strategy share one node table; `entity_type` scopes every query.
//! - **Side state lives elsewhere**: Intervals, paths and closure rows are owned
//!   by the strategy that maintains them (see [`crate::hierarchy`]).
//!
//! # Examples
//!
//! ```rust
//! use orgtree_core::models::{EntityType, NameRules};
//!
//! let rules = NameRules::new(16);
//! assert!(rules.validate("Engineering").is_ok());
//! assert!(rules.validate("   ").is_err());
//! assert_eq!("team".parse::<EntityType>().unwrap(), EntityType::Team);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default maximum name length (in characters)
pub const DEFAULT_MAX_NAME_LENGTH: usize = 255;

/// Validation errors for node commands
///
/// Always recoverable by the caller; the engine never retries them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name must not be blank")]
    BlankName,

    #[error("Name is {actual} characters long, maximum is {max}")]
    NameTooLong { max: usize, actual: usize },

    #[error("Search fragment must not be blank")]
    BlankSearch,

    #[error("Invalid page request: {0}")]
    InvalidPage(String),

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),
}

/// Logical entity family a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Department,
    Job,
    Project,
    Team,
}

impl EntityType {
    /// Every entity family, in declaration order
    pub const ALL: [EntityType; 4] = [
        EntityType::Department,
        EntityType::Job,
        EntityType::Project,
        EntityType::Team,
    ];

    /// Tag stored in the `entity_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Department => "department",
            EntityType::Job => "job",
            EntityType::Project => "project",
            EntityType::Team => "team",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "department" => Ok(EntityType::Department),
            "job" => Ok(EntityType::Job),
            "project" => Ok(EntityType::Project),
            "team" => Ok(EntityType::Team),
            other => Err(ValidationError::UnknownEntityType(other.to_string())),
        }
    }
}

/// One element of a hierarchy.
///
/// # Fields
///
/// - `id`: Store-assigned identity, stable and never reused
/// - `entity_type`: Family the node belongs to (department, job, ...)
/// - `name`: Display name, validated by [`NameRules`]
/// - `parent_id`: Parent node id, `None` for roots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier assigned at creation
    pub id: i64,

    /// Entity family tag
    pub entity_type: EntityType,

    /// Node name
    pub name: String,

    /// Parent node ID (None means this node is a root)
    pub parent_id: Option<i64>,
}

impl Node {
    /// Whether this node has no parent
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Name constraints shared by all strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameRules {
    max_length: usize,
}

impl Default for NameRules {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NAME_LENGTH)
    }
}

impl NameRules {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Validate a node name
    ///
    /// # Errors
    ///
    /// - `BlankName` if the name is empty or whitespace only
    /// - `NameTooLong` if the name has more than `max_length` characters
    pub fn validate(&self, name: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::BlankName);
        }

        let actual = name.chars().count();
        if actual > self.max_length {
            return Err(ValidationError::NameTooLong {
                max: self.max_length,
                actual,
            });
        }

        Ok(())
    }
}
