//! Engine configuration
//!
//! [`OrgTreeConfig`] selects where the database lives, the name and paging
//! limits handed to the strategies, and which strategy backs each entity type.
//! Every field has a default, so a partial JSON document (or none at all) is a
//! valid configuration.
//!
//! # Example
//!
//! ```rust
//! use orgtree_core::config::OrgTreeConfig;
//! use orgtree_core::hierarchy::StrategyKind;
//! use orgtree_core::models::EntityType;
//!
//! let config = OrgTreeConfig::from_json_str(
//!     r#"{ "maxPageSize": 50, "strategies": { "team": "closure_table" } }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.max_page_size, 50);
//! assert_eq!(config.strategy_for(EntityType::Team), StrategyKind::ClosureTable);
//! assert_eq!(config.strategy_for(EntityType::Job), StrategyKind::NestedSet);
//! ```

use crate::db::IN_MEMORY_PATH;
use crate::hierarchy::StrategyKind;
use crate::models::{EntityType, NameRules, PageRequest, DEFAULT_MAX_NAME_LENGTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Strategy backing each entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyAssignments {
    pub department: StrategyKind,
    pub job: StrategyKind,
    pub project: StrategyKind,
    pub team: StrategyKind,
}

impl Default for StrategyAssignments {
    fn default() -> Self {
        Self {
            department: StrategyKind::ClosureTable,
            job: StrategyKind::NestedSet,
            project: StrategyKind::MaterializedPath,
            team: StrategyKind::AdjacencyList,
        }
    }
}

impl StrategyAssignments {
    /// Every entity type backed by `kind`
    pub fn uniform(kind: StrategyKind) -> Self {
        Self {
            department: kind,
            job: kind,
            project: kind,
            team: kind,
        }
    }

    pub fn get(&self, entity: EntityType) -> StrategyKind {
        match entity {
            EntityType::Department => self.department,
            EntityType::Job => self.job,
            EntityType::Project => self.project,
            EntityType::Team => self.team,
        }
    }
}

/// Configuration for the hierarchy engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrgTreeConfig {
    /// Database file, or `:memory:` for an ephemeral store
    pub database_path: PathBuf,

    /// Maximum node name length, in characters
    pub max_name_length: usize,

    /// Page size used by [`OrgTreeConfig::first_page`]
    pub default_page_size: u32,

    /// Largest page a caller may request
    pub max_page_size: u32,

    pub strategies: StrategyAssignments,
}

impl Default for OrgTreeConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            strategies: StrategyAssignments::default(),
        }
    }
}

impl OrgTreeConfig {
    /// Default configuration over a database file
    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded config from {}", path.display());
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("databasePath must not be empty".into()));
        }
        if self.max_name_length == 0 {
            return Err(ConfigError::Invalid("maxNameLength must be positive".into()));
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::Invalid("maxPageSize must be positive".into()));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "defaultPageSize must be between 1 and maxPageSize ({}), got {}",
                self.max_page_size, self.default_page_size
            )));
        }
        Ok(())
    }

    pub fn name_rules(&self) -> NameRules {
        NameRules::new(self.max_name_length)
    }

    pub fn strategy_for(&self, entity: EntityType) -> StrategyKind {
        self.strategies.get(entity)
    }

    /// First page at the default page size
    pub fn first_page(&self) -> PageRequest {
        PageRequest::first(self.default_page_size)
    }
}
