//! OrgTree Core - Hierarchy Encoding Engine
//!
//! This crate stores tree-shaped business entities (departments, jobs,
//! projects, teams) in a flat relational store using one of four
//! interchangeable encodings, all behind one behavioral contract.
//!
//! # Architecture
//!
//! - **One contract**: [`hierarchy::HierarchyStrategy`] covers create, rename,
//!   move, delete-with-subtree and child/descendant/ancestor traversal, all
//!   paginated and sortable
//! - **Four encodings**: Adjacency List, Nested Set, Materialized Path and
//!   Closure Table, each keeping its own side state consistent
//! - **libsql**: Embedded SQLite-compatible database, on disk or in memory
//! - **Transactional mutations**: a failed mutation leaves no partial rewrite
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, EntityType, paging types)
//! - [`hierarchy`] - The strategy trait and its four implementations
//! - [`services`] - Entity-type façade and view mapping
//! - [`db`] - Database layer with libsql integration
//! - [`config`] - Engine configuration

pub mod config;
pub mod db;
pub mod hierarchy;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{ConfigError, OrgTreeConfig};
pub use hierarchy::{
    CreateNode, DeleteOutcome, HierarchyError, HierarchyStrategy, StrategyKind, UpdateNode,
};
pub use models::*;
pub use services::{HierarchyService, NodeView};
