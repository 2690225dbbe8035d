//! Hierarchy Strategies
//!
//! Four interchangeable encodings of a forest of named nodes, all behind the
//! [`HierarchyStrategy`] trait:
//!
//! | Strategy                      | Side state              | Cheap             | Expensive              |
//! |-------------------------------|-------------------------|-------------------|------------------------|
//! | [`AdjacencyListStrategy`]     | none                    | move, delete      | descendants, ancestors |
//! | [`NestedSetStrategy`]         | interval labels         | subtree reads     | every insert and move  |
//! | [`MaterializedPathStrategy`]  | `/id/.../id/` path      | prefix reads      | subtree moves          |
//! | [`ClosureTableStrategy`]      | all ancestor pairs      | every traversal   | storage, moves         |
//!
//! All mutations are transactional and reject moves that would create a
//! cycle before writing anything.

mod adjacency_list;
mod closure_table;
mod contract;
mod error;
mod materialized_path;
mod nested_set;
pub(crate) mod paging;

#[cfg(test)]
mod adjacency_list_test;
#[cfg(test)]
mod closure_table_test;

pub use adjacency_list::AdjacencyListStrategy;
pub use closure_table::{ClosureEntry, ClosureTableStrategy};
pub use contract::{CreateNode, DeleteOutcome, HierarchyStrategy, StrategyKind, UpdateNode};
pub use error::HierarchyError;
pub use materialized_path::{child_path, parse_path, MaterializedPathStrategy, PathEntry};
pub use nested_set::{NestedInterval, NestedSetStrategy};

use crate::db::DatabaseService;
use crate::models::NameRules;
use std::sync::Arc;

/// Build the strategy implementing `kind` over a shared database
pub fn build_strategy(
    kind: StrategyKind,
    db: Arc<DatabaseService>,
    rules: NameRules,
) -> Arc<dyn HierarchyStrategy> {
    match kind {
        StrategyKind::AdjacencyList => Arc::new(AdjacencyListStrategy::new(db, rules)),
        StrategyKind::NestedSet => Arc::new(NestedSetStrategy::new(db, rules)),
        StrategyKind::MaterializedPath => Arc::new(MaterializedPathStrategy::new(db, rules)),
        StrategyKind::ClosureTable => Arc::new(ClosureTableStrategy::new(db, rules)),
    }
}
