//! Shared helpers for the integration tests
//!
//! `ParentModel` is the reference forest the tests compare every strategy
//! against: a plain map from node id to parent id.

#![allow(dead_code)]

use orgtree_core::db::DatabaseService;
use orgtree_core::hierarchy::{build_strategy, HierarchyStrategy, StrategyKind};
use orgtree_core::models::{EntityType, NameRules, Node};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Route engine logs to the test writer (`RUST_LOG=debug cargo test`)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn in_memory_strategy(
    kind: StrategyKind,
) -> anyhow::Result<(Arc<dyn HierarchyStrategy>, Arc<DatabaseService>)> {
    let db = Arc::new(DatabaseService::new_in_memory().await?);
    Ok((build_strategy(kind, db.clone(), NameRules::default()), db))
}

pub fn ids(nodes: &[Node]) -> Vec<i64> {
    nodes.iter().map(|n| n.id).collect()
}

#[derive(Debug, Default, Clone)]
pub struct ParentModel {
    pub parents: BTreeMap<i64, Option<i64>>,
}

impl ParentModel {
    pub fn insert(&mut self, id: i64, parent_id: Option<i64>) {
        self.parents.insert(id, parent_id);
    }

    pub fn ids(&self) -> Vec<i64> {
        self.parents.keys().copied().collect()
    }

    /// Nearest first
    pub fn ancestors(&self, id: i64) -> Vec<i64> {
        let mut out = Vec::new();
        let mut cursor = self.parents.get(&id).copied().flatten();
        while let Some(parent) = cursor {
            out.push(parent);
            cursor = self.parents.get(&parent).copied().flatten();
        }
        out
    }

    pub fn children(&self, id: i64) -> Vec<i64> {
        self.parents
            .iter()
            .filter(|(_, parent)| **parent == Some(id))
            .map(|(child, _)| *child)
            .collect()
    }

    /// Ordered by depth below `id`, then id
    pub fn descendants(&self, id: i64) -> Vec<i64> {
        let mut found: Vec<(usize, i64)> = Vec::new();
        let mut frontier = vec![id];
        let mut depth = 0;
        while !frontier.is_empty() {
            depth += 1;
            let mut next: Vec<i64> = frontier.iter().flat_map(|n| self.children(*n)).collect();
            next.sort_unstable();
            found.extend(next.iter().map(|n| (depth, *n)));
            frontier = next;
        }
        found.into_iter().map(|(_, n)| n).collect()
    }

    pub fn is_in_subtree(&self, root: i64, candidate: i64) -> bool {
        candidate == root || self.ancestors(candidate).contains(&root)
    }

    /// Apply a delete the way `kind` does
    pub fn delete(&mut self, id: i64, kind: StrategyKind) -> Vec<i64> {
        if kind.cascades_delete() {
            let mut removed = vec![id];
            removed.extend(self.descendants(id));
            for node in &removed {
                self.parents.remove(node);
            }
            removed
        } else {
            for child in self.children(id) {
                self.parents.insert(child, None);
            }
            self.parents.remove(&id);
            vec![id]
        }
    }
}

/// Compare every read of `strategy` against the model
pub async fn assert_matches_model(
    strategy: &dyn HierarchyStrategy,
    entity: EntityType,
    model: &ParentModel,
) -> anyhow::Result<()> {
    let kind = strategy.kind();
    let stored: BTreeMap<i64, Option<i64>> = strategy
        .list_all(entity, None)
        .await?
        .into_items()
        .into_iter()
        .map(|n| (n.id, n.parent_id))
        .collect();
    assert_eq!(stored, model.parents, "{}: parent links diverged", kind);

    for id in model.ids() {
        let ancestors = strategy.get_ancestors(entity, id, None).await?;
        assert_eq!(ids(&ancestors.items), model.ancestors(id), "{}: ancestors of {}", kind, id);

        let children = strategy.get_children(entity, id, None).await?;
        assert_eq!(ids(&children.items), model.children(id), "{}: children of {}", kind, id);

        let descendants = strategy.get_descendants(entity, id, None).await?;
        assert_eq!(
            ids(&descendants.items),
            model.descendants(id),
            "{}: descendants of {}",
            kind,
            id
        );
    }

    let roots: Vec<i64> = model
        .parents
        .iter()
        .filter(|(_, parent)| parent.is_none())
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(ids(&strategy.list_roots(entity, None).await?.items), roots);

    Ok(())
}
