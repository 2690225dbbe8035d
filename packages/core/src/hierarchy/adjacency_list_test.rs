//! Tests for the adjacency list strategy
//!
//! Covers parent-pointer walks, cycle rejection on move, and the orphaning
//! delete policy.

use crate::db::rows::execute;
use crate::db::DatabaseService;
use crate::hierarchy::{
    AdjacencyListStrategy, CreateNode, HierarchyError, HierarchyStrategy, UpdateNode,
};
use crate::models::{EntityType, NameRules, PageRequest, SortField, SortOrder};
use std::sync::Arc;

const TEAM: EntityType = EntityType::Team;

async fn create_strategy() -> (AdjacencyListStrategy, Arc<DatabaseService>) {
    let db = Arc::new(DatabaseService::new_in_memory().await.unwrap());
    (
        AdjacencyListStrategy::new(db.clone(), NameRules::default()),
        db,
    )
}

fn ids(nodes: &[crate::models::Node]) -> Vec<i64> {
    nodes.iter().map(|n| n.id).collect()
}

/// R -> C -> G
async fn chain(strategy: &AdjacencyListStrategy) -> (i64, i64, i64) {
    let r = strategy.create(TEAM, CreateNode::root("R")).await.unwrap();
    let c = strategy.create(TEAM, CreateNode::child("C", r.id)).await.unwrap();
    let g = strategy.create(TEAM, CreateNode::child("G", c.id)).await.unwrap();
    (r.id, c.id, g.id)
}

#[tokio::test]
async fn test_create_and_get_by_id() {
    let (strategy, _db) = create_strategy().await;

    let root = strategy.create(TEAM, CreateNode::root("Platform")).await.unwrap();
    assert!(root.is_root());

    let fetched = strategy.get_by_id(TEAM, root.id).await.unwrap();
    assert_eq!(fetched, root);
}

#[tokio::test]
async fn test_create_rejects_missing_parent_and_blank_name() {
    let (strategy, _db) = create_strategy().await;

    let missing = strategy.create(TEAM, CreateNode::child("X", 999)).await;
    assert!(matches!(
        missing,
        Err(HierarchyError::ParentNotFound { parent_id: 999, .. })
    ));

    let blank = strategy.create(TEAM, CreateNode::root("  ")).await;
    assert!(matches!(blank, Err(HierarchyError::Validation(_))));
}

#[tokio::test]
async fn test_entity_types_are_isolated() {
    let (strategy, _db) = create_strategy().await;

    let team = strategy.create(TEAM, CreateNode::root("Shared")).await.unwrap();
    let lookup = strategy.get_by_id(EntityType::Job, team.id).await;
    assert!(lookup.unwrap_err().is_not_found());

    let cross_parent = strategy
        .create(EntityType::Job, CreateNode::child("Child", team.id))
        .await;
    assert!(matches!(cross_parent, Err(HierarchyError::ParentNotFound { .. })));
}

#[tokio::test]
async fn test_traversals_follow_natural_order() {
    let (strategy, _db) = create_strategy().await;
    let (r, c, g) = chain(&strategy).await;
    let c2 = strategy.create(TEAM, CreateNode::child("C2", r)).await.unwrap();

    let children = strategy.get_children(TEAM, r, None).await.unwrap();
    assert_eq!(ids(&children.items), vec![c, c2.id]);

    let descendants = strategy.get_descendants(TEAM, r, None).await.unwrap();
    assert_eq!(ids(&descendants.items), vec![c, c2.id, g]);

    let ancestors = strategy.get_ancestors(TEAM, g, None).await.unwrap();
    assert_eq!(ids(&ancestors.items), vec![c, r]);

    let root_ancestors = strategy.get_ancestors(TEAM, r, None).await.unwrap();
    assert!(root_ancestors.is_empty());
}

#[tokio::test]
async fn test_descendants_paged_and_sorted_in_memory() {
    let (strategy, _db) = create_strategy().await;
    let root = strategy.create(TEAM, CreateNode::root("Root")).await.unwrap();
    for name in ["delta", "alpha", "charlie", "bravo"] {
        strategy
            .create(TEAM, CreateNode::child(name, root.id))
            .await
            .unwrap();
    }

    let request = PageRequest::new(0, 3).sorted_by(SortOrder::asc(SortField::Name));
    let page = strategy
        .get_descendants(TEAM, root.id, Some(&request))
        .await
        .unwrap();

    let names: Vec<&str> = page.items.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
    assert_eq!(page.total_elements, 4);
    assert_eq!(page.total_pages, 2);
}

#[tokio::test]
async fn test_rename_is_idempotent() {
    let (strategy, _db) = create_strategy().await;
    let (r, c, _) = chain(&strategy).await;

    let node = strategy.get_by_id(TEAM, c).await.unwrap();
    let same = strategy
        .update(TEAM, c, UpdateNode::rename("C"))
        .await
        .unwrap();
    assert_eq!(same, node);

    let renamed = strategy
        .update(TEAM, c, UpdateNode::rename("Core"))
        .await
        .unwrap();
    assert_eq!(renamed.name, "Core");
    assert_eq!(renamed.parent_id, Some(r));
}

#[tokio::test]
async fn test_move_rejects_cycles() {
    let (strategy, _db) = create_strategy().await;
    let (r, c, g) = chain(&strategy).await;

    let onto_self = strategy.update(TEAM, c, UpdateNode::new("C", Some(c))).await;
    assert!(onto_self.unwrap_err().is_data_integrity());

    let onto_grandchild = strategy.update(TEAM, r, UpdateNode::new("R", Some(g))).await;
    assert!(onto_grandchild.unwrap_err().is_data_integrity());

    // Nothing moved
    let ancestors = strategy.get_ancestors(TEAM, g, None).await.unwrap();
    assert_eq!(ids(&ancestors.items), vec![c, r]);
    assert!(strategy.get_by_id(TEAM, r).await.unwrap().is_root());
}

#[tokio::test]
async fn test_move_subtree_and_promote_to_root() {
    let (strategy, _db) = create_strategy().await;
    let (r, c, g) = chain(&strategy).await;
    let other = strategy.create(TEAM, CreateNode::root("Other")).await.unwrap();

    strategy
        .update(TEAM, c, UpdateNode::new("C", Some(other.id)))
        .await
        .unwrap();
    let ancestors = strategy.get_ancestors(TEAM, g, None).await.unwrap();
    assert_eq!(ids(&ancestors.items), vec![c, other.id]);
    assert!(strategy.get_descendants(TEAM, r, None).await.unwrap().is_empty());

    strategy
        .update(TEAM, c, UpdateNode::new("C", None))
        .await
        .unwrap();
    let roots = strategy.list_roots(TEAM, None).await.unwrap();
    assert_eq!(ids(&roots.items), vec![r, c, other.id]);
}

#[tokio::test]
async fn test_delete_orphans_direct_children() {
    let (strategy, _db) = create_strategy().await;
    let (r, c, g) = chain(&strategy).await;

    let outcome = strategy.delete(TEAM, r).await.unwrap();
    assert_eq!(outcome.deleted, vec![r]);
    assert_eq!(outcome.orphaned, vec![c]);

    assert!(strategy.get_by_id(TEAM, r).await.unwrap_err().is_not_found());
    assert!(strategy.get_by_id(TEAM, c).await.unwrap().is_root());
    assert_eq!(
        strategy.get_by_id(TEAM, g).await.unwrap().parent_id,
        Some(c)
    );
}

#[tokio::test]
async fn test_corrupted_parent_loop_is_reported() {
    let (strategy, db) = create_strategy().await;
    let (r, _c, g) = chain(&strategy).await;

    // Close the loop R -> C -> G -> R behind the strategy's back
    {
        let conn = db.connection().await;
        execute(
            &conn,
            "UPDATE adjacency_nodes SET parent_id = ? WHERE id = ?",
            [g, r],
        )
        .await
        .unwrap();
    }

    let ancestors = strategy.get_ancestors(TEAM, g, None).await;
    assert!(ancestors.unwrap_err().is_data_integrity());

    let descendants = strategy.get_descendants(TEAM, r, None).await;
    assert!(descendants.unwrap_err().is_data_integrity());
}

#[tokio::test]
async fn test_search_is_substring_and_case_insensitive() {
    let (strategy, _db) = create_strategy().await;
    for name in ["Backend Platform", "Frontend", "platform ops"] {
        strategy.create(TEAM, CreateNode::root(name)).await.unwrap();
    }

    let page = strategy.search_by_name(TEAM, "PLATFORM", None).await.unwrap();
    assert_eq!(page.total_elements, 2);

    let blank = strategy.search_by_name(TEAM, " ", None).await;
    assert!(matches!(blank, Err(HierarchyError::Validation(_))));
}
