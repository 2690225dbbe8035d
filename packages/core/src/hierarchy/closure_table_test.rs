//! Tests for the closure table strategy
//!
//! The closure rows are compared against the full set of (ancestor,
//! descendant, level) triples derived from parent pointers after every move.

use crate::db::rows::execute;
use crate::db::DatabaseService;
use crate::hierarchy::{
    ClosureEntry, ClosureTableStrategy, CreateNode, HierarchyError, HierarchyStrategy, UpdateNode,
};
use crate::models::{EntityType, NameRules, Node, PageRequest, SortField, SortOrder};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const DEPT: EntityType = EntityType::Department;

async fn create_strategy() -> ClosureTableStrategy {
    create_strategy_with_db().await.0
}

async fn create_strategy_with_db() -> (ClosureTableStrategy, Arc<DatabaseService>) {
    let db = Arc::new(DatabaseService::new_in_memory().await.unwrap());
    (ClosureTableStrategy::new(db.clone(), NameRules::default()), db)
}

/// Remove every closure row that names `id`, leaving its node row behind
async fn strip_closure_rows(db: &DatabaseService, id: i64) {
    let conn = db.connection().await;
    execute(
        &conn,
        "DELETE FROM closure_entries WHERE ancestor_id = ? OR descendant_id = ?",
        [id, id],
    )
    .await
    .unwrap();
}

fn ids(nodes: &[Node]) -> Vec<i64> {
    nodes.iter().map(|n| n.id).collect()
}

/// Closure rows implied by the parent pointers of every node
async fn expected_closure(strategy: &ClosureTableStrategy) -> BTreeSet<ClosureEntry> {
    let nodes = strategy.list_all(DEPT, None).await.unwrap().into_items();
    let parents: HashMap<i64, Option<i64>> = nodes.iter().map(|n| (n.id, n.parent_id)).collect();

    let mut expected = BTreeSet::new();
    for node in &nodes {
        let mut level = 0;
        let mut cursor = Some(node.id);
        while let Some(ancestor) = cursor {
            expected.insert(ClosureEntry::new(ancestor, node.id, level));
            level += 1;
            cursor = parents[&ancestor];
        }
    }
    expected
}

async fn assert_closure_consistent(strategy: &ClosureTableStrategy) {
    let actual: BTreeSet<ClosureEntry> =
        strategy.closure_rows(DEPT).await.unwrap().into_iter().collect();
    assert_eq!(actual, expected_closure(strategy).await);
}

/// R -> C -> G
async fn chain(strategy: &ClosureTableStrategy) -> (i64, i64, i64) {
    let r = strategy.create(DEPT, CreateNode::root("R")).await.unwrap();
    let c = strategy.create(DEPT, CreateNode::child("C", r.id)).await.unwrap();
    let g = strategy.create(DEPT, CreateNode::child("G", c.id)).await.unwrap();
    (r.id, c.id, g.id)
}

#[tokio::test]
async fn test_chain_stores_six_rows_and_delete_removes_them() {
    let strategy = create_strategy().await;
    let (r, c, g) = chain(&strategy).await;

    let rows = strategy.closure_rows(DEPT).await.unwrap();
    assert_eq!(
        rows,
        vec![
            ClosureEntry::new(r, r, 0),
            ClosureEntry::new(r, c, 1),
            ClosureEntry::new(r, g, 2),
            ClosureEntry::new(c, c, 0),
            ClosureEntry::new(c, g, 1),
            ClosureEntry::new(g, g, 0),
        ]
    );

    let outcome = strategy.delete(DEPT, r).await.unwrap();
    assert_eq!(outcome.deleted, vec![r, c, g]);
    assert!(strategy.closure_rows(DEPT).await.unwrap().is_empty());
    assert!(strategy.list_all(DEPT, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_traversals() {
    let strategy = create_strategy().await;
    let (r, c, g) = chain(&strategy).await;
    let c2 = strategy.create(DEPT, CreateNode::child("C2", r)).await.unwrap();

    let children = strategy.get_children(DEPT, r, None).await.unwrap();
    assert_eq!(ids(&children.items), vec![c, c2.id]);

    let descendants = strategy.get_descendants(DEPT, r, None).await.unwrap();
    assert_eq!(ids(&descendants.items), vec![c, c2.id, g]);

    let ancestors = strategy.get_ancestors(DEPT, g, None).await.unwrap();
    assert_eq!(ids(&ancestors.items), vec![c, r]);
}

#[tokio::test]
async fn test_move_keeps_internal_rows_and_relinks_outside() {
    let strategy = create_strategy().await;
    let (r, c, g) = chain(&strategy).await;
    let s = strategy.create(DEPT, CreateNode::root("S")).await.unwrap();
    let t = strategy.create(DEPT, CreateNode::child("T", s.id)).await.unwrap();

    strategy
        .update(DEPT, c, UpdateNode::new("C", Some(t.id)))
        .await
        .unwrap();

    assert_closure_consistent(&strategy).await;
    let rows = strategy.closure_rows(DEPT).await.unwrap();
    assert!(rows.contains(&ClosureEntry::new(c, g, 1)));
    assert!(rows.contains(&ClosureEntry::new(s.id, g, 3)));
    assert!(!rows.iter().any(|row| row.ancestor_id == r && row.descendant_id != r));

    let ancestors = strategy.get_ancestors(DEPT, g, None).await.unwrap();
    assert_eq!(ids(&ancestors.items), vec![c, t.id, s.id]);
}

#[tokio::test]
async fn test_move_to_root_drops_outside_rows() {
    let strategy = create_strategy().await;
    let (r, c, g) = chain(&strategy).await;

    strategy
        .update(DEPT, c, UpdateNode::new("C", None))
        .await
        .unwrap();

    assert_closure_consistent(&strategy).await;
    assert!(strategy.get_descendants(DEPT, r, None).await.unwrap().is_empty());
    let ancestors = strategy.get_ancestors(DEPT, g, None).await.unwrap();
    assert_eq!(ids(&ancestors.items), vec![c]);
}

#[tokio::test]
async fn test_move_rejects_cycles_without_side_effects() {
    let strategy = create_strategy().await;
    let (r, c, g) = chain(&strategy).await;
    let before = strategy.closure_rows(DEPT).await.unwrap();

    for (node, target) in [(c, c), (r, g), (c, g)] {
        let result = strategy
            .update(DEPT, node, UpdateNode::new("X", Some(target)))
            .await;
        assert!(result.unwrap_err().is_data_integrity());
    }

    assert_eq!(strategy.closure_rows(DEPT).await.unwrap(), before);
    assert_eq!(strategy.get_by_id(DEPT, c).await.unwrap().name, "C");
}

#[tokio::test]
async fn test_move_to_missing_parent() {
    let strategy = create_strategy().await;
    let (_r, c, _g) = chain(&strategy).await;

    let result = strategy
        .update(DEPT, c, UpdateNode::new("C", Some(404)))
        .await;
    assert!(result.unwrap_err().is_not_found());
    assert_closure_consistent(&strategy).await;
}

#[tokio::test]
async fn test_delete_subtree_leaves_siblings() {
    let strategy = create_strategy().await;
    let (r, c, g) = chain(&strategy).await;
    let c2 = strategy.create(DEPT, CreateNode::child("C2", r)).await.unwrap();

    let outcome = strategy.delete(DEPT, c).await.unwrap();
    assert_eq!(outcome.deleted, vec![c, g]);

    assert_closure_consistent(&strategy).await;
    let children = strategy.get_children(DEPT, r, None).await.unwrap();
    assert_eq!(ids(&children.items), vec![c2.id]);
}

#[tokio::test]
async fn test_ancestors_paged_with_explicit_sort() {
    let strategy = create_strategy().await;
    let (r, c, g) = chain(&strategy).await;

    let request = PageRequest::new(0, 1).sorted_by(SortOrder::desc(SortField::Name));
    let page = strategy.get_ancestors(DEPT, g, Some(&request)).await.unwrap();

    // "R" > "C"
    assert_eq!(ids(&page.items), vec![r]);
    assert_eq!(page.total_elements, 2);
    assert_eq!(page.total_pages, 2);

    let second = PageRequest::new(1, 1).sorted_by(SortOrder::desc(SortField::Name));
    let page = strategy.get_ancestors(DEPT, g, Some(&second)).await.unwrap();
    assert_eq!(ids(&page.items), vec![c]);
}

#[tokio::test]
async fn test_create_under_parent_without_closure_rows() {
    let (strategy, db) = create_strategy_with_db().await;
    let p = strategy.create(DEPT, CreateNode::root("P")).await.unwrap();
    strip_closure_rows(&db, p.id).await;

    let result = strategy.create(DEPT, CreateNode::child("C", p.id)).await;
    assert!(matches!(
        result,
        Err(HierarchyError::ParentNotFound { parent_id, .. }) if parent_id == p.id
    ));

    // The insert was rolled back with the rest of the transaction
    let nodes = strategy.list_all(DEPT, None).await.unwrap();
    assert_eq!(ids(&nodes.items), vec![p.id]);
    assert!(strategy.closure_rows(DEPT).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_move_under_parent_without_closure_rows() {
    let (strategy, db) = create_strategy_with_db().await;
    let (r, c, g) = chain(&strategy).await;
    let s = strategy.create(DEPT, CreateNode::root("S")).await.unwrap();
    strip_closure_rows(&db, s.id).await;
    let before = strategy.closure_rows(DEPT).await.unwrap();

    let result = strategy.update(DEPT, c, UpdateNode::move_to(Some(s.id))).await;
    assert!(matches!(result, Err(HierarchyError::ParentNotFound { .. })));

    assert_eq!(strategy.closure_rows(DEPT).await.unwrap(), before);
    let ancestors = strategy.get_ancestors(DEPT, g, None).await.unwrap();
    assert_eq!(ids(&ancestors.items), vec![c, r]);
}
