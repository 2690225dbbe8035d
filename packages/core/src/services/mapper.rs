//! Node to transfer record mapping
//!
//! [`NodeView`] is what the façade hands out. When sub-entities are requested
//! the node's descendant list (as returned by any strategy) is assembled into
//! a nested tree in memory, children ordered by id.

use crate::models::{EntityType, Node};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub id: i64,
    pub entity_type: EntityType,
    pub name: String,
    pub parent_id: Option<i64>,

    /// Sub-entities; `None` when they were not fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<NodeView>>,
}

impl From<Node> for NodeView {
    fn from(node: Node) -> Self {
        Self::with_children(node, None)
    }
}

impl NodeView {
    fn with_children(node: Node, children: Option<Vec<NodeView>>) -> Self {
        Self {
            id: node.id,
            entity_type: node.entity_type,
            name: node.name,
            parent_id: node.parent_id,
            children,
        }
    }

    /// Number of nodes in this view, itself included
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(view) = pending.pop() {
            count += 1;
            pending.extend(view.children.iter().flatten());
        }
        count
    }

    /// Ids of the direct children, if fetched
    pub fn child_ids(&self) -> Option<Vec<i64>> {
        self.children
            .as_ref()
            .map(|children| children.iter().map(|c| c.id).collect())
    }
}

// Unlink the subtree first so a deep chain is freed without recursion
impl Drop for NodeView {
    fn drop(&mut self) {
        let mut pending = self.children.take().unwrap_or_default();
        while let Some(mut view) = pending.pop() {
            pending.extend(view.children.take().into_iter().flatten());
        }
    }
}

/// A node whose children are still being assembled
struct Frame {
    node: Node,
    pending: std::vec::IntoIter<Node>,
    done: Vec<NodeView>,
}

impl Frame {
    fn open(node: Node, by_parent: &mut HashMap<i64, Vec<Node>>) -> Self {
        let children = by_parent.remove(&node.id).unwrap_or_default();
        Self {
            done: Vec::with_capacity(children.len()),
            pending: children.into_iter(),
            node,
        }
    }

    fn finish(self) -> NodeView {
        NodeView::with_children(self.node, Some(self.done))
    }
}

/// Assemble `root` and its descendants into a nested view
///
/// Every fetched node gets `Some(children)`, empty for leaves. Descendants
/// whose parent is not part of the tree are dropped. The walk keeps its own
/// stack, so tree depth is bounded by memory rather than the thread stack.
pub fn build_tree(root: Node, descendants: Vec<Node>) -> NodeView {
    let mut by_parent: HashMap<i64, Vec<Node>> = HashMap::new();
    for node in descendants {
        if let Some(parent_id) = node.parent_id {
            by_parent.entry(parent_id).or_default().push(node);
        }
    }
    for siblings in by_parent.values_mut() {
        siblings.sort_by_key(|n| n.id);
    }

    let mut ancestors: Vec<Frame> = Vec::new();
    let mut current = Frame::open(root, &mut by_parent);
    loop {
        match current.pending.next() {
            Some(child) => {
                let child = Frame::open(child, &mut by_parent);
                ancestors.push(std::mem::replace(&mut current, child));
            }
            None => {
                let view = current.finish();
                match ancestors.pop() {
                    Some(mut parent) => {
                        parent.done.push(view);
                        current = parent;
                    }
                    None => return view,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, parent_id: Option<i64>) -> Node {
        Node {
            id,
            entity_type: EntityType::Department,
            name: format!("N{}", id),
            parent_id,
        }
    }

    #[test]
    fn test_build_tree_nests_and_orders_children() {
        // 1 -> {2 -> {5}, 3}, descendants listed out of order
        let tree = build_tree(
            node(1, None),
            vec![node(5, Some(2)), node(3, Some(1)), node(2, Some(1))],
        );

        assert_eq!(tree.child_ids(), Some(vec![2, 3]));
        let two = &tree.children.as_ref().unwrap()[0];
        assert_eq!(two.child_ids(), Some(vec![5]));
        let five = &two.children.as_ref().unwrap()[0];
        assert_eq!(five.child_ids(), Some(vec![]));
        assert_eq!(tree.size(), 4);
    }

    #[test]
    fn test_build_tree_handles_deep_chain() {
        const DEPTH: i64 = 50_000;
        let chain = (2..=DEPTH).rev().map(|id| node(id, Some(id - 1))).collect();

        let tree = build_tree(node(1, None), chain);
        assert_eq!(tree.size(), DEPTH as usize);

        let mut cursor = &tree;
        let mut depth = 1;
        while let Some([child]) = cursor.children.as_deref() {
            assert_eq!(child.parent_id, Some(cursor.id));
            cursor = child;
            depth += 1;
        }
        assert_eq!(depth, DEPTH);
        assert_eq!(cursor.id, DEPTH);
        assert_eq!(cursor.child_ids(), Some(vec![]));
    }

    #[test]
    fn test_build_tree_drops_unattached_nodes() {
        let tree = build_tree(node(1, None), vec![node(2, Some(1)), node(9, Some(8))]);
        assert_eq!(tree.size(), 2);
    }

    #[test]
    fn test_unfetched_children_are_omitted_from_json() {
        let view = NodeView::from(node(4, Some(1)));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 4,
                "entityType": "department",
                "name": "N4",
                "parentId": 1
            })
        );

        let leaf = build_tree(node(4, Some(1)), Vec::new());
        let json = serde_json::to_value(&leaf).unwrap();
        assert_eq!(json["children"], serde_json::json!([]));
    }
}
