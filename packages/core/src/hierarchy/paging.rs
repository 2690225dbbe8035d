//! Paging and sorting helpers shared by the strategies
//!
//! Single-scan traversals are paged in SQL (`ORDER BY ... LIMIT ... OFFSET`
//! plus a `COUNT(*)` for the total). Traversals computed hop by hop (adjacency
//! list walks, path-derived ancestors) are sorted and sliced in memory.

use crate::db::rows::{decode_node, query_all, query_i64, NODE_COLUMNS};
use crate::hierarchy::HierarchyError;
use crate::models::{
    EntityType, Node, Page, PageRequest, SortDirection, SortField, SortOrder, ValidationError,
};
use libsql::params::Params;
use libsql::{Connection, Value};
use std::cmp::Ordering;

const ID_TIE_BREAK: &str = "n.id ASC";

/// Reject malformed page requests before touching the store
pub(crate) fn check_page(page: Option<&PageRequest>) -> Result<(), HierarchyError> {
    if let Some(request) = page {
        request.validate(u32::MAX)?;
    }
    Ok(())
}

fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Id => "n.id",
        SortField::Name => "n.name",
    }
}

fn sort_keyword(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

/// Build an ORDER BY body: explicit sort keys, else the natural order, then id
pub(crate) fn order_clause(sort: &[SortOrder], natural: &str) -> String {
    let mut parts: Vec<String> = if sort.is_empty() {
        vec![natural.to_string()]
    } else {
        sort.iter()
            .map(|order| {
                format!(
                    "{} {}",
                    sort_column(order.field),
                    sort_keyword(order.direction)
                )
            })
            .collect()
    };

    if !parts.last().is_some_and(|last| last.ends_with(ID_TIE_BREAK)) {
        parts.push(ID_TIE_BREAK.to_string());
    }
    parts.join(", ")
}

fn compare_nodes(a: &Node, b: &Node, sort: &[SortOrder]) -> Ordering {
    for order in sort {
        let ordering = match order.field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::Name => a.name.cmp(&b.name),
        };
        let ordering = match order.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.id.cmp(&b.id)
}

/// Sort and slice a fully materialized result
///
/// Without a page request the natural order is kept and everything returned.
pub(crate) fn page_in_memory(mut nodes: Vec<Node>, page: Option<&PageRequest>) -> Page<Node> {
    let Some(request) = page else {
        return Page::unpaged(nodes);
    };

    if !request.sort.is_empty() {
        nodes.sort_by(|a, b| compare_nodes(a, b, &request.sort));
    }

    let total = nodes.len() as u64;
    let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
    let items = nodes
        .into_iter()
        .skip(offset)
        .take(request.size as usize)
        .collect();
    Page::new(items, request, total)
}

/// LIKE pattern matching `fragment` literally anywhere in the value
pub(crate) fn contains_pattern(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for ch in fragment.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// A predicate scan over one node table, aliased `n`
pub(crate) struct NodeScan {
    from: String,
    filter: String,
    params: Vec<Value>,
    natural_order: String,
}

impl NodeScan {
    pub(crate) fn new(from: impl Into<String>, filter: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            from: from.into(),
            filter: filter.into(),
            params,
            natural_order: ID_TIE_BREAK.to_string(),
        }
    }

    pub(crate) fn natural_order(mut self, order: impl Into<String>) -> Self {
        self.natural_order = order.into();
        self
    }

    /// Nodes of `entity` whose name contains `fragment`
    pub(crate) fn search(
        table: &str,
        entity: EntityType,
        fragment: &str,
    ) -> Result<Self, HierarchyError> {
        if fragment.trim().is_empty() {
            return Err(ValidationError::BlankSearch.into());
        }
        Ok(Self::new(
            format!("{} n", table),
            "n.entity_type = ? AND n.name LIKE ? ESCAPE '\\'",
            vec![
                Value::from(entity.as_str()),
                Value::from(contains_pattern(fragment)),
            ],
        ))
    }

    /// Parentless nodes of `entity`
    pub(crate) fn roots(table: &str, entity: EntityType) -> Self {
        Self::new(
            format!("{} n", table),
            "n.entity_type = ? AND n.parent_id IS NULL",
            vec![Value::from(entity.as_str())],
        )
    }

    /// Every node of `entity`
    pub(crate) fn all(table: &str, entity: EntityType) -> Self {
        Self::new(
            format!("{} n", table),
            "n.entity_type = ?",
            vec![Value::from(entity.as_str())],
        )
    }

    /// Run the scan, paged in SQL when a page request is given
    pub(crate) async fn fetch(
        self,
        conn: &Connection,
        page: Option<&PageRequest>,
    ) -> Result<Page<Node>, HierarchyError> {
        check_page(page)?;

        let sort = page.map(|p| p.sort.as_slice()).unwrap_or_default();
        let select = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            NODE_COLUMNS,
            self.from,
            self.filter,
            order_clause(sort, &self.natural_order)
        );

        let Some(request) = page else {
            let nodes = query_all(conn, &select, Params::Positional(self.params), decode_node).await?;
            return Ok(Page::unpaged(nodes));
        };

        let count_sql = format!("SELECT COUNT(*) FROM {} WHERE {}", self.from, self.filter);
        let total = query_i64(conn, &count_sql, Params::Positional(self.params.clone())).await?;

        let mut params = self.params;
        params.push(Value::Integer(i64::from(request.size)));
        params.push(Value::Integer(
            i64::try_from(request.offset()).unwrap_or(i64::MAX),
        ));

        let nodes = query_all(
            conn,
            &format!("{} LIMIT ? OFFSET ?", select),
            Params::Positional(params),
            decode_node,
        )
        .await?;

        Ok(Page::new(nodes, request, total.max(0) as u64))
    }
}
