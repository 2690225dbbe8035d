//! Row helpers
//!
//! Thin wrappers over libsql's `query` + `Rows::next` loop, plus decoding of
//! the node columns every strategy table shares.

use crate::db::DatabaseError;
use crate::models::{EntityType, Node};
use libsql::params::IntoParams;
use libsql::{Connection, Row, Rows};

/// Node columns shared by every strategy table (aliased as `n`)
pub const NODE_COLUMNS: &str = "n.id, n.entity_type, n.name, n.parent_id";

/// Decode the four shared node columns starting at index 0
pub fn decode_node(row: &Row) -> Result<Node, DatabaseError> {
    let id: i64 = row.get(0)?;
    let entity_tag: String = row.get(1)?;
    let name: String = row.get(2)?;
    let parent_id: Option<i64> = row.get(3)?;

    let entity_type = entity_tag.parse::<EntityType>().map_err(|e| {
        DatabaseError::row_decode(format!("node {} has invalid entity type: {}", id, e))
    })?;

    Ok(Node {
        id,
        entity_type,
        name,
        parent_id,
    })
}

/// Drain a result set through `decode`
pub async fn collect_rows<T, F>(mut rows: Rows, decode: F) -> Result<Vec<T>, DatabaseError>
where
    F: Fn(&Row) -> Result<T, DatabaseError>,
{
    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        out.push(decode(&row)?);
    }
    Ok(out)
}

/// Run a query and decode every row
pub async fn query_all<T, F>(
    conn: &Connection,
    sql: &str,
    params: impl IntoParams,
    decode: F,
) -> Result<Vec<T>, DatabaseError>
where
    F: Fn(&Row) -> Result<T, DatabaseError>,
{
    let rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("{}: {}", first_line(sql), e)))?;
    collect_rows(rows, decode).await
}

/// Run a query and decode the first row, if any
pub async fn query_one<T, F>(
    conn: &Connection,
    sql: &str,
    params: impl IntoParams,
    decode: F,
) -> Result<Option<T>, DatabaseError>
where
    F: Fn(&Row) -> Result<T, DatabaseError>,
{
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("{}: {}", first_line(sql), e)))?;
    match rows.next().await? {
        Some(row) => Ok(Some(decode(&row)?)),
        None => Ok(None),
    }
}

/// Run a query returning a single integer (COUNT, MAX, ...)
///
/// A NULL result (e.g. `MAX` over no rows) reads as 0.
pub async fn query_i64(
    conn: &Connection,
    sql: &str,
    params: impl IntoParams,
) -> Result<i64, DatabaseError> {
    let value = query_one(conn, sql, params, |row| {
        let value: Option<i64> = row.get(0)?;
        Ok(value.unwrap_or(0))
    })
    .await?;
    Ok(value.unwrap_or(0))
}

/// Execute a statement, returning the number of affected rows
pub async fn execute(
    conn: &Connection,
    sql: &str,
    params: impl IntoParams,
) -> Result<u64, DatabaseError> {
    conn.execute(sql, params)
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("{}: {}", first_line(sql), e)))
}

fn first_line(sql: &str) -> &str {
    sql.trim().lines().next().unwrap_or_default()
}
