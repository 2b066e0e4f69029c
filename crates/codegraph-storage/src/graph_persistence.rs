//! Node, edge and file-record SQL shared by the store and its transactions.

use crate::map_sqlite;
use codegraph_core::{
    CodegraphError, Confidence, Edge, FileRecord, GraphNode, GraphQuery, MergeOutcome, NodeKind,
    QueryRow, RelationshipType, Span,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::collections::BTreeSet;

const NODE_COLUMNS: &str = "id, kind, name, qualified_name, file_path, language, \
                            start_line, start_col, end_line, end_col, signature";

const EDGE_COLUMNS: &str = "id, src, dst, relationship, confidence, target_ref, file_path, \
                            start_line, start_col, end_line, end_col";

// ── Row Decoding ────────────────────────────────────────────────────────

fn parse_column<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = CodegraphError>,
{
    value
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn span_from(row: &Row, first: usize) -> rusqlite::Result<Span> {
    Ok(Span::new(
        row.get::<_, i64>(first)? as usize,
        row.get::<_, i64>(first + 1)? as usize,
        row.get::<_, i64>(first + 2)? as usize,
        row.get::<_, i64>(first + 3)? as usize,
    ))
}

fn node_from_row(row: &Row) -> rusqlite::Result<GraphNode> {
    Ok(GraphNode {
        id: row.get(0)?,
        kind: parse_column::<NodeKind>(1, row.get(1)?)?,
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        file_path: row.get(4)?,
        language: row.get(5)?,
        span: span_from(row, 6)?,
        signature: row.get(10)?,
    })
}

fn edge_from_row(row: &Row) -> rusqlite::Result<Edge> {
    Ok(Edge {
        id: row.get(0)?,
        src: row.get(1)?,
        dst: row.get(2)?,
        relationship: parse_column::<RelationshipType>(3, row.get(3)?)?,
        confidence: parse_column::<Confidence>(4, row.get(4)?)?,
        target_ref: row.get(5)?,
        file_path: row.get(6)?,
        span: span_from(row, 7)?,
    })
}

fn timestamp(secs: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

// ── Nodes ───────────────────────────────────────────────────────────────

pub(crate) fn get_node(conn: &Connection, id: &str) -> Result<Option<GraphNode>, CodegraphError> {
    conn.query_row(
        &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
        params![id],
        node_from_row,
    )
    .optional()
    .map_err(map_sqlite)
}

/// Insert or update a node. Writes nothing when the stored row is identical.
pub(crate) fn merge_node(
    conn: &Connection,
    node: &GraphNode,
) -> Result<MergeOutcome, CodegraphError> {
    let outcome = match get_node(conn, &node.id)? {
        Some(existing) if existing == *node => return Ok(MergeOutcome::Unchanged),
        Some(_) => MergeOutcome::Updated,
        None => MergeOutcome::Created,
    };

    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO nodes ({NODE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            node.id,
            node.kind.to_string(),
            node.name,
            node.qualified_name,
            node.file_path,
            node.language,
            node.span.start_line as i64,
            node.span.start_col as i64,
            node.span.end_line as i64,
            node.span.end_col as i64,
            node.signature,
        ],
    )
    .map_err(map_sqlite)?;

    Ok(outcome)
}

pub(crate) fn delete_node(conn: &Connection, id: &str) -> Result<bool, CodegraphError> {
    let rows = conn
        .execute("DELETE FROM nodes WHERE id = ?1", params![id])
        .map_err(map_sqlite)?;
    Ok(rows > 0)
}

// ── Edges ───────────────────────────────────────────────────────────────

pub(crate) fn get_edge(conn: &Connection, id: &str) -> Result<Option<Edge>, CodegraphError> {
    conn.query_row(
        &format!("SELECT {EDGE_COLUMNS} FROM edges WHERE id = ?1"),
        params![id],
        edge_from_row,
    )
    .optional()
    .map_err(map_sqlite)
}

/// Insert or update an edge. Writes nothing when the stored row is identical.
pub(crate) fn merge_edge(conn: &Connection, edge: &Edge) -> Result<MergeOutcome, CodegraphError> {
    let outcome = match get_edge(conn, &edge.id)? {
        Some(existing) if existing == *edge => return Ok(MergeOutcome::Unchanged),
        Some(_) => MergeOutcome::Updated,
        None => MergeOutcome::Created,
    };

    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO edges ({EDGE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            edge.id,
            edge.src,
            edge.dst,
            edge.relationship.to_string(),
            edge.confidence.to_string(),
            edge.target_ref,
            edge.file_path,
            edge.span.start_line as i64,
            edge.span.start_col as i64,
            edge.span.end_line as i64,
            edge.span.end_col as i64,
        ],
    )
    .map_err(map_sqlite)?;

    Ok(outcome)
}

pub(crate) fn delete_edge(conn: &Connection, id: &str) -> Result<bool, CodegraphError> {
    let rows = conn
        .execute("DELETE FROM edges WHERE id = ?1", params![id])
        .map_err(map_sqlite)?;
    Ok(rows > 0)
}

// ── Queries ─────────────────────────────────────────────────────────────

fn select_nodes(
    conn: &Connection,
    filter: &str,
    args: &[&dyn ToSql],
) -> Result<Vec<QueryRow>, CodegraphError> {
    let mut stmt = conn
        .prepare_cached(&format!("SELECT {NODE_COLUMNS} FROM nodes {filter}"))
        .map_err(map_sqlite)?;
    let rows = stmt
        .query_map(args, node_from_row)
        .map_err(map_sqlite)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sqlite)?;
    Ok(rows.into_iter().map(QueryRow::Node).collect())
}

fn select_edges(
    conn: &Connection,
    filter: &str,
    args: &[&dyn ToSql],
) -> Result<Vec<QueryRow>, CodegraphError> {
    let mut stmt = conn
        .prepare_cached(&format!("SELECT {EDGE_COLUMNS} FROM edges {filter}"))
        .map_err(map_sqlite)?;
    let rows = stmt
        .query_map(args, edge_from_row)
        .map_err(map_sqlite)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sqlite)?;
    Ok(rows.into_iter().map(QueryRow::Edge).collect())
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len() + 2);
    escaped.push('%');
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Evaluate a query expression. Results are ordered by file, then position.
pub(crate) fn run_query(
    conn: &Connection,
    query: &GraphQuery,
) -> Result<Vec<QueryRow>, CodegraphError> {
    const NODE_ORDER: &str = "ORDER BY file_path, start_line, start_col, id";
    const EDGE_ORDER: &str = "ORDER BY file_path, start_line, start_col, id";

    match query {
        GraphQuery::NodeById(id) => select_nodes(conn, "WHERE id = ?1", &[id]),
        GraphQuery::NodesByQualifiedName(qn) => select_nodes(
            conn,
            &format!("WHERE qualified_name = ?1 {NODE_ORDER}"),
            &[qn],
        ),
        GraphQuery::NodesByName(name) => {
            select_nodes(conn, &format!("WHERE name = ?1 {NODE_ORDER}"), &[name])
        }
        GraphQuery::NodesInFile(path) => select_nodes(
            conn,
            &format!("WHERE file_path = ?1 {NODE_ORDER}"),
            &[path],
        ),
        GraphQuery::SearchNodes { pattern, limit } => {
            let like = like_pattern(pattern);
            let limit = i64::try_from(*limit).unwrap_or(i64::MAX);
            select_nodes(
                conn,
                &format!(
                    "WHERE name LIKE ?1 ESCAPE '\\' OR qualified_name LIKE ?1 ESCAPE '\\'
                     {NODE_ORDER} LIMIT ?2"
                ),
                &[&like, &limit],
            )
        }
        GraphQuery::EdgeById(id) => select_edges(conn, "WHERE id = ?1", &[id]),
        GraphQuery::EdgesFrom {
            node_id,
            relationship,
        } => {
            let rel = relationship.map(|r| r.to_string());
            select_edges(
                conn,
                &format!("WHERE src = ?1 AND (?2 IS NULL OR relationship = ?2) {EDGE_ORDER}"),
                &[node_id, &rel],
            )
        }
        GraphQuery::EdgesTo {
            node_id,
            relationship,
        } => {
            let rel = relationship.map(|r| r.to_string());
            select_edges(
                conn,
                &format!("WHERE dst = ?1 AND (?2 IS NULL OR relationship = ?2) {EDGE_ORDER}"),
                &[node_id, &rel],
            )
        }
        GraphQuery::EdgesInFile(path) => select_edges(
            conn,
            &format!("WHERE file_path = ?1 {EDGE_ORDER}"),
            &[path],
        ),
        GraphQuery::UnresolvedEdges => {
            select_edges(conn, &format!("WHERE dst IS NULL {EDGE_ORDER}"), &[])
        }
        GraphQuery::UnresolvedEdgesFor(target) => select_edges(
            conn,
            &format!("WHERE dst IS NULL AND target_ref = ?1 {EDGE_ORDER}"),
            &[target],
        ),
        GraphQuery::AllNodes => select_nodes(conn, NODE_ORDER, &[]),
    }
}

// ── File Records ────────────────────────────────────────────────────────

fn contributions(conn: &Connection, path: &str) -> Result<BTreeSet<String>, CodegraphError> {
    let mut stmt = conn
        .prepare_cached("SELECT item_id FROM file_contributions WHERE path = ?1")
        .map_err(map_sqlite)?;
    let items = stmt
        .query_map(params![path], |row| row.get::<_, String>(0))
        .map_err(map_sqlite)?
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(map_sqlite)?;
    Ok(items)
}

pub(crate) fn get_file_record(
    conn: &Connection,
    path: &str,
) -> Result<Option<FileRecord>, CodegraphError> {
    let row: Option<(String, String, String, i64)> = conn
        .query_row(
            "SELECT path, language, fingerprint, indexed_at FROM file_records WHERE path = ?1",
            params![path],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(map_sqlite)?;

    match row {
        Some((path, language, fingerprint, indexed_at)) => Ok(Some(FileRecord {
            contributions: contributions(conn, &path)?,
            path,
            language,
            fingerprint,
            indexed_at: timestamp(indexed_at),
        })),
        None => Ok(None),
    }
}

pub(crate) fn all_file_records(conn: &Connection) -> Result<Vec<FileRecord>, CodegraphError> {
    let paths: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT path FROM file_records ORDER BY path")
            .map_err(map_sqlite)?;
        let paths = stmt
            .query_map([], |row| row.get(0))
            .map_err(map_sqlite)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite)?;
        paths
    };

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        if let Some(record) = get_file_record(conn, &path)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Replace a file record and its whole contribution set.
pub(crate) fn put_file_record(conn: &Connection, record: &FileRecord) -> Result<(), CodegraphError> {
    conn.execute(
        "INSERT INTO file_records (path, language, fingerprint, indexed_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(path) DO UPDATE SET
            language = excluded.language,
            fingerprint = excluded.fingerprint,
            indexed_at = excluded.indexed_at",
        params![
            record.path,
            record.language,
            record.fingerprint,
            record.indexed_at.timestamp(),
        ],
    )
    .map_err(map_sqlite)?;

    conn.execute(
        "DELETE FROM file_contributions WHERE path = ?1",
        params![record.path],
    )
    .map_err(map_sqlite)?;

    let mut stmt = conn
        .prepare_cached("INSERT INTO file_contributions (path, item_id) VALUES (?1, ?2)")
        .map_err(map_sqlite)?;
    for item in &record.contributions {
        stmt.execute(params![record.path, item])
            .map_err(map_sqlite)?;
    }
    Ok(())
}

pub(crate) fn delete_file_record(conn: &Connection, path: &str) -> Result<bool, CodegraphError> {
    conn.execute(
        "DELETE FROM file_contributions WHERE path = ?1",
        params![path],
    )
    .map_err(map_sqlite)?;
    let rows = conn
        .execute("DELETE FROM file_records WHERE path = ?1", params![path])
        .map_err(map_sqlite)?;
    Ok(rows > 0)
}

pub(crate) fn other_claimants(
    conn: &Connection,
    item_id: &str,
    except: &str,
) -> Result<Vec<String>, CodegraphError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT path FROM file_contributions WHERE item_id = ?1 AND path != ?2 ORDER BY path",
        )
        .map_err(map_sqlite)?;
    let paths = stmt
        .query_map(params![item_id, except], |row| row.get(0))
        .map_err(map_sqlite)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sqlite)?;
    Ok(paths)
}
