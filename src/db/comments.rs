//! Comment storage and the moderation flag

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::{collect_rows, Page, PageRequest};
use crate::types::WeblogError;

/// Comment row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentRow {
    pub id: i64,
    pub author_id: i64,
    pub blog_id: i64,
    pub body: String,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        blog_id: row.get(2)?,
        body: row.get(3)?,
        disabled: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const COMMENT_COLUMNS: &str = "id, author_id, blog_id, body, disabled, created_at";

/// Insert a visible comment
pub fn insert_comment(
    conn: &Connection,
    author_id: i64,
    blog_id: i64,
    body: &str,
    now: DateTime<Utc>,
) -> Result<CommentRow, WeblogError> {
    conn.execute(
        "INSERT INTO comments (author_id, blog_id, body, disabled, created_at) VALUES (?, ?, ?, 0, ?)",
        params![author_id, blog_id, body, now],
    )?;

    let id = conn.last_insert_rowid();
    get_comment(conn, id)?
        .ok_or_else(|| WeblogError::Internal("Failed to retrieve created comment".to_string()))
}

/// Get a comment by ID
pub fn get_comment(conn: &Connection, id: i64) -> Result<Option<CommentRow>, WeblogError> {
    conn.query_row(
        &format!("SELECT {} FROM comments WHERE id = ?", COMMENT_COLUMNS),
        params![id],
        comment_from_row,
    )
    .optional()
    .map_err(|e| WeblogError::Database(format!("Failed to get comment: {}", e)))
}

/// Set the disabled flag. Returns true if the stored value changed.
pub fn set_disabled(conn: &Connection, id: i64, disabled: bool) -> Result<bool, WeblogError> {
    let rows = conn
        .execute(
            "UPDATE comments SET disabled = ?1 WHERE id = ?2 AND disabled != ?1",
            params![disabled, id],
        )
        .map_err(|e| WeblogError::Database(format!("Failed to update comment: {}", e)))?;

    if rows == 0 && get_comment(conn, id)?.is_none() {
        return Err(WeblogError::NotFound(format!("comment {}", id)));
    }
    Ok(rows > 0)
}

/// Every comment, newest first (moderation view)
pub fn list_comments(conn: &Connection, req: PageRequest) -> Result<Page<CommentRow>, WeblogError> {
    let total = count(conn, "SELECT COUNT(*) FROM comments", None)?;
    let items = query_page(
        conn,
        &format!(
            "SELECT {} FROM comments ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            COMMENT_COLUMNS
        ),
        None,
        req,
    )?;
    Ok(Page::new(items, req, total))
}

/// Comments on one post, oldest first
pub fn list_blog_comments(
    conn: &Connection,
    blog_id: i64,
    req: PageRequest,
) -> Result<Page<CommentRow>, WeblogError> {
    let total = count_blog_comments(conn, blog_id)?;
    let items = query_page(
        conn,
        &format!(
            "SELECT {} FROM comments WHERE blog_id = ?3
             ORDER BY created_at ASC, id ASC LIMIT ?1 OFFSET ?2",
            COMMENT_COLUMNS
        ),
        Some(blog_id),
        req,
    )?;
    Ok(Page::new(items, req, total))
}

pub fn count_blog_comments(conn: &Connection, blog_id: i64) -> Result<u64, WeblogError> {
    count(
        conn,
        "SELECT COUNT(*) FROM comments WHERE blog_id = ?",
        Some(blog_id),
    )
}

fn count(conn: &Connection, sql: &str, key: Option<i64>) -> Result<u64, WeblogError> {
    let result = match key {
        Some(key) => conn.query_row(sql, params![key], |row| row.get::<_, i64>(0)),
        None => conn.query_row(sql, [], |row| row.get::<_, i64>(0)),
    };
    result
        .map(|n| n as u64)
        .map_err(|e| WeblogError::Database(format!("Query failed: {}", e)))
}

fn query_page(
    conn: &Connection,
    sql: &str,
    key: Option<i64>,
    req: PageRequest,
) -> Result<Vec<CommentRow>, WeblogError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| WeblogError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = match key {
        Some(key) => stmt.query_map(params![req.limit(), req.offset(), key], comment_from_row),
        None => stmt.query_map(params![req.limit(), req.offset()], comment_from_row),
    }
    .map_err(|e| WeblogError::Database(format!("Failed to query comments: {}", e)))?;

    collect_rows(rows)
}
