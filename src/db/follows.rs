//! Follow graph edge storage
//!
//! The composite primary key `(follower_id, followed_id)` is the authoritative
//! guard against duplicate edges; inserts use `INSERT OR IGNORE` so a racing
//! second follow becomes a no-op instead of a constraint error.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::users::{user_columns, user_from_row, UserRow};
use super::{collect_rows, Page, PageRequest};
use crate::types::WeblogError;

/// One side of an edge joined with the identity on the other side
#[derive(Debug, Clone, Serialize)]
pub struct FollowEntry {
    pub user: UserRow,
    pub since: DateTime<Utc>,
}

/// Insert edge `(follower, followed)`. Returns false if it already existed.
pub fn insert_follow(
    conn: &Connection,
    follower_id: i64,
    followed_id: i64,
    now: DateTime<Utc>,
) -> Result<bool, WeblogError> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, ?)",
        params![follower_id, followed_id, now],
    )?;
    Ok(rows > 0)
}

/// Remove edge `(follower, followed)`. Returns false if there was none.
pub fn delete_follow(conn: &Connection, follower_id: i64, followed_id: i64) -> Result<bool, WeblogError> {
    let rows = conn
        .execute(
            "DELETE FROM follows WHERE follower_id = ? AND followed_id = ?",
            params![follower_id, followed_id],
        )
        .map_err(|e| WeblogError::Database(format!("Failed to delete follow: {}", e)))?;
    Ok(rows > 0)
}

/// Does `follower` follow `followed`? Primary key lookup.
pub fn is_following(conn: &Connection, follower_id: i64, followed_id: i64) -> Result<bool, WeblogError> {
    conn.query_row(
        "SELECT 1 FROM follows WHERE follower_id = ? AND followed_id = ?",
        params![follower_id, followed_id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|e| WeblogError::Database(format!("Failed to check follow: {}", e)))
}

/// Number of identities `user` follows
pub fn count_following(conn: &Connection, user_id: i64) -> Result<u64, WeblogError> {
    count(conn, "SELECT COUNT(*) FROM follows WHERE follower_id = ?", user_id)
}

/// Number of identities following `user`
pub fn count_followers(conn: &Connection, user_id: i64) -> Result<u64, WeblogError> {
    count(conn, "SELECT COUNT(*) FROM follows WHERE followed_id = ?", user_id)
}

/// Identities `user` follows, most recent edge first
pub fn list_following(conn: &Connection, user_id: i64, req: PageRequest) -> Result<Page<FollowEntry>, WeblogError> {
    let total = count_following(conn, user_id)?;
    let items = list_edges(conn, "f.followed_id", "f.follower_id", user_id, req)?;
    Ok(Page::new(items, req, total))
}

/// Identities following `user`, most recent edge first
pub fn list_followers(conn: &Connection, user_id: i64, req: PageRequest) -> Result<Page<FollowEntry>, WeblogError> {
    let total = count_followers(conn, user_id)?;
    let items = list_edges(conn, "f.follower_id", "f.followed_id", user_id, req)?;
    Ok(Page::new(items, req, total))
}

fn list_edges(
    conn: &Connection,
    join_col: &str,
    filter_col: &str,
    user_id: i64,
    req: PageRequest,
) -> Result<Vec<FollowEntry>, WeblogError> {
    let sql = format!(
        "SELECT {}, f.created_at FROM follows f
         JOIN users u ON u.id = {}
         WHERE {} = ?
         ORDER BY f.created_at DESC, u.id DESC
         LIMIT ? OFFSET ?",
        user_columns("u"),
        join_col,
        filter_col
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| WeblogError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(params![user_id, req.limit(), req.offset()], |row| {
            Ok(FollowEntry {
                user: user_from_row(row)?,
                since: row.get(14)?,
            })
        })
        .map_err(|e| WeblogError::Database(format!("Failed to query follows: {}", e)))?;

    collect_rows(rows)
}

fn count(conn: &Connection, sql: &str, user_id: i64) -> Result<u64, WeblogError> {
    let n: i64 = conn
        .query_row(sql, params![user_id], |row| row.get(0))
        .map_err(|e| WeblogError::Database(format!("Query failed: {}", e)))?;
    Ok(n as u64)
}
