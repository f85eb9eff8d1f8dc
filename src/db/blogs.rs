//! Blog post storage
//!
//! `body_html` is written only together with `body`; callers derive it with
//! [`crate::markup::render_markdown`] before every insert or update.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::Serialize;

use super::schema::LOWER_FN;
use super::{collect_rows, Page, PageRequest};
use crate::types::WeblogError;

/// Blog row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlogRow {
    pub id: i64,
    pub author_id: i64,
    pub body: String,
    pub body_html: String,
    pub created_at: DateTime<Utc>,
}

fn blog_from_row(row: &Row<'_>) -> rusqlite::Result<BlogRow> {
    Ok(BlogRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        body: row.get(2)?,
        body_html: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const BLOG_COLUMNS: &str = "b.id, b.author_id, b.body, b.body_html, b.created_at";

pub fn insert_blog(
    conn: &Connection,
    author_id: i64,
    body: &str,
    body_html: &str,
    now: DateTime<Utc>,
) -> Result<BlogRow, WeblogError> {
    conn.execute(
        "INSERT INTO blogs (author_id, body, body_html, created_at) VALUES (?, ?, ?, ?)",
        params![author_id, body, body_html, now],
    )?;

    let id = conn.last_insert_rowid();
    get_blog(conn, id)?
        .ok_or_else(|| WeblogError::Internal("Failed to retrieve created blog".to_string()))
}

/// Get a blog by ID
pub fn get_blog(conn: &Connection, id: i64) -> Result<Option<BlogRow>, WeblogError> {
    conn.query_row(
        &format!("SELECT {} FROM blogs b WHERE b.id = ?", BLOG_COLUMNS),
        params![id],
        blog_from_row,
    )
    .optional()
    .map_err(|e| WeblogError::Database(format!("Failed to get blog: {}", e)))
}

/// Replace body and its rendering together
pub fn update_blog_body(conn: &Connection, id: i64, body: &str, body_html: &str) -> Result<(), WeblogError> {
    let rows = conn.execute(
        "UPDATE blogs SET body = ?, body_html = ? WHERE id = ?",
        params![body, body_html, id],
    )?;
    if rows == 0 {
        return Err(WeblogError::NotFound(format!("blog {}", id)));
    }
    Ok(())
}

/// All posts, newest first
pub fn list_blogs(conn: &Connection, req: PageRequest) -> Result<Page<BlogRow>, WeblogError> {
    list_where(conn, "", "1=1", &[], req)
}

/// Posts by one author, newest first
pub fn list_user_blogs(conn: &Connection, author_id: i64, req: PageRequest) -> Result<Page<BlogRow>, WeblogError> {
    list_where(conn, "", "b.author_id = ?", &[&author_id], req)
}

/// Posts by every identity `follower` follows, newest first.
///
/// Computed as a join on each call; nothing is materialized.
pub fn list_followed_blogs(
    conn: &Connection,
    follower_id: i64,
    req: PageRequest,
) -> Result<Page<BlogRow>, WeblogError> {
    list_where(
        conn,
        "JOIN follows f ON f.followed_id = b.author_id",
        "f.follower_id = ?",
        &[&follower_id],
        req,
    )
}

/// Case-insensitive substring match on the body.
///
/// Both sides are lowercased with Unicode rules (`lower_unicode`, see
/// [`super::schema::register_functions`]); SQLite's own LIKE folds ASCII only.
pub fn search_blogs(conn: &Connection, needle: &str, req: PageRequest) -> Result<Page<BlogRow>, WeblogError> {
    let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
    let filter = format!("{}(b.body) LIKE ? ESCAPE '\\'", LOWER_FN);
    list_where(conn, "", &filter, &[&pattern], req)
}

pub fn count_user_blogs(conn: &Connection, author_id: i64) -> Result<u64, WeblogError> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM blogs WHERE author_id = ?",
            params![author_id],
            |row| row.get(0),
        )
        .map_err(|e| WeblogError::Database(format!("Query failed: {}", e)))?;
    Ok(n as u64)
}

fn list_where(
    conn: &Connection,
    join: &str,
    filter: &str,
    args: &[&dyn ToSql],
    req: PageRequest,
) -> Result<Page<BlogRow>, WeblogError> {
    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM blogs b {} WHERE {}", join, filter),
            args,
            |row| row.get(0),
        )
        .map_err(|e| WeblogError::Database(format!("Query failed: {}", e)))?;

    let sql = format!(
        "SELECT {} FROM blogs b {} WHERE {} ORDER BY b.created_at DESC, b.id DESC LIMIT ? OFFSET ?",
        BLOG_COLUMNS, join, filter
    );

    let limit = req.limit();
    let offset = req.offset();
    let mut params_vec: Vec<&dyn ToSql> = args.to_vec();
    params_vec.push(&limit);
    params_vec.push(&offset);

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| WeblogError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(params_vec.as_slice(), blog_from_row)
        .map_err(|e| WeblogError::Database(format!("Failed to query blogs: {}", e)))?;

    Ok(Page::new(collect_rows(rows)?, req, total as u64))
}

/// Escape LIKE wildcards so user input matches literally
pub(crate) fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::follows::insert_follow;
    use crate::db::roles::{default_role, ensure_roles};
    use crate::db::schema::{init_schema, register_functions};
    use crate::db::users::{insert_user, NewUser};
    use chrono::Duration;

    fn setup() -> (Connection, i64, i64) {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        register_functions(&conn).unwrap();
        init_schema(&conn).unwrap();
        ensure_roles(&mut conn).unwrap();
        let role_id = default_role(&conn).unwrap().id;
        let mk = |email: &str, name: &str| {
            insert_user(
                &conn,
                &NewUser {
                    email,
                    name,
                    password_hash: "x",
                    role_id,
                    confirmed: true,
                    avatar_hash: "h",
                },
                Utc::now(),
            )
            .unwrap()
            .id
        };
        let a = mk("ann@example.com", "ann");
        let b = mk("bob@example.com", "bob");
        (conn, a, b)
    }

    #[test]
    fn test_newest_first() {
        let (conn, a, _) = setup();
        let t0 = Utc::now();
        insert_blog(&conn, a, "first", "<p>first</p>", t0).unwrap();
        insert_blog(&conn, a, "second", "<p>second</p>", t0 + Duration::seconds(1)).unwrap();

        let page = list_blogs(&conn, PageRequest::new(1, 10)).unwrap();
        let bodies: Vec<_> = page.items.iter().map(|b| b.body.as_str()).collect();
        assert_eq!(bodies, vec!["second", "first"]);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn test_followed_blogs_projection() {
        let (conn, a, b) = setup();
        insert_blog(&conn, a, "by ann", "", Utc::now()).unwrap();
        insert_blog(&conn, b, "by bob", "", Utc::now()).unwrap();

        let empty = list_followed_blogs(&conn, a, PageRequest::new(1, 10)).unwrap();
        assert_eq!(empty.total, 0);

        insert_follow(&conn, a, b, Utc::now()).unwrap();
        let page = list_followed_blogs(&conn, a, PageRequest::new(1, 10)).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].body, "by bob");
    }

    #[test]
    fn test_search_escapes_wildcards() {
        let (conn, a, _) = setup();
        insert_blog(&conn, a, "100% Rust", "", Utc::now()).unwrap();
        insert_blog(&conn, a, "1000 rusty nails", "", Utc::now()).unwrap();

        let page = search_blogs(&conn, "0%", PageRequest::new(1, 10)).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].body, "100% Rust");

        let page = search_blogs(&conn, "RUST", PageRequest::new(1, 10)).unwrap();
        assert_eq!(page.total, 2);
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let (conn, a, _) = setup();
        insert_blog(&conn, a, "Notes from ÉTÉ camp", "", Utc::now()).unwrap();
        insert_blog(&conn, a, "Straße und Weg", "", Utc::now()).unwrap();

        let page = search_blogs(&conn, "été", PageRequest::new(1, 10)).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].body, "Notes from ÉTÉ camp");

        let page = search_blogs(&conn, "STRASSE", PageRequest::new(1, 10)).unwrap();
        assert_eq!(page.total, 0);
        let page = search_blogs(&conn, "STRAßE", PageRequest::new(1, 10)).unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn test_update_missing_blog() {
        let (conn, _, _) = setup();
        assert!(matches!(
            update_blog_body(&conn, 42, "x", "x"),
            Err(WeblogError::NotFound(_))
        ));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a_b%c\\"), "a\\_b\\%c\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
