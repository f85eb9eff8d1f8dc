//! SQLite persistence for Weblog
//!
//! ## Tables
//!
//! - `roles` - Named permission bundles (exactly one default)
//! - `users` - Identities, each referencing one role
//! - `follows` - Directed follow edges, composite key `(follower_id, followed_id)`
//! - `blogs` - Posts with their body and derived `body_html`
//! - `comments` - Comments on posts with a `disabled` moderation flag
//!
//! Every foreign key to `users` and `blogs` cascades on delete, so removing an
//! identity removes its edges, posts and (transitively) comments on those posts.
//! Rows are addressed by integer id; relationships resolve through the lookup
//! functions in each submodule.

pub mod blogs;
pub mod comments;
pub mod follows;
pub mod roles;
pub mod schema;
pub mod users;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::types::WeblogError;

/// SQLite database handle shared by all request handlers
pub struct WeblogDb {
    conn: Mutex<Connection>,
}

impl WeblogDb {
    /// Open or create the database at `path` (":memory:" opens a private in-memory db)
    pub fn open(path: &Path) -> Result<Self, WeblogError> {
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory();
        }

        info!("Opening SQLite database at {:?}", path);

        let conn = Connection::open(path)
            .map_err(|e| WeblogError::Database(format!("Failed to open SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| WeblogError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, WeblogError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(|e| {
            WeblogError::Database(format!("Failed to open in-memory SQLite: {}", e))
        })?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, WeblogError> {
        // Cascading deletes depend on this; SQLite leaves it off per connection.
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| WeblogError::Database(format!("Failed to enable foreign keys: {}", e)))?;

        schema::register_functions(&conn)?;
        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read-only closure against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, WeblogError>
    where
        F: FnOnce(&Connection) -> Result<T, WeblogError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| WeblogError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, WeblogError>
    where
        F: FnOnce(&mut Connection) -> Result<T, WeblogError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| WeblogError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Row counts, reported by the health endpoint
    pub fn stats(&self) -> Result<DbStats, WeblogError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, WeblogError> {
                let n: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                    .map_err(|e| WeblogError::Database(format!("Query failed: {}", e)))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                user_count: count("users")?,
                blog_count: count("blogs")?,
                comment_count: count("comments")?,
                follow_count: count("follows")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub user_count: u64,
    pub blog_count: u64,
    pub comment_count: u64,
    pub follow_count: u64,
}

// =============================================================================
// Pagination
// =============================================================================

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Page numbers below 1 are treated as 1; a zero page size as 1
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

/// One page of a listing. Past-the-end pages are empty, never an error.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub has_prev: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, req: PageRequest, total: u64) -> Self {
        let seen = u64::from(req.page) * u64::from(req.per_page);
        Self {
            items,
            page: req.page,
            per_page: req.per_page,
            total,
            has_prev: req.page > 1,
            has_next: seen < total,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            has_prev: self.has_prev,
            has_next: self.has_next,
        }
    }

    /// Fallible variant of [`Page::map`]
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        let items = self.items.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(Page {
            items,
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            has_prev: self.has_prev,
            has_next: self.has_next,
        })
    }
}

/// Collect mapped rows, converting row errors
pub(crate) fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>, WeblogError> {
    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| WeblogError::Database(format!("Failed to read row: {}", e)))?);
    }
    Ok(results)
}
