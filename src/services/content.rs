//! Content Service - posts, comments and moderation
//!
//! Every write to a post body re-derives `body_html` through
//! [`render_markdown`] inside the same transaction, so the stored rendering
//! is always the rendering of the stored body.
//!
//! ## Permissions
//!
//! | Operation | Requires |
//! |-----------|----------|
//! | create_content | WRITE |
//! | edit_content | author, or ADMINISTER |
//! | add_comment | COMMENT |
//! | set_comment_visibility | MODERATE |

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::auth::{has_permission, require_permission, Permission};
use crate::db::blogs::{self, BlogRow};
use crate::db::comments::{self, CommentRow};
use crate::db::users::{self, UserRow};
use crate::db::{Page, PageRequest, WeblogDb};
use crate::markup::render_markdown;
use crate::types::WeblogError;

/// Body shown in place of a disabled comment to viewers without MODERATE
pub const DISABLED_COMMENT_BODY: &str = "This comment has been disabled by a moderator.";

/// Result of a moderation toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityOutcome {
    Changed,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct ContentServiceConfig {
    /// Minimum trimmed query length for search
    pub search_min_len: usize,
}

impl Default for ContentServiceConfig {
    fn default() -> Self {
        Self { search_min_len: 2 }
    }
}

#[derive(Clone)]
pub struct ContentService {
    db: Arc<WeblogDb>,
    config: ContentServiceConfig,
}

fn require_body(body: &str, what: &str) -> Result<(), WeblogError> {
    if body.trim().is_empty() {
        return Err(WeblogError::ValidationFailed(format!("{} does not have a body", what)));
    }
    Ok(())
}

impl ContentService {
    pub fn new(db: Arc<WeblogDb>, config: ContentServiceConfig) -> Self {
        Self { db, config }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Publish a post. Requires WRITE.
    pub fn create_content(&self, author: &UserRow, body: &str) -> Result<BlogRow, WeblogError> {
        require_body(body, "blog")?;
        let body_html = render_markdown(body);

        let blog = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            require_permission(&tx, author.id, Permission::Write)?;
            let blog = blogs::insert_blog(&tx, author.id, body, &body_html, Utc::now())?;
            tx.commit()?;
            Ok(blog)
        })?;

        info!(blog_id = blog.id, author_id = author.id, "Blog created");
        Ok(blog)
    }

    /// Replace a post body. Allowed for the author or an administrator.
    pub fn edit_content(&self, editor: &UserRow, blog_id: i64, new_body: &str) -> Result<BlogRow, WeblogError> {
        require_body(new_body, "blog")?;
        let body_html = render_markdown(new_body);

        let blog = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let blog = blogs::get_blog(&tx, blog_id)?
                .ok_or_else(|| WeblogError::NotFound(format!("blog {}", blog_id)))?;

            if blog.author_id != editor.id && !has_permission(&tx, editor.id, Permission::Administer)? {
                return Err(WeblogError::AuthorizationDenied(
                    "only the author or an administrator may edit this blog".into(),
                ));
            }

            blogs::update_blog_body(&tx, blog_id, new_body, &body_html)?;
            let blog = blogs::get_blog(&tx, blog_id)?
                .ok_or_else(|| WeblogError::NotFound(format!("blog {}", blog_id)))?;
            tx.commit()?;
            Ok(blog)
        })?;

        info!(blog_id, editor_id = editor.id, "Blog edited");
        Ok(blog)
    }

    /// Comment on a post. Requires COMMENT; the comment starts visible.
    pub fn add_comment(&self, author: &UserRow, blog_id: i64, body: &str) -> Result<CommentRow, WeblogError> {
        require_body(body, "comment")?;

        let comment = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            require_permission(&tx, author.id, Permission::Comment)?;
            if blogs::get_blog(&tx, blog_id)?.is_none() {
                return Err(WeblogError::NotFound(format!("blog {}", blog_id)));
            }
            let comment = comments::insert_comment(&tx, author.id, blog_id, body, Utc::now())?;
            tx.commit()?;
            Ok(comment)
        })?;

        info!(comment_id = comment.id, blog_id, author_id = author.id, "Comment added");
        Ok(comment)
    }

    /// Enable or disable a comment. Requires MODERATE; idempotent.
    pub fn set_comment_visibility(
        &self,
        moderator: &UserRow,
        comment_id: i64,
        disabled: bool,
    ) -> Result<VisibilityOutcome, WeblogError> {
        let changed = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            require_permission(&tx, moderator.id, Permission::Moderate)?;
            let changed = comments::set_disabled(&tx, comment_id, disabled)?;
            tx.commit()?;
            Ok(changed)
        })?;

        if changed {
            info!(comment_id, moderator_id = moderator.id, disabled, "Comment visibility changed");
            Ok(VisibilityOutcome::Changed)
        } else {
            debug!(comment_id, disabled, "Comment visibility unchanged");
            Ok(VisibilityOutcome::Unchanged)
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn get_content(&self, blog_id: i64) -> Result<BlogRow, WeblogError> {
        self.db
            .with_conn(|conn| blogs::get_blog(conn, blog_id))?
            .ok_or_else(|| WeblogError::NotFound(format!("blog {}", blog_id)))
    }

    pub fn get_comment(&self, comment_id: i64) -> Result<CommentRow, WeblogError> {
        self.db
            .with_conn(|conn| comments::get_comment(conn, comment_id))?
            .ok_or_else(|| WeblogError::NotFound(format!("comment {}", comment_id)))
    }

    /// Every post, newest first
    pub fn list_content(&self, req: PageRequest) -> Result<Page<BlogRow>, WeblogError> {
        self.db.with_conn(|conn| blogs::list_blogs(conn, req))
    }

    /// Posts by one author, newest first
    pub fn list_user_content(&self, author_id: i64, req: PageRequest) -> Result<Page<BlogRow>, WeblogError> {
        self.db.with_conn(|conn| {
            if users::get_user(conn, author_id)?.is_none() {
                return Err(WeblogError::NotFound(format!("user {}", author_id)));
            }
            blogs::list_user_blogs(conn, author_id, req)
        })
    }

    pub fn count_user_content(&self, author_id: i64) -> Result<u64, WeblogError> {
        self.db.with_conn(|conn| blogs::count_user_blogs(conn, author_id))
    }

    /// Every comment, newest first
    pub fn list_comments(&self, req: PageRequest) -> Result<Page<CommentRow>, WeblogError> {
        self.db.with_conn(|conn| comments::list_comments(conn, req))
    }

    /// Comments on one post, oldest first
    pub fn list_content_comments(&self, blog_id: i64, req: PageRequest) -> Result<Page<CommentRow>, WeblogError> {
        self.db.with_conn(|conn| {
            if blogs::get_blog(conn, blog_id)?.is_none() {
                return Err(WeblogError::NotFound(format!("blog {}", blog_id)));
            }
            comments::list_blog_comments(conn, blog_id, req)
        })
    }

    pub fn comment_count(&self, blog_id: i64) -> Result<u64, WeblogError> {
        self.db
            .with_conn(|conn| comments::count_blog_comments(conn, blog_id))
    }

    /// Case-insensitive substring search over post bodies
    pub fn search_content(&self, query: &str, req: PageRequest) -> Result<Page<BlogRow>, WeblogError> {
        let query = query.trim();
        if query.chars().count() < self.config.search_min_len {
            return Err(WeblogError::ValidationFailed(format!(
                "search query must be at least {} characters",
                self.config.search_min_len
            )));
        }
        self.db.with_conn(|conn| blogs::search_blogs(conn, query, req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RoleKind;
    use crate::db::roles::{ensure_roles, get_role_by_name};
    use crate::db::users::NewUser;

    struct Fixture {
        svc: ContentService,
        db: Arc<WeblogDb>,
        user: UserRow,
        other: UserRow,
        moderator: UserRow,
        admin: UserRow,
    }

    fn setup() -> Fixture {
        let db = Arc::new(WeblogDb::open_in_memory().unwrap());
        let mk = |name: &str, role: RoleKind| -> UserRow {
            db.with_conn_mut(|conn| {
                let role_id = get_role_by_name(conn, role.name())?
                    .ok_or_else(|| WeblogError::Internal("role".into()))?
                    .id;
                let email = format!("{}@example.com", name);
                users::insert_user(
                    conn,
                    &NewUser {
                        email: &email,
                        name,
                        password_hash: "x",
                        role_id,
                        confirmed: true,
                        avatar_hash: "h",
                    },
                    Utc::now(),
                )
            })
            .unwrap()
        };
        db.with_conn_mut(|conn| ensure_roles(conn)).unwrap();

        let user = mk("ann", RoleKind::User);
        let other = mk("bob", RoleKind::User);
        let moderator = mk("mod", RoleKind::Moderator);
        let admin = mk("root", RoleKind::Administrator);
        Fixture {
            svc: ContentService::new(db.clone(), ContentServiceConfig::default()),
            db,
            user,
            other,
            moderator,
            admin,
        }
    }

    #[test]
    fn test_create_renders_body() {
        let f = setup();
        let blog = f.svc.create_content(&f.user, "Hello **world**").unwrap();
        assert_eq!(blog.body, "Hello **world**");
        assert_eq!(blog.body_html, render_markdown("Hello **world**"));
        assert!(blog.body_html.contains("<strong>world</strong>"));
    }

    #[test]
    fn test_empty_body_rejected() {
        let f = setup();
        assert!(matches!(
            f.svc.create_content(&f.user, "   "),
            Err(WeblogError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_edit_permissions() {
        let f = setup();
        let blog = f.svc.create_content(&f.user, "first draft").unwrap();

        assert!(matches!(
            f.svc.edit_content(&f.other, blog.id, "hijacked"),
            Err(WeblogError::AuthorizationDenied(_))
        ));
        assert_eq!(f.svc.get_content(blog.id).unwrap().body, "first draft");

        let edited = f.svc.edit_content(&f.user, blog.id, "*edited*").unwrap();
        assert_eq!(edited.body_html, render_markdown("*edited*"));

        let by_admin = f.svc.edit_content(&f.admin, blog.id, "admin edit").unwrap();
        assert_eq!(by_admin.body, "admin edit");
        assert_eq!(by_admin.created_at, blog.created_at);

        assert!(matches!(
            f.svc.edit_content(&f.user, 999, "x"),
            Err(WeblogError::NotFound(_))
        ));
    }

    #[test]
    fn test_moderation_denied_leaves_comment_unchanged() {
        let f = setup();
        let blog = f.svc.create_content(&f.user, "post").unwrap();
        let comment = f.svc.add_comment(&f.other, blog.id, "nice").unwrap();
        assert!(!comment.disabled);

        assert!(matches!(
            f.svc.set_comment_visibility(&f.user, comment.id, true),
            Err(WeblogError::AuthorizationDenied(_))
        ));
        assert!(!f.svc.get_comment(comment.id).unwrap().disabled);
    }

    #[test]
    fn test_moderation_is_idempotent() {
        let f = setup();
        let blog = f.svc.create_content(&f.user, "post").unwrap();
        let comment = f.svc.add_comment(&f.other, blog.id, "nice").unwrap();

        assert_eq!(
            f.svc.set_comment_visibility(&f.moderator, comment.id, true).unwrap(),
            VisibilityOutcome::Changed
        );
        assert_eq!(
            f.svc.set_comment_visibility(&f.moderator, comment.id, true).unwrap(),
            VisibilityOutcome::Unchanged
        );
        assert!(f.svc.get_comment(comment.id).unwrap().disabled);
        assert_eq!(
            f.svc.set_comment_visibility(&f.admin, comment.id, false).unwrap(),
            VisibilityOutcome::Changed
        );
        assert!(matches!(
            f.svc.set_comment_visibility(&f.moderator, 999, true),
            Err(WeblogError::NotFound(_))
        ));
    }

    #[test]
    fn test_comment_on_missing_blog() {
        let f = setup();
        assert!(matches!(
            f.svc.add_comment(&f.user, 42, "hello"),
            Err(WeblogError::NotFound(_))
        ));
    }

    #[test]
    fn test_listings() {
        let f = setup();
        let a = f.svc.create_content(&f.user, "first").unwrap();
        f.svc.create_content(&f.other, "second").unwrap();
        f.svc.add_comment(&f.other, a.id, "c1").unwrap();
        f.svc.add_comment(&f.user, a.id, "c2").unwrap();

        assert_eq!(f.svc.list_content(PageRequest::new(1, 10)).unwrap().total, 2);
        let mine = f.svc.list_user_content(f.user.id, PageRequest::new(1, 10)).unwrap();
        assert_eq!(mine.total, 1);
        assert_eq!(f.svc.count_user_content(f.user.id).unwrap(), 1);
        assert_eq!(f.svc.comment_count(a.id).unwrap(), 2);

        let on_a = f.svc.list_content_comments(a.id, PageRequest::new(1, 10)).unwrap();
        assert_eq!(on_a.items[0].body, "c1");
        assert_eq!(f.svc.list_comments(PageRequest::new(1, 1)).unwrap().total, 2);

        assert!(matches!(
            f.svc.list_user_content(999, PageRequest::new(1, 10)),
            Err(WeblogError::NotFound(_))
        ));
    }

    #[test]
    fn test_search() {
        let f = setup();
        f.svc.create_content(&f.user, "Learning Rust ownership").unwrap();
        f.svc.create_content(&f.user, "Gardening notes").unwrap();
        f.svc.create_content(&f.user, "Notes from ÉTÉ camp").unwrap();

        let hits = f.svc.search_content("  rust ", PageRequest::new(1, 10)).unwrap();
        assert_eq!(hits.total, 1);
        let hits = f.svc.search_content("été", PageRequest::new(1, 10)).unwrap();
        assert_eq!(hits.total, 1);
        assert!(matches!(
            f.svc.search_content(" r ", PageRequest::new(1, 10)),
            Err(WeblogError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_author_delete_cascades() {
        let f = setup();
        let blog = f.svc.create_content(&f.user, "post").unwrap();
        let comment = f.svc.add_comment(&f.other, blog.id, "nice").unwrap();

        f.db.with_conn(|conn| users::delete_user(conn, f.user.id)).unwrap();
        assert!(matches!(f.svc.get_content(blog.id), Err(WeblogError::NotFound(_))));
        assert!(matches!(f.svc.get_comment(comment.id), Err(WeblogError::NotFound(_))));
    }
}
