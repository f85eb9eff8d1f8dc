//! JSON representations of rows
//!
//! Rows never go over the wire directly: the public user view omits the
//! email and credentials, and comment bodies are masked once disabled.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::{Permission, PermissionSet};
use crate::db::blogs::BlogRow;
use crate::db::comments::CommentRow;
use crate::db::follows::FollowEntry;
use crate::db::users::{self, Gender, UserRow};
use crate::server::AppState;
use crate::services::{gravatar_url, DISABLED_COMMENT_BODY};
use crate::types::WeblogError;

pub fn user_url(id: i64) -> String {
    format!("/api/v1/users/{}", id)
}

pub fn blog_url(id: i64) -> String {
    format!("/api/v1/blogs/{}", id)
}

pub fn comment_url(id: i64) -> String {
    format!("/api/v1/comments/{}", id)
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub avatar_url: String,
    pub age: Option<i64>,
    pub gender: Option<Gender>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub blogs_url: String,
    pub followed_blogs_url: String,
    pub followers_url: String,
    pub followed_url: String,
    pub blogs_count: u64,
    pub followers_count: u64,
    pub following_count: u64,
}

impl UserView {
    pub fn build(state: &AppState, user: &UserRow) -> Result<Self, WeblogError> {
        let counts = state.social.follow_counts(user.id)?;
        let url = user_url(user.id);
        Ok(Self {
            id: user.id,
            name: user.name.clone(),
            avatar_url: gravatar_url(user, 100),
            age: user.age,
            gender: user.gender,
            location: user.location.clone(),
            about_me: user.about_me.clone(),
            created_at: user.created_at,
            last_seen: user.last_seen,
            blogs_url: format!("{}/blogs", url),
            followed_blogs_url: format!("{}/followed_blogs", url),
            followers_url: format!("{}/followers", url),
            followed_url: format!("{}/followed", url),
            blogs_count: state.content.count_user_content(user.id)?,
            followers_count: counts.followers,
            following_count: counts.following,
            url,
        })
    }
}

/// The caller's own account, or any account as seen by an administrator
#[derive(Debug, Serialize)]
pub struct AccountView {
    #[serde(flatten)]
    pub user: UserView,
    pub email: String,
    pub phone_number: Option<String>,
    pub confirmed: bool,
    pub role: String,
    pub permissions: PermissionSet,
}

impl AccountView {
    pub fn build(state: &AppState, user: &UserRow) -> Result<Self, WeblogError> {
        let role = state.db.with_conn(|conn| users::user_role(conn, user.id))?;
        Ok(Self {
            user: UserView::build(state, user)?,
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            confirmed: user.confirmed,
            role: role.name,
            permissions: role.permissions,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FollowView {
    pub user: UserView,
    pub since: DateTime<Utc>,
}

impl FollowView {
    pub fn build(state: &AppState, entry: &FollowEntry) -> Result<Self, WeblogError> {
        Ok(Self {
            user: UserView::build(state, &entry.user)?,
            since: entry.since,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct BlogView {
    pub id: i64,
    pub url: String,
    pub author_id: i64,
    pub author_url: String,
    pub body: String,
    pub body_html: String,
    pub created_at: DateTime<Utc>,
    pub comments_url: String,
    pub comments_count: u64,
}

impl BlogView {
    pub fn build(state: &AppState, blog: &BlogRow) -> Result<Self, WeblogError> {
        let url = blog_url(blog.id);
        Ok(Self {
            id: blog.id,
            author_id: blog.author_id,
            author_url: user_url(blog.author_id),
            body: blog.body.clone(),
            body_html: blog.body_html.clone(),
            created_at: blog.created_at,
            comments_url: format!("{}/comments", url),
            comments_count: state.content.comment_count(blog.id)?,
            url,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub url: String,
    pub blog_id: i64,
    pub blog_url: String,
    pub author_id: i64,
    pub author_url: String,
    pub body: String,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

impl CommentView {
    /// Disabled bodies are replaced unless `reveal_disabled`
    pub fn new(comment: &CommentRow, reveal_disabled: bool) -> Self {
        let body = if comment.disabled && !reveal_disabled {
            DISABLED_COMMENT_BODY.to_string()
        } else {
            comment.body.clone()
        };
        Self {
            id: comment.id,
            url: comment_url(comment.id),
            blog_id: comment.blog_id,
            blog_url: blog_url(comment.blog_id),
            author_id: comment.author_id,
            author_url: user_url(comment.author_id),
            body,
            disabled: comment.disabled,
            created_at: comment.created_at,
        }
    }
}

/// Can `viewer` see disabled comment bodies?
pub fn reveals_disabled(state: &AppState, viewer: &UserRow) -> Result<bool, WeblogError> {
    state.accounts.has_permission(viewer.id, Permission::Moderate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(disabled: bool) -> CommentRow {
        CommentRow {
            id: 7,
            author_id: 2,
            blog_id: 3,
            body: "rude words".into(),
            disabled,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_disabled_comment_is_masked() {
        let view = CommentView::new(&comment(true), false);
        assert_eq!(view.body, DISABLED_COMMENT_BODY);
        assert!(view.disabled);
        assert_eq!(view.blog_url, "/api/v1/blogs/3");
    }

    #[test]
    fn test_moderator_sees_disabled_body() {
        assert_eq!(CommentView::new(&comment(true), true).body, "rude words");
        assert_eq!(CommentView::new(&comment(false), false).body, "rude words");
    }
}
