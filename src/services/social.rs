//! Social Service - the follow graph
//!
//! Edges are directed and may form cycles or self-loops; the graph itself
//! does not police either. Follow and unfollow are idempotent and report
//! whether anything changed.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::auth::{require_permission, Permission};
use crate::db::blogs::{self, BlogRow};
use crate::db::follows::{self, FollowEntry};
use crate::db::users::{self, UserRow};
use crate::db::{Page, PageRequest, WeblogDb};
use crate::types::WeblogError;

/// Result of a follow request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowOutcome {
    NowFollowing,
    AlreadyFollowing,
}

/// Result of an unfollow request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnfollowOutcome {
    Unfollowed,
    NotFollowing,
}

/// Following / follower totals for one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FollowCounts {
    pub following: u64,
    pub followers: u64,
}

#[derive(Clone)]
pub struct SocialService {
    db: Arc<WeblogDb>,
}

impl SocialService {
    pub fn new(db: Arc<WeblogDb>) -> Self {
        Self { db }
    }

    /// Add edge `follower -> followed`. Requires FOLLOW.
    pub fn follow(&self, follower: &UserRow, followed_id: i64) -> Result<FollowOutcome, WeblogError> {
        let inserted = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            require_permission(&tx, follower.id, Permission::Follow)?;
            if users::get_user(&tx, followed_id)?.is_none() {
                return Err(WeblogError::NotFound(format!("user {}", followed_id)));
            }
            let inserted = follows::insert_follow(&tx, follower.id, followed_id, Utc::now())?;
            tx.commit()?;
            Ok(inserted)
        })?;

        if inserted {
            info!(follower_id = follower.id, followed_id, "Now following");
            Ok(FollowOutcome::NowFollowing)
        } else {
            Ok(FollowOutcome::AlreadyFollowing)
        }
    }

    /// Remove edge `follower -> followed`. Requires FOLLOW.
    pub fn unfollow(&self, follower: &UserRow, followed_id: i64) -> Result<UnfollowOutcome, WeblogError> {
        let removed = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            require_permission(&tx, follower.id, Permission::Follow)?;
            if users::get_user(&tx, followed_id)?.is_none() {
                return Err(WeblogError::NotFound(format!("user {}", followed_id)));
            }
            let removed = follows::delete_follow(&tx, follower.id, followed_id)?;
            tx.commit()?;
            Ok(removed)
        })?;

        if removed {
            info!(follower_id = follower.id, followed_id, "Unfollowed");
            Ok(UnfollowOutcome::Unfollowed)
        } else {
            Ok(UnfollowOutcome::NotFollowing)
        }
    }

    /// Does `a` follow `b`?
    pub fn is_following(&self, a: i64, b: i64) -> Result<bool, WeblogError> {
        self.db.with_conn(|conn| follows::is_following(conn, a, b))
    }

    /// Is `a` followed by `b`?
    pub fn is_followed_by(&self, a: i64, b: i64) -> Result<bool, WeblogError> {
        self.db.with_conn(|conn| follows::is_following(conn, b, a))
    }

    /// Posts by everyone `user` follows, newest first
    pub fn followed_content(&self, user_id: i64, req: PageRequest) -> Result<Page<BlogRow>, WeblogError> {
        self.db.with_conn(|conn| {
            require_user(conn, user_id)?;
            blogs::list_followed_blogs(conn, user_id, req)
        })
    }

    /// Identities `user` follows
    pub fn followed_by_user(&self, user_id: i64, req: PageRequest) -> Result<Page<FollowEntry>, WeblogError> {
        self.db.with_conn(|conn| {
            require_user(conn, user_id)?;
            follows::list_following(conn, user_id, req)
        })
    }

    /// Identities following `user`
    pub fn followers_of(&self, user_id: i64, req: PageRequest) -> Result<Page<FollowEntry>, WeblogError> {
        self.db.with_conn(|conn| {
            require_user(conn, user_id)?;
            follows::list_followers(conn, user_id, req)
        })
    }

    pub fn follow_counts(&self, user_id: i64) -> Result<FollowCounts, WeblogError> {
        self.db.with_conn(|conn| {
            Ok(FollowCounts {
                following: follows::count_following(conn, user_id)?,
                followers: follows::count_followers(conn, user_id)?,
            })
        })
    }
}

fn require_user(conn: &rusqlite::Connection, user_id: i64) -> Result<(), WeblogError> {
    users::get_user(conn, user_id)?
        .map(|_| ())
        .ok_or_else(|| WeblogError::NotFound(format!("user {}", user_id)))
}
