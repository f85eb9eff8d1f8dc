//! Application services
//!
//! Each service owns an `Arc<WeblogDb>` and runs every mutation inside one
//! SQLite transaction, checking permissions against the caller's current
//! role before touching any row.
//!
//! - [`AccountService`] - registration, credentials, tokens, profiles, roles
//! - [`SocialService`] - the follow graph
//! - [`ContentService`] - posts, comments and moderation

pub mod accounts;
pub mod content;
pub mod social;

pub use accounts::{
    avatar_hash, gravatar_url, normalize_email, validate_name, AccountService,
    AccountServiceConfig, AdminProfileUpdate, ConfirmOutcome, ProfileUpdate, RegisterInput,
    ResendOutcome,
};
pub use content::{ContentService, ContentServiceConfig, VisibilityOutcome, DISABLED_COMMENT_BODY};
pub use social::{FollowCounts, FollowOutcome, SocialService, UnfollowOutcome};
