//! Authentication and authorization for Weblog
//!
//! Provides:
//! - Signed, purpose-bound tokens (confirmation, password reset, API access)
//! - Typed permission flags and the seeded role table
//! - Password hashing with Argon2
//! - Permission checks that resolve the caller's role on every call

pub mod password;
pub mod permissions;
pub mod token;

use rusqlite::Connection;

pub use password::{hash_password, validate_password_policy, verify_password};
pub use permissions::{Permission, PermissionSet, RoleKind};
pub use token::{extract_token_from_header, Claims, TokenPurpose, TokenSigner};

use crate::db::users::user_role;
use crate::types::WeblogError;

/// Does `user_id`'s current role grant `permission`?
///
/// The role is read from the store each time, so a role change takes effect
/// on the very next check.
pub fn has_permission(conn: &Connection, user_id: i64, permission: Permission) -> Result<bool, WeblogError> {
    Ok(user_role(conn, user_id)?.permissions.contains(permission))
}

/// Like [`has_permission`] but denial is an `AuthorizationDenied` error
pub fn require_permission(conn: &Connection, user_id: i64, permission: Permission) -> Result<(), WeblogError> {
    if has_permission(conn, user_id, permission)? {
        Ok(())
    } else {
        Err(WeblogError::AuthorizationDenied(format!(
            "{} permission required",
            permission
        )))
    }
}
