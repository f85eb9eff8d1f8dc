//! Identity CRUD operations
//!
//! `email` and `name` are stored as entered next to a lowercased key column
//! (`email_key`, `name_key`). Uniqueness and every lookup go through the keys,
//! so both are case-insensitive for any script, not just ASCII.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::roles::{get_role, RoleRow};
use crate::types::WeblogError;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// User row from database
#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role_id: i64,
    pub confirmed: bool,
    pub age: Option<i64>,
    pub gender: Option<Gender>,
    pub phone_number: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub avatar_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub password_hash: &'a str,
    pub role_id: i64,
    pub confirmed: bool,
    pub avatar_hash: &'a str,
}

/// Full replacement of the user-editable profile columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFields {
    pub name: String,
    pub age: Option<i64>,
    pub gender: Option<Gender>,
    pub phone_number: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
}

impl From<&UserRow> for ProfileFields {
    fn from(user: &UserRow) -> Self {
        Self {
            name: user.name.clone(),
            age: user.age,
            gender: user.gender,
            phone_number: user.phone_number.clone(),
            location: user.location.clone(),
            about_me: user.about_me.clone(),
        }
    }
}

const USER_FIELDS: [&str; 14] = [
    "id", "email", "name", "password_hash", "role_id", "confirmed", "age", "gender",
    "phone_number", "location", "about_me", "avatar_hash", "created_at", "last_seen",
];

/// Column list for [`user_from_row`], qualified with `alias` when joining
pub(crate) fn user_columns(alias: &str) -> String {
    USER_FIELDS
        .iter()
        .map(|f| format!("{}.{}", alias, f))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let gender: Option<String> = row.get(7)?;
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        role_id: row.get(4)?,
        confirmed: row.get(5)?,
        age: row.get(6)?,
        gender: gender.as_deref().and_then(Gender::parse),
        phone_number: row.get(8)?,
        location: row.get(9)?,
        about_me: row.get(10)?,
        avatar_hash: row.get(11)?,
        created_at: row.get(12)?,
        last_seen: row.get(13)?,
    })
}

/// Lookup key for an email or name
pub fn fold_key(value: &str) -> String {
    value.to_lowercase()
}

fn query_user(conn: &Connection, filter: &str, key: &dyn rusqlite::ToSql) -> Result<Option<UserRow>, WeblogError> {
    conn.query_row(
        &format!("SELECT {} FROM users u WHERE u.{}", user_columns("u"), filter),
        params![key],
        user_from_row,
    )
    .optional()
    .map_err(|e| WeblogError::Database(format!("Failed to get user: {}", e)))
}

// =============================================================================
// CRUD Operations
// =============================================================================

/// Insert a user. Duplicate email or name fails with `AlreadyExists`.
pub fn insert_user(conn: &Connection, input: &NewUser<'_>, now: DateTime<Utc>) -> Result<UserRow, WeblogError> {
    conn.execute(
        "INSERT INTO users (email, email_key, name, name_key, password_hash, role_id, confirmed, avatar_hash,
                            created_at, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            input.email,
            fold_key(input.email),
            input.name,
            fold_key(input.name),
            input.password_hash,
            input.role_id,
            input.confirmed,
            input.avatar_hash,
            now,
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_user(conn, id)?
        .ok_or_else(|| WeblogError::Internal("Failed to retrieve created user".to_string()))
}

/// Get a user by ID
pub fn get_user(conn: &Connection, id: i64) -> Result<Option<UserRow>, WeblogError> {
    query_user(conn, "id = ?", &id)
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>, WeblogError> {
    query_user(conn, "email_key = ?", &fold_key(email))
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<UserRow>, WeblogError> {
    query_user(conn, "name_key = ?", &fold_key(name))
}

/// Look up by email if the login contains '@', otherwise by name
pub fn find_by_login(conn: &Connection, login: &str) -> Result<Option<UserRow>, WeblogError> {
    if login.contains('@') {
        find_by_email(conn, login)
    } else {
        find_by_name(conn, login)
    }
}

/// Current role of a user, resolved fresh on every call
pub fn user_role(conn: &Connection, user_id: i64) -> Result<RoleRow, WeblogError> {
    let role_id: i64 = conn
        .query_row("SELECT role_id FROM users WHERE id = ?", params![user_id], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| WeblogError::Database(format!("Failed to get user role: {}", e)))?
        .ok_or_else(|| WeblogError::NotFound(format!("user {}", user_id)))?;

    get_role(conn, role_id)?
        .ok_or_else(|| WeblogError::Internal(format!("user {} references missing role {}", user_id, role_id)))
}

pub fn set_password_hash(conn: &Connection, id: i64, password_hash: &str) -> Result<(), WeblogError> {
    let rows = conn.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        params![password_hash, id],
    )?;
    require_row(rows, id)
}

/// Set the confirmed flag. Returns true if the stored value changed.
pub fn set_confirmed(conn: &Connection, id: i64, confirmed: bool) -> Result<bool, WeblogError> {
    let rows = conn.execute(
        "UPDATE users SET confirmed = ?1 WHERE id = ?2 AND confirmed != ?1",
        params![confirmed, id],
    )?;
    if rows == 0 && get_user(conn, id)?.is_none() {
        return Err(WeblogError::NotFound(format!("user {}", id)));
    }
    Ok(rows > 0)
}

/// Replace the email and avatar hash, and reset confirmation
pub fn set_email(conn: &Connection, id: i64, email: &str, avatar_hash: &str) -> Result<(), WeblogError> {
    let rows = conn.execute(
        "UPDATE users SET email = ?, email_key = ?, avatar_hash = ?, confirmed = 0 WHERE id = ?",
        params![email, fold_key(email), avatar_hash, id],
    )?;
    require_row(rows, id)
}

pub fn set_role(conn: &Connection, id: i64, role_id: i64) -> Result<(), WeblogError> {
    let rows = conn.execute(
        "UPDATE users SET role_id = ? WHERE id = ?",
        params![role_id, id],
    )?;
    require_row(rows, id)
}

/// Write profile columns. Duplicate name or phone number fails with `AlreadyExists`.
pub fn update_profile(conn: &Connection, id: i64, profile: &ProfileFields) -> Result<(), WeblogError> {
    let rows = conn.execute(
        "UPDATE users SET name = ?, name_key = ?, age = ?, gender = ?, phone_number = ?, location = ?,
                about_me = ?
         WHERE id = ?",
        params![
            profile.name,
            fold_key(&profile.name),
            profile.age,
            profile.gender.map(Gender::as_str),
            profile.phone_number,
            profile.location,
            profile.about_me,
            id,
        ],
    )?;
    require_row(rows, id)
}

pub fn touch_last_seen(conn: &Connection, id: i64, now: DateTime<Utc>) -> Result<(), WeblogError> {
    conn.execute("UPDATE users SET last_seen = ? WHERE id = ?", params![now, id])
        .map_err(|e| WeblogError::Database(format!("Failed to update last_seen: {}", e)))?;
    Ok(())
}

/// Delete a user; follows, posts and comments cascade
pub fn delete_user(conn: &Connection, id: i64) -> Result<bool, WeblogError> {
    let rows = conn
        .execute("DELETE FROM users WHERE id = ?", params![id])
        .map_err(|e| WeblogError::Database(format!("Failed to delete user: {}", e)))?;
    Ok(rows > 0)
}

fn require_row(rows: usize, id: i64) -> Result<(), WeblogError> {
    if rows == 0 {
        Err(WeblogError::NotFound(format!("user {}", id)))
    } else {
        Ok(())
    }
}
