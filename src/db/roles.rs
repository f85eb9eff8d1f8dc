//! Role table: seeded once at bootstrap, read on every permission check

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use crate::auth::permissions::{PermissionSet, RoleKind};
use crate::types::WeblogError;

/// Role row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRow {
    pub id: i64,
    pub name: String,
    pub is_default: bool,
    pub permissions: PermissionSet,
}

const ROLE_COLUMNS: &str = "id, name, is_default, permissions";

fn role_from_row(row: &Row<'_>) -> rusqlite::Result<RoleRow> {
    let bits: i64 = row.get(3)?;
    let permissions = u8::try_from(bits)
        .ok()
        .and_then(PermissionSet::from_bits)
        .ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Integer,
                format!("unknown permission bits {:#x}", bits).into(),
            )
        })?;

    Ok(RoleRow {
        id: row.get(0)?,
        name: row.get(1)?,
        is_default: row.get(2)?,
        permissions,
    })
}

/// Upsert the three seeded roles and make `User` the only default.
///
/// Safe to run on every startup; existing role ids are preserved.
pub fn ensure_roles(conn: &mut Connection) -> Result<Vec<RoleRow>, WeblogError> {
    let tx = conn.transaction()?;

    tx.execute(
        "UPDATE roles SET is_default = 0 WHERE is_default = 1 AND name != ?",
        params![RoleKind::DEFAULT.name()],
    )?;

    for kind in RoleKind::ALL {
        tx.execute(
            "INSERT INTO roles (name, is_default, permissions) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
             is_default = excluded.is_default,
             permissions = excluded.permissions",
            params![
                kind.name(),
                kind == RoleKind::DEFAULT,
                kind.permissions().bits()
            ],
        )?;
    }

    tx.commit()?;

    let roles = list_roles(conn)?;
    info!(count = roles.len(), "Roles seeded");
    Ok(roles)
}

/// Get a role by ID
pub fn get_role(conn: &Connection, id: i64) -> Result<Option<RoleRow>, WeblogError> {
    conn.query_row(
        &format!("SELECT {} FROM roles WHERE id = ?", ROLE_COLUMNS),
        params![id],
        role_from_row,
    )
    .optional()
    .map_err(|e| WeblogError::Database(format!("Failed to get role: {}", e)))
}

pub fn get_role_by_name(conn: &Connection, name: &str) -> Result<Option<RoleRow>, WeblogError> {
    conn.query_row(
        &format!("SELECT {} FROM roles WHERE name = ?", ROLE_COLUMNS),
        params![name],
        role_from_row,
    )
    .optional()
    .map_err(|e| WeblogError::Database(format!("Failed to get role: {}", e)))
}

/// The role assigned to new identities
pub fn default_role(conn: &Connection) -> Result<RoleRow, WeblogError> {
    conn.query_row(
        &format!("SELECT {} FROM roles WHERE is_default = 1", ROLE_COLUMNS),
        [],
        role_from_row,
    )
    .optional()
    .map_err(|e| WeblogError::Database(format!("Failed to get default role: {}", e)))?
    .ok_or_else(|| WeblogError::Internal("No default role; roles were never seeded".into()))
}

pub fn list_roles(conn: &Connection) -> Result<Vec<RoleRow>, WeblogError> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM roles ORDER BY id", ROLE_COLUMNS))
        .map_err(|e| WeblogError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map([], role_from_row)
        .map_err(|e| WeblogError::Database(format!("Failed to query roles: {}", e)))?;

    super::collect_rows(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::Permission;
    use crate::db::schema::init_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_ensure_roles_seeds_table() {
        let mut conn = setup();
        let roles = ensure_roles(&mut conn).unwrap();

        let bits: Vec<(String, u8)> = roles
            .iter()
            .map(|r| (r.name.clone(), r.permissions.bits()))
            .collect();
        assert_eq!(
            bits,
            vec![
                ("User".to_string(), 7),
                ("Moderator".to_string(), 15),
                ("Administrator".to_string(), 143)
            ]
        );

        let default = default_role(&conn).unwrap();
        assert_eq!(default.name, "User");
        assert!(!default.permissions.contains(Permission::Moderate));
    }

    #[test]
    fn test_ensure_roles_is_idempotent() {
        let mut conn = setup();
        let first = ensure_roles(&mut conn).unwrap();
        let second = ensure_roles(&mut conn).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ensure_roles_repairs_default_and_bits() {
        let mut conn = setup();
        ensure_roles(&mut conn).unwrap();
        conn.execute_batch(
            "UPDATE roles SET is_default = 0;
             UPDATE roles SET is_default = 1, permissions = 1 WHERE name = 'Moderator';",
        )
        .unwrap();

        ensure_roles(&mut conn).unwrap();
        assert_eq!(default_role(&conn).unwrap().name, "User");
        let moderator = get_role_by_name(&conn, "Moderator").unwrap().unwrap();
        assert_eq!(moderator.permissions.bits(), 15);
        assert!(!moderator.is_default);
    }

    #[test]
    fn test_unknown_bits_surface_as_error() {
        let conn = setup();
        conn.execute(
            "INSERT INTO roles (name, is_default, permissions) VALUES ('Weird', 0, 16)",
            [],
        )
        .unwrap();
        assert!(get_role_by_name(&conn, "Weird").is_err());
    }

    #[test]
    fn test_default_role_missing() {
        let conn = setup();
        assert!(matches!(default_role(&conn), Err(WeblogError::Internal(_))));
    }
}
