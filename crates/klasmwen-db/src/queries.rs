use crate::models::{UserRow, parse_enum};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::{Connection, Row};

use klasmwen_types::models::{Role, User};

const USER_COLUMNS: &str = "id, username, password, role, bio, avatar_url, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Public profile (no password hash).
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.get_user_by_id(id)?.map(UserRow::into_user))
    }

    /// Updates bio and avatar URL. `None` leaves a field unchanged; an empty
    /// string clears it.
    pub fn update_profile(
        &self,
        id: &str,
        bio: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET bio = CASE WHEN ?1 IS NULL THEN bio ELSE NULLIF(?1, '') END,
                     avatar_url = CASE WHEN ?2 IS NULL THEN avatar_url ELSE NULLIF(?2, '') END
                 WHERE id = ?3",
                (bio, avatar_url, id),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            Ok(query_user(conn, "id", id)?.map(UserRow::into_user))
        })
    }

    pub fn set_user_role(&self, id: &str, role: Role) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                (role.as_str(), id),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            Ok(query_user(conn, "id", id)?.map(UserRow::into_user))
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    conn.query_row(&sql, [value], map_user_row).optional()
}

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        role: parse_enum(row, 3)?,
        bio: row.get(4)?,
        avatar_url: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Fixtures shared by the query tests of every module.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::Database;

    pub fn user(db: &Database, id: &str) -> String {
        db.create_user(id, id, "not-a-real-hash").unwrap();
        id.to_string()
    }

    pub fn post(db: &Database, author: &str) -> i64 {
        db.create_post(author, "title", "content").unwrap().id
    }
}
