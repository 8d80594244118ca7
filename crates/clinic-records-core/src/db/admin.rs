//! Admin account operations.

use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

use super::{Database, DbError, DbResult};
use crate::models::{now_timestamp, AdminAccount};

const HASH_SCHEME: &str = "sha256";

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a password as `sha256$<salt>$<hex>` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    format!("{}${}${}", HASH_SCHEME, salt, digest(&salt, password))
}

/// Check a password against a stored hash. Bare hex digests written by older
/// installs are unsalted SHA-256.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(HASH_SCHEME), Some(salt), Some(hex_digest)) => {
            digest(salt, password).eq_ignore_ascii_case(hex_digest)
        }
        (Some(legacy), None, None) => digest("", password).eq_ignore_ascii_case(legacy),
        _ => false,
    }
}

fn require_non_blank(field: &str, value: &str) -> DbResult<()> {
    if value.trim().is_empty() {
        return Err(DbError::InvalidArgument(format!("{} is required", field)));
    }
    Ok(())
}

impl Database {
    /// Whether any admin account has been created.
    pub fn admin_exists(&self) -> DbResult<bool> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM admin_users", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Create an admin account. A taken username is a constraint violation.
    pub fn create_admin(&self, username: &str, password: &str) -> DbResult<AdminAccount> {
        require_non_blank("username", username)?;
        require_non_blank("password", password)?;

        let username = username.trim();
        let created_at = now_timestamp();
        self.conn.execute(
            "INSERT INTO admin_users (username, password_hash, created_at) VALUES (?, ?, ?)",
            params![username, hash_password(password), created_at],
        )?;
        tracing::info!(username, "Created admin account");

        Ok(AdminAccount {
            admin_id: self.conn.last_insert_rowid(),
            username: username.to_string(),
            created_at: Some(created_at),
        })
    }

    /// Check a login. Unknown usernames and wrong passwords are both `false`.
    pub fn verify_admin(&self, username: &str, password: &str) -> DbResult<bool> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT password_hash FROM admin_users WHERE username = ?",
                [username.trim()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.is_some_and(|hash| verify_password(password, &hash)))
    }

    /// Username of the first admin account.
    pub fn admin_username(&self) -> DbResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT username FROM admin_users ORDER BY admin_id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Rename an admin. Returns `false` when `old_username` does not exist.
    pub fn update_admin_username(&self, old_username: &str, new_username: &str) -> DbResult<bool> {
        require_non_blank("username", new_username)?;
        let rows_affected = self.conn.execute(
            "UPDATE admin_users SET username = ? WHERE username = ?",
            params![new_username.trim(), old_username.trim()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Replace an admin's password. Returns `false` when the user does not exist.
    pub fn update_admin_password(&self, username: &str, new_password: &str) -> DbResult<bool> {
        require_non_blank("password", new_password)?;
        let rows_affected = self.conn.execute(
            "UPDATE admin_users SET password_hash = ? WHERE username = ?",
            params![hash_password(new_password), username.trim()],
        )?;
        if rows_affected > 0 {
            tracing::info!(username, "Admin password changed");
        }
        Ok(rows_affected > 0)
    }
}
