use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::db::{self, Database};
use crate::error::{AppError, Result};
use crate::models::{CreateUser, Role, User};
use crate::validation::{limits, Violations};

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub(crate) fn find_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, name, email, role, created_at FROM users WHERE id = ?1",
            [id],
            map_user,
        )
        .optional()?;
    Ok(user)
}

fn insert_user(conn: &Connection, name: &str, email: Option<&str>, role: Role) -> Result<User> {
    conn.execute(
        "INSERT INTO users (name, email, role, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![name, email, role, db::now()],
    )?;
    let id = conn.last_insert_rowid();
    find_user(conn, id)?.ok_or(AppError::NotFound("user"))
}

/// Public sign-up always yields a customer account.
pub fn register_user(db: &Database, user: CreateUser) -> Result<User> {
    let mut violations = Violations::new();
    let name = violations.require_text("name", Some(&user.name), limits::MIN_NAME_LENGTH);
    let email = violations.optional_email("email", user.email.as_deref());
    violations.finish()?;
    let name = name.unwrap_or_default();

    let conn = db.lock()?;
    let created = insert_user(&conn, &name, email.as_deref(), Role::Customer)?;
    info!(user_id = created.id, "customer registered");
    Ok(created)
}

pub fn get_user(db: &Database, id: i64) -> Result<User> {
    let conn = db.lock()?;
    find_user(&conn, id)?.ok_or(AppError::NotFound("user"))
}

/// Replaces the email on file; `None` or blank clears it.
pub fn set_user_email(db: &Database, id: i64, email: Option<&str>) -> Result<User> {
    let mut violations = Violations::new();
    let email = violations.optional_email("email", email);
    violations.finish()?;

    let conn = db.lock()?;
    let changed = conn.execute(
        "UPDATE users SET email = ?1 WHERE id = ?2",
        params![email, id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("user"));
    }
    find_user(&conn, id)?.ok_or(AppError::NotFound("user"))
}

/// Creates the configured admin account on first start; an admin already
/// holding that email is returned unchanged.
pub fn ensure_admin(db: &Database, name: &str, email: &str) -> Result<User> {
    let email = email.trim().to_lowercase();
    let conn = db.lock()?;

    let existing = conn
        .query_row(
            "SELECT id, name, email, role, created_at FROM users WHERE email = ?1 AND role = 'admin'",
            [&email],
            map_user,
        )
        .optional()?;
    if let Some(admin) = existing {
        return Ok(admin);
    }

    let admin = insert_user(&conn, name, Some(&email), Role::Admin)?;
    info!(user_id = admin.id, "admin account created");
    Ok(admin)
}
