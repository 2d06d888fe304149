use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::db::{self, Database};
use crate::error::{AppError, Result};
use crate::models::{ContactMessage, ContactStatus, CreateContactMessage};
use crate::validation::{limits, trimmed, Violations};

const CONTACT_COLUMNS: &str = "id, full_name, email, phone, message, status, created_at";

fn map_message(row: &Row<'_>) -> rusqlite::Result<ContactMessage> {
    Ok(ContactMessage {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        message: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn find_message(conn: &Connection, id: i64) -> Result<Option<ContactMessage>> {
    let message = conn
        .query_row(
            &format!("SELECT {CONTACT_COLUMNS} FROM contact_messages WHERE id = ?1"),
            [id],
            map_message,
        )
        .optional()?;
    Ok(message)
}

pub fn create_message(db: &Database, input: CreateContactMessage) -> Result<ContactMessage> {
    let mut v = Violations::new();
    let full_name = v.require_text(
        "fullName",
        input.full_name.as_deref(),
        limits::MIN_NAME_LENGTH,
    );
    let email = v.optional_email("email", input.email.as_deref());
    let body = v.require_text("message", input.message.as_deref(), 1);
    v.finish()?;

    let conn = db.lock()?;
    conn.execute(
        "INSERT INTO contact_messages (full_name, email, phone, message, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            full_name.unwrap_or_default(),
            email,
            trimmed(input.phone.as_deref()),
            body.unwrap_or_default(),
            ContactStatus::New,
            db::now(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    info!(message_id = id, "contact message received");

    find_message(&conn, id)?.ok_or(AppError::NotFound("message"))
}

pub fn get_messages(db: &Database) -> Result<Vec<ContactMessage>> {
    let conn = db.lock()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {CONTACT_COLUMNS} FROM contact_messages ORDER BY created_at DESC, id DESC"
    ))?;

    let messages = stmt
        .query_map([], map_message)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(messages)
}

pub fn update_message_status(db: &Database, id: i64, status: &str) -> Result<ContactMessage> {
    let status: ContactStatus = status.trim().parse().map_err(|_| {
        AppError::field("status", "must be one of new, replied, closed")
    })?;

    let conn = db.lock()?;
    let changed = conn.execute(
        "UPDATE contact_messages SET status = ?1 WHERE id = ?2",
        params![status, id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("message"));
    }

    info!(message_id = id, status = %status, "contact message status updated");
    find_message(&conn, id)?.ok_or(AppError::NotFound("message"))
}
