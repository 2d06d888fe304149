use rusqlite::{params, OptionalExtension};
use tracing::info;

use crate::db::{self, Database};
use crate::error::{AppError, Result};
use crate::models::NewsletterSubscriber;
use crate::validation::Violations;

/// Returns the subscriber row and whether it already existed.
pub fn subscribe(db: &Database, email: &str) -> Result<(NewsletterSubscriber, bool)> {
    let mut v = Violations::new();
    let email = v.optional_email("email", Some(email));
    if email.is_none() && v.is_empty() {
        v.add("email", "is required");
    }
    v.finish()?;
    let email = email.unwrap_or_default();

    let conn = db.lock()?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO newsletter_subscribers (email, created_at) VALUES (?1, ?2)",
        params![email, db::now()],
    )?;

    let subscriber = conn
        .query_row(
            "SELECT id, email, created_at FROM newsletter_subscribers WHERE email = ?1",
            [&email],
            |row| {
                Ok(NewsletterSubscriber {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or(AppError::NotFound("subscriber"))?;

    let already_subscribed = inserted == 0;
    if !already_subscribed {
        info!(subscriber_id = subscriber.id, "newsletter signup");
    }
    Ok((subscriber, already_subscribed))
}
