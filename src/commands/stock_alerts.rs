use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::commands::products::find_product;
use crate::commands::users::find_user;
use crate::db::{self, is_unique_violation, Database};
use crate::error::{AppError, Result};
use crate::models::{AlertStatus, StockAlert, SubscribeOutcome};

const ALERT_COLUMNS: &str = "id, product_id, user_id, email, status, created_at, sent_at";

fn map_alert(row: &Row<'_>) -> rusqlite::Result<StockAlert> {
    Ok(StockAlert {
        id: row.get(0)?,
        product_id: row.get(1)?,
        user_id: row.get(2)?,
        email: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        sent_at: row.get(6)?,
    })
}

fn find_pending(conn: &Connection, product_id: i64, user_id: i64) -> Result<Option<StockAlert>> {
    let alert = conn
        .query_row(
            &format!(
                "SELECT {ALERT_COLUMNS} FROM stock_alerts
                 WHERE product_id = ?1 AND user_id = ?2 AND status = ?3"
            ),
            params![product_id, user_id, AlertStatus::Pending],
            map_alert,
        )
        .optional()?;
    Ok(alert)
}

/// Registers a back-in-stock request for a product that is currently
/// unavailable. A second request while one is pending is acknowledged
/// without adding a row.
pub fn subscribe(db: &Database, user_id: i64, product_id: i64) -> Result<SubscribeOutcome> {
    let conn = db.lock()?;

    let product = find_product(&conn, product_id)?.ok_or(AppError::NotFound("product"))?;
    if product.is_available() {
        return Err(AppError::AlreadyAvailable);
    }

    let user = find_user(&conn, user_id)?.ok_or(AppError::Unauthorized)?;
    let email = user
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or(AppError::MissingEmail)?
        .to_string();

    if let Some(existing) = find_pending(&conn, product_id, user_id)? {
        return Ok(SubscribeOutcome::AlreadySubscribed(existing));
    }

    let inserted = conn.execute(
        "INSERT INTO stock_alerts (product_id, user_id, email, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![product_id, user_id, email, AlertStatus::Pending, db::now()],
    );
    match inserted {
        Ok(_) => {}
        // Lost a race with another request for the same pair.
        Err(e) if is_unique_violation(&e) => {
            let existing =
                find_pending(&conn, product_id, user_id)?.ok_or(AppError::Database(e))?;
            return Ok(SubscribeOutcome::AlreadySubscribed(existing));
        }
        Err(e) => return Err(e.into()),
    }

    let id = conn.last_insert_rowid();
    info!(alert_id = id, product_id, user_id, "stock alert registered");

    let alert = conn.query_row(
        &format!("SELECT {ALERT_COLUMNS} FROM stock_alerts WHERE id = ?1"),
        [id],
        map_alert,
    )?;
    Ok(SubscribeOutcome::Subscribed(alert))
}

/// Cancels every pending alert for the pair and returns how many changed.
pub fn unsubscribe(db: &Database, user_id: i64, product_id: i64) -> Result<usize> {
    let conn = db.lock()?;

    let cancelled = conn.execute(
        "UPDATE stock_alerts SET status = ?1
         WHERE product_id = ?2 AND user_id = ?3 AND status = ?4",
        params![AlertStatus::Cancelled, product_id, user_id, AlertStatus::Pending],
    )?;

    info!(product_id, user_id, cancelled, "stock alert cancelled");
    Ok(cancelled)
}

/// Oldest pending alerts for a product, at most `limit` of them.
pub fn get_pending_alerts(db: &Database, product_id: i64, limit: usize) -> Result<Vec<StockAlert>> {
    let conn = db.lock()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM stock_alerts
         WHERE product_id = ?1 AND status = ?2
         ORDER BY created_at, id
         LIMIT ?3"
    ))?;

    let alerts = stmt
        .query_map(
            params![product_id, AlertStatus::Pending, limit as i64],
            map_alert,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(alerts)
}

pub fn is_pending(db: &Database, alert_id: i64) -> Result<bool> {
    let conn = db.lock()?;

    let status: Option<AlertStatus> = conn
        .query_row("SELECT status FROM stock_alerts WHERE id = ?1", [alert_id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(status == Some(AlertStatus::Pending))
}

/// Marks an alert sent if it is still pending. Returns false when another
/// run or an unsubscribe got to it first.
pub fn mark_alert_sent(db: &Database, alert_id: i64) -> Result<bool> {
    let conn = db.lock()?;

    let changed = conn.execute(
        "UPDATE stock_alerts SET status = ?1, sent_at = ?2 WHERE id = ?3 AND status = ?4",
        params![AlertStatus::Sent, db::now(), alert_id, AlertStatus::Pending],
    )?;

    if changed == 0 {
        debug!(alert_id, "stock alert no longer pending");
    }
    Ok(changed > 0)
}

/// Every alert the user ever registered, newest first.
pub fn get_user_alerts(db: &Database, user_id: i64) -> Result<Vec<StockAlert>> {
    let conn = db.lock()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM stock_alerts
         WHERE user_id = ?1
         ORDER BY created_at DESC, id DESC"
    ))?;

    let alerts = stmt
        .query_map([user_id], map_alert)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(alerts)
}
