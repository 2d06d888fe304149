use rusqlite::types::Type;
use rusqlite::{Connection, Result, Row};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::AppError;

pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|_| rusqlite::Error::InvalidPath(dir.to_path_buf()))?;
        }

        let conn = Connection::open(path)?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Database {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Locks the connection. Callers must drop the guard before any `.await`.
    pub fn lock(&self) -> std::result::Result<MutexGuard<'_, Connection>, AppError> {
        self.conn.lock().map_err(|_| AppError::LockPoisoned)
    }

    /// Runs `f` on the blocking thread pool so SQLite work stays off the
    /// async workers.
    pub async fn call<T, F>(self: &Arc<Self>, f: F) -> std::result::Result<T, AppError>
    where
        F: FnOnce(&Database) -> std::result::Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub fn initialize(&self) -> std::result::Result<(), AppError> {
        let conn = self.lock()?;

        conn.execute_batch(
            "
            -- Catalog
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'General',
                price REAL NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                images TEXT NOT NULL DEFAULT '[]',
                sizes TEXT NOT NULL DEFAULT '[]',
                colors TEXT NOT NULL DEFAULT '[]',
                in_stock INTEGER NOT NULL DEFAULT 1,
                stock_qty INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Customer and admin accounts
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT,
                role TEXT NOT NULL DEFAULT 'customer',
                created_at TEXT NOT NULL
            );

            -- Orders; customer and delivery are snapshots taken at checkout
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_code TEXT NOT NULL UNIQUE,
                user_id INTEGER,
                customer_name TEXT NOT NULL,
                customer_phone TEXT NOT NULL,
                customer_email TEXT,
                delivery_method TEXT NOT NULL,
                delivery_address TEXT,
                delivery_city TEXT,
                delivery_state TEXT,
                custom_order TEXT,
                subtotal REAL NOT NULL,
                delivery_fee REAL NOT NULL,
                total REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending_whatsapp',
                payment_method TEXT NOT NULL DEFAULT 'whatsapp',
                paid INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Line items, never joined back to live products
            CREATE TABLE IF NOT EXISTS order_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                product_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                price REAL NOT NULL,
                qty INTEGER NOT NULL,
                size TEXT,
                color TEXT,
                FOREIGN KEY (order_id) REFERENCES orders(id)
            );

            -- Back-in-stock subscriptions
            CREATE TABLE IF NOT EXISTS stock_alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                email TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_stock_alerts_one_pending
                ON stock_alerts (product_id, user_id) WHERE status = 'pending';

            -- Contact form
            CREATE TABLE IF NOT EXISTS contact_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                email TEXT,
                phone TEXT,
                message TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS newsletter_subscribers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
            ",
        )?;

        // Run migrations for existing databases (pass connection to avoid deadlock)
        Self::migrate_conn(&conn)?;

        Ok(())
    }

    fn migrate_conn(conn: &Connection) -> Result<()> {
        let order_columns = Self::columns(conn, "orders")?;
        if !order_columns.contains(&"delivery_note".to_string()) {
            conn.execute("ALTER TABLE orders ADD COLUMN delivery_note TEXT", [])?;
        }

        let alert_columns = Self::columns(conn, "stock_alerts")?;
        if !alert_columns.contains(&"sent_at".to_string()) {
            conn.execute("ALTER TABLE stock_alerts ADD COLUMN sent_at TEXT", [])?;
        }

        Ok(())
    }

    fn columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>>>()?;
        Ok(columns)
    }
}

pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Reads a TEXT column holding JSON.
pub fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads a nullable TEXT column holding JSON.
pub fn optional_json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
