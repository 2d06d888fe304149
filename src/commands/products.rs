use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::db::{self, json_column, Database};
use crate::error::{AppError, Result};
use crate::models::{is_available, CreateProduct, Product, UpdateProduct, UpdatedProduct};
use crate::validation::Violations;

pub const DEFAULT_CATEGORY: &str = "General";

const PRODUCT_COLUMNS: &str = "id, title, category, price, description, images, sizes, colors, \
     in_stock, stock_qty, created_at, updated_at";

fn map_product(row: &Row<'_>) -> rusqlite::Result<Product> {
    let in_stock: bool = row.get(8)?;
    let stock_qty: i64 = row.get(9)?;
    Ok(Product {
        id: row.get(0)?,
        title: row.get(1)?,
        category: row.get(2)?,
        price: row.get(3)?,
        description: row.get(4)?,
        images: json_column(row, 5)?,
        sizes: json_column(row, 6)?,
        colors: json_column(row, 7)?,
        in_stock,
        stock_qty,
        available: is_available(in_stock, stock_qty),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub(crate) fn find_product(conn: &Connection, id: i64) -> Result<Option<Product>> {
    let product = conn
        .query_row(
            &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
            [id],
            map_product,
        )
        .optional()?;
    Ok(product)
}

/// Newest first, optionally narrowed to one category.
pub fn get_products(db: &Database, category: Option<&str>) -> Result<Vec<Product>> {
    let conn = db.lock()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products
         WHERE (?1 IS NULL OR category = ?1)
         ORDER BY created_at DESC, id DESC"
    ))?;

    let products = stmt
        .query_map([category], map_product)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(products)
}

pub fn get_product(db: &Database, id: i64) -> Result<Product> {
    let conn = db.lock()?;
    find_product(&conn, id)?.ok_or(AppError::NotFound("product"))
}

pub fn create_product(db: &Database, product: CreateProduct) -> Result<Product> {
    let mut violations = Violations::new();
    let title = violations.require_text("title", Some(&product.title), 1);
    let price = violations.non_negative("price", product.price);
    let stock_qty = product.stock_qty.unwrap_or(0);
    if stock_qty < 0 {
        violations.add("stockQty", "must be zero or more");
    }
    violations.finish()?;
    let title = title.unwrap_or_default();
    let price = price.unwrap_or_default();

    let category = product
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string();
    let now = db::now();

    let conn = db.lock()?;
    conn.execute(
        "INSERT INTO products (title, category, price, description, images, sizes, colors, in_stock, stock_qty, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            title,
            category,
            price,
            product.description.unwrap_or_default(),
            serde_json::to_string(&product.images)?,
            serde_json::to_string(&product.sizes)?,
            serde_json::to_string(&product.colors)?,
            product.in_stock.unwrap_or(true),
            stock_qty,
            now,
        ],
    )?;

    let id = conn.last_insert_rowid();
    info!(product_id = id, title = %title, "product created");

    find_product(&conn, id)?.ok_or(AppError::NotFound("product"))
}

/// Applies the supplied fields and reports the availability the product had
/// before the write, so the caller can spot a restock.
pub fn update_product(db: &Database, id: i64, patch: UpdateProduct) -> Result<UpdatedProduct> {
    let mut violations = Violations::new();
    if let Some(title) = patch.title.as_deref() {
        violations.require_text("title", Some(title), 1);
    }
    if let Some(price) = patch.price {
        violations.non_negative("price", Some(price));
    }
    if matches!(patch.stock_qty, Some(qty) if qty < 0) {
        violations.add("stockQty", "must be zero or more");
    }
    violations.finish()?;

    let conn = db.lock()?;
    let current = find_product(&conn, id)?.ok_or(AppError::NotFound("product"))?;
    let was_available = current.is_available();

    let category = match patch.category.as_deref().map(str::trim) {
        Some("") => DEFAULT_CATEGORY.to_string(),
        Some(c) => c.to_string(),
        None => current.category,
    };
    let images = patch.images.unwrap_or(current.images);
    let sizes = patch.sizes.unwrap_or(current.sizes);
    let colors = patch.colors.unwrap_or(current.colors);

    conn.execute(
        "UPDATE products SET title = ?1, category = ?2, price = ?3, description = ?4, images = ?5,
             sizes = ?6, colors = ?7, in_stock = ?8, stock_qty = ?9, updated_at = ?10
         WHERE id = ?11",
        params![
            patch
                .title
                .map(|t| t.trim().to_string())
                .unwrap_or(current.title),
            category,
            patch.price.unwrap_or(current.price),
            patch.description.unwrap_or(current.description),
            serde_json::to_string(&images)?,
            serde_json::to_string(&sizes)?,
            serde_json::to_string(&colors)?,
            patch.in_stock.unwrap_or(current.in_stock),
            patch.stock_qty.unwrap_or(current.stock_qty),
            db::now(),
            id,
        ],
    )?;

    let product = find_product(&conn, id)?.ok_or(AppError::NotFound("product"))?;
    info!(
        product_id = id,
        was_available,
        available = product.available,
        stock_qty = product.stock_qty,
        "product updated"
    );

    Ok(UpdatedProduct {
        product,
        was_available,
    })
}

/// Stock alerts and order items referencing the product are left in place.
pub fn delete_product(db: &Database, id: i64) -> Result<()> {
    let conn = db.lock()?;

    let removed = conn.execute("DELETE FROM products WHERE id = ?1", [id])?;
    if removed == 0 {
        return Err(AppError::NotFound("product"));
    }

    info!(product_id = id, "product deleted");
    Ok(())
}
