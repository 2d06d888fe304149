use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use crate::db::{self, is_unique_violation, optional_json_column, Database};
use crate::error::{AppError, Result};
use crate::models::{
    CreateOrder, CustomOrder, Customer, Delivery, DeliveryMethod, Order, OrderItem, OrderStatus,
    Payment, User,
};
use crate::order_code;
use crate::validation::{limits, trimmed, Violations};

/// Attempts at drawing a fresh order code before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 8;

const PAYMENT_METHOD: &str = "whatsapp";

const ORDER_COLUMNS: &str = "id, order_code, user_id, customer_name, customer_phone, customer_email, \
     delivery_method, delivery_address, delivery_city, delivery_state, delivery_note, custom_order, \
     subtotal, delivery_fee, total, status, payment_method, paid, created_at, updated_at";

/// A checkout payload that passed validation.
#[derive(Debug, Clone)]
struct Checkout {
    customer: Customer,
    delivery: Delivery,
    items: Vec<OrderItem>,
    custom_order: Option<CustomOrder>,
    subtotal: f64,
    delivery_fee: f64,
    total: f64,
}

fn validate_checkout(input: CreateOrder) -> Result<Checkout> {
    let mut v = Violations::new();

    let full_name = v.require_text(
        "customer.fullName",
        input.customer.full_name.as_deref(),
        limits::MIN_NAME_LENGTH,
    );
    let phone = v.require_text(
        "customer.phone",
        input.customer.phone.as_deref(),
        limits::MIN_PHONE_LENGTH,
    );
    let email = v.optional_email("customer.email", input.customer.email.as_deref());

    let method = match trimmed(input.delivery.method.as_deref()) {
        None => {
            v.add("delivery.method", "is required");
            None
        }
        Some(raw) => match raw.to_lowercase().parse::<DeliveryMethod>() {
            Ok(method) => Some(method),
            Err(_) => {
                v.add(
                    "delivery.method",
                    "must be one of delivery, standard, express, pickup",
                );
                None
            }
        },
    };
    let address = trimmed(input.delivery.address.as_deref());
    if method.is_some_and(|m| m.requires_address()) && address.is_none() {
        v.add("delivery.address", "is required for delivery");
    }

    if input.items.is_empty() && input.custom_order.is_none() {
        v.add("items", "must contain at least one item");
    }
    let mut items = Vec::with_capacity(input.items.len());
    for (i, item) in input.items.iter().enumerate() {
        let product_id = item.product_id;
        if product_id.is_none() {
            v.add(format!("items[{i}].productId"), "is required");
        }
        let title = v.require_text(&format!("items[{i}].title"), item.title.as_deref(), 1);
        let price = v.non_negative(&format!("items[{i}].price"), item.price);
        let qty = match item.qty {
            Some(q) if q >= 1 => Some(q),
            Some(_) => {
                v.add(format!("items[{i}].qty"), "must be at least 1");
                None
            }
            None => {
                v.add(format!("items[{i}].qty"), "is required");
                None
            }
        };
        if let (Some(product_id), Some(title), Some(price), Some(qty)) = (product_id, title, price, qty)
        {
            items.push(OrderItem {
                product_id,
                title,
                price,
                qty,
                size: trimmed(item.size.as_deref()),
                color: trimmed(item.color.as_deref()),
            });
        }
    }

    let subtotal = v.non_negative("subtotal", input.subtotal);
    let delivery_fee = v.non_negative("deliveryFee", input.delivery_fee.or(Some(0.0)));
    let total = v.non_negative("total", input.total);

    v.finish()?;

    // Every Option below is Some once `finish` has passed.
    Ok(Checkout {
        customer: Customer {
            full_name: full_name.unwrap_or_default(),
            phone: phone.unwrap_or_default(),
            email,
        },
        delivery: Delivery {
            method: method.unwrap_or(DeliveryMethod::Pickup),
            address,
            city: trimmed(input.delivery.city.as_deref()),
            state: trimmed(input.delivery.state.as_deref()),
            note: trimmed(input.delivery.note.as_deref()),
        },
        items,
        custom_order: input.custom_order,
        subtotal: subtotal.unwrap_or_default(),
        delivery_fee: delivery_fee.unwrap_or_default(),
        total: total.unwrap_or_default(),
    })
}

fn map_order(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        order_code: row.get(1)?,
        user_id: row.get(2)?,
        customer: Customer {
            full_name: row.get(3)?,
            phone: row.get(4)?,
            email: row.get(5)?,
        },
        delivery: Delivery {
            method: row.get(6)?,
            address: row.get(7)?,
            city: row.get(8)?,
            state: row.get(9)?,
            note: row.get(10)?,
        },
        items: Vec::new(),
        custom_order: optional_json_column(row, 11)?,
        subtotal: row.get(12)?,
        delivery_fee: row.get(13)?,
        total: row.get(14)?,
        status: row.get(15)?,
        payment: Payment {
            method: row.get(16)?,
            paid: row.get(17)?,
        },
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

fn load_items(conn: &Connection, order_id: i64) -> rusqlite::Result<Vec<OrderItem>> {
    let mut stmt = conn.prepare(
        "SELECT product_id, title, price, qty, size, color
         FROM order_items
         WHERE order_id = ?1
         ORDER BY position",
    )?;

    let items = stmt
        .query_map([order_id], |row| {
            Ok(OrderItem {
                product_id: row.get(0)?,
                title: row.get(1)?,
                price: row.get(2)?,
                qty: row.get(3)?,
                size: row.get(4)?,
                color: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(items)
}

fn find_order(conn: &Connection, id: i64) -> Result<Option<Order>> {
    let order = conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
            [id],
            map_order,
        )
        .optional()?;

    match order {
        Some(mut order) => {
            order.items = load_items(conn, order.id)?;
            Ok(Some(order))
        }
        None => Ok(None),
    }
}

/// Validates and stores a checkout with status `pending_whatsapp` and an
/// unpaid WhatsApp payment. Totals are stored exactly as submitted.
pub fn create_order(db: &Database, input: CreateOrder, user_id: Option<i64>) -> Result<Order> {
    create_order_with_codes(db, input, user_id, order_code::generate)
}

/// [`create_order`] with the order-code source supplied by the caller.
pub fn create_order_with_codes(
    db: &Database,
    input: CreateOrder,
    user_id: Option<i64>,
    mut next_code: impl FnMut() -> String,
) -> Result<Order> {
    let checkout = validate_checkout(input)?;
    let custom_order = checkout
        .custom_order
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let now = db::now();

    let mut conn = db.lock()?;
    let tx = conn.transaction()?;

    let mut attempt = 0;
    let order_code = loop {
        attempt += 1;
        let code = next_code();
        let inserted = tx.execute(
            "INSERT INTO orders (order_code, user_id, customer_name, customer_phone, customer_email,
                 delivery_method, delivery_address, delivery_city, delivery_state, delivery_note,
                 custom_order, subtotal, delivery_fee, total, status, payment_method, paid,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, 0, ?17, ?17)",
            params![
                code,
                user_id,
                checkout.customer.full_name,
                checkout.customer.phone,
                checkout.customer.email,
                checkout.delivery.method,
                checkout.delivery.address,
                checkout.delivery.city,
                checkout.delivery.state,
                checkout.delivery.note,
                custom_order,
                checkout.subtotal,
                checkout.delivery_fee,
                checkout.total,
                OrderStatus::PendingWhatsapp,
                PAYMENT_METHOD,
                now,
            ],
        );
        match inserted {
            Ok(_) => break code,
            Err(e) if is_unique_violation(&e) && attempt < MAX_CODE_ATTEMPTS => {
                warn!(attempt, order_code = %code, "order code collision, drawing another");
            }
            Err(e) => return Err(e.into()),
        }
    };

    let order_id = tx.last_insert_rowid();
    for (position, item) in checkout.items.iter().enumerate() {
        tx.execute(
            "INSERT INTO order_items (order_id, position, product_id, title, price, qty, size, color)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                order_id,
                position as i64,
                item.product_id,
                item.title,
                item.price,
                item.qty,
                item.size,
                item.color,
            ],
        )?;
    }

    tx.commit()?;

    info!(
        order_id,
        order_code = %order_code,
        items = checkout.items.len(),
        custom = checkout.custom_order.is_some(),
        total = checkout.total,
        "order placed"
    );

    find_order(&conn, order_id)?.ok_or(AppError::NotFound("order"))
}

/// Admins see every order, customers only their own; newest first.
pub fn get_orders(db: &Database, viewer: &User) -> Result<Vec<Order>> {
    let conn = db.lock()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE ?1 OR user_id = ?2
         ORDER BY created_at DESC, id DESC"
    ))?;

    let mut orders = stmt
        .query_map(params![viewer.is_admin(), viewer.id], map_order)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for order in &mut orders {
        order.items = load_items(&conn, order.id)?;
    }

    Ok(orders)
}

/// Someone else's order reads as not found rather than forbidden.
pub fn get_order(db: &Database, id: i64, viewer: &User) -> Result<Order> {
    let conn = db.lock()?;

    match find_order(&conn, id)? {
        Some(order) if viewer.is_admin() || order.user_id == Some(viewer.id) => Ok(order),
        _ => Err(AppError::NotFound("order")),
    }
}

/// Sets any of the known statuses. Moves that skip ahead, go backwards or
/// leave a terminal state are accepted and logged.
pub fn update_order_status(db: &Database, id: i64, status: &str) -> Result<Order> {
    let next: OrderStatus = status
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidStatus(status.to_string()))?;

    let conn = db.lock()?;

    let current: OrderStatus = conn
        .query_row("SELECT status FROM orders WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or(AppError::NotFound("order"))?;

    if current != next && !current.can_transition_to(next) {
        warn!(
            order_id = id,
            from = %current,
            to = %next,
            "order status moved off the fulfilment path"
        );
    }

    conn.execute(
        "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![next, db::now(), id],
    )?;

    info!(order_id = id, from = %current, to = %next, "order status updated");

    find_order(&conn, id)?.ok_or(AppError::NotFound("order"))
}
