use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::auth::{current_user, optional_user, require_admin};
use super::json::ApiJson;
use super::AppState;
use crate::commands::{contact, newsletter, orders, products, stock_alerts, users};
use crate::error::Result;
use crate::models::{
    ContactMessage, CreateContactMessage, CreateOrder, CreateProduct, CreateUser,
    NewsletterSignup, NewsletterSubscriber, Order, Product, StockAlert, SubscribeOutcome,
    UpdateContactStatus, UpdateOrderStatus, UpdateProduct, User,
};

// Every handler does its SQLite work inside `state.db.call`, which moves it
// to the blocking pool together with the identity lookup.

pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ============================================================================
// Products
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>> {
    let category = query.category.filter(|c| !c.is_empty());
    let list = state
        .db
        .call(move |db| products::get_products(db, category.as_deref()))
        .await?;
    Ok(Json(list))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Product>> {
    let product = state.db.call(move |db| products::get_product(db, id)).await?;
    Ok(Json(product))
}

pub async fn create_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(product): ApiJson<CreateProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let created = state
        .db
        .call(move |db| {
            require_admin(db, &headers)?;
            products::create_product(db, product)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Restock notifications run in the background; the response only
/// reflects the product write.
pub async fn update_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    ApiJson(patch): ApiJson<UpdateProduct>,
) -> Result<Json<Product>> {
    let update = state
        .db
        .call(move |db| {
            require_admin(db, &headers)?;
            products::update_product(db, id, patch)
        })
        .await?;
    let _ = state.watcher.observe(&update);
    Ok(Json(update.product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state
        .db
        .call(move |db| {
            require_admin(db, &headers)?;
            products::delete_product(db, id)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Stock alerts
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub message: &'static str,
    pub alert: StockAlert,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub message: &'static str,
    pub cancelled: usize,
}

pub async fn subscribe_stock_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(product_id): Path<i64>,
) -> Result<(StatusCode, Json<SubscribeResponse>)> {
    let outcome = state
        .db
        .call(move |db| {
            let user = current_user(db, &headers)?;
            stock_alerts::subscribe(db, user.id, product_id)
        })
        .await?;

    let status = match &outcome {
        SubscribeOutcome::Subscribed(_) => StatusCode::CREATED,
        SubscribeOutcome::AlreadySubscribed(_) => StatusCode::OK,
    };
    Ok((
        status,
        Json(SubscribeResponse {
            message: outcome.message(),
            alert: outcome.alert().clone(),
        }),
    ))
}

pub async fn unsubscribe_stock_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(product_id): Path<i64>,
) -> Result<Json<UnsubscribeResponse>> {
    let cancelled = state
        .db
        .call(move |db| {
            let user = current_user(db, &headers)?;
            stock_alerts::unsubscribe(db, user.id, product_id)
        })
        .await?;
    Ok(Json(UnsubscribeResponse {
        message: "You won't be notified about this product",
        cancelled,
    }))
}

pub async fn my_stock_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<StockAlert>>> {
    let alerts = state
        .db
        .call(move |db| {
            let user = current_user(db, &headers)?;
            stock_alerts::get_user_alerts(db, user.id)
        })
        .await?;
    Ok(Json(alerts))
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateEmail {
    pub email: Option<String>,
}

pub async fn register_user(
    State(state): State<AppState>,
    ApiJson(user): ApiJson<CreateUser>,
) -> Result<(StatusCode, Json<User>)> {
    let created = state
        .db
        .call(move |db| users::register_user(db, user))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<User>> {
    let user = state
        .db
        .call(move |db| current_user(db, &headers))
        .await?;
    Ok(Json(user))
}

pub async fn update_my_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<UpdateEmail>,
) -> Result<Json<User>> {
    let user = state
        .db
        .call(move |db| {
            let user = current_user(db, &headers)?;
            users::set_user_email(db, user.id, body.email.as_deref())
        })
        .await?;
    Ok(Json(user))
}

// ============================================================================
// Orders
// ============================================================================

/// Guest checkout is allowed; an identified caller gets the order linked to
/// their account.
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(order): ApiJson<CreateOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let created = state
        .db
        .call(move |db| {
            let user = optional_user(db, &headers)?;
            orders::create_order(db, order, user.map(|u| u.id))
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Order>>> {
    let list = state
        .db
        .call(move |db| {
            let viewer = current_user(db, &headers)?;
            orders::get_orders(db, &viewer)
        })
        .await?;
    Ok(Json(list))
}

pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Order>> {
    let order = state
        .db
        .call(move |db| {
            let viewer = current_user(db, &headers)?;
            orders::get_order(db, id, &viewer)
        })
        .await?;
    Ok(Json(order))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<UpdateOrderStatus>,
) -> Result<Json<Order>> {
    let order = state
        .db
        .call(move |db| {
            require_admin(db, &headers)?;
            orders::update_order_status(db, id, &body.requested()?)
        })
        .await?;
    Ok(Json(order))
}

// ============================================================================
// Contact & newsletter
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterResponse {
    pub message: &'static str,
    pub subscriber: NewsletterSubscriber,
    pub already_subscribed: bool,
}

pub async fn create_contact_message(
    State(state): State<AppState>,
    ApiJson(message): ApiJson<CreateContactMessage>,
) -> Result<(StatusCode, Json<ContactMessage>)> {
    let created = state
        .db
        .call(move |db| contact::create_message(db, message))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_contact_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ContactMessage>>> {
    let messages = state
        .db
        .call(move |db| {
            require_admin(db, &headers)?;
            contact::get_messages(db)
        })
        .await?;
    Ok(Json(messages))
}

pub async fn update_contact_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<UpdateContactStatus>,
) -> Result<Json<ContactMessage>> {
    let message = state
        .db
        .call(move |db| {
            require_admin(db, &headers)?;
            contact::update_message_status(db, id, &body.status)
        })
        .await?;
    Ok(Json(message))
}

pub async fn newsletter_signup(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewsletterSignup>,
) -> Result<Json<NewsletterResponse>> {
    let (subscriber, already_subscribed) = state
        .db
        .call(move |db| newsletter::subscribe(db, &body.email))
        .await?;
    let message = if already_subscribed {
        "You're already subscribed"
    } else {
        "Thanks for subscribing"
    };
    Ok(Json(NewsletterResponse {
        message,
        subscriber,
        already_subscribed,
    }))
}
