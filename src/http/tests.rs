use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{router, AppState, USER_ID_HEADER};
use crate::commands::{products, users};
use crate::config::StorefrontConfig;
use crate::db::Database;
use crate::models::{CreateProduct, CreateUser};
use crate::notifier::{EmailMessage, Notifier, NotifyError};
use crate::watcher::StockWatcher;

#[derive(Default)]
struct Outbox(Mutex<Vec<EmailMessage>>);

impl Outbox {
    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        self.0.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct TestApp {
    app: Router,
    db: Arc<Database>,
    outbox: Arc<Outbox>,
    admin: i64,
    customer: i64,
}

fn test_app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.initialize().unwrap();

    let admin = users::ensure_admin(&db, "Owner", "owner@example.com").unwrap();
    let customer = users::register_user(
        &db,
        CreateUser {
            name: "Ada".to_string(),
            email: Some("ada@example.com".to_string()),
        },
    )
    .unwrap();

    let outbox = Arc::new(Outbox::default());
    let watcher = StockWatcher::new(
        db.clone(),
        outbox.clone(),
        StorefrontConfig {
            public_url: "https://shop.example.com".to_string(),
            brand_name: "Adire House".to_string(),
        },
        100,
    );

    TestApp {
        app: router(AppState {
            db: db.clone(),
            watcher,
        }),
        db,
        outbox,
        admin: admin.id,
        customer: customer.id,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        user: Option<i64>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(id) = user {
            req = req.header(USER_ID_HEADER, id.to_string());
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn seed_product(&self, in_stock: bool, stock_qty: i64) -> i64 {
        products::create_product(
            &self.db,
            CreateProduct {
                title: "Kaftan".to_string(),
                price: Some(50000.0),
                in_stock: Some(in_stock),
                stock_qty: Some(stock_qty),
                ..Default::default()
            },
        )
        .unwrap()
        .id
    }
}

fn pickup_order() -> Value {
    json!({
        "customer": { "fullName": "Amaka Obi", "phone": "08031234567" },
        "delivery": { "method": "pickup" },
        "items": [
            { "productId": 1, "title": "Kaftan", "price": 50000, "qty": 2, "size": "L" }
        ],
        "subtotal": 100000,
        "deliveryFee": 0,
        "total": 100000
    })
}

fn field_names(body: &Value) -> Vec<&str> {
    body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let t = test_app();
    let (status, _) = t.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_guest_checkout_creates_pending_order() {
    let t = test_app();

    let (status, body) = t
        .call(Method::POST, "/api/orders", None, Some(pickup_order()))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending_whatsapp");
    assert_eq!(body["payment"]["method"], "whatsapp");
    assert_eq!(body["payment"]["paid"], false);
    assert!(body["orderCode"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(body["items"][0]["qty"], 2);
    assert!(body["userId"].is_null());
}

#[tokio::test]
async fn test_signed_in_checkout_is_linked_to_user() {
    let t = test_app();

    let (status, body) = t
        .call(Method::POST, "/api/orders", Some(t.customer), Some(pickup_order()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["userId"], t.customer);

    let (status, list) = t
        .call(Method::GET, "/api/orders", Some(t.customer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_checkout_validation_lists_fields() {
    let t = test_app();

    let mut order = pickup_order();
    order["customer"] = json!({ "phone": "" });
    order["delivery"] = json!({ "method": "delivery" });

    let (status, body) = t.call(Method::POST, "/api/orders", None, Some(order)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        field_names(&body),
        vec!["customer.fullName", "customer.phone", "delivery.address"]
    );
}

#[tokio::test]
async fn test_identity_errors() {
    let t = test_app();

    let (status, _) = t.call(Method::GET, "/api/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.call(Method::GET, "/api/orders", Some(9999), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A bad header fails even on routes that allow guests.
    let (status, _) = t
        .call(Method::POST, "/api/orders", Some(9999), Some(pickup_order()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .call(Method::GET, "/api/contact", Some(t.customer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_order_status_updates() {
    let t = test_app();
    let (_, order) = t
        .call(Method::POST, "/api/orders", None, Some(pickup_order()))
        .await;
    let uri = format!("/api/orders/{}/status", order["id"]);

    let (status, _) = t
        .call(Method::PATCH, &uri, Some(t.customer), Some(json!({ "status": "confirmed" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .call(Method::PATCH, &uri, Some(t.admin), Some(json!({ "status": "shipped" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("shipped"));

    let (_, unchanged) = t
        .call(Method::GET, &format!("/api/orders/{}", order["id"]), Some(t.admin), None)
        .await;
    assert_eq!(unchanged["status"], "pending_whatsapp");

    let (status, body) = t
        .call(Method::PATCH, &uri, Some(t.admin), Some(json!({ "status": "confirmed" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");

    let (status, _) = t
        .call(
            Method::PATCH,
            "/api/orders/9999/status",
            Some(t.admin),
            Some(json!({ "status": "confirmed" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_customer_cannot_read_other_orders() {
    let t = test_app();
    let (_, order) = t
        .call(Method::POST, "/api/orders", None, Some(pickup_order()))
        .await;

    let (status, _) = t
        .call(
            Method::GET,
            &format!("/api/orders/{}", order["id"]),
            Some(t.customer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_product_admin_routes() {
    let t = test_app();
    let product = json!({ "title": "Boubou", "price": 30000, "stockQty": 2 });

    let (status, _) = t
        .call(Method::POST, "/api/products", Some(t.customer), Some(product.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = t
        .call(Method::POST, "/api/products", Some(t.admin), Some(product))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["category"], "General");
    assert_eq!(created["available"], true);

    let uri = format!("/api/products/{}", created["id"]);
    let (status, _) = t.call(Method::DELETE, &uri, Some(t.admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stock_alert_subscribe_responses() {
    let t = test_app();
    let sold_out = t.seed_product(true, 0);
    let in_stock = t.seed_product(true, 4);

    let uri = format!("/api/products/{sold_out}/stock-alert");
    let (status, body) = t.call(Method::POST, &uri, Some(t.customer), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["alert"]["status"], "pending");
    assert_eq!(body["alert"]["email"], "ada@example.com");

    let (status, body) = t.call(Method::POST, &uri, Some(t.customer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "You're already on the list");

    let (status, _) = t.call(Method::POST, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .call(
            Method::POST,
            &format!("/api/products/{in_stock}/stock-alert"),
            Some(t.customer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, alerts) = t
        .call(Method::GET, "/api/stock-alerts", Some(t.customer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alerts.as_array().unwrap().len(), 1);

    let (status, body) = t.call(Method::DELETE, &uri, Some(t.customer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], 1);
}

#[tokio::test]
async fn test_stock_alert_requires_email() {
    let t = test_app();
    let product = t.seed_product(false, 0);

    let (status, _) = t
        .call(
            Method::PUT,
            "/api/users/me/email",
            Some(t.customer),
            Some(json!({ "email": null })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .call(
            Method::POST,
            &format!("/api/products/{product}/stock-alert"),
            Some(t.customer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_restock_through_api_emails_subscribers() {
    let t = test_app();
    let product = t.seed_product(true, 0);

    t.call(
        Method::POST,
        &format!("/api/products/{product}/stock-alert"),
        Some(t.customer),
        None,
    )
    .await;

    let (status, body) = t
        .call(
            Method::PATCH,
            &format!("/api/products/{product}"),
            Some(t.admin),
            Some(json!({ "stockQty": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);

    // Fan-out runs in the background after the response.
    for _ in 0..100 {
        if t.outbox.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(t.outbox.len(), 1);
}

#[tokio::test]
async fn test_newsletter_signup_twice() {
    let t = test_app();
    let body = json!({ "email": "Fan@Example.com" });

    let (status, first) = t
        .call(Method::POST, "/api/newsletter", None, Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["alreadySubscribed"], false);

    let (_, second) = t.call(Method::POST, "/api/newsletter", None, Some(body)).await;
    assert_eq!(second["alreadySubscribed"], true);
    assert_eq!(second["subscriber"]["email"], "fan@example.com");
}

#[tokio::test]
async fn test_contact_flow() {
    let t = test_app();

    let (status, message) = t
        .call(
            Method::POST,
            "/api/contact",
            None,
            Some(json!({ "fullName": "Ngozi", "message": "Do you ship to Abuja?" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["status"], "new");

    let (status, updated) = t
        .call(
            Method::PATCH,
            &format!("/api/contact/{}/status", message["id"]),
            Some(t.admin),
            Some(json!({ "status": "closed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "closed");

    let (status, list) = t.call(Method::GET, "/api/contact", Some(t.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_status_update_rejects_non_string_status() {
    let t = test_app();
    let (_, order) = t
        .call(Method::POST, "/api/orders", None, Some(pickup_order()))
        .await;
    let uri = format!("/api/orders/{}/status", order["id"]);

    for body in [json!({}), json!({ "status": 5 }), json!({ "status": null })] {
        let (status, resp) = t.call(Method::PATCH, &uri, Some(t.admin), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(resp["error"].as_str().unwrap().starts_with("invalid status"));
    }

    let (_, unchanged) = t
        .call(Method::GET, &format!("/api/orders/{}", order["id"]), Some(t.admin), None)
        .await;
    assert_eq!(unchanged["status"], "pending_whatsapp");
}

#[tokio::test]
async fn test_checkout_type_errors_are_field_errors() {
    let t = test_app();

    let mut order = pickup_order();
    order["items"][0]["qty"] = json!(1.5);
    let (status, body) = t.call(Method::POST, "/api/orders", None, Some(order)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(field_names(&body), vec!["items[0].qty"]);

    let mut order = pickup_order();
    order["customer"]["fullName"] = json!(42);
    let (status, body) = t.call(Method::POST, "/api/orders", None, Some(order)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(field_names(&body), vec!["customer.fullName"]);
}

#[tokio::test]
async fn test_malformed_body_is_json_error() {
    let t = test_app();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/contact")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = t.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(field_names(&body), vec!["body"]);

    let (status, body) = t
        .call(Method::POST, "/api/products", Some(t.admin), Some(json!({ "title": "Boubou" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(field_names(&body), vec!["price"]);
}
