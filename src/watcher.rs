//! Back-in-stock fan-out.
//!
//! After a product update, [`StockWatcher::observe`] checks whether the
//! product went from unavailable to available and, if so, emails every
//! pending subscriber in a background task. Delivery is at-least-once: a row
//! only leaves `pending` after its email was accepted, so anything not
//! reached is picked up by the next restock.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::commands::stock_alerts;
use crate::config::StorefrontConfig;
use crate::db::Database;
use crate::models::{FanOutReport, Product, StockAlert, UpdatedProduct};
use crate::notifier::{EmailMessage, Notifier};

/// Only unavailable → available counts as a restock.
pub fn restocked(was_available: bool, is_available: bool) -> bool {
    !was_available && is_available
}

#[derive(Clone)]
pub struct StockWatcher {
    db: Arc<Database>,
    notifier: Arc<dyn Notifier>,
    storefront: StorefrontConfig,
    batch_size: usize,
}

impl StockWatcher {
    pub fn new(
        db: Arc<Database>,
        notifier: Arc<dyn Notifier>,
        storefront: StorefrontConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            db,
            notifier,
            storefront,
            batch_size,
        }
    }

    /// Starts fan-out for a restocked product. Returns `None` when the update
    /// was not a restock. The caller is free to drop the handle.
    pub fn observe(&self, update: &UpdatedProduct) -> Option<JoinHandle<FanOutReport>> {
        if !restocked(update.was_available, update.product.is_available()) {
            return None;
        }

        let watcher = self.clone();
        let product = update.product.clone();
        Some(tokio::spawn(async move {
            watcher.notify_restock(&product).await
        }))
    }

    /// Emails up to `batch_size` pending subscribers of `product`, marking
    /// each row sent once its email is accepted. Each row is checked again
    /// right before its send, so one cancelled mid-run is skipped. A failed
    /// send leaves that row pending and moves on to the next one.
    pub async fn notify_restock(&self, product: &Product) -> FanOutReport {
        let mut report = FanOutReport::default();

        let (product_id, limit) = (product.id, self.batch_size);
        let pending = self
            .db
            .call(move |db| stock_alerts::get_pending_alerts(db, product_id, limit))
            .await;
        let alerts = match pending {
            Ok(alerts) => alerts,
            Err(e) => {
                error!(product_id, error = %e, "failed to load pending stock alerts");
                return report;
            }
        };

        if alerts.is_empty() {
            return report;
        }
        info!(
            product_id,
            pending = alerts.len(),
            "product back in stock, notifying subscribers"
        );

        for alert in &alerts {
            let alert_id = alert.id;

            match self
                .db
                .call(move |db| stock_alerts::is_pending(db, alert_id))
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!(alert_id, "stock alert no longer pending, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(alert_id, error = %e, "failed to re-check stock alert");
                    report.failed += 1;
                    continue;
                }
            }

            report.attempted += 1;
            let message = self.restock_email(product, alert);
            if let Err(e) = self.notifier.send(&message).await {
                warn!(
                    alert_id,
                    product_id,
                    error = %e,
                    "stock alert email failed, leaving pending"
                );
                report.failed += 1;
                continue;
            }

            match self
                .db
                .call(move |db| stock_alerts::mark_alert_sent(db, alert_id))
                .await
            {
                Ok(true) => report.sent += 1,
                // Cancelled while its email was in flight.
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    // Email went out but the row stays pending: a later
                    // restock will send it again.
                    error!(alert_id, error = %e, "failed to mark stock alert sent");
                    report.failed += 1;
                }
            }
        }

        info!(
            product_id,
            attempted = report.attempted,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "stock alert fan-out finished"
        );
        report
    }

    fn restock_email(&self, product: &Product, alert: &StockAlert) -> EmailMessage {
        let link = format!(
            "{}/products/{}",
            self.storefront.public_url.trim_end_matches('/'),
            product.id
        );
        EmailMessage {
            to: alert.email.clone(),
            subject: format!("{} is back in stock", product.title),
            text: format!(
                "Good news! \"{}\" is available again at {}.\n\nShop it here: {}\n",
                product.title, self.storefront.brand_name, link
            ),
        }
    }
}
