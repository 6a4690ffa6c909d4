//! Cart checkout.
//!
//! Turns the caller's live cart into an order inside one durable transaction:
//! the order header, one item per cart line, and a guarded stock decrement per
//! line. Any failure rolls the whole transaction back and leaves the cart
//! untouched. After commit the purchased lines are removed from the cart on a
//! best-effort basis.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use tillpoint_core::{OrderItemId, UserId};

use super::cart::CartEngine;
use super::catalog::ProductCatalog;
use crate::db::RepositoryError;
use crate::error::AppError;
use crate::models::{CartItem, CheckoutReceipt, Order, OrderItem};
use crate::store::{OrderStore, OrderTransaction};

/// Places orders from live carts.
#[derive(Clone)]
pub struct CheckoutService {
    cart: CartEngine,
    catalog: ProductCatalog,
    orders: Arc<dyn OrderStore>,
}

impl CheckoutService {
    #[must_use]
    pub fn new(cart: CartEngine, catalog: ProductCatalog, orders: Arc<dyn OrderStore>) -> Self {
        Self {
            cart,
            catalog,
            orders,
        }
    }

    /// Check out the user's whole cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CartEmpty` for an empty cart,
    /// `AppError::ProductNotFound` if a product vanished, and
    /// `AppError::InsufficientStock` if any line cannot be covered. No order
    /// is created and no stock changes in those cases.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn checkout(&self, user_id: UserId) -> Result<CheckoutReceipt, AppError> {
        let items = self.cart.get(user_id).await?;
        if items.is_empty() {
            return Err(AppError::CartEmpty);
        }

        let mut tx = self.orders.begin().await?;
        let (order, order_items) = match place(tx.as_mut(), user_id, &items).await {
            Ok(placed) => placed,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Checkout rollback failed");
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        info!(
            order_id = %order.id,
            lines = order_items.len(),
            total = order.total_amount,
            "Order placed"
        );

        for item in &items {
            self.catalog.invalidate(item.product_id).await;
        }
        for item in &items {
            if let Err(e) = self.cart.remove(user_id, item.product_id).await {
                warn!(
                    product_id = %item.product_id,
                    error = %e,
                    "Failed to remove purchased line from cart"
                );
            }
        }

        Ok(CheckoutReceipt {
            order,
            items: order_items,
        })
    }
}

/// Write the order, its items and the stock decrements through `tx`.
async fn place(
    tx: &mut dyn OrderTransaction,
    user_id: UserId,
    items: &[CartItem],
) -> Result<(Order, Vec<OrderItem>), AppError> {
    let mut order = Order::pending(user_id, Utc::now());
    tx.insert_order(&order).await?;

    let mut order_items = Vec::with_capacity(items.len());
    for item in items {
        let order_item = OrderItem {
            id: OrderItemId::generate(),
            order_id: order.id,
            product_id: item.product_id,
            quantity: item.quantity,
            price_at_checkout: item.price,
        };
        tx.insert_item(&order_item).await?;

        tx.decrement_stock(item.product_id, item.quantity)
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound => AppError::ProductNotFound(item.product_id),
                other => other.into(),
            })?;

        order_items.push(order_item);
    }

    let total = items.iter().map(CartItem::line_total).sum();
    tx.set_total(order.id, total).await?;
    order.total_amount = total;

    Ok((order, order_items))
}
