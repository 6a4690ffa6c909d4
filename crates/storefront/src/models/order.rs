//! Order types produced by checkout.

use chrono::{DateTime, Utc};
use serde::Serialize;

use tillpoint_core::{OrderId, OrderItemId, OrderStatus, ProductId, UserId};

/// An order header. Only checkout creates orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    /// Sum of `price_at_checkout * quantity` over the order's items.
    pub total_amount: i64,
}

impl Order {
    /// A new pending order with a zero total, finalized later in the same transaction.
    #[must_use]
    pub fn pending(user_id: UserId, order_date: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::generate(),
            user_id,
            status: OrderStatus::Pending,
            order_date,
            total_amount: 0,
        }
    }
}

/// A purchased product line within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub price_at_checkout: i32,
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub items: Vec<OrderItem>,
}
