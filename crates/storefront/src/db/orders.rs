//! Checkout transactions over `catalog.orders` and `catalog.order_items`.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use tillpoint_core::{OrderId, ProductId};

use super::RepositoryError;
use super::products::stock_miss;
use crate::models::{Order, OrderItem};
use crate::store::{OrderStore, OrderTransaction};

/// `PostgreSQL` implementation of [`OrderStore`].
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgOrderTransaction { tx }))
    }
}

/// Open database transaction. sqlx rolls it back when dropped uncommitted.
struct PgOrderTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderTransaction for PgOrderTransaction {
    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO catalog.orders (id, user_id, status, order_date, total_amount)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.status)
        .bind(order.order_date)
        .bind(order.total_amount)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO catalog.order_items
                (id, order_id, product_id, quantity, price_at_checkout)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.price_at_checkout)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE catalog.products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL AND stock >= $2
            ",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(stock_miss(&mut *self.tx, product_id).await);
        }
        Ok(())
    }

    async fn set_total(&mut self, order_id: OrderId, total: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE catalog.orders SET total_amount = $2 WHERE id = $1")
            .bind(order_id)
            .bind(total)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
