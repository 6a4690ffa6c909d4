//! Durable cart backup in `catalog.cart_items`.

use async_trait::async_trait;
use sqlx::PgPool;

use tillpoint_core::{ProductId, UserId};

use super::RepositoryError;
use crate::models::DurableCartRow;
use crate::store::CartBackupStore;

/// `PostgreSQL` implementation of [`CartBackupStore`].
#[derive(Debug, Clone)]
pub struct PgCartBackupStore {
    pool: PgPool,
}

impl PgCartBackupStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartBackupStore for PgCartBackupStore {
    async fn upsert(&self, row: &DurableCartRow) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO catalog.cart_items
                (user_id, product_id, quantity, note, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, product_id) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                note = EXCLUDED.note,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(row.user_id)
        .bind(row.product_id)
        .bind(row.quantity)
        .bind(&row.note)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, user_id: UserId, product_id: ProductId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM catalog.cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM catalog.cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, user_id: UserId) -> Result<Vec<DurableCartRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, DurableCartRow>(
            r"
            SELECT user_id, product_id, quantity, note, created_at, updated_at
            FROM catalog.cart_items
            WHERE user_id = $1
            ORDER BY created_at, product_id
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
