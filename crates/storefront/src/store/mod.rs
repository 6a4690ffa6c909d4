//! Durable store capabilities.
//!
//! Services depend on these traits rather than on a concrete database so the
//! same code runs against `PostgreSQL` ([`crate::db`]) and the in-process
//! [`MemoryStore`].

mod memory;

use async_trait::async_trait;

use tillpoint_core::{OrderId, ProductId, UserId};

use crate::db::RepositoryError;
use crate::models::{DurableCartRow, Order, OrderItem, ProductDraft, ProductView};

pub use memory::MemoryStore;

/// Product reads and writes. Every read excludes soft-deleted rows.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find(&self, id: ProductId) -> Result<Option<ProductView>, RepositoryError>;

    /// Resolve many products at once. Unknown ids are skipped.
    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<ProductView>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<ProductView>, RepositoryError>;

    async fn list_by_seller(&self, seller_id: UserId)
    -> Result<Vec<ProductView>, RepositoryError>;

    /// Case-insensitive substring match on the product name.
    async fn search_by_name(&self, query: &str) -> Result<Vec<ProductView>, RepositoryError>;

    /// Insert a product, recording `seller_name` as the seller's display name.
    async fn insert(
        &self,
        seller_id: UserId,
        seller_name: &str,
        draft: &ProductDraft,
    ) -> Result<ProductView, RepositoryError>;

    /// Overwrite the seller-editable fields of a live product.
    ///
    /// Returns `RepositoryError::NotFound` if the product is missing or deleted.
    async fn update(
        &self,
        id: ProductId,
        draft: &ProductDraft,
    ) -> Result<ProductView, RepositoryError>;

    /// Mark a product deleted.
    ///
    /// Returns `RepositoryError::NotFound` if the product is missing or already deleted.
    async fn soft_delete(&self, id: ProductId) -> Result<(), RepositoryError>;

    /// Atomically add `delta` to a product's stock and return the new stock.
    ///
    /// Returns `RepositoryError::InsufficientStock` if the result would be
    /// negative, leaving the stock unchanged.
    async fn adjust_stock(&self, id: ProductId, delta: i32) -> Result<i32, RepositoryError>;
}

/// Durable backup of live cart lines.
#[async_trait]
pub trait CartBackupStore: Send + Sync {
    /// Insert or overwrite the row for `(row.user_id, row.product_id)`.
    async fn upsert(&self, row: &DurableCartRow) -> Result<(), RepositoryError>;

    async fn delete(&self, user_id: UserId, product_id: ProductId) -> Result<(), RepositoryError>;

    async fn delete_all(&self, user_id: UserId) -> Result<(), RepositoryError>;

    async fn list(&self, user_id: UserId) -> Result<Vec<DurableCartRow>, RepositoryError>;
}

/// Entry point for checkout transactions.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, RepositoryError>;
}

/// An open checkout transaction.
///
/// Dropping the transaction without calling [`OrderTransaction::commit`]
/// discards every write made through it.
#[async_trait]
pub trait OrderTransaction: Send {
    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError>;

    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), RepositoryError>;

    /// Decrement a live product's stock by `quantity` within the transaction.
    ///
    /// Returns `RepositoryError::NotFound` for a missing or deleted product and
    /// `RepositoryError::InsufficientStock` when stock is below `quantity`.
    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError>;

    async fn set_total(&mut self, order_id: OrderId, total: i64) -> Result<(), RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}
