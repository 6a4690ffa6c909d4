//! In-process durable store.
//!
//! Holds every table in one mutex-guarded [`State`]. A checkout transaction
//! keeps the lock for its whole lifetime and restores a snapshot unless it is
//! committed, which gives the same all-or-nothing behavior as `PostgreSQL`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use tillpoint_core::{OrderId, ProductId, UserId};

use super::{CartBackupStore, OrderStore, OrderTransaction, ProductStore};
use crate::db::RepositoryError;
use crate::models::{DurableCartRow, Order, OrderItem, Product, ProductDraft, ProductView};

#[derive(Debug, Clone, Default)]
struct State {
    sellers: HashMap<UserId, String>,
    products: HashMap<ProductId, Product>,
    cart_rows: HashMap<(UserId, ProductId), DurableCartRow>,
    orders: Vec<Order>,
    order_items: Vec<OrderItem>,
}

impl State {
    fn view(&self, product: &Product) -> ProductView {
        ProductView {
            product: product.clone(),
            seller_name: self.sellers.get(&product.seller_id).cloned(),
        }
    }

    fn live(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id).filter(|p| p.deleted_at.is_none())
    }

    fn live_mut(&mut self, id: ProductId) -> Option<&mut Product> {
        self.products
            .get_mut(&id)
            .filter(|p| p.deleted_at.is_none())
    }

    fn views_where(&self, keep: impl Fn(&Product) -> bool) -> Vec<ProductView> {
        let mut products: Vec<&Product> = self
            .products
            .values()
            .filter(|p| p.deleted_at.is_none() && keep(p))
            .collect();
        products.sort_by_key(|p| (p.created_at, p.id));
        products.into_iter().map(|p| self.view(p)).collect()
    }
}

/// Durable store kept in process memory.
///
/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed order, in creation order.
    pub async fn orders(&self) -> Vec<Order> {
        self.state.lock().await.orders.clone()
    }

    /// Every committed order item, in creation order.
    pub async fn order_items(&self) -> Vec<OrderItem> {
        self.state.lock().await.order_items.clone()
    }

    /// Current stock of a product, including soft-deleted ones.
    pub async fn stock(&self, id: ProductId) -> Option<i32> {
        self.state.lock().await.products.get(&id).map(|p| p.stock)
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn find(&self, id: ProductId) -> Result<Option<ProductView>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.live(id).map(|p| state.view(p)))
    }

    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<ProductView>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.views_where(|p| ids.contains(&p.id)))
    }

    async fn list_all(&self) -> Result<Vec<ProductView>, RepositoryError> {
        Ok(self.state.lock().await.views_where(|_| true))
    }

    async fn list_by_seller(
        &self,
        seller_id: UserId,
    ) -> Result<Vec<ProductView>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .views_where(|p| p.seller_id == seller_id))
    }

    async fn search_by_name(&self, query: &str) -> Result<Vec<ProductView>, RepositoryError> {
        let needle = query.to_lowercase();
        Ok(self
            .state
            .lock()
            .await
            .views_where(|p| p.name.to_lowercase().contains(&needle)))
    }

    async fn insert(
        &self,
        seller_id: UserId,
        seller_name: &str,
        draft: &ProductDraft,
    ) -> Result<ProductView, RepositoryError> {
        let now = Utc::now();
        let product = Product {
            id: ProductId::generate(),
            seller_id,
            name: draft.name.clone(),
            price: draft.price,
            stock: draft.stock,
            discount: draft.discount,
            product_type: draft.product_type.clone(),
            description: draft.description.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let mut state = self.state.lock().await;
        state.sellers.insert(seller_id, seller_name.to_owned());
        state.products.insert(product.id, product.clone());
        Ok(state.view(&product))
    }

    async fn update(
        &self,
        id: ProductId,
        draft: &ProductDraft,
    ) -> Result<ProductView, RepositoryError> {
        let mut state = self.state.lock().await;
        let product = state.live_mut(id).ok_or(RepositoryError::NotFound)?;
        product.name.clone_from(&draft.name);
        product.price = draft.price;
        product.stock = draft.stock;
        product.discount = draft.discount;
        product.product_type.clone_from(&draft.product_type);
        product.description.clone_from(&draft.description);
        product.updated_at = Utc::now();

        let product = product.clone();
        Ok(state.view(&product))
    }

    async fn soft_delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let product = state.live_mut(id).ok_or(RepositoryError::NotFound)?;
        let now = Utc::now();
        product.deleted_at = Some(now);
        product.updated_at = now;
        Ok(())
    }

    async fn adjust_stock(&self, id: ProductId, delta: i32) -> Result<i32, RepositoryError> {
        let mut state = self.state.lock().await;
        let product = state.live_mut(id).ok_or(RepositoryError::NotFound)?;
        let next = product
            .stock
            .checked_add(delta)
            .filter(|stock| *stock >= 0)
            .ok_or(RepositoryError::InsufficientStock(id))?;
        product.stock = next;
        product.updated_at = Utc::now();
        Ok(next)
    }
}

#[async_trait]
impl CartBackupStore for MemoryStore {
    async fn upsert(&self, row: &DurableCartRow) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .await
            .cart_rows
            .insert((row.user_id, row.product_id), row.clone());
        Ok(())
    }

    async fn delete(&self, user_id: UserId, product_id: ProductId) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .await
            .cart_rows
            .remove(&(user_id, product_id));
        Ok(())
    }

    async fn delete_all(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .await
            .cart_rows
            .retain(|(owner, _), _| *owner != user_id);
        Ok(())
    }

    async fn list(&self, user_id: UserId) -> Result<Vec<DurableCartRow>, RepositoryError> {
        let state = self.state.lock().await;
        let mut rows: Vec<DurableCartRow> = state
            .cart_rows
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.created_at, row.product_id));
        Ok(rows)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            snapshot: Some(snapshot),
        }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    /// State to restore on drop; cleared by commit.
    snapshot: Option<State>,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl OrderTransaction for MemoryTransaction {
    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        self.guard.orders.push(order.clone());
        Ok(())
    }

    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), RepositoryError> {
        self.guard.order_items.push(item.clone());
        Ok(())
    }

    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let product = self
            .guard
            .live_mut(product_id)
            .ok_or(RepositoryError::NotFound)?;
        if product.stock < quantity {
            return Err(RepositoryError::InsufficientStock(product_id));
        }
        product.stock -= quantity;
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn set_total(&mut self, order_id: OrderId, total: i64) -> Result<(), RepositoryError> {
        let order = self
            .guard
            .orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or(RepositoryError::NotFound)?;
        order.total_amount = total;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let mut tx = self;
        tx.snapshot = None;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        drop(self);
        Ok(())
    }
}
