//! Live carts held in the cache with write-behind durable backup.
//!
//! The cache hash `cart:<user_id>` is the source of truth for a live cart.
//! Every mutation refreshes the hash TTL and hands a job to the
//! [`BackupQueue`]. Removals and clears also delete the durable rows inline on
//! a best-effort basis; the queued delete then covers any upsert still waiting
//! in the same user's queue. [`CartEngine::restore`] rebuilds the hash from the
//! durable rows and always overwrites whatever the cache holds.
//!
//! `add` and `update_quantity` read the line and write it back in two steps,
//! so two concurrent mutations of the same line can lose one of the updates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use tillpoint_core::{ProductId, UserId};

use super::backup::{BackupJob, BackupQueue};
use super::catalog::ProductCatalog;
use crate::cache::{CacheStore, keys};
use crate::error::AppError;
use crate::models::{CartItem, CartLine, DurableCartRow, ProductView, StoredCartLine};
use crate::store::CartBackupStore;

/// Cart operations for one storefront instance.
#[derive(Clone)]
pub struct CartEngine {
    cache: Arc<dyn CacheStore>,
    catalog: ProductCatalog,
    backups: Arc<dyn CartBackupStore>,
    queue: BackupQueue,
}

fn join(line: CartLine, view: &ProductView) -> CartItem {
    CartItem {
        product_id: line.product_id,
        product_name: view.product.name.clone(),
        seller_id: view.product.seller_id,
        seller_name: view.seller_name.clone(),
        price: view.product.price,
        quantity: line.quantity,
        note: line.note,
        created_at: line.created_at,
        updated_at: line.updated_at,
    }
}

impl CartEngine {
    #[must_use]
    pub fn new(
        cache: Arc<dyn CacheStore>,
        catalog: ProductCatalog,
        backups: Arc<dyn CartBackupStore>,
        queue: BackupQueue,
    ) -> Self {
        Self {
            cache,
            catalog,
            backups,
            queue,
        }
    }

    /// Raw cart lines ordered by `created_at`, then product id.
    ///
    /// Fields that do not decode are skipped.
    async fn lines(&self, user_id: UserId) -> Result<Vec<CartLine>, AppError> {
        let fields = self.cache.hash_get_all(&keys::cart(user_id)).await?;

        let mut lines = Vec::with_capacity(fields.len());
        for (field, value) in fields {
            let Ok(product_id) = field.parse::<ProductId>() else {
                warn!(user_id = %user_id, field, "Skipping cart field with invalid product id");
                continue;
            };
            match serde_json::from_str::<StoredCartLine>(&value) {
                Ok(stored) => lines.push(stored.into_line(product_id)),
                Err(e) => warn!(
                    user_id = %user_id,
                    product_id = %product_id,
                    error = %e,
                    "Skipping undecodable cart line"
                ),
            }
        }

        lines.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        Ok(lines)
    }

    async fn stored_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<StoredCartLine>, AppError> {
        let raw = self
            .cache
            .hash_get(&keys::cart(user_id), &product_id.to_string())
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(stored) => Ok(Some(stored)),
            Err(e) => {
                // Treat a corrupt line as absent so the next write replaces it.
                warn!(
                    user_id = %user_id,
                    product_id = %product_id,
                    error = %e,
                    "Ignoring undecodable cart line"
                );
                Ok(None)
            }
        }
    }

    async fn write_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        stored: &StoredCartLine,
    ) -> Result<CartLine, AppError> {
        let json = serde_json::to_string(stored)
            .map_err(|e| AppError::Internal(format!("failed to encode cart line: {e}")))?;
        self.cache
            .hash_set_with_ttl(
                &keys::cart(user_id),
                &product_id.to_string(),
                &json,
                keys::CART_TTL,
            )
            .await?;

        let line = stored.clone().into_line(product_id);
        self.queue
            .enqueue(BackupJob::Upsert(DurableCartRow::from_line(user_id, &line)));
        Ok(line)
    }

    /// The user's cart joined with current product data.
    ///
    /// Lines whose product no longer resolves are dropped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cache` if the cart cannot be read.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get(&self, user_id: UserId) -> Result<Vec<CartItem>, AppError> {
        let lines = self.lines(user_id).await?;
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ProductId> = lines.iter().map(|line| line.product_id).collect();
        let products: HashMap<ProductId, ProductView> = self
            .catalog
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|view| (view.id(), view))
            .collect();

        let items = lines
            .into_iter()
            .filter_map(|line| {
                if let Some(view) = products.get(&line.product_id) {
                    Some(join(line, view))
                } else {
                    warn!(
                        user_id = %user_id,
                        product_id = %line.product_id,
                        "Dropping cart line for unknown product"
                    );
                    None
                }
            })
            .collect();
        Ok(items)
    }

    /// A single cart line joined with its product.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the line is not in the cart and
    /// `AppError::ProductNotFound` if its product no longer exists.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn get_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<CartItem, AppError> {
        let stored = self
            .stored_line(user_id, product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("cart line".to_owned()))?;
        let view = self.catalog.get(product_id).await?;
        Ok(join(stored.into_line(product_id), &view))
    }

    /// Add `delta` units of a product (negative to take some out).
    ///
    /// Removes the line when the resulting quantity is zero or less and
    /// returns `None` in that case. `note: None` keeps the current note.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for a zero delta or when an increase
    /// would exceed stock, and `AppError::ProductNotFound` for an unknown product.
    #[instrument(skip(self, note), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn add(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: i32,
        note: Option<String>,
    ) -> Result<Option<CartLine>, AppError> {
        if delta == 0 {
            return Err(AppError::BadRequest("quantity must not be zero".to_owned()));
        }

        let product = self.catalog.get(product_id).await?;
        let previous = self.stored_line(user_id, product_id).await?;
        let current = previous.as_ref().map_or(0, |p| p.quantity);
        let quantity = current.saturating_add(delta);

        if quantity <= 0 {
            self.remove(user_id, product_id).await?;
            return Ok(None);
        }
        if delta > 0 && quantity > product.product.stock {
            return Err(AppError::BadRequest(format!(
                "only {} in stock",
                product.product.stock
            )));
        }

        let stored = StoredCartLine::next(quantity, note, previous.as_ref(), Utc::now());
        let line = self.write_line(user_id, product_id, &stored).await?;

        debug!(quantity, "Cart line added");
        Ok(Some(line))
    }

    /// Set a line's quantity outright.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` when `quantity` is not positive or exceeds
    /// stock, and `AppError::ProductNotFound` for an unknown product.
    #[instrument(skip(self, note), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
        note: Option<String>,
    ) -> Result<CartLine, AppError> {
        if quantity <= 0 {
            return Err(AppError::BadRequest(
                "quantity must be greater than 0".to_owned(),
            ));
        }

        let product = self.catalog.get(product_id).await?;
        if quantity > product.product.stock {
            return Err(AppError::BadRequest(format!(
                "only {} in stock",
                product.product.stock
            )));
        }

        let previous = self.stored_line(user_id, product_id).await?;
        let stored = StoredCartLine::next(quantity, note, previous.as_ref(), Utc::now());
        let line = self.write_line(user_id, product_id, &stored).await?;

        debug!(quantity, "Cart line updated");
        Ok(line)
    }

    /// Remove a line from the cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cache` if the cache delete fails. Durable cleanup
    /// failures are only logged.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn remove(&self, user_id: UserId, product_id: ProductId) -> Result<(), AppError> {
        self.cache
            .hash_delete(&keys::cart(user_id), &product_id.to_string())
            .await?;

        if let Err(e) = self.backups.delete(user_id, product_id).await {
            warn!(error = %e, "Failed to delete durable cart line");
        }
        self.queue.enqueue(BackupJob::Delete(user_id, product_id));
        Ok(())
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cache` if the cache delete fails. Durable cleanup
    /// failures are only logged.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear(&self, user_id: UserId) -> Result<(), AppError> {
        self.cache.delete(&[keys::cart(user_id)]).await?;

        if let Err(e) = self.backups.delete_all(user_id).await {
            warn!(error = %e, "Failed to delete durable cart");
        }
        self.queue.enqueue(BackupJob::Clear(user_id));
        info!("Cart cleared");
        Ok(())
    }

    /// Rebuild the live cart from its durable backup, replacing it entirely.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the backup cannot be read and
    /// `AppError::Cache` if the cart cannot be written.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn restore(&self, user_id: UserId) -> Result<usize, AppError> {
        let rows = self.backups.list(user_id).await?;

        let mut fields = Vec::with_capacity(rows.len());
        for row in rows {
            let line = row.into_line();
            let json = serde_json::to_string(&line.stored())
                .map_err(|e| AppError::Internal(format!("failed to encode cart line: {e}")))?;
            fields.push((line.product_id.to_string(), json));
        }

        self.cache
            .hash_replace_with_ttl(&keys::cart(user_id), &fields, keys::CART_TTL)
            .await?;

        info!(lines = fields.len(), "Cart restored from backup");
        Ok(fields.len())
    }
}
