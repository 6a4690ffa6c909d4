//! Read-through product cache over the durable product store.
//!
//! Reads try the cache first and fall back to the database on a miss, an
//! undecodable entry, or any cache error; cache problems never fail a read.
//! Writes go to the database first and then invalidate `product:<id>` and
//! `all_products`. Per-seller and per-name lists are only bounded by their TTL.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use tillpoint_core::{ProductId, UserId};

use crate::cache::{CacheStore, keys};
use crate::db::RepositoryError;
use crate::error::AppError;
use crate::models::{CurrentUser, ProductDraft, ProductView};
use crate::store::ProductStore;

/// Product reads and writes with cache management.
#[derive(Clone)]
pub struct ProductCatalog {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn ProductStore>,
}

/// Map "row missing" to the product-specific error.
fn product_error(id: ProductId) -> impl Fn(RepositoryError) -> AppError {
    move |err| match err {
        RepositoryError::NotFound => AppError::ProductNotFound(id),
        other => other.into(),
    }
}

impl ProductCatalog {
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStore>, store: Arc<dyn ProductStore>) -> Self {
        Self { cache, store }
    }

    /// Decode a cached value, or `None` on miss or any cache problem.
    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    debug!(key, "Product cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "Discarding undecodable product cache entry");
                    None
                }
            },
            Ok(None) => {
                debug!(key, "Product cache miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Product cache read failed, using database");
                None
            }
        }
    }

    /// Write a value back to the cache. Failures are logged only.
    async fn remember<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode product cache entry");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, &json, ttl).await {
            warn!(key, error = %e, "Failed to populate product cache");
        }
    }

    async fn read_through<T, F, Fut>(&self, key: &str, ttl: Duration, load: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, AppError>> + Send,
    {
        if let Some(value) = self.cached(key).await {
            return Ok(value);
        }
        let value = load().await?;
        self.remember(key, &value, ttl).await;
        Ok(value)
    }

    /// Get one live product.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProductNotFound` if the product is missing or deleted.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get(&self, id: ProductId) -> Result<ProductView, AppError> {
        self.read_through(&keys::product(id), keys::PRODUCT_TTL, || async move {
            self.store
                .find(id)
                .await?
                .ok_or(AppError::ProductNotFound(id))
        })
        .await
    }

    /// Resolve many products, serving each from cache where possible.
    ///
    /// Unknown or deleted ids are skipped. Results follow the order of `ids`
    /// with duplicates removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the database lookup for cache misses fails.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<ProductView>, AppError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<ProductId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let mut found = HashMap::with_capacity(unique.len());
        let mut misses = Vec::new();
        for id in &unique {
            match self.cached::<ProductView>(&keys::product(*id)).await {
                Some(view) => {
                    found.insert(*id, view);
                }
                None => misses.push(*id),
            }
        }

        if !misses.is_empty() {
            let loaded = self.store.find_many(&misses).await?;
            for view in &loaded {
                self.remember(&keys::product(view.id()), view, keys::PRODUCT_TTL)
                    .await;
            }
            found.extend(loaded.into_iter().map(|view| (view.id(), view)));
        }

        Ok(unique
            .into_iter()
            .filter_map(|id| found.remove(&id))
            .collect())
    }

    /// List every live product.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the cache misses and the query fails.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<ProductView>, AppError> {
        self.read_through(keys::ALL_PRODUCTS, keys::ALL_PRODUCTS_TTL, || async move {
            Ok(self.store.list_all().await?)
        })
        .await
    }

    /// List a seller's live products.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the cache misses and the query fails.
    #[instrument(skip(self), fields(seller_id = %seller_id))]
    pub async fn list_by_seller(&self, seller_id: UserId) -> Result<Vec<ProductView>, AppError> {
        self.read_through(
            &keys::products_by_seller(seller_id),
            keys::PRODUCT_TTL,
            || async move { Ok(self.store.list_by_seller(seller_id).await?) },
        )
        .await
    }

    /// Case-insensitive substring search on product names.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for a blank query and `AppError::Database`
    /// if the cache misses and the query fails.
    #[instrument(skip(self))]
    pub async fn search_by_name(&self, query: &str) -> Result<Vec<ProductView>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::BadRequest("search query must not be empty".to_owned()));
        }

        self.read_through(
            &keys::products_by_name(query),
            keys::PRODUCT_TTL,
            || async move { Ok(self.store.search_by_name(query).await?) },
        )
        .await
    }

    /// Drop the cached single-product entry and the full list.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn invalidate(&self, id: ProductId) {
        let stale = [keys::product(id), keys::ALL_PRODUCTS.to_owned()];
        if let Err(e) = self.cache.delete(&stale).await {
            warn!(product_id = %id, error = %e, "Failed to invalidate product cache");
        }
    }

    /// Create a product owned by `seller`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` if the draft is invalid.
    #[instrument(skip(self, seller, draft), fields(seller_id = %seller.user_id))]
    pub async fn create(
        &self,
        seller: &CurrentUser,
        draft: &ProductDraft,
    ) -> Result<ProductView, AppError> {
        validate(draft)?;
        let view = self
            .store
            .insert(seller.user_id, &seller.username, draft)
            .await?;
        self.invalidate(view.id()).await;

        info!(product_id = %view.id(), "Product created");
        Ok(view)
    }

    /// Replace a product's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProductNotFound`, `AppError::Forbidden` when `user`
    /// does not own the product, or `AppError::BadRequest` for an invalid draft.
    #[instrument(skip(self, user, draft), fields(product_id = %id, user_id = %user.user_id))]
    pub async fn update(
        &self,
        user: &CurrentUser,
        id: ProductId,
        draft: &ProductDraft,
    ) -> Result<ProductView, AppError> {
        validate(draft)?;
        self.ensure_owner(user, id).await?;

        let view = self
            .store
            .update(id, draft)
            .await
            .map_err(product_error(id))?;
        self.invalidate(id).await;

        info!("Product updated");
        Ok(view)
    }

    /// Soft-delete a product.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProductNotFound` or `AppError::Forbidden` when `user`
    /// does not own the product.
    #[instrument(skip(self, user), fields(product_id = %id, user_id = %user.user_id))]
    pub async fn delete(&self, user: &CurrentUser, id: ProductId) -> Result<(), AppError> {
        self.ensure_owner(user, id).await?;

        self.store
            .soft_delete(id)
            .await
            .map_err(product_error(id))?;
        self.invalidate(id).await;

        info!("Product deleted");
        Ok(())
    }

    /// Atomically take `quantity` units out of stock. Returns the new stock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for a non-positive quantity,
    /// `AppError::ProductNotFound`, or `AppError::InsufficientStock`.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn decrement_stock(&self, id: ProductId, quantity: i32) -> Result<i32, AppError> {
        let quantity = positive(quantity)?;
        let stock = self
            .store
            .adjust_stock(id, -quantity)
            .await
            .map_err(product_error(id))?;
        self.invalidate(id).await;
        Ok(stock)
    }

    /// Atomically put `quantity` units back into stock. Returns the new stock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for a non-positive quantity or
    /// `AppError::ProductNotFound`.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn increment_stock(&self, id: ProductId, quantity: i32) -> Result<i32, AppError> {
        let quantity = positive(quantity)?;
        let stock = self
            .store
            .adjust_stock(id, quantity)
            .await
            .map_err(product_error(id))?;
        self.invalidate(id).await;
        Ok(stock)
    }

    /// Remove every product-derived cache entry. Returns the number of keys removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cache` if the cache cannot be scanned.
    #[instrument(skip(self))]
    pub async fn clear_all_caches(&self) -> Result<u64, AppError> {
        let mut removed = 0;
        for pattern in keys::PRODUCT_PATTERNS {
            removed += self.cache.delete_matching(pattern).await?;
        }
        info!(removed, "Product caches cleared");
        Ok(removed)
    }

    async fn ensure_owner(&self, user: &CurrentUser, id: ProductId) -> Result<(), AppError> {
        let current = self
            .store
            .find(id)
            .await?
            .ok_or(AppError::ProductNotFound(id))?;

        if user.is_admin() || current.product.seller_id == user.user_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "product belongs to another seller".to_owned(),
            ))
        }
    }
}

fn validate(draft: &ProductDraft) -> Result<(), AppError> {
    draft
        .validate()
        .map_err(|problems| AppError::BadRequest(problems.join("; ")))
}

fn positive(quantity: i32) -> Result<i32, AppError> {
    if quantity > 0 {
        Ok(quantity)
    } else {
        Err(AppError::BadRequest("quantity must be greater than 0".to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tillpoint_core::Role;

    use super::*;
    use crate::cache::{MemoryCacheStore, UnavailableCacheStore};
    use crate::store::MemoryStore;

    struct Fixture {
        catalog: ProductCatalog,
        cache: MemoryCacheStore,
        store: MemoryStore,
        seller: CurrentUser,
    }

    fn fixture() -> Fixture {
        let cache = MemoryCacheStore::new();
        let store = MemoryStore::new();
        Fixture {
            catalog: ProductCatalog::new(Arc::new(cache.clone()), Arc::new(store.clone())),
            cache,
            store,
            seller: user(Role::Seller),
        }
    }

    fn user(role: Role) -> CurrentUser {
        CurrentUser {
            user_id: UserId::generate(),
            username: format!("{role}-user"),
            role,
        }
    }

    fn draft(name: &str, price: i32, stock: i32) -> ProductDraft {
        ProductDraft {
            name: name.to_owned(),
            price,
            stock,
            discount: 0,
            product_type: "snack".to_owned(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_get_reads_through_and_caches() {
        let fx = fixture();
        let created = fx
            .catalog
            .create(&fx.seller, &draft("Dried Mango", 1200, 5))
            .await
            .unwrap();

        let first = fx.catalog.get(created.id()).await.unwrap();
        assert!(fx.cache.get(&keys::product(created.id())).await.unwrap().is_some());

        // A change that bypasses the catalog is invisible until invalidation.
        fx.store
            .update(created.id(), &draft("Renamed", 1200, 5))
            .await
            .unwrap();
        let second = fx.catalog.get(created.id()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_update_invalidates_cached_product() {
        let fx = fixture();
        let created = fx
            .catalog
            .create(&fx.seller, &draft("Dried Mango", 1200, 5))
            .await
            .unwrap();
        fx.catalog.get(created.id()).await.unwrap();
        fx.catalog.list_all().await.unwrap();

        fx.catalog
            .update(&fx.seller, created.id(), &draft("Dried Mango XL", 1500, 5))
            .await
            .unwrap();

        let fresh = fx.catalog.get(created.id()).await.unwrap();
        assert_eq!(fresh.product.name, "Dried Mango XL");
        assert_eq!(fresh.product.price, 1500);
        let all = fx.catalog.list_all().await.unwrap();
        assert_eq!(all[0].product.name, "Dried Mango XL");
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let fx = fixture();
        let err = fx.catalog.get(ProductId::generate()).await.unwrap_err();
        assert!(matches!(err, AppError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_other_seller_cannot_modify() {
        let fx = fixture();
        let created = fx
            .catalog
            .create(&fx.seller, &draft("Dried Mango", 1200, 5))
            .await
            .unwrap();

        let intruder = user(Role::Seller);
        let err = fx
            .catalog
            .update(&intruder, created.id(), &draft("Stolen", 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = fx.catalog.delete(&intruder, created.id()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let admin = user(Role::Admin);
        fx.catalog.delete(&admin, created.id()).await.unwrap();
        assert!(matches!(
            fx.catalog.get(created.id()).await,
            Err(AppError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_draft_is_rejected() {
        let fx = fixture();
        let err = fx
            .catalog
            .create(&fx.seller, &draft("ab", 0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_stock_changes_are_guarded() {
        let fx = fixture();
        let created = fx
            .catalog
            .create(&fx.seller, &draft("Rice", 300, 3))
            .await
            .unwrap();

        assert_eq!(fx.catalog.decrement_stock(created.id(), 2).await.unwrap(), 1);
        assert!(matches!(
            fx.catalog.decrement_stock(created.id(), 2).await,
            Err(AppError::InsufficientStock(_))
        ));
        assert!(matches!(
            fx.catalog.decrement_stock(created.id(), 0).await,
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(fx.catalog.increment_stock(created.id(), 4).await.unwrap(), 5);
        assert_eq!(fx.catalog.get(created.id()).await.unwrap().product.stock, 5);
    }

    #[tokio::test]
    async fn test_get_many_keeps_request_order() {
        let fx = fixture();
        let a = fx.catalog.create(&fx.seller, &draft("Apple", 100, 1)).await.unwrap();
        let b = fx.catalog.create(&fx.seller, &draft("Banana", 100, 1)).await.unwrap();
        fx.catalog.get(b.id()).await.unwrap();

        let views = fx
            .catalog
            .get_many(&[b.id(), ProductId::generate(), a.id(), b.id()])
            .await
            .unwrap();
        let ids: Vec<ProductId> = views.iter().map(ProductView::id).collect();
        assert_eq!(ids, vec![b.id(), a.id()]);
    }

    #[tokio::test]
    async fn test_empty_lists_are_returned_and_cached() {
        let fx = fixture();
        let seller = UserId::generate();
        assert!(fx.catalog.list_by_seller(seller).await.unwrap().is_empty());
        assert_eq!(
            fx.cache
                .get(&keys::products_by_seller(seller))
                .await
                .unwrap()
                .as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn test_clear_all_caches() {
        let fx = fixture();
        let created = fx
            .catalog
            .create(&fx.seller, &draft("Green Tea", 100, 1))
            .await
            .unwrap();
        fx.catalog.get(created.id()).await.unwrap();
        fx.catalog.list_all().await.unwrap();
        fx.catalog.search_by_name("tea").await.unwrap();

        let removed = fx.catalog.clear_all_caches().await.unwrap();
        assert_eq!(removed, 3);
        assert!(fx.cache.get(keys::ALL_PRODUCTS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reads_fall_back_to_database_when_cache_is_down() {
        let store = MemoryStore::new();
        let catalog = ProductCatalog::new(Arc::new(UnavailableCacheStore), Arc::new(store.clone()));
        let seller = user(Role::Seller);

        let created = catalog
            .create(&seller, &draft("Dried Mango", 1200, 5))
            .await
            .unwrap();

        assert_eq!(catalog.get(created.id()).await.unwrap(), created);
        assert_eq!(catalog.list_all().await.unwrap(), vec![created.clone()]);
        assert_eq!(
            catalog.list_by_seller(seller.user_id).await.unwrap(),
            vec![created.clone()]
        );
        assert_eq!(catalog.search_by_name("mango").await.unwrap().len(), 1);
        let ids: Vec<ProductId> = catalog
            .get_many(&[created.id()])
            .await
            .unwrap()
            .iter()
            .map(ProductView::id)
            .collect();
        assert_eq!(ids, vec![created.id()]);
        assert_eq!(catalog.decrement_stock(created.id(), 2).await.unwrap(), 3);
        assert!(matches!(
            catalog.clear_all_caches().await,
            Err(AppError::Cache(_))
        ));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_refetched() {
        let fx = fixture();
        let created = fx
            .catalog
            .create(&fx.seller, &draft("Green Tea", 450, 2))
            .await
            .unwrap();
        let key = keys::product(created.id());
        fx.cache
            .set(&key, "{not json", keys::PRODUCT_TTL)
            .await
            .unwrap();

        assert_eq!(fx.catalog.get(created.id()).await.unwrap(), created);

        let cached = fx.cache.get(&key).await.unwrap().unwrap();
        let decoded: ProductView = serde_json::from_str(&cached).unwrap();
        assert_eq!(decoded, created);
    }

    #[tokio::test]
    async fn test_wrong_type_entry_falls_back_to_database() {
        let fx = fixture();
        let created = fx
            .catalog
            .create(&fx.seller, &draft("Green Tea", 450, 2))
            .await
            .unwrap();
        fx.cache
            .hash_set_with_ttl(&keys::product(created.id()), "field", "value", keys::PRODUCT_TTL)
            .await
            .unwrap();

        assert_eq!(fx.catalog.get(created.id()).await.unwrap(), created);
    }
}
