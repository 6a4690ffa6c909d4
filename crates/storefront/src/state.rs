//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::cache::CacheStore;
use crate::services::{
    BackupQueue, CartEngine, CheckoutService, IdentityVerifier, ProductCatalog,
};
use crate::store::{CartBackupStore, OrderStore, ProductStore};

/// Concrete backends the services are built on.
///
/// `main` fills this with Redis and `PostgreSQL`; tests use the in-process
/// backends and leave `pool` empty.
pub struct Backends {
    pub cache: Arc<dyn CacheStore>,
    pub products: Arc<dyn ProductStore>,
    pub carts: Arc<dyn CartBackupStore>,
    pub orders: Arc<dyn OrderStore>,
    pub identity: Arc<dyn IdentityVerifier>,
    /// Pool probed by the readiness check, when running on `PostgreSQL`.
    pub pool: Option<PgPool>,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: Option<PgPool>,
    cache: Arc<dyn CacheStore>,
    identity: Arc<dyn IdentityVerifier>,
    catalog: ProductCatalog,
    cart: CartEngine,
    checkout: CheckoutService,
}

impl AppState {
    /// Wire the services together.
    ///
    /// `queue` must feed the same durable store as `backends.carts`.
    #[must_use]
    pub fn new(backends: Backends, queue: BackupQueue) -> Self {
        let Backends {
            cache,
            products,
            carts,
            orders,
            identity,
            pool,
        } = backends;

        let catalog = ProductCatalog::new(Arc::clone(&cache), products);
        let cart = CartEngine::new(Arc::clone(&cache), catalog.clone(), carts, queue);
        let checkout = CheckoutService::new(cart.clone(), catalog.clone(), orders);

        Self {
            inner: Arc::new(AppStateInner {
                pool,
                cache,
                identity,
                catalog,
                cart,
                checkout,
            }),
        }
    }

    /// Get a reference to the database connection pool, if any.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn cache(&self) -> &dyn CacheStore {
        self.inner.cache.as_ref()
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityVerifier {
        self.inner.identity.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &ProductCatalog {
        &self.inner.catalog
    }

    #[must_use]
    pub fn cart(&self) -> &CartEngine {
        &self.inner.cart
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }
}
