//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                       - Liveness check
//! GET    /health/ready                 - Readiness check (database, cache)
//!
//! # Cart (bearer token)
//! GET    /api/v1/cart                  - Caller's cart
//! DELETE /api/v1/cart                  - Empty the cart
//! POST   /api/v1/cart/restore          - Restore from durable backup
//! POST   /api/v1/cart/checkout         - Place an order
//! GET    /api/v1/cart/{product_id}     - One cart line
//! POST   /api/v1/cart/{product_id}     - Add units
//! PUT    /api/v1/cart/{product_id}     - Set quantity
//! DELETE /api/v1/cart/{product_id}     - Remove line
//!
//! # Products (bearer token)
//! GET    /api/v1/products              - All products
//! POST   /api/v1/products              - Create (admin, seller)
//! POST   /api/v1/products/lookup       - Bulk lookup by ids
//! DELETE /api/v1/products/cache        - Clear product caches (admin)
//! GET    /api/v1/products/seller/{id}  - Products of one seller
//! GET    /api/v1/products/name/{query} - Search by name
//! GET    /api/v1/products/{id}         - One product
//! PUT    /api/v1/products/{id}         - Update (admin, seller)
//! DELETE /api/v1/products/{id}         - Soft delete (admin, seller)
//! ```

pub mod cart;
pub mod products;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/restore", post(cart::restore))
        .route("/checkout", post(cart::checkout))
        .route(
            "/{product_id}",
            get(cart::show_line)
                .post(cart::add)
                .put(cart::update)
                .delete(cart::remove),
        )
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    use axum::routing::delete;

    Router::new()
        .route("/", get(products::index).post(products::create))
        .route("/lookup", post(products::lookup))
        .route("/cache", delete(products::clear_cache))
        .route("/seller/{seller_id}", get(products::by_seller))
        .route("/name/{query}", get(products::by_name))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::delete),
        )
}

/// Create all API routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/v1/cart", cart_routes())
        .nest("/api/v1/products", product_routes())
}
