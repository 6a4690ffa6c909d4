//! Cache key layout and TTLs.
//!
//! The key strings are shared with other services reading the same Redis
//! instance and must not change shape.

use std::time::Duration;

use tillpoint_core::{ProductId, UserId};

/// Live cart hash lifetime, refreshed on every mutation.
pub const CART_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Lifetime of single-product and per-seller / per-name list entries.
pub const PRODUCT_TTL: Duration = Duration::from_secs(5 * 60);
/// Lifetime of the full product list.
pub const ALL_PRODUCTS_TTL: Duration = Duration::from_secs(2 * 60);

pub const ALL_PRODUCTS: &str = "all_products";

/// Patterns covering every product-derived cache entry.
pub const PRODUCT_PATTERNS: [&str; 4] = [
    "product:*",
    "products_by_seller:*",
    "products_by_name:*",
    ALL_PRODUCTS,
];

#[must_use]
pub fn cart(user_id: UserId) -> String {
    format!("cart:{user_id}")
}

#[must_use]
pub fn product(product_id: ProductId) -> String {
    format!("product:{product_id}")
}

#[must_use]
pub fn products_by_seller(seller_id: UserId) -> String {
    format!("products_by_seller:{seller_id}")
}

#[must_use]
pub fn products_by_name(query: &str) -> String {
    format!("products_by_name:{query}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let user: UserId = "0b8f7c1a-4d2e-4f6a-8b9c-1d2e3f4a5b6c".parse().unwrap();
        let product: ProductId = "9a8b7c6d-5e4f-4a3b-9c2d-1e0f9a8b7c6d".parse().unwrap();

        assert_eq!(cart(user), "cart:0b8f7c1a-4d2e-4f6a-8b9c-1d2e3f4a5b6c");
        assert_eq!(
            super::product(product),
            "product:9a8b7c6d-5e4f-4a3b-9c2d-1e0f9a8b7c6d"
        );
        assert_eq!(
            products_by_seller(user),
            "products_by_seller:0b8f7c1a-4d2e-4f6a-8b9c-1d2e3f4a5b6c"
        );
        assert_eq!(products_by_name("mango"), "products_by_name:mango");
    }

    #[test]
    fn test_ttls() {
        assert_eq!(CART_TTL.as_secs(), 86_400);
        assert_eq!(PRODUCT_TTL.as_secs(), 300);
        assert_eq!(ALL_PRODUCTS_TTL.as_secs(), 120);
    }
}
