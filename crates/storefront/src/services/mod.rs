//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `catalog` - Product reads and writes behind the product cache
//! - `cart` - Live carts in the cache with write-behind backup
//! - `backup` - Worker pool that persists cart lines
//! - `checkout` - Transactional cart checkout
//! - `identity` - Bearer token validation against the identity service

pub mod backup;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod identity;

pub use backup::{BackupJob, BackupQueue, BackupWorkers};
pub use cart::CartEngine;
pub use catalog::ProductCatalog;
pub use checkout::CheckoutService;
pub use identity::{HttpIdentityVerifier, IdentityError, IdentityVerifier};
