//! Domain models for the storefront.

pub mod cart;
pub mod identity;
pub mod order;
pub mod product;

pub use cart::{CartItem, CartLine, DurableCartRow, StoredCartLine};
pub use identity::CurrentUser;
pub use order::{CheckoutReceipt, Order, OrderItem};
pub use product::{Product, ProductDraft, ProductView};
