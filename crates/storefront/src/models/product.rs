//! Product domain types.
//!
//! `Product` is the canonical durable row. `ProductView` adds the seller's
//! display name and is the shape served to callers and stored in the product
//! cache as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tillpoint_core::{ProductId, UserId};

const NAME_MIN_CHARS: usize = 3;
const NAME_MAX_CHARS: usize = 100;

/// A catalog product owned by a seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub name: String,
    /// Unit price in the smallest currency unit.
    pub price: i32,
    pub stock: i32,
    /// Discount percentage (0-100).
    pub discount: i32,
    #[serde(rename = "type")]
    pub product_type: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the product is soft-deleted. Reads never return deleted rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A product joined with its seller's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub product: Product,
    pub seller_name: Option<String>,
}

impl ProductView {
    #[must_use]
    pub const fn id(&self) -> ProductId {
        self.product.id
    }
}

/// Seller-supplied product fields, used for both create and update.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub price: i32,
    pub stock: i32,
    #[serde(default)]
    pub discount: i32,
    #[serde(rename = "type")]
    pub product_type: String,
    #[serde(default)]
    pub description: String,
}

impl ProductDraft {
    /// Validate the draft, collecting every violated rule.
    ///
    /// # Errors
    ///
    /// Returns one message per failing field.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        let name_len = self.name.trim().chars().count();
        if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&name_len) {
            problems.push(format!(
                "name must be between {NAME_MIN_CHARS} and {NAME_MAX_CHARS} characters"
            ));
        }
        if self.price <= 0 {
            problems.push("price must be greater than 0".to_owned());
        }
        if self.stock < 0 {
            problems.push("stock must not be negative".to_owned());
        }
        if !(0..=100).contains(&self.discount) {
            problems.push("discount must be between 0 and 100".to_owned());
        }
        if self.product_type.is_empty() || !self.product_type.chars().all(char::is_alphabetic) {
            problems.push("type must be a non-empty alphabetic word".to_owned());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
