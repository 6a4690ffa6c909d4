//! Cart domain types.
//!
//! A live cart is a cache hash `cart:<user_id>` whose fields are product IDs
//! and whose values are JSON-encoded [`StoredCartLine`]s. [`DurableCartRow`]
//! is the best-effort backup of a line in `PostgreSQL`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tillpoint_core::{ProductId, UserId};

/// Value stored in the cart hash, keyed by product ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCartLine {
    pub quantity: i32,
    #[serde(default)]
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredCartLine {
    /// Build the next version of a line.
    ///
    /// `createdAt` is carried over from `previous` when present. A `None` note
    /// keeps the previous note.
    #[must_use]
    pub fn next(
        quantity: i32,
        note: Option<String>,
        previous: Option<&Self>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            quantity,
            note: note
                .or_else(|| previous.map(|p| p.note.clone()))
                .unwrap_or_default(),
            created_at: previous.map_or(now, |p| p.created_at),
            updated_at: now,
        }
    }

    #[must_use]
    pub fn into_line(self, product_id: ProductId) -> CartLine {
        CartLine {
            product_id,
            quantity: self.quantity,
            note: self.note,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A single cart line as held in the live cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: i32,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    #[must_use]
    pub fn stored(&self) -> StoredCartLine {
        StoredCartLine {
            quantity: self.quantity,
            note: self.note.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A cart line joined with current product data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub seller_id: UserId,
    pub seller_name: Option<String>,
    /// Current unit price of the product.
    pub price: i32,
    pub quantity: i32,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// Price times quantity, widened so large carts cannot overflow.
    #[must_use]
    pub fn line_total(&self) -> i64 {
        i64::from(self.price) * i64::from(self.quantity)
    }
}

/// Durable backup of a cart line, keyed by `(user_id, product_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DurableCartRow {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DurableCartRow {
    #[must_use]
    pub fn from_line(user_id: UserId, line: &CartLine) -> Self {
        Self {
            user_id,
            product_id: line.product_id,
            quantity: line.quantity,
            note: line.note.clone(),
            created_at: line.created_at,
            updated_at: line.updated_at,
        }
    }

    #[must_use]
    pub fn into_line(self) -> CartLine {
        CartLine {
            product_id: self.product_id,
            quantity: self.quantity,
            note: self.note,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_next_preserves_created_at_and_note() {
        let first_seen = Utc::now() - Duration::minutes(5);
        let previous = StoredCartLine {
            quantity: 2,
            note: "gift wrap".to_owned(),
            created_at: first_seen,
            updated_at: first_seen,
        };

        let now = Utc::now();
        let next = StoredCartLine::next(5, None, Some(&previous), now);

        assert_eq!(next.quantity, 5);
        assert_eq!(next.note, "gift wrap");
        assert_eq!(next.created_at, first_seen);
        assert_eq!(next.updated_at, now);
    }

    #[test]
    fn test_next_without_previous_starts_fresh() {
        let now = Utc::now();
        let line = StoredCartLine::next(1, Some("fragile".to_owned()), None, now);
        assert_eq!(line.created_at, now);
        assert_eq!(line.note, "fragile");
    }

    #[test]
    fn test_stored_line_uses_camel_case_keys() {
        let now = Utc::now();
        let line = StoredCartLine::next(3, None, None, now);
        let json = serde_json::to_value(&line).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["quantity"], 3);
    }

    #[test]
    fn test_line_total_widens() {
        let now = Utc::now();
        let item = CartItem {
            product_id: ProductId::generate(),
            product_name: "Bulk Rice".to_owned(),
            seller_id: UserId::generate(),
            seller_name: None,
            price: i32::MAX,
            quantity: 2,
            note: String::new(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(item.line_total(), i64::from(i32::MAX) * 2);
    }
}
