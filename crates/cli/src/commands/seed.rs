//! Seed the catalog with sellers and products for local development.
//!
//! # File Format
//!
//! ```yaml
//! sellers:
//!   - id: 9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d
//!     name: Corner Shop
//!     products:
//!       - name: Green Tea
//!         price: 450
//!         stock: 20
//!         type: drink
//!         description: Loose leaf, 100g
//! ```
//!
//! `discount` and `description` are optional. Every product is validated
//! before anything is written.

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use tillpoint_core::UserId;
use tillpoint_storefront::db::{self, PgProductStore};
use tillpoint_storefront::models::ProductDraft;
use tillpoint_storefront::store::ProductStore;

use super::{CliError, database_url};

/// Top-level seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub sellers: Vec<SeedSeller>,
}

/// A seller and the products it owns.
#[derive(Debug, Deserialize)]
pub struct SeedSeller {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub products: Vec<ProductDraft>,
}

/// Collect every validation problem in the file, prefixed with its location.
fn validate(seed: &SeedFile) -> Vec<String> {
    let mut errors = Vec::new();
    for seller in &seed.sellers {
        if seller.name.trim().is_empty() {
            errors.push(format!("seller {}: name is empty", seller.id));
        }
        for (index, product) in seller.products.iter().enumerate() {
            if let Err(problems) = product.validate() {
                for problem in problems {
                    errors.push(format!("seller {} product #{index}: {problem}", seller.id));
                }
            }
        }
    }
    errors
}

/// Seed sellers and products from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation, or if
/// any database write fails.
pub async fn catalog(file_path: &str) -> Result<(), CliError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(CliError::Invalid(format!("File not found: {file_path}")));
    }

    info!(path = %file_path, "Loading catalog seed");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let seed: SeedFile = serde_yaml::from_str(&content)?;

    let errors = validate(&seed);
    if !errors.is_empty() {
        error!("Seed validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(CliError::Invalid(format!(
            "{} validation errors found",
            errors.len()
        )));
    }

    let pool = db::create_pool(&database_url()?).await?;
    info!("Connected to database");

    let store = PgProductStore::new(pool);
    let mut inserted = 0usize;
    for seller in &seed.sellers {
        for product in &seller.products {
            let view = store.insert(seller.id, &seller.name, product).await?;
            info!(product_id = %view.id(), name = %product.name, "Product inserted");
            inserted += 1;
        }
    }

    info!("Seeding complete!");
    info!("  Sellers: {}", seed.sellers.len());
    info!("  Products inserted: {inserted}");
    Ok(())
}
