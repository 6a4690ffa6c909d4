//! Product route handlers.
//!
//! Reads are open to any authenticated caller. Writes need the `admin` or
//! `seller` role, and clearing the product caches needs `admin`.

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tillpoint_core::{ProductId, Role, UserId};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{ProductDraft, ProductView};
use crate::state::AppState;

const WRITERS: &[Role] = &[Role::Admin, Role::Seller];

/// Bulk lookup request.
#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub ids: Vec<ProductId>,
}

/// Result of clearing the product caches.
#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub removed: u64,
}

/// List every live product.
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
) -> Result<Json<Vec<ProductView>>> {
    Ok(Json(state.catalog().list_all().await?))
}

/// Show one product.
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    path: std::result::Result<Path<ProductId>, PathRejection>,
) -> Result<Json<ProductView>> {
    let Path(id) = path?;
    Ok(Json(state.catalog().get(id).await?))
}

/// List a seller's products.
#[instrument(skip_all)]
pub async fn by_seller(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    path: std::result::Result<Path<UserId>, PathRejection>,
) -> Result<Json<Vec<ProductView>>> {
    let Path(seller_id) = path?;
    Ok(Json(state.catalog().list_by_seller(seller_id).await?))
}

/// Search products by name.
#[instrument(skip_all)]
pub async fn by_name(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    path: std::result::Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<ProductView>>> {
    let Path(query) = path?;
    Ok(Json(state.catalog().search_by_name(&query).await?))
}

/// Resolve many products at once. Unknown ids are left out of the response.
#[instrument(skip_all)]
pub async fn lookup(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    body: std::result::Result<Json<LookupRequest>, JsonRejection>,
) -> Result<Json<Vec<ProductView>>> {
    let Json(request) = body?;
    Ok(Json(state.catalog().get_many(&request.ids).await?))
}

/// Create a product owned by the caller.
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    body: std::result::Result<Json<ProductDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductView>)> {
    user.require_role(WRITERS)?;
    let Json(draft) = body?;

    let product = state.catalog().create(&user, &draft).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Replace a product's fields.
#[instrument(skip_all)]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    path: std::result::Result<Path<ProductId>, PathRejection>,
    body: std::result::Result<Json<ProductDraft>, JsonRejection>,
) -> Result<Json<ProductView>> {
    user.require_role(WRITERS)?;
    let Path(id) = path?;
    let Json(draft) = body?;

    Ok(Json(state.catalog().update(&user, id, &draft).await?))
}

/// Soft-delete a product.
#[instrument(skip_all)]
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    path: std::result::Result<Path<ProductId>, PathRejection>,
) -> Result<StatusCode> {
    user.require_role(WRITERS)?;
    let Path(id) = path?;

    state.catalog().delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Drop every cached product entry.
#[instrument(skip_all)]
pub async fn clear_cache(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CacheClearResponse>> {
    user.require_role(&[Role::Admin])?;

    let removed = state.catalog().clear_all_caches().await?;
    Ok(Json(CacheClearResponse { removed }))
}
