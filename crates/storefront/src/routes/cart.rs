//! Cart route handlers.
//!
//! Every handler acts on the authenticated caller's own cart. Mutations
//! respond with the full updated cart.

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

use tillpoint_core::{ProductId, UserId};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::{CartItem, CheckoutReceipt};
use crate::state::AppState;

/// Body for adding to or setting a cart line.
#[derive(Debug, Deserialize)]
pub struct CartLineRequest {
    pub quantity: i32,
    #[serde(default)]
    pub note: Option<String>,
}

/// A cart with its running total.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub items: Vec<CartItem>,
    /// Sum of `price * quantity` over the items.
    pub total: i64,
    /// Total number of units in the cart.
    pub item_count: i64,
}

impl From<Vec<CartItem>> for CartResponse {
    fn from(items: Vec<CartItem>) -> Self {
        let total = items.iter().map(CartItem::line_total).sum();
        let item_count = items.iter().map(|item| i64::from(item.quantity)).sum();
        Self {
            items,
            total,
            item_count,
        }
    }
}

/// Empty notes mean "leave the note alone".
fn note(note: Option<String>) -> Option<String> {
    note.filter(|n| !n.trim().is_empty())
}

async fn current_cart(state: &AppState, user_id: UserId) -> Result<Json<CartResponse>> {
    let items = state.cart().get(user_id).await?;
    Ok(Json(items.into()))
}

/// Show the caller's cart.
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartResponse>> {
    current_cart(&state, user.user_id).await
}

/// Show one line of the caller's cart.
#[instrument(skip_all)]
pub async fn show_line(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    path: std::result::Result<Path<ProductId>, PathRejection>,
) -> Result<Json<CartItem>> {
    let Path(product_id) = path?;
    let item = state.cart().get_line(user.user_id, product_id).await?;
    Ok(Json(item))
}

/// Add `quantity` units (negative to take some out).
#[instrument(skip_all)]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    path: std::result::Result<Path<ProductId>, PathRejection>,
    body: std::result::Result<Json<CartLineRequest>, JsonRejection>,
) -> Result<Json<CartResponse>> {
    let Path(product_id) = path?;
    let Json(request) = body?;

    state
        .cart()
        .add(user.user_id, product_id, request.quantity, note(request.note))
        .await?;
    current_cart(&state, user.user_id).await
}

/// Set a line's quantity.
#[instrument(skip_all)]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    path: std::result::Result<Path<ProductId>, PathRejection>,
    body: std::result::Result<Json<CartLineRequest>, JsonRejection>,
) -> Result<Json<CartResponse>> {
    let Path(product_id) = path?;
    let Json(request) = body?;

    state
        .cart()
        .update_quantity(user.user_id, product_id, request.quantity, note(request.note))
        .await?;
    current_cart(&state, user.user_id).await
}

/// Remove a line.
#[instrument(skip_all)]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    path: std::result::Result<Path<ProductId>, PathRejection>,
) -> Result<Json<CartResponse>> {
    let Path(product_id) = path?;
    state.cart().remove(user.user_id, product_id).await?;
    current_cart(&state, user.user_id).await
}

/// Empty the cart.
#[instrument(skip_all)]
pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<StatusCode> {
    state.cart().clear(user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the live cart with its durable backup.
#[instrument(skip_all)]
pub async fn restore(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartResponse>> {
    state.cart().restore(user.user_id).await?;
    current_cart(&state, user.user_id).await
}

/// Check out the whole cart.
#[instrument(skip_all)]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<(StatusCode, Json<CheckoutReceipt>)> {
    add_breadcrumb("cart", "Checkout started", None);

    let receipt = state.checkout().checkout(user.user_id).await?;

    let order_id = receipt.order.id.to_string();
    add_breadcrumb("cart", "Order placed", Some(&[("order_id", order_id.as_str())]));
    Ok((StatusCode::CREATED, Json(receipt)))
}
