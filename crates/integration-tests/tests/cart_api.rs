//! Cart and checkout API tests.
//!
//! Run with: cargo test -p tillpoint-integration-tests

use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::json;

use tillpoint_core::ProductId;
use tillpoint_integration_tests::{CUSTOMER_TOKEN, SELLER_TOKEN, TestApp};
use tillpoint_storefront::store::CartBackupStore;

#[tokio::test]
async fn test_cart_requires_bearer_token() {
    let app = TestApp::new();

    let response = app
        .request(Method::GET, "/api/v1/cart", None, None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.body["message"].is_string());

    let response = app.get("/api/v1/cart", "forged").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_add_accumulates_and_returns_cart() {
    let app = TestApp::new();
    let product = app.create_product("Green Tea", 450, 10).await;
    let uri = format!("/api/v1/cart/{product}");

    let response = app.post(&uri, CUSTOMER_TOKEN, json!({ "quantity": 2 })).await;
    assert_eq!(response.status, StatusCode::OK);
    let first_created = response.body["items"][0]["created_at"].clone();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let response = app
        .post(&uri, CUSTOMER_TOKEN, json!({ "quantity": 3, "note": "loose leaf" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let items = response.body["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 5);
    assert_eq!(items[0]["note"], "loose leaf");
    assert_eq!(items[0]["created_at"], first_created);
    assert_ne!(items[0]["updated_at"], first_created);
    assert_eq!(response.body["total"], 5 * 450);
    assert_eq!(response.body["item_count"], 5);

    let line = app.get(&uri, CUSTOMER_TOKEN).await;
    assert_eq!(line.status, StatusCode::OK);
    assert_eq!(line.body["product_name"], "Green Tea");
}

#[tokio::test]
async fn test_carts_are_per_user() {
    let app = TestApp::new();
    let product = app.create_product("Green Tea", 450, 10).await;

    app.post(
        &format!("/api/v1/cart/{product}"),
        CUSTOMER_TOKEN,
        json!({ "quantity": 1 }),
    )
    .await;

    let response = app.get("/api/v1/cart", SELLER_TOKEN).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["items"], json!([]));
}

#[tokio::test]
async fn test_quantity_rules() {
    let app = TestApp::new();
    let product = app.create_product("Saffron", 900, 2).await;
    let uri = format!("/api/v1/cart/{product}");

    let response = app.post(&uri, CUSTOMER_TOKEN, json!({ "quantity": 3 })).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app.put(&uri, CUSTOMER_TOKEN, json!({ "quantity": 0 })).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app.put(&uri, CUSTOMER_TOKEN, json!({ "quantity": 2 })).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["items"][0]["quantity"], 2);

    // Taking out more than is in the cart removes the line.
    let response = app.post(&uri, CUSTOMER_TOKEN, json!({ "quantity": -5 })).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["items"], json!([]));

    let response = app.get(&uri, CUSTOMER_TOKEN).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_product_and_bad_ids() {
    let app = TestApp::new();

    let response = app
        .post(
            &format!("/api/v1/cart/{}", ProductId::generate()),
            CUSTOMER_TOKEN,
            json!({ "quantity": 1 }),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app
        .post("/api/v1/cart/not-a-uuid", CUSTOMER_TOKEN, json!({ "quantity": 1 }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["message"].is_string());

    let product = app.create_product("Green Tea", 450, 10).await;
    let response = app
        .post(
            &format!("/api/v1/cart/{product}"),
            CUSTOMER_TOKEN,
            json!({ "qty": 1 }),
        )
        .await;
    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_remove_and_clear() {
    let app = TestApp::new();
    let tea = app.create_product("Green Tea", 450, 10).await;
    let rice = app.create_product("Jasmine Rice", 300, 10).await;
    for product in [&tea, &rice] {
        app.post(
            &format!("/api/v1/cart/{product}"),
            CUSTOMER_TOKEN,
            json!({ "quantity": 1 }),
        )
        .await;
    }

    let response = app
        .delete(&format!("/api/v1/cart/{tea}"), CUSTOMER_TOKEN)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["items"].as_array().map(Vec::len), Some(1));

    let response = app.delete("/api/v1/cart", CUSTOMER_TOKEN).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = app.get("/api/v1/cart", CUSTOMER_TOKEN).await;
    assert_eq!(response.body["items"], json!([]));
}

#[tokio::test]
async fn test_restore_replaces_live_cart_with_backup() {
    let app = TestApp::new();
    let tea = app.create_product("Green Tea", 450, 10).await;
    let rice = app.create_product("Jasmine Rice", 300, 10).await;

    app.post(
        &format!("/api/v1/cart/{tea}"),
        CUSTOMER_TOKEN,
        json!({ "quantity": 3 }),
    )
    .await;
    app.drain_backups().await;
    assert_eq!(app.store.list(app.customer.user_id).await.expect("rows").len(), 1);

    // These changes never reach the backup.
    app.put(
        &format!("/api/v1/cart/{tea}"),
        CUSTOMER_TOKEN,
        json!({ "quantity": 1 }),
    )
    .await;
    app.post(
        &format!("/api/v1/cart/{rice}"),
        CUSTOMER_TOKEN,
        json!({ "quantity": 5 }),
    )
    .await;

    let response = app
        .request(Method::POST, "/api/v1/cart/restore", Some(CUSTOMER_TOKEN), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let items = response.body["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], tea.as_str());
    assert_eq!(items[0]["quantity"], 3);
}

#[tokio::test]
async fn test_checkout_places_order() {
    let app = TestApp::new();
    let product = app.create_product("Oat Milk", 100, 5).await;
    app.post(
        &format!("/api/v1/cart/{product}"),
        CUSTOMER_TOKEN,
        json!({ "quantity": 2 }),
    )
    .await;

    let response = app
        .request(Method::POST, "/api/v1/cart/checkout", Some(CUSTOMER_TOKEN), None)
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    assert_eq!(response.body["order"]["total_amount"], 200);
    assert_eq!(response.body["order"]["status"], "pending");
    assert_eq!(response.body["items"][0]["price_at_checkout"], 100);

    let product_view = app
        .get(&format!("/api/v1/products/{product}"), CUSTOMER_TOKEN)
        .await;
    assert_eq!(product_view.body["stock"], 3);

    let cart = app.get("/api/v1/cart", CUSTOMER_TOKEN).await;
    assert_eq!(cart.body["items"], json!([]));
}

#[tokio::test]
async fn test_checkout_rolls_back_on_insufficient_stock() {
    let app = TestApp::new();
    let flour = app.create_product("Flour", 300, 10).await;
    let saffron = app.create_product("Saffron", 900, 1).await;

    app.post(
        &format!("/api/v1/cart/{flour}"),
        CUSTOMER_TOKEN,
        json!({ "quantity": 2 }),
    )
    .await;
    app.post(
        &format!("/api/v1/cart/{saffron}"),
        CUSTOMER_TOKEN,
        json!({ "quantity": 1 }),
    )
    .await;

    // The last unit sells to someone else before this cart checks out.
    let other = app
        .post(
            &format!("/api/v1/cart/{saffron}"),
            SELLER_TOKEN,
            json!({ "quantity": 1 }),
        )
        .await;
    assert_eq!(other.status, StatusCode::OK);
    let other = app
        .request(Method::POST, "/api/v1/cart/checkout", Some(SELLER_TOKEN), None)
        .await;
    assert_eq!(other.status, StatusCode::CREATED);

    let response = app
        .request(Method::POST, "/api/v1/cart/checkout", Some(CUSTOMER_TOKEN), None)
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    assert_eq!(app.store.orders().await.len(), 1);
    assert_eq!(app.store.order_items().await.len(), 1);
    let flour_id = flour.parse::<ProductId>().expect("product id");
    assert_eq!(app.store.stock(flour_id).await, Some(10));

    let cart = app.get("/api/v1/cart", CUSTOMER_TOKEN).await;
    assert_eq!(cart.body["items"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_empty_cart_checkout_is_rejected() {
    let app = TestApp::new();
    let response = app
        .request(Method::POST, "/api/v1/cart/checkout", Some(CUSTOMER_TOKEN), None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "Cart is empty");
}
