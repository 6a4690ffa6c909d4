//! Product catalog API tests.
//!
//! Run with: cargo test -p tillpoint-integration-tests

use axum::http::StatusCode;
use serde_json::json;

use tillpoint_core::ProductId;
use tillpoint_integration_tests::{
    ADMIN_TOKEN, CUSTOMER_TOKEN, OTHER_SELLER_TOKEN, SELLER_TOKEN, TestApp,
};

fn draft(name: &str, price: i32) -> serde_json::Value {
    json!({
        "name": name,
        "price": price,
        "stock": 4,
        "discount": 10,
        "type": "grocery",
        "description": "from the hills",
    })
}

#[tokio::test]
async fn test_create_and_read_product() {
    let app = TestApp::new();

    let response = app.post("/api/v1/products", SELLER_TOKEN, draft("Green Tea", 450)).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["seller_name"], "corner-shop");
    assert_eq!(response.body["type"], "grocery");
    let id = response.body["id"].as_str().expect("id").to_owned();

    let response = app.get(&format!("/api/v1/products/{id}"), CUSTOMER_TOKEN).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["name"], "Green Tea");
    assert_eq!(response.body["discount"], 10);

    let response = app.get("/api/v1/products", CUSTOMER_TOKEN).await;
    assert_eq!(response.body.as_array().map(Vec::len), Some(1));

    let response = app
        .get(
            &format!("/api/v1/products/seller/{}", app.seller.user_id),
            CUSTOMER_TOKEN,
        )
        .await;
    assert_eq!(response.body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_customers_cannot_write_products() {
    let app = TestApp::new();

    let response = app
        .post("/api/v1/products", CUSTOMER_TOKEN, draft("Green Tea", 450))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app.delete("/api/v1/products/cache", SELLER_TOKEN).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_draft_is_rejected() {
    let app = TestApp::new();

    let response = app
        .post(
            "/api/v1/products",
            SELLER_TOKEN,
            json!({ "name": "ab", "price": 0, "stock": -1, "type": "two words" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let message = response.body["message"].as_str().expect("message");
    assert!(message.contains("price"));
    assert!(message.contains("stock"));
}

#[tokio::test]
async fn test_update_is_visible_immediately() {
    let app = TestApp::new();
    let id = app.create_product("Green Tea", 450, 4).await;
    let uri = format!("/api/v1/products/{id}");

    // Warm the caches.
    app.get(&uri, CUSTOMER_TOKEN).await;
    app.get("/api/v1/products", CUSTOMER_TOKEN).await;

    let response = app.put(&uri, SELLER_TOKEN, draft("Sencha Tea", 500)).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.get(&uri, CUSTOMER_TOKEN).await;
    assert_eq!(response.body["name"], "Sencha Tea");
    assert_eq!(response.body["price"], 500);

    let response = app.get("/api/v1/products", CUSTOMER_TOKEN).await;
    assert_eq!(response.body[0]["name"], "Sencha Tea");
}

#[tokio::test]
async fn test_only_owner_or_admin_may_modify() {
    let app = TestApp::new();
    let id = app.create_product("Green Tea", 450, 4).await;
    let uri = format!("/api/v1/products/{id}");

    let response = app.put(&uri, OTHER_SELLER_TOKEN, draft("Stolen Tea", 1)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app.delete(&uri, OTHER_SELLER_TOKEN).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app.delete(&uri, ADMIN_TOKEN).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = app.get(&uri, CUSTOMER_TOKEN).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.delete(&uri, ADMIN_TOKEN).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_by_name() {
    let app = TestApp::new();
    app.create_product("Green Tea", 450, 4).await;
    app.create_product("Black Tea", 400, 4).await;
    app.create_product("Jasmine Rice", 300, 4).await;

    let response = app.get("/api/v1/products/name/tea", CUSTOMER_TOKEN).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_array().map(Vec::len), Some(2));

    let response = app.get("/api/v1/products/name/coffee", CUSTOMER_TOKEN).await;
    assert_eq!(response.body, json!([]));
}

#[tokio::test]
async fn test_bulk_lookup_skips_unknown_ids() {
    let app = TestApp::new();
    let tea = app.create_product("Green Tea", 450, 4).await;
    let rice = app.create_product("Jasmine Rice", 300, 4).await;

    let response = app
        .post(
            "/api/v1/products/lookup",
            CUSTOMER_TOKEN,
            json!({ "ids": [rice, ProductId::generate(), tea, rice] }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let names: Vec<&str> = response
        .body
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Jasmine Rice", "Green Tea"]);
}

#[tokio::test]
async fn test_admin_clears_product_caches() {
    let app = TestApp::new();
    let id = app.create_product("Green Tea", 450, 4).await;
    app.get(&format!("/api/v1/products/{id}"), CUSTOMER_TOKEN).await;
    app.get("/api/v1/products", CUSTOMER_TOKEN).await;

    let response = app.delete("/api/v1/products/cache", ADMIN_TOKEN).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["removed"], 2);
}
