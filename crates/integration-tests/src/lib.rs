//! Integration test harness for Tillpoint.
//!
//! [`TestApp`] builds the full storefront router over the in-process cache
//! and durable backends, with an identity verifier that accepts a fixed set
//! of tokens. Requests go through `tower::ServiceExt::oneshot`; no sockets,
//! database or Redis are needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tillpoint-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;

use tillpoint_core::{Role, UserId};
use tillpoint_storefront::cache::MemoryCacheStore;
use tillpoint_storefront::config::BackupConfig;
use tillpoint_storefront::models::CurrentUser;
use tillpoint_storefront::services::{BackupQueue, BackupWorkers, IdentityError, IdentityVerifier};
use tillpoint_storefront::state::{AppState, Backends};
use tillpoint_storefront::store::MemoryStore;

/// Token accepted for the seller fixture.
pub const SELLER_TOKEN: &str = "seller-token";
/// Token accepted for a second, unrelated seller.
pub const OTHER_SELLER_TOKEN: &str = "other-seller-token";
/// Token accepted for the customer fixture.
pub const CUSTOMER_TOKEN: &str = "customer-token";
/// Token accepted for the admin fixture.
pub const ADMIN_TOKEN: &str = "admin-token";

/// Identity verifier that knows a fixed set of tokens.
pub struct FixedTokens {
    users: HashMap<String, CurrentUser>,
}

#[async_trait]
impl IdentityVerifier for FixedTokens {
    async fn validate_token(&self, token: &str) -> Result<CurrentUser, IdentityError> {
        self.users
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::InvalidToken("unknown token".to_owned()))
    }
}

fn user(username: &str, role: Role) -> CurrentUser {
    CurrentUser {
        user_id: UserId::generate(),
        username: username.to_owned(),
        role,
    }
}

/// A storefront router wired to in-process backends.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub cache: MemoryCacheStore,
    pub seller: CurrentUser,
    pub other_seller: CurrentUser,
    pub customer: CurrentUser,
    pub admin: CurrentUser,
    workers: Mutex<Option<BackupWorkers>>,
}

/// Status and decoded JSON body of a response (`Value::Null` when empty).
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    /// Build a fresh app. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let cache = MemoryCacheStore::new();

        let seller = user("corner-shop", Role::Seller);
        let other_seller = user("market-stall", Role::Seller);
        let customer = user("alex", Role::Customer);
        let admin = user("ops", Role::Admin);
        let users = [
            (SELLER_TOKEN, &seller),
            (OTHER_SELLER_TOKEN, &other_seller),
            (CUSTOMER_TOKEN, &customer),
            (ADMIN_TOKEN, &admin),
        ]
        .into_iter()
        .map(|(token, user)| (token.to_owned(), user.clone()))
        .collect();

        let (queue, workers) = BackupQueue::start(
            Arc::new(store.clone()),
            BackupConfig {
                workers: 2,
                queue_capacity: 256,
                drain_timeout: Duration::from_secs(5),
            },
        );

        let state = AppState::new(
            Backends {
                cache: Arc::new(cache.clone()),
                products: Arc::new(store.clone()),
                carts: Arc::new(store.clone()),
                orders: Arc::new(store.clone()),
                identity: Arc::new(FixedTokens { users }),
                pool: None,
            },
            queue,
        );

        Self {
            router: tillpoint_storefront::app(state, Duration::from_secs(10)),
            store,
            cache,
            seller,
            other_seller,
            customer,
            admin,
            workers: Mutex::new(Some(workers)),
        }
    }

    /// Send one request and decode the response.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body is not JSON.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Create a product as the seller fixture and return its id.
    ///
    /// # Panics
    ///
    /// Panics if the product is rejected.
    pub async fn create_product(&self, name: &str, price: i32, stock: i32) -> String {
        let response = self
            .post(
                "/api/v1/products",
                SELLER_TOKEN,
                serde_json::json!({
                    "name": name,
                    "price": price,
                    "stock": stock,
                    "type": "grocery",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"]
            .as_str()
            .expect("product id")
            .to_owned()
    }

    /// Wait for every queued cart backup to be written, then stop the workers.
    ///
    /// Cart writes after this point are no longer backed up.
    pub async fn drain_backups(&self) {
        let workers = self.workers.lock().await.take();
        if let Some(workers) = workers {
            workers.shutdown().await;
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
