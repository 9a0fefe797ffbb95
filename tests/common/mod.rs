//! Common test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use cashai_backend::aggregator::{
    Aggregator, AggregatorError, AggregatorResult, AggregatorTransaction, DateWindow, LinkToken,
    Page, PlaidEnvironment, TokenExchange, TransactionsPage,
};
use cashai_backend::crypto::CredentialCipher;
use cashai_backend::session::SessionTokens;
use cashai_backend::store::CredentialStore;
use cashai_backend::{build_router, db, AppState, Config};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_ACCESS_TOKEN: &str = "access-sandbox-test";
pub const TEST_ITEM_ID: &str = "item-test";

/// Fresh in-memory database with migrations applied.
///
/// A single connection that never idles out keeps the in-memory database
/// alive for the whole test.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("Failed to enable foreign keys");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub fn test_cipher() -> CredentialCipher {
    CredentialCipher::new([7u8; 32])
}

pub async fn setup_store() -> CredentialStore {
    CredentialStore::new(setup_test_db().await, test_cipher())
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        database_max_connections: 1,
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        allowed_origins: vec!["*".to_string()],
        jwt_secret: TEST_JWT_SECRET.to_string(),
        credential_key: None,
        plaid_client_id: "client-id".to_string(),
        plaid_secret: "secret".to_string(),
        plaid_env: PlaidEnvironment::Sandbox,
        plaid_base_url: None,
        plaid_redirect_uri: None,
        plaid_client_name: "CashAI".to_string(),
        mobile_redirect_uri: "cashai://plaid-oauth".to_string(),
        echo_access_token: false,
    }
}

pub fn sample_transaction(id: &str, amount: &str, date: NaiveDate) -> AggregatorTransaction {
    AggregatorTransaction {
        transaction_id: id.to_string(),
        account_id: "acc-1".to_string(),
        amount: amount.parse().expect("valid decimal"),
        date,
        name: Some("Coffee Shop".to_string()),
        merchant_name: Some("Blue Bottle".to_string()),
        category: Some(vec!["Food and Drink".to_string()]),
        personal_finance_category: None,
        extra: Map::new(),
    }
}

/// In-process aggregator with canned responses
#[derive(Default)]
pub struct FakeAggregator {
    /// Every call fails with an upstream error when set
    pub fail: bool,
    pub transactions: Vec<AggregatorTransaction>,
    /// `client_user_id` values seen by `create_link_token`
    pub link_users: Mutex<Vec<String>>,
}

impl FakeAggregator {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_transactions(transactions: Vec<AggregatorTransaction>) -> Self {
        Self {
            transactions,
            ..Self::default()
        }
    }

    fn check(&self) -> AggregatorResult<()> {
        if self.fail {
            return Err(AggregatorError::Upstream {
                status: 400,
                error_type: "INVALID_INPUT".to_string(),
                error_code: "INVALID_ACCESS_TOKEN".to_string(),
                error_message: "provided access token is in an invalid format".to_string(),
                display_message: None,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Aggregator for FakeAggregator {
    async fn create_link_token(&self, client_user_id: &str) -> AggregatorResult<LinkToken> {
        self.check()?;
        self.link_users
            .lock()
            .unwrap()
            .push(client_user_id.to_string());
        Ok(LinkToken {
            link_token: "link-sandbox-test".to_string(),
            expiration: Some("2030-01-01T00:00:00Z".to_string()),
        })
    }

    async fn exchange_public_token(&self, _public_token: &str) -> AggregatorResult<TokenExchange> {
        self.check()?;
        Ok(TokenExchange {
            access_token: TEST_ACCESS_TOKEN.to_string(),
            item_id: TEST_ITEM_ID.to_string(),
        })
    }

    async fn fetch_balances(&self, access_token: &str) -> AggregatorResult<Value> {
        self.check()?;
        Ok(json!({
            "accounts": [{
                "account_id": "acc-1",
                "balances": { "available": 100.5, "current": 110.0 }
            }],
            "access_token_seen": access_token == TEST_ACCESS_TOKEN,
        }))
    }

    async fn fetch_transactions(
        &self,
        _access_token: &str,
        _window: DateWindow,
        page: Page,
    ) -> AggregatorResult<TransactionsPage> {
        self.check()?;
        let transactions = self
            .transactions
            .iter()
            .skip(page.offset as usize)
            .take(page.count as usize)
            .cloned()
            .collect();
        Ok(TransactionsPage {
            accounts: Vec::new(),
            transactions,
            total_transactions: self.transactions.len() as u64,
            extra: Map::new(),
        })
    }
}

/// Full application over the given store and aggregator
pub fn test_app_with(store: CredentialStore, aggregator: Arc<dyn Aggregator>) -> Router {
    let state = AppState::new(
        store,
        SessionTokens::new(TEST_JWT_SECRET.as_bytes()),
        aggregator,
        test_config(),
    );
    build_router(state)
}

pub async fn test_app(aggregator: FakeAggregator) -> (Router, CredentialStore) {
    let store = setup_store().await;
    (test_app_with(store.clone(), Arc::new(aggregator)), store)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authorized_json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    let mut request = json_request(method, uri, body);
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {}", token).parse().unwrap(),
    );
    request
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn authorized_get_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
