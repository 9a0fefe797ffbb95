//! Plaid Client Integration Tests
//!
//! Runs the client against a local mock of the Plaid API.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};

use cashai_backend::aggregator::{
    Aggregator, AggregatorError, DateWindow, Page, PlaidClient, PlaidSettings,
};

const CLIENT_ID: &str = "test-client";
const SECRET: &str = "test-secret";

/// Mock never returns more than this many transactions per page
const MOCK_PAGE_CAP: usize = 2;
const MOCK_TOTAL: usize = 5;

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("plaid-client-id").and_then(|v| v.to_str().ok()) == Some(CLIENT_ID)
        && headers.get("plaid-secret").and_then(|v| v.to_str().ok()) == Some(SECRET)
}

fn plaid_error(status: StatusCode, code: &str, message: &str) -> axum::response::Response {
    (
        status,
        Json(json!({
            "error_type": "INVALID_INPUT",
            "error_code": code,
            "error_message": message,
            "display_message": null,
            "request_id": "req-1"
        })),
    )
        .into_response()
}

async fn link_token_create(headers: HeaderMap, Json(body): Json<Value>) -> axum::response::Response {
    if !authorized(&headers) {
        return plaid_error(StatusCode::BAD_REQUEST, "INVALID_API_KEYS", "invalid client_id or secret");
    }
    Json(json!({
        "link_token": format!("link-sandbox-{}", body["user"]["client_user_id"].as_str().unwrap_or("")),
        "expiration": "2030-01-01T00:00:00Z",
        "request_id": "req-1"
    }))
    .into_response()
}

async fn public_token_exchange(Json(body): Json<Value>) -> axum::response::Response {
    if body["public_token"] == "public-expired" {
        return plaid_error(
            StatusCode::BAD_REQUEST,
            "INVALID_PUBLIC_TOKEN",
            "provided public token is expired",
        );
    }
    Json(json!({
        "access_token": "access-sandbox-1",
        "item_id": "item-1",
        "request_id": "req-1"
    }))
    .into_response()
}

async fn transactions_get(
    State(total): State<usize>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let offset = body["options"]["offset"].as_u64().unwrap_or(0) as usize;
    let count = body["options"]["count"].as_u64().unwrap_or(100) as usize;
    let end = total.min(offset + count.min(MOCK_PAGE_CAP));

    let transactions: Vec<Value> = (offset..end)
        .map(|i| {
            json!({
                "transaction_id": format!("txn-{}", i),
                "account_id": "acc-1",
                "amount": 1.25,
                "date": "2024-06-01",
                "name": "Coffee",
                "pending": false
            })
        })
        .collect();

    Json(json!({
        "accounts": [],
        "transactions": transactions,
        "total_transactions": total,
        "request_id": "req-1"
    }))
    .into_response()
}

async fn spawn_mock_plaid() -> String {
    let app = Router::new()
        .route("/link/token/create", post(link_token_create))
        .route("/item/public_token/exchange", post(public_token_exchange))
        .route("/transactions/get", post(transactions_get))
        .with_state(MOCK_TOTAL);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn client(base_url: String, secret: &str) -> PlaidClient {
    PlaidClient::new(PlaidSettings {
        base_url,
        client_id: CLIENT_ID.to_string(),
        secret: secret.to_string(),
        client_name: "CashAI".to_string(),
        redirect_uri: None,
    })
}

fn window() -> DateWindow {
    DateWindow {
        start: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
    }
}

#[tokio::test]
async fn test_create_link_token() {
    let base_url = spawn_mock_plaid().await;

    let link = client(base_url, SECRET)
        .create_link_token("user-42")
        .await
        .unwrap();
    assert_eq!(link.link_token, "link-sandbox-user-42");
    assert_eq!(link.expiration.as_deref(), Some("2030-01-01T00:00:00Z"));
}

#[tokio::test]
async fn test_bad_credentials_surface_plaid_error() {
    let base_url = spawn_mock_plaid().await;

    let err = client(base_url, "wrong-secret")
        .create_link_token("user-42")
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("INVALID_API_KEYS"));
}

#[tokio::test]
async fn test_exchange_public_token() {
    let base_url = spawn_mock_plaid().await;
    let plaid = client(base_url, SECRET);

    let exchange = plaid.exchange_public_token("public-sandbox-1").await.unwrap();
    assert_eq!(exchange.item_id, "item-1");
    assert_eq!(exchange.access_token, "access-sandbox-1");

    let err = plaid.exchange_public_token("public-expired").await.unwrap_err();
    match err {
        AggregatorError::Upstream {
            status,
            error_code,
            error_message,
            ..
        } => {
            assert_eq!(status, 400);
            assert_eq!(error_code, "INVALID_PUBLIC_TOKEN");
            assert_eq!(error_message, "provided public token is expired");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_transactions_single_page_preserves_fields() {
    let base_url = spawn_mock_plaid().await;

    let page = client(base_url, SECRET)
        .fetch_transactions("access-sandbox-1", window(), Page::default())
        .await
        .unwrap();
    assert_eq!(page.transactions.len(), MOCK_PAGE_CAP);
    assert_eq!(page.total_transactions, MOCK_TOTAL as u64);
    assert_eq!(page.transactions[0].extra["pending"], json!(false));
}

#[tokio::test]
async fn test_fetch_all_transactions_paginates() {
    let base_url = spawn_mock_plaid().await;

    let all = client(base_url, SECRET)
        .fetch_all_transactions("access-sandbox-1", window())
        .await
        .unwrap();
    assert_eq!(all.transactions.len(), MOCK_TOTAL);

    let ids: Vec<&str> = all
        .transactions
        .iter()
        .map(|t| t.transaction_id.as_str())
        .collect();
    assert_eq!(ids, ["txn-0", "txn-1", "txn-2", "txn-3", "txn-4"]);
}

#[tokio::test]
async fn test_unreachable_aggregator_is_transport_error() {
    // Nothing listens on the discard port
    let err = client("http://127.0.0.1:9".to_string(), SECRET)
        .create_link_token("user-42")
        .await
        .unwrap_err();
    assert!(matches!(err, AggregatorError::Transport(_)));
}
