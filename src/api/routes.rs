//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::aggregator::{DateWindow, Page, DEFAULT_PAGE_SIZE, DEFAULT_WINDOW_DAYS, MAX_PAGE_SIZE};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::session::SessionClaims;
use crate::store::{
    LinkedAccount, LoginMethod, NewTransaction, StoreError, User, DEFAULT_TRANSACTION_LIMIT,
};

use super::extract::JsonBody;
use super::{dashboard, AppState};

/// Upper bound for cached transaction listings
const MAX_TRANSACTION_LIMIT: i64 = 500;

const DEFAULT_ACCOUNT_NAME: &str = "Bank account";
const DEFAULT_ACCOUNT_TYPE: &str = "depository";

const SESSION_REQUIRED: &str = "A session token is required";

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateLinkTokenRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateLinkTokenResponse {
    pub link_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExchangePublicTokenRequest {
    #[serde(default)]
    pub public_token: Option<String>,
    /// Identifies the owner when no session token is presented
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub login_method: Option<LoginMethod>,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExchangePublicTokenResponse {
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Session token issued when this exchange registered the user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BalancesRequest {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub account_id: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FetchTransactionsRequest {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub all_pages: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VerifyTokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OAuthCallbackQuery {
    #[serde(default)]
    pub oauth_state_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/users", get(list_users))
        .route("/api/accounts", get(list_accounts))
        .route("/api/create-link-token", post(create_link_token))
        .route("/api/exchange-public-token", post(exchange_public_token))
        .route("/api/balances", post(get_balances))
        .route(
            "/api/transactions",
            post(fetch_transactions).get(list_transactions),
        )
        .route("/api/verify-token", post(verify_token))
        .route("/plaid-oauth-callback", get(oauth_callback))
        .route("/dashboard", get(dashboard::dashboard))
}

// =========================================================================
// GET / and /health
// =========================================================================

async fn root() -> Json<Value> {
    Json(json!({ "message": "CashAI Backend is running!" }))
}

/// Reports database connectivity for load balancers
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let database = match db::verify_connection(state.store.pool()).await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            "disconnected"
        }
    };

    Json(json!({
        "status": if database == "connected" { "healthy" } else { "unhealthy" },
        "database": database,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =========================================================================
// GET /api/users, /api/accounts
// =========================================================================

async fn list_users(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let users = state.store.list_users().await?;

    Ok(Json(json!({
        "message": "Database is connected!",
        "data": users,
    })))
}

/// Linked accounts of the session user; credentials are never included
async fn list_accounts(
    State(state): State<AppState>,
    session: Option<Extension<SessionClaims>>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    let user_id = listing_owner(session, query.user_id)?;
    let accounts = state.store.list_linked_accounts(Some(user_id)).await?;

    Ok(Json(json!({ "accounts": accounts })))
}

/// Per-user listings require a session; `?user_id=` may only name the session user
fn listing_owner(
    session: Option<Extension<SessionClaims>>,
    requested: Option<i64>,
) -> AppResult<i64> {
    let Some(Extension(claims)) = session else {
        return Err(AppError::unauthorized(SESSION_REQUIRED));
    };

    match requested {
        Some(user_id) if user_id != claims.user_id => Err(AppError::unauthorized(
            "user_id does not match the session user",
        )),
        _ => Ok(claims.user_id),
    }
}

// =========================================================================
// POST /api/create-link-token
// =========================================================================

async fn create_link_token(
    State(state): State<AppState>,
    session: Option<Extension<SessionClaims>>,
    JsonBody(request): JsonBody<CreateLinkTokenRequest>,
) -> AppResult<Json<CreateLinkTokenResponse>> {
    let requested = request.user_id;
    let client_user_id = match session {
        Some(Extension(claims)) => claims.user_id.to_string(),
        None => requested
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
    };

    let link = state
        .aggregator
        .create_link_token(&client_user_id)
        .await
        .map_err(AppError::upstream(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create link token",
        ))?;

    Ok(Json(CreateLinkTokenResponse {
        link_token: link.link_token,
        expiration: link.expiration,
    }))
}

// =========================================================================
// POST /api/exchange-public-token
// =========================================================================

async fn exchange_public_token(
    State(state): State<AppState>,
    session: Option<Extension<SessionClaims>>,
    JsonBody(request): JsonBody<ExchangePublicTokenRequest>,
) -> AppResult<Json<ExchangePublicTokenResponse>> {
    let public_token = required(request.public_token.as_deref(), "public_token is required")?;

    let email = request
        .email
        .as_deref()
        .map(|email| email.trim().to_lowercase())
        .filter(|email| !email.is_empty());
    if email.as_deref().is_some_and(|email| !email.contains('@')) {
        return Err(AppError::validation("email is invalid"));
    }

    let claims = session.map(|Extension(claims)| claims);
    // Resolved before the single-use public token is spent
    let owner = resolve_link_owner(&state, claims.as_ref(), email.as_deref()).await?;

    let exchange = state
        .aggregator
        .exchange_public_token(public_token)
        .await
        .map_err(AppError::upstream(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to exchange public token",
        ))?;

    tracing::info!(item_id = %exchange.item_id, "Public token exchanged");

    let (owner, token) = match owner {
        LinkOwner::Session(user) => (Some(user), None),
        LinkOwner::NewUser(email) => {
            let (user, token) = register_link_user(&state, &email, &request).await?;
            (Some(user), Some(token))
        }
        LinkOwner::Anonymous => (None, None),
    };

    let (account_id, user_id) = match &owner {
        Some(user) => {
            let account_id = state
                .store
                .save_linked_account(
                    user.id,
                    &exchange.item_id,
                    &exchange.access_token,
                    non_blank(request.account_name.as_deref()).unwrap_or(DEFAULT_ACCOUNT_NAME),
                    non_blank(request.account_type.as_deref()).unwrap_or(DEFAULT_ACCOUNT_TYPE),
                )
                .await?;
            (Some(account_id), Some(user.id))
        }
        None => {
            tracing::warn!(
                item_id = %exchange.item_id,
                "Exchange has no session or email; linked account not persisted"
            );
            (None, None)
        }
    };

    let access_token = state
        .config
        .echo_access_token
        .then(|| exchange.access_token.clone());

    Ok(Json(ExchangePublicTokenResponse {
        item_id: exchange.item_id,
        account_id,
        user_id,
        token,
        access_token,
    }))
}

/// Who a public token exchange is attributed to
enum LinkOwner {
    /// User proven by the session token
    Session(User),
    /// Unregistered email; the user is created once the exchange succeeds
    NewUser(String),
    Anonymous,
}

/// A registered email is not proof of identity: linking for an existing
/// user requires that user's session.
async fn resolve_link_owner(
    state: &AppState,
    claims: Option<&SessionClaims>,
    email: Option<&str>,
) -> AppResult<LinkOwner> {
    if let Some(claims) = claims {
        if let Some(user) = state.store.get_user_by_id(claims.user_id).await? {
            return Ok(LinkOwner::Session(user));
        }
        tracing::warn!(user_id = claims.user_id, "Session names an unknown user");
    }

    let Some(email) = email else {
        return Ok(LinkOwner::Anonymous);
    };

    if state.store.get_user_by_email(email).await?.is_some() {
        tracing::warn!("Exchange names a registered email without its session");
        return Err(AppError::unauthorized(SESSION_REQUIRED));
    }

    Ok(LinkOwner::NewUser(email.to_string()))
}

/// Create the user named by a first link and issue their session token
async fn register_link_user(
    state: &AppState,
    email: &str,
    request: &ExchangePublicTokenRequest,
) -> AppResult<(User, String)> {
    let name = non_blank(request.name.as_deref()).unwrap_or_default();
    let id = match state.store.create_user(email, name).await {
        Ok(id) => id,
        // Registered concurrently by another request
        Err(StoreError::Conflict(_)) => return Err(AppError::unauthorized(SESSION_REQUIRED)),
        Err(e) => return Err(e.into()),
    };

    if let Some(method) = request.login_method {
        state.store.update_user_login_method(id, method).await?;
    }

    let user = state
        .store
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::Internal("user vanished after creation".to_string()))?;
    tracing::info!(user_id = user.id, "User created on first link");

    let token = state.sessions.issue(&user)?;
    Ok((user, token))
}

// =========================================================================
// POST /api/balances
// =========================================================================

async fn get_balances(
    State(state): State<AppState>,
    session: Option<Extension<SessionClaims>>,
    JsonBody(request): JsonBody<BalancesRequest>,
) -> AppResult<Json<Value>> {
    let claims = session.map(|Extension(claims)| claims);
    let credential = resolve_credential(
        &state,
        claims.as_ref(),
        request.access_token.as_deref(),
        request.account_id,
    )
    .await?;

    let balances = state
        .aggregator
        .fetch_balances(credential.access_token())
        .await
        .map_err(AppError::upstream(
            StatusCode::BAD_REQUEST,
            "Failed to fetch balances",
        ))?;

    tracing::info!("Balances fetched successfully");
    Ok(Json(balances))
}

// =========================================================================
// POST /api/transactions
// =========================================================================

async fn fetch_transactions(
    State(state): State<AppState>,
    session: Option<Extension<SessionClaims>>,
    JsonBody(request): JsonBody<FetchTransactionsRequest>,
) -> AppResult<Json<Value>> {
    let claims = session.map(|Extension(claims)| claims);
    let credential = resolve_credential(
        &state,
        claims.as_ref(),
        request.access_token.as_deref(),
        request.account_id,
    )
    .await?;

    let window = transaction_window(
        request.start_date,
        request.end_date,
        Utc::now().date_naive(),
    )?;

    let result = if request.all_pages {
        state
            .aggregator
            .fetch_all_transactions(credential.access_token(), window)
            .await
    } else {
        let page = Page {
            count: request
                .count
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            offset: request.offset.unwrap_or(0),
        };
        state
            .aggregator
            .fetch_transactions(credential.access_token(), window, page)
            .await
    };
    let page = result.map_err(AppError::upstream(
        StatusCode::BAD_REQUEST,
        "Failed to fetch transactions",
    ))?;

    tracing::info!(
        fetched = page.transactions.len(),
        total = page.total_transactions,
        "Transactions fetched successfully"
    );

    let stored = match &credential {
        Credential::Stored(account) => {
            let batch: Vec<NewTransaction> = page
                .transactions
                .iter()
                .map(|txn| txn.to_new_transaction())
                .collect();
            Some(
                state
                    .store
                    .save_transactions(account.user_id, account.id, &batch)
                    .await?,
            )
        }
        Credential::Presented(_) => None,
    };

    let mut body = serde_json::to_value(&page).map_err(|e| AppError::Internal(e.to_string()))?;
    if let (Some(stored), Some(object)) = (stored, body.as_object_mut()) {
        object.insert("stored".to_string(), json!(stored));
    }

    Ok(Json(body))
}

/// Fetch window: the trailing thirty days unless the caller names dates
fn transaction_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> AppResult<DateWindow> {
    let end = end.unwrap_or(today);
    let start = start.unwrap_or(end - Duration::days(DEFAULT_WINDOW_DAYS));

    if start > end {
        return Err(AppError::validation("start_date must not be after end_date"));
    }

    Ok(DateWindow { start, end })
}

// =========================================================================
// GET /api/transactions
// =========================================================================

/// Cached transactions of the session user
async fn list_transactions(
    State(state): State<AppState>,
    session: Option<Extension<SessionClaims>>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    let user_id = listing_owner(session, query.user_id)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
        .clamp(1, MAX_TRANSACTION_LIMIT);

    let transactions = state.store.list_transactions(Some(user_id), limit).await?;

    Ok(Json(json!({ "transactions": transactions })))
}

// =========================================================================
// Credential resolution
// =========================================================================

enum Credential {
    /// Raw access token sent by the client
    Presented(String),
    /// Linked account owned by the session user
    Stored(LinkedAccount),
}

impl Credential {
    fn access_token(&self) -> &str {
        match self {
            Credential::Presented(token) => token,
            Credential::Stored(account) => &account.access_credential,
        }
    }
}

async fn resolve_credential(
    state: &AppState,
    claims: Option<&SessionClaims>,
    access_token: Option<&str>,
    account_id: Option<i64>,
) -> AppResult<Credential> {
    if let Some(token) = non_blank(access_token) {
        return Ok(Credential::Presented(token.to_string()));
    }

    let Some(account_id) = account_id else {
        return Err(AppError::validation("access_token is required"));
    };

    let claims = claims.ok_or_else(|| AppError::unauthorized(SESSION_REQUIRED))?;

    match state.store.get_linked_account(account_id).await? {
        Some(account) if account.user_id == claims.user_id => Ok(Credential::Stored(account)),
        _ => Err(AppError::NotFound("Linked account not found".to_string())),
    }
}

// =========================================================================
// POST /api/verify-token
// =========================================================================

async fn verify_token(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<VerifyTokenRequest>,
) -> AppResult<Json<Value>> {
    let token = non_blank(request.token.as_deref())
        .ok_or_else(|| AppError::unauthorized("Token is required"))?;

    let claims = state
        .sessions
        .verify(token)
        .ok_or_else(|| AppError::unauthorized("Invalid token"))?;

    Ok(Json(json!({ "valid": true, "user": claims })))
}

// =========================================================================
// GET /plaid-oauth-callback
// =========================================================================

/// Hand control back to the mobile app after the bank's OAuth flow
async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Redirect {
    let target = oauth_redirect_target(&state.config.mobile_redirect_uri, &query);
    Redirect::to(&target)
}

/// Deep link carrying `success`, `error` and `oauth_state_id`
pub fn oauth_redirect_target(base: &str, query: &OAuthCallbackQuery) -> String {
    let mut params: Vec<(&str, &str)> = Vec::new();

    match non_blank(query.error.as_deref()) {
        Some(error) => {
            tracing::warn!(error, "OAuth flow returned an error");
            params.push(("success", "false"));
            params.push(("error", error));
        }
        None => {
            tracing::info!("OAuth flow completed");
            params.push(("success", "true"));
        }
    }

    if let Some(state_id) = non_blank(query.oauth_state_id.as_deref()) {
        params.push(("oauth_state_id", state_id));
    }

    let encoded = serde_urlencoded::to_string(&params).unwrap_or_default();
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, encoded)
}

// =========================================================================
// Helpers
// =========================================================================

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: Option<&'a str>, message: &str) -> AppResult<&'a str> {
    non_blank(value).ok_or_else(|| AppError::validation(message))
}
