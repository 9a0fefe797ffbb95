//! Plaid implementation of the aggregator adapter

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;

use super::{
    Aggregator, AggregatorError, AggregatorResult, DateWindow, LinkToken, Page, TokenExchange,
    TransactionsPage,
};

const PRODUCTS: &[&str] = &["auth", "transactions"];
const COUNTRY_CODES: &[&str] = &["US"];
const LANGUAGE: &str = "en";

/// Connection settings for the Plaid API
#[derive(Clone)]
pub struct PlaidSettings {
    pub base_url: String,
    pub client_id: String,
    pub secret: String,
    pub client_name: String,
    pub redirect_uri: Option<String>,
}

impl PlaidSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.plaid_base_url(),
            client_id: config.plaid_client_id.clone(),
            secret: config.plaid_secret.clone(),
            client_name: config.plaid_client_name.clone(),
            redirect_uri: config.plaid_redirect_uri.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LinkUser<'a> {
    client_user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct LinkTokenRequest<'a> {
    client_name: &'a str,
    user: LinkUser<'a>,
    products: &'a [&'a str],
    country_codes: &'a [&'a str],
    language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
}

#[derive(Serialize)]
struct PublicTokenRequest<'a> {
    public_token: &'a str,
}

#[derive(Serialize)]
struct AccessTokenRequest<'a> {
    access_token: &'a str,
}

#[derive(Serialize)]
struct TransactionsRequest<'a> {
    access_token: &'a str,
    start_date: String,
    end_date: String,
    options: Page,
}

/// Error body returned by Plaid on any non-2xx response
#[derive(Debug, Deserialize)]
struct PlaidErrorBody {
    error_type: String,
    error_code: String,
    error_message: String,
    #[serde(default)]
    display_message: Option<String>,
}

/// Plaid HTTPS client
pub struct PlaidClient {
    http: reqwest::Client,
    settings: PlaidSettings,
}

impl PlaidClient {
    pub fn new(settings: PlaidSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(PlaidSettings::from_config(config))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> AggregatorResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let res = self
            .http
            .post(self.url(path))
            .header("PLAID-CLIENT-ID", &self.settings.client_id)
            .header("PLAID-SECRET", &self.settings.secret)
            .json(body)
            .send()
            .await
            .inspect_err(|err| {
                tracing::error!(path, "Error occurred in request to Plaid: {:#?}", err);
            })?;

        let status = res.status();
        let bytes = res.bytes().await?;

        if !status.is_success() {
            let err = upstream_error(status, &bytes);
            tracing::warn!(
                path,
                status = status.as_u16(),
                error_code = err.code().unwrap_or_default(),
                "Plaid returned an error"
            );
            return Err(err);
        }

        serde_json::from_slice(&bytes).map_err(|err| {
            tracing::error!(path, "Error occurred while deserialising Plaid response: {}", err);
            AggregatorError::Decode(err.to_string())
        })
    }
}

/// Map a non-success response to `AggregatorError::Upstream`
fn upstream_error(status: StatusCode, body: &[u8]) -> AggregatorError {
    match serde_json::from_slice::<PlaidErrorBody>(body) {
        Ok(parsed) => AggregatorError::Upstream {
            status: status.as_u16(),
            error_type: parsed.error_type,
            error_code: parsed.error_code,
            error_message: parsed.error_message,
            display_message: parsed.display_message,
        },
        Err(_) => AggregatorError::Upstream {
            status: status.as_u16(),
            error_type: "API_ERROR".to_string(),
            error_code: format!("HTTP_{}", status.as_u16()),
            error_message: String::from_utf8_lossy(body).chars().take(200).collect(),
            display_message: None,
        },
    }
}

#[async_trait]
impl Aggregator for PlaidClient {
    async fn create_link_token(&self, client_user_id: &str) -> AggregatorResult<LinkToken> {
        let request = LinkTokenRequest {
            client_name: &self.settings.client_name,
            user: LinkUser { client_user_id },
            products: PRODUCTS,
            country_codes: COUNTRY_CODES,
            language: LANGUAGE,
            redirect_uri: self.settings.redirect_uri.as_deref(),
        };

        tracing::info!(client_user_id, products = ?PRODUCTS, "Creating link token");
        self.post("/link/token/create", &request).await
    }

    async fn exchange_public_token(&self, public_token: &str) -> AggregatorResult<TokenExchange> {
        tracing::info!("Exchanging public token");
        self.post("/item/public_token/exchange", &PublicTokenRequest { public_token })
            .await
    }

    async fn fetch_balances(&self, access_token: &str) -> AggregatorResult<Value> {
        tracing::info!("Fetching balances");
        self.post("/accounts/balance/get", &AccessTokenRequest { access_token })
            .await
    }

    async fn fetch_transactions(
        &self,
        access_token: &str,
        window: DateWindow,
        page: Page,
    ) -> AggregatorResult<TransactionsPage> {
        let request = TransactionsRequest {
            access_token,
            start_date: window.start.format("%Y-%m-%d").to_string(),
            end_date: window.end.format("%Y-%m-%d").to_string(),
            options: page,
        };

        tracing::info!(
            start = %window.start,
            end = %window.end,
            count = page.count,
            offset = page.offset,
            "Fetching transactions"
        );
        self.post("/transactions/get", &request).await
    }
}
