//! Aggregator Client Adapter
//!
//! Thin call-through to the financial-data aggregator: link sessions, public
//! token exchange, balances and transactions. No retries and no timeout
//! overrides; every call is one request and one response.

mod error;
mod plaid;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::NewTransaction;

pub use error::{AggregatorError, AggregatorResult};
pub use plaid::{PlaidClient, PlaidSettings};

/// Trailing window used when a caller names no dates
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Page size used when a caller names none
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page the aggregator serves
pub const MAX_PAGE_SIZE: u32 = 500;

/// Aggregator deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaidEnvironment {
    Sandbox,
    Production,
}

impl PlaidEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            PlaidEnvironment::Sandbox => "https://sandbox.plaid.com",
            PlaidEnvironment::Production => "https://production.plaid.com",
        }
    }
}

impl fmt::Display for PlaidEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaidEnvironment::Sandbox => f.write_str("sandbox"),
            PlaidEnvironment::Production => f.write_str("production"),
        }
    }
}

impl FromStr for PlaidEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(PlaidEnvironment::Sandbox),
            "production" => Ok(PlaidEnvironment::Production),
            other => Err(format!("Unknown Plaid environment: {}", other)),
        }
    }
}

/// Inclusive date range for a transaction fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// `days` days up to and including `today`
    pub fn trailing_days(days: i64, today: NaiveDate) -> Self {
        Self {
            start: today - Duration::days(days),
            end: today,
        }
    }

    /// Trailing thirty days ending today (UTC)
    pub fn trailing_default() -> Self {
        Self::trailing_days(DEFAULT_WINDOW_DAYS, Utc::now().date_naive())
    }
}

/// Pagination passed through to the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub count: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            count: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkToken {
    pub link_token: String,
    #[serde(default)]
    pub expiration: Option<String>,
}

/// Long-lived credential obtained from a public token
#[derive(Clone, Deserialize)]
pub struct TokenExchange {
    pub access_token: String,
    pub item_id: String,
}

impl fmt::Debug for TokenExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExchange")
            .field("access_token", &"[REDACTED]")
            .field("item_id", &self.item_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalFinanceCategory {
    pub primary: String,
    #[serde(default)]
    pub detailed: Option<String>,
}

/// One transaction as reported by the aggregator. Fields this service does
/// not interpret are carried in `extra` so responses pass through intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorTransaction {
    pub transaction_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub category: Option<Vec<String>>,
    #[serde(default)]
    pub personal_finance_category: Option<PersonalFinanceCategory>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AggregatorTransaction {
    /// Shape used by the credential store
    pub fn to_new_transaction(&self) -> NewTransaction {
        let category = self
            .personal_finance_category
            .as_ref()
            .map(|pfc| pfc.primary.clone())
            .or_else(|| self.category.as_ref().and_then(|c| c.first().cloned()));

        NewTransaction {
            aggregator_transaction_id: self.transaction_id.clone(),
            amount: self.amount,
            category,
            merchant: self.merchant_name.clone().or_else(|| self.name.clone()),
            date: self.date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionsPage {
    #[serde(default)]
    pub accounts: Vec<Value>,
    pub transactions: Vec<AggregatorTransaction>,
    pub total_transactions: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Remote financial-data aggregator
#[async_trait]
pub trait Aggregator: Send + Sync {
    /// Start a link session scoped to `client_user_id`
    async fn create_link_token(&self, client_user_id: &str) -> AggregatorResult<LinkToken>;

    /// One-shot exchange of a single-use public token
    async fn exchange_public_token(&self, public_token: &str) -> AggregatorResult<TokenExchange>;

    async fn fetch_balances(&self, access_token: &str) -> AggregatorResult<Value>;

    async fn fetch_transactions(
        &self,
        access_token: &str,
        window: DateWindow,
        page: Page,
    ) -> AggregatorResult<TransactionsPage>;

    /// Fetch every page in `window`, stopping early if the aggregator
    /// returns an empty page before `total_transactions` is reached.
    async fn fetch_all_transactions(
        &self,
        access_token: &str,
        window: DateWindow,
    ) -> AggregatorResult<TransactionsPage> {
        let mut page = Page {
            count: MAX_PAGE_SIZE,
            offset: 0,
        };
        let mut collected = self.fetch_transactions(access_token, window, page).await?;

        while (collected.transactions.len() as u64) < collected.total_transactions {
            page.offset = collected.transactions.len() as u32;
            let next = self.fetch_transactions(access_token, window, page).await?;
            if next.transactions.is_empty() {
                tracing::warn!(
                    fetched = collected.transactions.len(),
                    total = collected.total_transactions,
                    "Aggregator returned an empty page before the reported total"
                );
                break;
            }
            collected.transactions.extend(next.transactions);
        }

        Ok(collected)
    }
}
