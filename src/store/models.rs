//! Store models
//!
//! Records returned by the credential store and the raw rows they are
//! mapped from.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::StoreError;

/// How a user signed in most recently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    #[default]
    Email,
    Google,
    Apple,
}

impl LoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::Email => "email",
            LoginMethod::Google => "google",
            LoginMethod::Apple => "apple",
        }
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(LoginMethod::Email),
            "google" => Ok(LoginMethod::Google),
            "apple" => Ok(LoginMethod::Apple),
            other => Err(format!("Unknown login method: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub login_method: LoginMethod,
    pub created_at: DateTime<Utc>,
}

/// A bank connection created by a public token exchange.
///
/// The access credential is opened from its sealed form when loaded and is
/// never serialized.
#[derive(Clone, Serialize)]
pub struct LinkedAccount {
    pub id: i64,
    pub user_id: i64,
    pub item_id: String,
    #[serde(skip_serializing)]
    pub access_credential: String,
    pub name: String,
    pub account_type: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for LinkedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedAccount")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("item_id", &self.item_id)
            .field("access_credential", &"[REDACTED]")
            .field("name", &self.name)
            .field("account_type", &self.account_type)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Transaction as handed to the store for ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub aggregator_transaction_id: String,
    pub amount: Decimal,
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub user_id: i64,
    pub account_id: i64,
    pub aggregator_transaction_id: String,
    pub amount: Decimal,
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts rendered on the operator dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_linked_accounts: i64,
    pub total_transactions: i64,
    pub active_users: i64,
}

// =========================================================================
// Raw rows
// =========================================================================

#[derive(Debug, sqlx::FromRow)]
pub(super) struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub login_method: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let login_method = row.login_method.parse().map_err(StoreError::Corrupt)?;
        Ok(User {
            id: row.id,
            email: row.email,
            name: row.name,
            login_method,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct LinkedAccountRow {
    pub id: i64,
    pub user_id: i64,
    pub plaid_item_id: String,
    pub plaid_access_token: String,
    pub account_name: String,
    pub account_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct TransactionRow {
    pub id: i64,
    pub user_id: i64,
    pub account_id: i64,
    pub plaid_transaction_id: String,
    pub amount: String,
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let amount = row.amount.parse::<Decimal>().map_err(|e| {
            StoreError::Corrupt(format!("transaction {} amount: {}", row.id, e))
        })?;
        Ok(TransactionRecord {
            id: row.id,
            user_id: row.user_id,
            account_id: row.account_id,
            aggregator_transaction_id: row.plaid_transaction_id,
            amount,
            category: row.category,
            merchant: row.merchant,
            date: row.date,
            created_at: row.created_at,
        })
    }
}
