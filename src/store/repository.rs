//! Credential Store Repository
//!
//! Queries over the `users`, `bank_accounts` and `transactions` tables.
//! Access credentials are sealed on the way in and opened on the way out.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::crypto::CredentialCipher;

use super::models::{LinkedAccountRow, TransactionRow, UserRow};
use super::{
    DashboardStats, LinkedAccount, LoginMethod, NewTransaction, StoreResult, TransactionRecord,
    User,
};

/// Default page size for transaction listings
pub const DEFAULT_TRANSACTION_LIMIT: i64 = 100;

/// Window within which a user counts as active on the dashboard
const ACTIVE_USER_WINDOW_DAYS: i64 = 7;

const USER_COLUMNS: &str = "id, email, name, login_method, created_at";

const ACCOUNT_COLUMNS: &str =
    "id, user_id, plaid_item_id, plaid_access_token, account_name, account_type, created_at";

const TRANSACTION_COLUMNS: &str =
    "id, user_id, account_id, plaid_transaction_id, amount, category, merchant, date, created_at";

/// Store for users, linked accounts and transactions
#[derive(Debug, Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
    cipher: CredentialCipher,
}

impl CredentialStore {
    /// Create a new store over a migrated pool
    pub fn new(pool: SqlitePool, cipher: CredentialCipher) -> Self {
        Self { pool, cipher }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Create a user; fails with `Conflict` if the email is taken
    pub async fn create_user(&self, email: &str, name: &str) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (email, name, login_method, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(email)
        .bind(name)
        .bind(LoginMethod::Email.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(user_id = id, "User created");
        Ok(id)
    }

    pub async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    pub async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    /// Record the latest login method; returns rows affected (0 if absent)
    pub async fn update_user_login_method(
        &self,
        user_id: i64,
        method: LoginMethod,
    ) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE users SET login_method = ? WHERE id = ?")
            .bind(method.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// All users, newest first
    pub async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    // =========================================================================
    // Linked accounts
    // =========================================================================

    /// Persist a linked account, sealing its access credential
    pub async fn save_linked_account(
        &self,
        user_id: i64,
        item_id: &str,
        access_credential: &str,
        name: &str,
        account_type: &str,
    ) -> StoreResult<i64> {
        let sealed = self.cipher.seal(access_credential)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO bank_accounts
                (user_id, plaid_item_id, plaid_access_token, account_name, account_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(&sealed)
        .bind(name)
        .bind(account_type)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(account_id = id, user_id, item_id, "Linked account saved");
        Ok(id)
    }

    /// Linked accounts, newest first, optionally for one user
    pub async fn list_linked_accounts(
        &self,
        user_id: Option<i64>,
    ) -> StoreResult<Vec<LinkedAccount>> {
        let rows: Vec<LinkedAccountRow> = match user_id {
            Some(user_id) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM bank_accounts WHERE user_id = ? ORDER BY created_at DESC, id DESC",
                    ACCOUNT_COLUMNS
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM bank_accounts ORDER BY created_at DESC, id DESC",
                    ACCOUNT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(|row| self.open_account(row)).collect()
    }

    pub async fn get_linked_account(&self, id: i64) -> StoreResult<Option<LinkedAccount>> {
        let row: Option<LinkedAccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bank_accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| self.open_account(row)).transpose()
    }

    fn open_account(&self, row: LinkedAccountRow) -> StoreResult<LinkedAccount> {
        Ok(LinkedAccount {
            id: row.id,
            user_id: row.user_id,
            item_id: row.plaid_item_id,
            access_credential: self.cipher.open(&row.plaid_access_token)?,
            name: row.account_name,
            account_type: row.account_type,
            created_at: row.created_at,
        })
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Persist one transaction; a repeated aggregator id for the same account is a `Conflict`
    pub async fn save_transaction(
        &self,
        user_id: i64,
        account_id: i64,
        transaction: &NewTransaction,
    ) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO transactions
                (user_id, account_id, plaid_transaction_id, amount, category, merchant, date, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(account_id)
        .bind(&transaction.aggregator_transaction_id)
        .bind(transaction.amount.to_string())
        .bind(&transaction.category)
        .bind(&transaction.merchant)
        .bind(transaction.date)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Persist a fetched batch atomically, skipping transactions already stored.
    /// Returns the number of new rows.
    pub async fn save_transactions(
        &self,
        user_id: i64,
        account_id: i64,
        transactions: &[NewTransaction],
    ) -> StoreResult<u64> {
        let ingested_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for transaction in transactions {
            let result = sqlx::query(
                r#"
                INSERT INTO transactions
                    (user_id, account_id, plaid_transaction_id, amount, category, merchant, date, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (account_id, plaid_transaction_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(account_id)
            .bind(&transaction.aggregator_transaction_id)
            .bind(transaction.amount.to_string())
            .bind(&transaction.category)
            .bind(&transaction.merchant)
            .bind(transaction.date)
            .bind(ingested_at)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        tracing::info!(
            user_id,
            account_id,
            fetched = transactions.len(),
            inserted,
            "Transaction batch stored"
        );
        Ok(inserted)
    }

    /// Transactions by date, newest first, optionally for one user
    pub async fn list_transactions(
        &self,
        user_id: Option<i64>,
        limit: i64,
    ) -> StoreResult<Vec<TransactionRecord>> {
        let rows: Vec<TransactionRow> = match user_id {
            Some(user_id) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM transactions WHERE user_id = ? ORDER BY date DESC, id DESC LIMIT ?",
                    TRANSACTION_COLUMNS
                ))
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM transactions ORDER BY date DESC, id DESC LIMIT ?",
                    TRANSACTION_COLUMNS
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(TransactionRecord::try_from).collect()
    }

    // =========================================================================
    // Dashboard
    // =========================================================================

    /// Totals plus users created within the last seven days of `now`
    pub async fn dashboard_stats(&self, now: DateTime<Utc>) -> StoreResult<DashboardStats> {
        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let total_linked_accounts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bank_accounts")
            .fetch_one(&self.pool)
            .await?;

        let total_transactions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await?;

        let cutoff = now - Duration::days(ACTIVE_USER_WINDOW_DAYS);
        let active_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE created_at > ?")
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await?;

        Ok(DashboardStats {
            total_users,
            total_linked_accounts,
            total_transactions,
            active_users,
        })
    }
}
