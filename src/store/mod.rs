//! Credential Store module
//!
//! Persistence layer for users, linked bank accounts and cached
//! transactions. Pure data access over SQLite.

mod error;
mod models;
mod repository;

pub use error::{StoreError, StoreResult};
pub use models::{
    DashboardStats, LinkedAccount, LoginMethod, NewTransaction, TransactionRecord, User,
};
pub use repository::{CredentialStore, DEFAULT_TRANSACTION_LIMIT};
