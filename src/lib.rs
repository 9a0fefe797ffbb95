//! CashAI backend library
//!
//! Re-exports modules for integration testing and the server binary.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod session;
pub mod store;

mod error;

pub use api::{build_router, AppState};
pub use config::Config;
pub use error::{AppError, AppResult};
