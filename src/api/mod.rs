//! API module
//!
//! HTTP endpoints, the operator dashboard and middleware.

pub mod dashboard;
pub mod extract;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::session::SessionTokens;
use crate::store::CredentialStore;

pub use routes::create_router;

/// Process-wide state shared by every handler. Built once at start-up and
/// dropped at shutdown.
#[derive(Clone)]
pub struct AppState {
    pub store: CredentialStore,
    pub sessions: Arc<SessionTokens>,
    pub aggregator: Arc<dyn Aggregator>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: CredentialStore,
        sessions: SessionTokens,
        aggregator: Arc<dyn Aggregator>,
        config: Config,
    ) -> Self {
        Self {
            store,
            sessions: Arc::new(sessions),
            aggregator,
            config: Arc::new(config),
        }
    }
}

/// Build the application router with its middleware stack
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    // Layers run last-added first: cors -> trace -> logging -> session -> handler
    create_router()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::session_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS policy from configured origins; `*` allows any origin
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(allowed)
}
