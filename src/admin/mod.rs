//! # Admin HTTP API
//!
//! CRUD over users, products, orders and notifications. Everything under
//! `/api` except the public product list requires `Authorization: Bearer <token>`.

pub mod error;
pub mod handlers;

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::{self, Next},
    response::Response,
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::store::{CatalogStore, UserStore};

pub use error::{ApiError, AppResult};

/// Shared state of every admin handler
#[derive(Clone)]
pub struct AdminState {
    pub users: Arc<dyn UserStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub token: Arc<str>,
}

impl AdminState {
    pub fn new(users: Arc<dyn UserStore>, catalog: Arc<dyn CatalogStore>, token: &str) -> Self {
        Self {
            users,
            catalog,
            token: Arc::from(token),
        }
    }
}

/// Missing header is 401, a wrong token is 403
async fn require_bearer(
    State(state): State<AdminState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or(ApiError::Unauthorized)?;
    let token = header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(ApiError::Unauthorized)?;

    if token != state.token.as_ref() {
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(request).await)
}

pub fn router(state: AdminState) -> Router {
    let protected = Router::new()
        .route("/api/dashboard/stats", get(handlers::dashboard_stats))
        .route("/api/users", get(handlers::list_users))
        .route(
            "/api/users/:id",
            get(handlers::get_user).put(handlers::update_user),
        )
        .route(
            "/api/admin/products",
            get(handlers::list_all_products).post(handlers::create_product),
        )
        .route(
            "/api/admin/products/:id",
            put(handlers::update_product).delete(handlers::delete_product),
        )
        .route("/api/orders", get(handlers::list_orders))
        .route("/api/orders/:id/status", put(handlers::update_order_status))
        .route(
            "/api/notifications",
            get(handlers::list_notifications).post(handlers::create_notification),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/products", get(handlers::list_active_products))
        .merge(protected)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the admin API until the task is aborted
pub async fn serve(state: AdminState, port: u16) -> Result<()> {
    let address = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind admin API to {address}"))?;
    info!(address = %address, "Admin API listening");
    axum::serve(listener, router(state))
        .await
        .context("Admin API server stopped")
}
