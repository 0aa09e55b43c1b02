// HTTP API for the webhook relay
//
// Routes:
// - POST   /api/webhooks                 register (rate limited)
// - GET    /api/webhooks                 list
// - PUT    /api/webhooks/{id}            update
// - DELETE /api/webhooks/{id}            remove
// - GET    /api/webhooks/{id}/deliveries delivery log
// - POST   /api/events                   dispatch
// - GET    /health, GET /metrics

pub mod error;
pub mod handlers;
pub mod rate_limit;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::rate_limit::RegistrationLimiter;
use crate::webhooks::{HttpTransport, WebhookService};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: WebhookService,
    pub limiter: Arc<RegistrationLimiter>,
}

impl AppState {
    pub fn new(service: WebhookService, limiter: RegistrationLimiter) -> Self {
        Self {
            service,
            limiter: Arc::new(limiter),
        }
    }

    /// Build the production state: reqwest transport plus configured limits
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config.delivery.request_timeout())
            .context("Failed to build HTTP client")?;
        let service = WebhookService::new(Arc::new(transport), config.delivery.retry_config());
        Ok(Self::new(service, RegistrationLimiter::new(&config.rate_limit)))
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    // route_layer only wraps the handlers added before it, so GET stays unlimited
    let webhooks = post(handlers::register_webhook)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_registrations,
        ))
        .get(handlers::list_webhooks);

    Router::new()
        .route("/api/webhooks", webhooks)
        .route(
            "/api/webhooks/{id}",
            put(handlers::update_webhook).delete(handlers::delete_webhook),
        )
        .route("/api/webhooks/{id}/deliveries", get(handlers::delivery_log))
        .route("/api/events", post(handlers::ingest_event))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> Result<()> {
    crate::metrics::init().context("Failed to initialize metrics")?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", listener.local_addr().unwrap_or(addr));

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .context("API server error")?;

    info!("API server stopped");
    Ok(())
}
