mod http;

use axum::Router;
use axum::http::{Method, header};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};

use metacache_engine::QueryService;

#[derive(Clone)]
pub(crate) struct AppState {
    query: QueryService,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bind api :{port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("axum serve: {0}")]
    Serve(std::io::Error),
}

/// Metadata lookup HTTP API server.
pub async fn run(port: u16, query: QueryService) -> Result<(), ApiError> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|source| ApiError::Bind { port, source })?;
    tracing::info!(port, "api server listening");

    axum::serve(listener, router(query))
        .await
        .map_err(ApiError::Serve)
}

/// Routes + CORS, without a listener.
pub fn router(query: QueryService) -> Router {
    let state = AppState { query };

    Router::new()
        .route("/health", get(http::handle_health))
        .route("/metadata", get(http::handle_metadata))
        .layer(cors_layer())
        .with_state(state)
}

// Any origin; credentials are not allowed together with a wildcard origin.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::HEAD,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
