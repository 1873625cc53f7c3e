use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use metacache_engine::QueryError;

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  REST: GET /health
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "hi": "hello" }))
}

// ═══════════════════════════════════════════════════════════════
//  REST: GET /metadata?username=X
// ═══════════════════════════════════════════════════════════════

const USERNAME_PARAM: &str = "username";

/// Raw pairs so a repeated `username` resolves to its first value.
pub(crate) async fn handle_metadata(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let username = params
        .iter()
        .find(|(key, _)| key == USERNAME_PARAM)
        .map(|(_, value)| value.as_str());
    match state.query.lookup(username) {
        Ok(record) => Json(record.as_ref()).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: QueryError) -> Response {
    let status = match e {
        QueryError::BadRequest => StatusCode::BAD_REQUEST,
        QueryError::NotFound => StatusCode::NOT_FOUND,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}
