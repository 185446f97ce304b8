use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error};

use client::backend::{BackendError, QueryOptions};
use common::util;

use super::server::ApiState;

const CORS_HEADERS: [(HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, PUT, DELETE, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization"),
];

/// Raw cartridge bytes for the emulator, fetched once and then served from
/// the content-addressed cache.
pub async fn get_cartridge(State(state): State<ApiState>, Path(cartridge_id): Path<String>) -> Response {
    let id = util::normalize_id(&cartridge_id);
    debug!("Serving cartridge {}", id);

    match state.backend.cartridge(&id, QueryOptions::force_cache()).await {
        Ok(data) if !data.is_empty() => (
            StatusCode::OK,
            CORS_HEADERS,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            data,
        )
            .into_response(),
        Ok(_) | Err(BackendError::NotFound(_)) => {
            error!("Cartridge {} not found", id);
            failure(format!("Cartridge {} not found!", id))
        }
        Err(err) => {
            error!("Failed to fetch cartridge {}: {:?}", id, err);
            failure(err.to_string())
        }
    }
}

pub async fn cartridge_preflight() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, CORS_HEADERS)
}

fn failure(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        CORS_HEADERS,
        Json(json!({ "error": message })),
    )
        .into_response()
}
