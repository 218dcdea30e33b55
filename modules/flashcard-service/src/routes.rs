//! Axum route handlers for the card API.

use crate::service::{CardService, ServiceError};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, put};
use flashcard_types::*;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub struct AppState {
    pub service: Arc<CardService>,
    pub write_token: Option<String>,
    pub start_time: Instant,
}

pub fn router(state: Arc<AppState>, static_dir: PathBuf, cors: CorsLayer) -> Router {
    Router::new()
        .route("/cards", get(list_cards).post(create_cards))
        .route("/cards/:id", put(update_card).delete(delete_card))
        .route("/status", get(status))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
        .layer(cors)
}

/// CORS for the configured origin; `*` allows any.
pub fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if allowed_origin == "*" {
        return cors.allow_origin(Any);
    }
    match HeaderValue::from_str(allowed_origin) {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            log::warn!(
                "Invalid CARDS_ALLOWED_ORIGIN {:?}, cross-origin requests disabled",
                allowed_origin
            );
            cors
        }
    }
}

fn error(status: StatusCode, code: &str) -> Response {
    (status, Json(ErrorBody::new(code))).into_response()
}

fn service_error(e: ServiceError) -> Response {
    match e {
        ServiceError::InvalidPayload => error(StatusCode::BAD_REQUEST, "invalid_payload"),
        ServiceError::Store(e) => {
            log::error!("Card store error: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
        }
    }
}

fn tokens_match(given: &[u8], expected: &[u8]) -> bool {
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Check the bearer token on a mutation request.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim);

    match (token, state.write_token.as_deref()) {
        (Some(given), Some(expected)) if tokens_match(given.as_bytes(), expected.as_bytes()) => {
            Ok(())
        }
        _ => {
            log::warn!("Rejected unauthorized write request");
            Err(error(StatusCode::UNAUTHORIZED, "unauthorized"))
        }
    }
}

// GET /cards
pub async fn list_cards(State(state): State<Arc<AppState>>) -> Response {
    match state.service.list_all() {
        Ok(cards) => {
            let count = cards.len();
            (
                [(header::CACHE_CONTROL, "no-store")],
                Json(CardListing { cards, count }),
            )
                .into_response()
        }
        Err(e) => service_error(e),
    }
}

// POST /cards
pub async fn create_cards(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    let items = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Array(items)) => items,
        Ok(item) => vec![item],
        Err(e) => {
            log::debug!("Unparseable card payload: {}", e);
            return error(StatusCode::BAD_REQUEST, "invalid_payload");
        }
    };

    match state.service.create_or_upsert(&items).await {
        Ok(summary) => Json(UpsertResponse {
            ok: true,
            added: summary.added,
            total: summary.total,
        })
        .into_response(),
        Err(e) => service_error(e),
    }
}

// PUT /cards/:id
pub async fn update_card(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    let patch = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(patch)) => patch,
        _ => return error(StatusCode::BAD_REQUEST, "invalid_payload"),
    };

    match state.service.patch_by_id(&id, patch).await {
        Ok(true) => Json(MutationAck { ok: true, id }).into_response(),
        Ok(false) => error(StatusCode::NOT_FOUND, "not_found"),
        Err(e) => service_error(e),
    }
}

// DELETE /cards/:id
pub async fn delete_card(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    match state.service.delete_by_id(&id).await {
        Ok(true) => Json(MutationAck { ok: true, id }).into_response(),
        Ok(false) => error(StatusCode::NOT_FOUND, "not_found"),
        Err(e) => service_error(e),
    }
}

// GET /status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<ServiceStatus> {
    let total_cards = match state.service.list_all() {
        Ok(cards) => cards.len(),
        Err(e) => {
            log::error!("Card store error while reporting status: {}", e);
            0
        }
    };
    Json(ServiceStatus {
        running: true,
        uptime_secs: state.start_time.elapsed().as_secs(),
        total_cards,
        store_path: state.service.store_path().display().to_string(),
    })
}
