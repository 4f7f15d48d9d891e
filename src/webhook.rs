//! Webhook endpoint receiving Telegram updates.
//!
//! Each update is acknowledged immediately and handled on its own task, so a
//! long chunked transfer never holds the webhook response open.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bot::Bot;
use crate::rest_types::Update;

pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
pub struct AppState {
    bot: Arc<Bot>,
    secret_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(bot: Bot, secret_token: Option<String>) -> Self {
        Self {
            bot: Arc::new(bot),
            secret_token: secret_token.map(Arc::from),
        }
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(#[from] JsonRejection),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidUpdate(rejection) => rejection.status(),
        };
        let body = ErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(86400))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle_update))
        .route("/webhook", post(handle_update))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn handle_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    update: Result<Json<Update>, JsonRejection>,
) -> Result<&'static str, WebhookError> {
    if let Some(expected) = &state.secret_token {
        let provided = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(&**expected) {
            return Err(WebhookError::Unauthorized(
                "missing or wrong secret token".to_string(),
            ));
        }
    }

    // The body is only looked at once the caller is authenticated.
    let Json(update) = update?;
    tracing::debug!(update_id = update.update_id, "received update");

    let Some(message) = update.message else {
        return Ok("OK");
    };
    let Some(text) = message.text.filter(|t| !t.trim().is_empty()) else {
        return Ok("OK");
    };

    let chat = message.chat.id;
    let bot = state.bot.clone();
    tokio::spawn(async move {
        bot.handle_text(chat, &text).await;
    });

    Ok("OK")
}
