//! Route definitions for the Prism gateway.
//!
//! POST endpoints per model family plus a parameterized read-only
//! conversation endpoint and a health check. Error bodies are structured
//! `{error, code}` JSON.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::dispatch::{Dispatcher, TurnError, TurnOutcome};
use crate::store::Message;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Body for the plain text-chat endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_message: Option<String>,
}

/// Body for the vision-chat endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_message: Option<String>,
    /// Data-URI image produced by the caller.
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Body for the gemma endpoint, which accepts either field name.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub user_message: Option<String>,
}

/// Body for the image-generation endpoint.
#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Successful chat turn response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub conversation_history: Vec<Message>,
}

/// Read-only conversation response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub conversation_history: Vec<Message>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Build the model routes.
pub fn model_routes(state: AppState) -> Router {
    Router::new()
        .route("/model/chat", post(chat_handler))
        .route("/model/qwen", post(qwen_handler))
        .route("/model/gemma", post(gemma_handler))
        .route("/model/generate-image", post(generate_image_handler))
        .route("/model/:selector/:session_id", get(conversation_handler))
        .with_state(state)
}

/// Build the health check routes.
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_handler))
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    run_chat_turn(
        &state,
        "chat",
        request.session_id,
        request.user_message,
        None,
    )
    .await
}

async fn qwen_handler(
    State(state): State<AppState>,
    Json(request): Json<VisionChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    run_chat_turn(
        &state,
        "qwen",
        request.session_id,
        request.user_message,
        request.image_url,
    )
    .await
}

async fn gemma_handler(
    State(state): State<AppState>,
    Json(request): Json<PromptChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    // `prompt` wins when both fields are present
    let text = request.prompt.or(request.user_message);
    run_chat_turn(&state, "gemma", request.session_id, text, None).await
}

async fn run_chat_turn(
    state: &AppState,
    selector: &str,
    session_id: Option<String>,
    text: Option<String>,
    image: Option<String>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    let session_id = session_id.unwrap_or_default();

    let outcome = state
        .dispatcher
        .handle_turn(&session_id, selector, text.as_deref(), image)
        .await
        .map_err(error_response)?;

    match outcome {
        TurnOutcome::Chat { reply, history } => Ok(Json(ChatResponse {
            reply,
            conversation_history: history,
        })),
        TurnOutcome::Image(_) => Err(internal_error("chat model produced an image artifact")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Image Generation Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn generate_image_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateImageRequest>,
) -> Response {
    let outcome = state
        .dispatcher
        .handle_turn("", "image", request.prompt.as_deref(), None)
        .await;

    match outcome {
        Ok(TurnOutcome::Image(artifact)) => {
            ([(header::CONTENT_TYPE, artifact.media_type)], artifact.bytes).into_response()
        }
        Ok(TurnOutcome::Chat { .. }) => {
            internal_error("image model produced a chat reply").into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read-Only Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn conversation_handler(
    State(state): State<AppState>,
    Path((selector, session_id)): Path<(String, String)>,
) -> Result<Json<ConversationResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !state.dispatcher.has_model(&selector) {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown model '{}'", selector),
                code: "UNKNOWN_MODEL".into(),
            }),
        ));
    }

    Ok(Json(ConversationResponse {
        conversation_history: state.dispatcher.conversation(&session_id),
    }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "prism-gateway".into(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Mapping
// ─────────────────────────────────────────────────────────────────────────────

fn error_response(err: TurnError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        TurnError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        TurnError::Backend(_) => StatusCode::BAD_GATEWAY,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().into(),
        }),
    )
}

fn internal_error(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!(error = %message, "Internal dispatch mismatch");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.into(),
            code: "INTERNAL".into(),
        }),
    )
}
