//! Prism Gateway - session-scoped conversations over multiple inference backends.
//!
//! This crate provides the gateway service:
//! - In-memory conversation store keyed by caller-chosen session ids
//! - History formatting with a per-model system prompt
//! - Model adapters for text-chat, vision-chat, and image-generation
//!   backend shapes on the Hugging Face Inference router
//! - A dispatcher orchestrating each turn, exposed over HTTP
//!
//! ## Architecture
//!
//! ```text
//! Client → Gateway (validate → record user turn → format history) → Inference router
//!                                   ↓
//!                           record assistant turn
//! ```

#![warn(clippy::all)]

pub mod dispatch;
pub mod history;
pub mod model;
pub mod routes;
pub mod store;

pub use dispatch::{Dispatcher, TurnError, TurnOutcome};
pub use history::{format_history, ChatMessage};
pub use model::{
    create_registry, AdapterError, Capability, ChatInvocation, ImageArtifact,
    ImageGenerationAdapter, ModelAdapter, ModelProfile, ModelRegistry, TextChatAdapter,
    VisionChatAdapter,
};
pub use store::{ConversationStore, Message, Role};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use prism_common::Config;

/// Build the gateway router with the default model registry.
pub fn build_router(config: &Config) -> Router {
    let store = Arc::new(ConversationStore::new());
    let registry = Arc::new(create_registry(config));
    let dispatcher = Arc::new(Dispatcher::new(store, registry));

    build_router_with(dispatcher)
}

/// Build the gateway router around an existing dispatcher.
/// This is useful for testing with mock adapters.
pub fn build_router_with(dispatcher: Arc<Dispatcher>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::model_routes(routes::AppState { dispatcher }))
        .merge(routes::health_routes())
        .layer(cors)
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.bind_address().parse::<std::net::IpAddr>()?,
        config.gateway.port,
    ));

    let router = build_router(config);

    tracing::info!("Starting Prism Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
