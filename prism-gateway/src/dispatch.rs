//! Per-turn orchestration.
//!
//! A turn runs: validate → record the user turn → format history → invoke
//! the selected model adapter → record the assistant turn. Validation
//! failures happen before any mutation; a backend failure leaves the
//! already-recorded user turn in place, so resubmitting the same turn
//! continues an accumulating history instead of duplicating input.

use std::sync::Arc;

use crate::history::format_history;
use crate::model::{
    AdapterError, Capability, ChatInvocation, ImageArtifact, ModelRegistry, RegisteredModel,
};
use crate::store::{ConversationStore, Message, Role};

/// Error for a dispatched turn.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TurnError {
    /// Missing or empty required fields. Nothing was mutated.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The selected backend failed; the user turn (if any) stays recorded.
    #[error(transparent)]
    Backend(#[from] AdapterError),
}

impl TurnError {
    /// Stable machine-readable code for error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Backend(AdapterError::Unavailable { .. }) => "BACKEND_UNAVAILABLE",
            Self::Backend(AdapterError::Response { .. }) => "BACKEND_RESPONSE",
        }
    }
}

/// Result of a dispatched turn.
#[derive(Debug)]
pub enum TurnOutcome {
    /// A chat reply together with the full updated session history.
    Chat {
        reply: String,
        history: Vec<Message>,
    },
    /// A generated image. No session state was touched.
    Image(ImageArtifact),
}

/// Orchestrates turns across the conversation store and the model registry.
pub struct Dispatcher {
    store: Arc<ConversationStore>,
    registry: Arc<ModelRegistry>,
}

impl Dispatcher {
    pub fn new(store: Arc<ConversationStore>, registry: Arc<ModelRegistry>) -> Self {
        Self { store, registry }
    }

    /// Whether a model selector is registered.
    pub fn has_model(&self, selector: &str) -> bool {
        self.registry.contains(selector)
    }

    /// Read-only history fetch. Never mutates; unknown sessions are empty.
    pub fn conversation(&self, session_key: &str) -> Vec<Message> {
        self.store.get(session_key)
    }

    /// Run one turn against the selected model.
    ///
    /// Chat models require a non-empty session key and at least one of
    /// `user_text` / `image`; the image model requires a non-empty prompt
    /// and bypasses the store entirely.
    pub async fn handle_turn(
        &self,
        session_key: &str,
        selector: &str,
        user_text: Option<&str>,
        image: Option<String>,
    ) -> Result<TurnOutcome, TurnError> {
        let entry = self.registry.get(selector).ok_or_else(|| {
            TurnError::InvalidRequest(format!("unknown model selector '{}'", selector))
        })?;

        let user_text = user_text.filter(|t| !t.is_empty());
        let image = image.filter(|i| !i.is_empty());

        match entry.adapter.capability() {
            Capability::ImageGeneration => self.image_turn(entry, user_text).await,
            Capability::Chat | Capability::VisionChat => {
                self.chat_turn(entry, session_key, selector, user_text, image)
                    .await
            }
        }
    }

    async fn chat_turn(
        &self,
        entry: &RegisteredModel,
        session_key: &str,
        selector: &str,
        user_text: Option<&str>,
        image: Option<String>,
    ) -> Result<TurnOutcome, TurnError> {
        if session_key.is_empty() {
            return Err(TurnError::InvalidRequest("sessionId is required".into()));
        }
        if user_text.is_none() && image.is_none() {
            return Err(TurnError::InvalidRequest(
                "provide a text message or an image".into(),
            ));
        }

        // Record the user turn first; it survives a failed backend call.
        self.store
            .append(session_key, Role::User, user_text.unwrap_or(""));

        let messages = format_history(&self.store, session_key, &entry.profile.system_prompt);
        tracing::debug!(
            session = %session_key,
            model = %selector,
            turns = messages.len(),
            "Dispatching chat turn"
        );

        let invocation = ChatInvocation {
            model: entry.profile.model.clone(),
            messages,
            image,
            max_tokens: entry.profile.max_tokens,
            temperature: entry.profile.temperature,
        };

        let reply = entry.adapter.send_chat(invocation).await.map_err(|e| {
            tracing::warn!(session = %session_key, model = %selector, error = %e, "Chat turn failed");
            e
        })?;

        self.store.append(session_key, Role::Assistant, &reply);
        tracing::info!(
            session = %session_key,
            model = %selector,
            reply_len = reply.len(),
            "Chat turn completed"
        );

        Ok(TurnOutcome::Chat {
            reply,
            history: self.store.get(session_key),
        })
    }

    async fn image_turn(
        &self,
        entry: &RegisteredModel,
        prompt: Option<&str>,
    ) -> Result<TurnOutcome, TurnError> {
        let prompt =
            prompt.ok_or_else(|| TurnError::InvalidRequest("a prompt is required".into()))?;

        let artifact = entry
            .adapter
            .generate_image(&entry.profile.model, prompt)
            .await
            .map_err(|e| {
                tracing::warn!(model = %entry.profile.model, error = %e, "Image turn failed");
                e
            })?;

        tracing::info!(
            model = %entry.profile.model,
            bytes = artifact.bytes.len(),
            "Image generated"
        );
        Ok(TurnOutcome::Image(artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelAdapter, ModelProfile};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scriptable chat adapter that records every invocation it receives.
    struct MockChatAdapter {
        capability: Capability,
        replies: Mutex<VecDeque<Result<String, AdapterError>>>,
        invocations: Mutex<Vec<ChatInvocation>>,
    }

    impl MockChatAdapter {
        fn new(capability: Capability) -> Self {
            Self {
                capability,
                replies: Mutex::new(VecDeque::new()),
                invocations: Mutex::new(Vec::new()),
            }
        }

        fn push_reply(&self, reply: Result<String, AdapterError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        fn invocations(&self) -> Vec<ChatInvocation> {
            self.invocations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelAdapter for MockChatAdapter {
        fn name(&self) -> &str {
            "mock-chat"
        }

        fn capability(&self) -> Capability {
            self.capability
        }

        async fn send_chat(&self, invocation: ChatInvocation) -> Result<String, AdapterError> {
            self.invocations.lock().unwrap().push(invocation);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("ok".into()))
        }
    }

    struct MockImageAdapter;

    #[async_trait]
    impl ModelAdapter for MockImageAdapter {
        fn name(&self) -> &str {
            "mock-image"
        }

        fn capability(&self) -> Capability {
            Capability::ImageGeneration
        }

        async fn generate_image(
            &self,
            _model: &str,
            _prompt: &str,
        ) -> Result<ImageArtifact, AdapterError> {
            Ok(ImageArtifact {
                bytes: vec![1, 2, 3],
                media_type: "image/png".into(),
            })
        }
    }

    fn profile(selector: &str) -> ModelProfile {
        ModelProfile {
            selector: selector.into(),
            model: format!("test/{}", selector),
            system_prompt: "You are a helpful assistant.".into(),
            max_tokens: Some(500),
            temperature: None,
        }
    }

    fn dispatcher_with(
        selector: &str,
        adapter: Arc<dyn ModelAdapter>,
    ) -> (Dispatcher, Arc<ConversationStore>) {
        let store = Arc::new(ConversationStore::new());
        let mut registry = ModelRegistry::new();
        registry.register(profile(selector), adapter);
        (
            Dispatcher::new(Arc::clone(&store), Arc::new(registry)),
            store,
        )
    }

    #[tokio::test]
    async fn chat_turn_records_both_sides_and_returns_reply() {
        let adapter = Arc::new(MockChatAdapter::new(Capability::Chat));
        adapter.push_reply(Ok("Hi there".into()));
        let (dispatcher, store) = dispatcher_with("chat", adapter);

        let outcome = dispatcher
            .handle_turn("s1", "chat", Some("Hello"), None)
            .await
            .unwrap();

        match outcome {
            TurnOutcome::Chat { reply, history } => {
                assert_eq!(reply, "Hi there");
                assert_eq!(history.len(), 2);
                assert_eq!(history[0].role, Role::User);
                assert_eq!(history[0].text, "Hello");
                assert_eq!(history[1].role, Role::Assistant);
                assert_eq!(history[1].text, "Hi there");
            }
            TurnOutcome::Image(_) => panic!("expected a chat outcome"),
        }

        let stored = store.get("s1");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].text, "Hi there");
    }

    #[tokio::test]
    async fn second_turn_sends_accumulated_history() {
        let adapter = Arc::new(MockChatAdapter::new(Capability::Chat));
        adapter.push_reply(Ok("Hi there".into()));
        adapter.push_reply(Ok("Fine, thanks".into()));
        let (dispatcher, _store) = dispatcher_with("chat", adapter.clone() as Arc<dyn ModelAdapter>);

        dispatcher
            .handle_turn("s1", "chat", Some("Hello"), None)
            .await
            .unwrap();
        dispatcher
            .handle_turn("s1", "chat", Some("How are you?"), None)
            .await
            .unwrap();

        let invocations = adapter.invocations();
        assert_eq!(invocations.len(), 2);
        // system + Hello + Hi there + How are you?
        let second = &invocations[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[0].role, Role::System);
        assert_eq!(second[0].content, "You are a helpful assistant.");
        assert_eq!(second[3].content, "How are you?");
    }

    #[tokio::test]
    async fn failed_backend_keeps_only_the_user_turn() {
        let adapter = Arc::new(MockChatAdapter::new(Capability::Chat));
        adapter.push_reply(Err(AdapterError::unavailable(
            "test/chat",
            "connection refused",
            None,
        )));
        let (dispatcher, store) = dispatcher_with("chat", adapter);

        let err = dispatcher
            .handle_turn("s2", "chat", Some("Ping"), None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "BACKEND_UNAVAILABLE");
        let stored = store.get("s2");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].role, Role::User);
        assert_eq!(stored[0].text, "Ping");
    }

    #[tokio::test]
    async fn missing_session_key_rejected_before_any_mutation() {
        let adapter = Arc::new(MockChatAdapter::new(Capability::Chat));
        let (dispatcher, store) = dispatcher_with("chat", adapter);

        let err = dispatcher
            .handle_turn("", "chat", Some("Hello"), None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_REQUEST");
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn missing_text_and_image_rejected() {
        let adapter = Arc::new(MockChatAdapter::new(Capability::Chat));
        let (dispatcher, store) = dispatcher_with("chat", adapter);

        let err = dispatcher.handle_turn("s1", "chat", None, None).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");

        // Empty strings count as absent
        let err = dispatcher
            .handle_turn("s1", "chat", Some(""), Some(String::new()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn vision_turn_with_image_only_records_empty_user_text() {
        let adapter = Arc::new(MockChatAdapter::new(Capability::VisionChat));
        adapter.push_reply(Ok("A cat.".into()));
        let (dispatcher, store) = dispatcher_with("qwen", adapter.clone() as Arc<dyn ModelAdapter>);

        dispatcher
            .handle_turn("s1", "qwen", None, Some("data:image/png;base64,AAAA".into()))
            .await
            .unwrap();

        let stored = store.get("s1");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].text, "");

        // The image rides along on the invocation
        let invocations = adapter.invocations();
        assert_eq!(
            invocations[0].image.as_deref(),
            Some("data:image/png;base64,AAAA")
        );
    }

    #[tokio::test]
    async fn image_turn_never_touches_the_store() {
        let (dispatcher, store) = dispatcher_with("image", Arc::new(MockImageAdapter));

        let outcome = dispatcher
            .handle_turn("ignored", "image", Some("a futuristic city"), None)
            .await
            .unwrap();

        match outcome {
            TurnOutcome::Image(artifact) => {
                assert_eq!(artifact.bytes, vec![1, 2, 3]);
                assert_eq!(artifact.media_type, "image/png");
            }
            TurnOutcome::Chat { .. } => panic!("expected an image outcome"),
        }
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn image_turn_without_prompt_is_invalid_and_mutates_nothing() {
        let (dispatcher, store) = dispatcher_with("image", Arc::new(MockImageAdapter));

        let err = dispatcher
            .handle_turn("", "image", Some(""), None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_REQUEST");
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn unknown_selector_is_invalid_request() {
        let adapter = Arc::new(MockChatAdapter::new(Capability::Chat));
        let (dispatcher, _store) = dispatcher_with("chat", adapter);

        let err = dispatcher
            .handle_turn("s1", "claude", Some("Hello"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn concurrent_sessions_never_mix() {
        let adapter = Arc::new(MockChatAdapter::new(Capability::Chat));
        for _ in 0..20 {
            adapter.push_reply(Ok("ack".into()));
        }
        let (dispatcher, store) = dispatcher_with("chat", adapter);
        let dispatcher = Arc::new(dispatcher);

        let mut handles = Vec::new();
        for i in 0..10 {
            for key in ["a", "b"] {
                let dispatcher = Arc::clone(&dispatcher);
                handles.push(tokio::spawn(async move {
                    dispatcher
                        .handle_turn(key, "chat", Some(&format!("{}-{}", key, i)), None)
                        .await
                        .unwrap();
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for key in ["a", "b"] {
            let history = store.get(key);
            assert_eq!(history.len(), 20);
            assert!(history
                .iter()
                .filter(|m| m.role == Role::User)
                .all(|m| m.text.starts_with(key)));
        }
    }

    #[test]
    fn error_codes_cover_the_taxonomy() {
        assert_eq!(TurnError::InvalidRequest("x".into()).code(), "INVALID_REQUEST");
        assert_eq!(
            TurnError::Backend(AdapterError::unavailable("m", "down", Some(503))).code(),
            "BACKEND_UNAVAILABLE"
        );
        assert_eq!(
            TurnError::Backend(AdapterError::response("m", "bad shape")).code(),
            "BACKEND_RESPONSE"
        );
    }
}
