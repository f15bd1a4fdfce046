//! Provider gateway: the dispatch layer between a conversation and the
//! provider APIs.
//!
//! A send walks Idle → Sending → Succeeded/Failed → Idle. The user
//! message is appended before the network call so it is visible
//! immediately; exactly one HTTP request goes out per send; the pending
//! attachment is consumed on every exit path past the precondition
//! checks. Auth, network, and provider failures never escape a send:
//! they become one normalized error message on the conversation.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::api::gemini::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part};
use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::core::catalog::{ChatDialect, ProviderCatalog, ProviderSpec};
use crate::core::conversation::{local_stamp, ConversationStore, DisplayFlags, Message, Role};
use crate::core::credentials::CredentialStore;
use crate::core::error::GatewayError;
use crate::core::registry::ModelDescriptor;
use crate::core::transport::{HttpRequest, HttpTransport};
use crate::core::validation::{CredentialValidator, ValidationState};

/// Base64 size cap applied to non-image attachments.
pub const MAX_ATTACHMENT_BYTES: usize = 500 * 1024;

/// Caption sent after an inline image so the model describes it.
const IMAGE_CAPTION: &str =
    "Please describe what you see in this image and provide relevant insights.";

/// Fixed titling backend.
const TITLE_PROVIDER_ID: &str = "openrouter";
const TITLE_MODEL_ID: &str = "deepseek/deepseek-chat";

const FLAT_CHAT_PATH: &str = "chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Idle,
    Sending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeCategory {
    Image,
    Other,
}

/// File payload handed over by the picker collaborator. Lives only
/// between the attach action and the next send attempt.
#[derive(Debug, Clone)]
pub struct AttachedPayload {
    pub uri: String,
    pub name: String,
    pub base64_content: String,
    pub mime_category: MimeCategory,
    /// Text extracted by the picker for non-image files.
    pub extracted_text: Option<String>,
}

/// Terminal result of one send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message: Message,
    pub phase: SendPhase,
}

pub struct ProviderGateway {
    transport: Arc<dyn HttpTransport>,
    catalog: ProviderCatalog,
    credentials: Arc<CredentialStore>,
    validator: Arc<CredentialValidator>,
    system_prompt: String,
    phase: Mutex<SendPhase>,
    pending_attachment: Mutex<Option<AttachedPayload>>,
}

impl ProviderGateway {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        catalog: ProviderCatalog,
        credentials: Arc<CredentialStore>,
        validator: Arc<CredentialValidator>,
        system_prompt: impl Into<String>,
    ) -> Self {
        ProviderGateway {
            transport,
            catalog,
            credentials,
            validator,
            system_prompt: system_prompt.into(),
            phase: Mutex::new(SendPhase::Idle),
            pending_attachment: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> SendPhase {
        self.phase
            .lock()
            .map(|phase| *phase)
            .unwrap_or(SendPhase::Idle)
    }

    fn set_phase(&self, phase: SendPhase) {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase;
        }
    }

    /// Stage a payload for the next send. Non-image files over the
    /// size cap are rejected; images are exempt.
    pub fn attach(&self, payload: AttachedPayload) -> Result<(), GatewayError> {
        if payload.mime_category != MimeCategory::Image
            && payload.base64_content.len() > MAX_ATTACHMENT_BYTES
        {
            return Err(GatewayError::validation("file must be smaller than 500 KB"));
        }
        if let Ok(mut pending) = self.pending_attachment.lock() {
            *pending = Some(payload);
        }
        Ok(())
    }

    pub fn has_attachment(&self) -> bool {
        self.pending_attachment
            .lock()
            .map(|pending| pending.is_some())
            .unwrap_or(false)
    }

    pub fn clear_attachment(&self) {
        if let Ok(mut pending) = self.pending_attachment.lock() {
            *pending = None;
        }
    }

    fn take_attachment(&self) -> Option<AttachedPayload> {
        self.pending_attachment
            .lock()
            .ok()
            .and_then(|mut pending| pending.take())
    }

    /// Route one message through the model's provider.
    ///
    /// Precondition failures (`Validation`, `Configuration`) surface
    /// before anything is appended or sent. Past that point the send
    /// always terminates with exactly one appended message: the parsed
    /// assistant reply, or the normalized error entry.
    pub async fn send(
        &self,
        conversation: &mut ConversationStore,
        model: &ModelDescriptor,
        text: &str,
    ) -> Result<SendOutcome, GatewayError> {
        let provider = self.catalog.find(&model.provider_id).ok_or_else(|| {
            GatewayError::validation(format!(
                "model '{}' resolves to no registered provider",
                model.id
            ))
        })?;
        let dialect = provider.dialect.ok_or_else(|| {
            GatewayError::configuration(format!(
                "provider '{}' has no chat endpoint",
                provider.id
            ))
        })?;

        let trimmed = text.trim();
        let attachment_usable = provider.supports_attachments && self.has_attachment();
        if trimmed.is_empty() && !attachment_usable {
            return Err(GatewayError::validation("nothing to send"));
        }

        let prior = conversation.messages().to_vec();
        let attachment = self.take_attachment();

        if trimmed.is_empty() {
            let name = attachment
                .as_ref()
                .map(|payload| payload.name.as_str())
                .unwrap_or("Unknown file");
            conversation.append_user_attachment(name);
        } else {
            conversation.append_user(text);
        }
        self.set_phase(SendPhase::Sending);

        debug!(provider = %provider.id, model = %model.id, "dispatching chat request");
        let outcome = match self
            .dispatch(provider, dialect, model, &prior, text, attachment)
            .await
        {
            Ok(reply) => {
                let message = conversation
                    .append_assistant(reply, DisplayFlags::default())
                    .clone();
                self.set_phase(SendPhase::Succeeded);
                SendOutcome {
                    message,
                    phase: SendPhase::Succeeded,
                }
            }
            Err(err) => {
                debug!(provider = %provider.id, error = %err, "send failed");
                let message = conversation.append_error().clone();
                self.set_phase(SendPhase::Failed);
                SendOutcome {
                    message,
                    phase: SendPhase::Failed,
                }
            }
        };
        self.set_phase(SendPhase::Idle);
        Ok(outcome)
    }

    async fn dispatch(
        &self,
        provider: &ProviderSpec,
        dialect: ChatDialect,
        model: &ModelDescriptor,
        prior: &[Message],
        text: &str,
        attachment: Option<AttachedPayload>,
    ) -> Result<String, GatewayError> {
        if self.validator.state(&provider.id) != ValidationState::Valid {
            return Err(GatewayError::auth(format!(
                "provider '{}' has no validated API key",
                provider.id
            )));
        }
        let api_key = self.usable_credential(&provider.id)?;

        let request = match dialect {
            ChatDialect::Flat => self.build_flat_request(provider, model, prior, text, &api_key)?,
            ChatDialect::Multimodal => {
                self.build_multimodal_request(provider, model, prior, text, attachment, &api_key)?
            }
        };

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|err| GatewayError::network(err.to_string()))?;
        if !response.is_success() {
            return Err(GatewayError::provider(response.status, response.body));
        }

        match dialect {
            ChatDialect::Flat => {
                let parsed: ChatResponse = serde_json::from_str(&response.body)
                    .map_err(|err| GatewayError::provider(response.status, err.to_string()))?;
                Ok(parsed.message_text())
            }
            ChatDialect::Multimodal => {
                let parsed: GenerateContentResponse = serde_json::from_str(&response.body)
                    .map_err(|err| GatewayError::provider(response.status, err.to_string()))?;
                Ok(parsed.message_text())
            }
        }
    }

    fn usable_credential(&self, provider_id: &str) -> Result<String, GatewayError> {
        match self.credentials.get(provider_id) {
            Ok(Some(key)) if !key.trim().is_empty() => Ok(key),
            _ => Err(GatewayError::auth(format!(
                "no usable API key stored for provider '{provider_id}'"
            ))),
        }
    }

    /// Prior role/content pairs, then the system entry, then the new
    /// user entry.
    fn build_flat_request(
        &self,
        provider: &ProviderSpec,
        model: &ModelDescriptor,
        prior: &[Message],
        text: &str,
        api_key: &str,
    ) -> Result<HttpRequest, GatewayError> {
        let mut messages: Vec<ChatMessage> = prior
            .iter()
            .map(|message| ChatMessage::new(message.role.api_name(), message.text.clone()))
            .collect();
        messages.push(ChatMessage::new("system", self.system_prompt.clone()));
        messages.push(ChatMessage::new("user", text));

        let body = ChatRequest {
            model: model.id.clone(),
            messages,
            extras: provider.request_extras.clone(),
        };
        let body = serde_json::to_value(&body)
            .map_err(|err| GatewayError::network(format!("failed to encode request: {err}")))?;

        let url = provider.endpoint_url(FLAT_CHAT_PATH, api_key);
        Ok(provider.authorize(HttpRequest::post_json(url, body), api_key))
    }

    /// Ordered parts: system prompt, prior turns (assistant turns
    /// prefixed to keep speakers apart), the new text, then the inline
    /// image plus caption or the extracted text of a non-image file.
    fn build_multimodal_request(
        &self,
        provider: &ProviderSpec,
        model: &ModelDescriptor,
        prior: &[Message],
        text: &str,
        attachment: Option<AttachedPayload>,
        api_key: &str,
    ) -> Result<HttpRequest, GatewayError> {
        let mut parts = vec![Part::text(self.system_prompt.clone())];
        for message in prior {
            match message.role {
                Role::User => parts.push(Part::text(message.text.clone())),
                Role::Assistant => parts.push(Part::text(format!("Assistant: {}", message.text))),
            }
        }
        if !text.trim().is_empty() {
            parts.push(Part::text(text));
        }
        if let Some(payload) = attachment {
            match payload.mime_category {
                MimeCategory::Image => {
                    parts.push(Part::inline_data("image/jpeg", payload.base64_content));
                    parts.push(Part::text(IMAGE_CAPTION));
                }
                MimeCategory::Other => {
                    if let Some(content) = payload.extracted_text {
                        parts.push(Part::text(format!(
                            "Uploaded file: {}\n\n{}",
                            payload.name, content
                        )));
                    }
                }
            }
        }

        let body = GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig::default(),
        };
        let body = serde_json::to_value(&body)
            .map_err(|err| GatewayError::network(format!("failed to encode request: {err}")))?;

        let path = format!("models/{}:generateContent", model.id);
        let url = provider.endpoint_url(&path, api_key);
        Ok(provider.authorize(HttpRequest::post_json(url, body), api_key))
    }

    /// Short title for a conversation, produced by the fixed titling
    /// backend. Fails soft: any error yields a timestamp title.
    pub async fn generate_title(&self, messages: &[Message]) -> String {
        match self.request_title(messages).await {
            Ok(title) if !title.is_empty() => title,
            Ok(_) => fallback_title(),
            Err(err) => {
                debug!(error = %err, "title generation failed, falling back to timestamp");
                fallback_title()
            }
        }
    }

    /// Archive display name: generated title plus a local timestamp,
    /// or the timestamp-only fallback when titling fails.
    pub async fn archive_label(&self, messages: &[Message]) -> String {
        match self.request_title(messages).await {
            Ok(title) if !title.is_empty() => format!("{title} ({})", local_stamp()),
            Ok(_) => fallback_title(),
            Err(err) => {
                debug!(error = %err, "title generation failed, falling back to timestamp");
                fallback_title()
            }
        }
    }

    async fn request_title(&self, messages: &[Message]) -> Result<String, GatewayError> {
        let provider = self.catalog.find(TITLE_PROVIDER_ID).ok_or_else(|| {
            GatewayError::configuration("titling backend is not in the catalog")
        })?;
        let api_key = self.usable_credential(&provider.id)?;

        let transcript: Vec<String> = messages
            .iter()
            .map(|message| match message.role {
                Role::User => format!("User: {}", message.text),
                Role::Assistant => format!("AI: {}", message.text),
            })
            .collect();
        let prompt = format!(
            "Generate a short and meaningful title for the following conversation:\n\n{}",
            transcript.join("\n")
        );

        let body = ChatRequest {
            model: TITLE_MODEL_ID.to_string(),
            messages: vec![ChatMessage::new("user", prompt)],
            extras: serde_json::Map::new(),
        };
        let body = serde_json::to_value(&body)
            .map_err(|err| GatewayError::network(format!("failed to encode request: {err}")))?;
        let url = provider.endpoint_url(FLAT_CHAT_PATH, &api_key);
        let request = provider.authorize(HttpRequest::post_json(url, body), &api_key);

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|err| GatewayError::network(err.to_string()))?;
        if !response.is_success() {
            return Err(GatewayError::provider(response.status, response.body));
        }
        let parsed: ChatResponse = serde_json::from_str(&response.body)
            .map_err(|err| GatewayError::provider(response.status, err.to_string()))?;
        Ok(parsed.message_text().trim().to_string())
    }
}

pub fn fallback_title() -> String {
    format!("Chat from {}", local_stamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::MemoryStore;
    use crate::core::registry::ModelRegistry;
    use crate::core::transport::RequestBody;
    use crate::utils::test_utils::{flat_completion_body, ScriptedTransport};

    struct Fixture {
        gateway: ProviderGateway,
        transport: Arc<ScriptedTransport>,
        validator: Arc<CredentialValidator>,
        conversation: ConversationStore,
    }

    fn fixture(transport: ScriptedTransport, keys: &[(&str, &str)], valid: &[&str]) -> Fixture {
        let transport = Arc::new(transport);
        let credentials = Arc::new(CredentialStore::new(Box::new(MemoryStore::new())));
        for (provider, key) in keys {
            credentials.set(provider, key).expect("seed credential");
        }
        let validator = Arc::new(CredentialValidator::new(transport.clone()));
        for provider in valid {
            validator.set_state_for_test(provider, ValidationState::Valid);
        }
        let gateway = ProviderGateway::new(
            transport.clone(),
            ProviderCatalog::builtin(),
            credentials,
            validator.clone(),
            "Be terse.",
        );
        Fixture {
            gateway,
            transport,
            validator,
            conversation: ConversationStore::new(),
        }
    }

    fn model(id: &str) -> ModelDescriptor {
        ModelRegistry::with_builtin_models()
            .find(id)
            .expect("builtin model present")
            .clone()
    }

    fn image_payload(name: &str) -> AttachedPayload {
        AttachedPayload {
            uri: format!("file:///tmp/{name}"),
            name: name.to_string(),
            base64_content: "aGVsbG8=".to_string(),
            mime_category: MimeCategory::Image,
            extracted_text: None,
        }
    }

    fn request_json(transport: &ScriptedTransport, index: usize) -> serde_json::Value {
        match transport.request(index).body {
            RequestBody::Json(value) => value,
            other => panic!("expected a JSON body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_sends_are_rejected_before_any_side_effect() {
        let mut fx = fixture(
            ScriptedTransport::new(),
            &[("openai", "sk-test")],
            &["openai"],
        );

        let err = fx
            .gateway
            .send(&mut fx.conversation, &model("gpt-4"), "   ")
            .await
            .expect_err("blank send rejected");

        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(fx.conversation.messages().is_empty());
        assert_eq!(fx.transport.calls(), 0);
        assert_eq!(fx.gateway.phase(), SendPhase::Idle);
    }

    #[tokio::test]
    async fn attachments_do_not_unblock_blank_sends_on_flat_providers() {
        let mut fx = fixture(
            ScriptedTransport::new(),
            &[("openai", "sk-test")],
            &["openai"],
        );
        fx.gateway.attach(image_payload("pic.jpg")).expect("attach");

        let err = fx
            .gateway
            .send(&mut fx.conversation, &model("gpt-4"), "")
            .await
            .expect_err("blank send rejected");

        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(fx.transport.calls(), 0);
        // The precondition failure is not a send attempt; the payload
        // stays staged.
        assert!(fx.gateway.has_attachment());
    }

    #[tokio::test]
    async fn unknown_providers_fail_validation_not_silence() {
        let mut fx = fixture(ScriptedTransport::new(), &[], &[]);
        let stale = ModelDescriptor {
            id: "ghost-model".to_string(),
            display_label: "Ghost".to_string(),
            short_label: "G".to_string(),
            provider_id: "deleted-provider".to_string(),
            quick_access: false,
        };

        let err = fx
            .gateway
            .send(&mut fx.conversation, &stale, "hello")
            .await
            .expect_err("unresolvable provider rejected");
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(fx.conversation.messages().is_empty());
    }

    #[tokio::test]
    async fn flat_request_carries_prior_system_and_new_entries_in_order() {
        let mut fx = fixture(
            ScriptedTransport::new().respond_with(200, &flat_completion_body("Hi!")),
            &[("openai", "sk-test")],
            &["openai"],
        );
        fx.conversation.append_user("first");
        fx.conversation
            .append_assistant("second", DisplayFlags::default());

        let outcome = fx
            .gateway
            .send(&mut fx.conversation, &model("gpt-4"), "hello")
            .await
            .expect("send completes");

        assert_eq!(outcome.phase, SendPhase::Succeeded);
        assert_eq!(fx.transport.calls(), 1);

        let body = request_json(&fx.transport, 0);
        let messages = body["messages"].as_array().expect("messages array");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "first");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["role"], "system");
        assert_eq!(messages[2]["content"], "Be terse.");
        assert_eq!(messages[3]["role"], "user");
        assert_eq!(messages[3]["content"], "hello");
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["temperature"], 0.7);

        // One user entry and one assistant entry were appended.
        let appended = fx.conversation.messages();
        assert_eq!(appended.len(), 4);
        assert_eq!(appended[2].text, "hello");
        assert_eq!(appended[3].text, "Hi!");
        assert_eq!(appended[3].role, Role::Assistant);
    }

    #[tokio::test]
    async fn invalid_providers_fail_before_the_chat_endpoint_is_touched() {
        let mut fx = fixture(
            ScriptedTransport::new(),
            &[("openai", "sk-looks-fine")],
            &[],
        );
        fx.validator
            .set_state_for_test("openai", ValidationState::Invalid);

        let outcome = fx
            .gateway
            .send(&mut fx.conversation, &model("gpt-4"), "hello")
            .await
            .expect("send terminates normally");

        assert_eq!(outcome.phase, SendPhase::Failed);
        assert_eq!(fx.transport.calls(), 0);
        let messages = fx.conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, crate::core::conversation::SEND_FAILURE_TEXT);
    }

    #[tokio::test]
    async fn missing_credentials_convert_to_the_error_entry() {
        let mut fx = fixture(ScriptedTransport::new(), &[], &["openai"]);

        let outcome = fx
            .gateway
            .send(&mut fx.conversation, &model("gpt-4"), "hello")
            .await
            .expect("send terminates normally");

        assert_eq!(outcome.phase, SendPhase::Failed);
        assert_eq!(fx.transport.calls(), 0);
        assert_eq!(
            fx.conversation.messages()[1].text,
            crate::core::conversation::SEND_FAILURE_TEXT
        );
    }

    #[tokio::test]
    async fn provider_rejections_convert_to_the_error_entry() {
        let mut fx = fixture(
            ScriptedTransport::new().respond_with(500, "overloaded"),
            &[("cerebras", "c-key")],
            &["cerebras"],
        );

        let outcome = fx
            .gateway
            .send(&mut fx.conversation, &model("llama-3.3-70b"), "hello")
            .await
            .expect("send terminates normally");

        assert_eq!(outcome.phase, SendPhase::Failed);
        assert_eq!(fx.transport.calls(), 1);
        assert_eq!(
            fx.conversation.messages()[1].text,
            crate::core::conversation::SEND_FAILURE_TEXT
        );
        assert_eq!(fx.gateway.phase(), SendPhase::Idle);
    }

    #[tokio::test]
    async fn empty_reply_bodies_become_empty_assistant_messages() {
        let mut fx = fixture(
            ScriptedTransport::new().respond_with(200, r#"{"choices":[]}"#),
            &[("openrouter", "or-key")],
            &["openrouter"],
        );

        let outcome = fx
            .gateway
            .send(
                &mut fx.conversation,
                &model("deepseek/deepseek-chat"),
                "hello",
            )
            .await
            .expect("send completes");

        assert_eq!(outcome.phase, SendPhase::Succeeded);
        assert_eq!(outcome.message.text, "");
    }

    #[tokio::test]
    async fn multimodal_requests_order_parts_and_caption_images() {
        let mut fx = fixture(
            ScriptedTransport::new().respond_with(
                200,
                r#"{"candidates":[{"content":{"parts":[{"text":"A cat."}]}}]}"#,
            ),
            &[("google", "g-key")],
            &["google"],
        );
        fx.conversation.append_user("earlier question");
        fx.conversation
            .append_assistant("earlier answer", DisplayFlags::default());
        fx.gateway.attach(image_payload("cat.jpg")).expect("attach");

        let outcome = fx
            .gateway
            .send(
                &mut fx.conversation,
                &model("gemini-2.0-flash-exp"),
                "what is this?",
            )
            .await
            .expect("send completes");
        assert_eq!(outcome.phase, SendPhase::Succeeded);

        let request = fx.transport.request(0);
        assert_eq!(
            request.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-exp:generateContent?key=g-key"
        );
        assert!(request.headers.is_empty());

        let body = request_json(&fx.transport, 0);
        let parts = body["contents"][0]["parts"].as_array().expect("parts");
        assert_eq!(parts.len(), 6);
        assert_eq!(parts[0]["text"], "Be terse.");
        assert_eq!(parts[1]["text"], "earlier question");
        assert_eq!(parts[2]["text"], "Assistant: earlier answer");
        assert_eq!(parts[3]["text"], "what is this?");
        assert_eq!(parts[4]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[5]["text"], IMAGE_CAPTION);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);

        // The payload was consumed by the send.
        assert!(!fx.gateway.has_attachment());
    }

    #[tokio::test]
    async fn attachment_only_sends_use_the_placeholder_entry() {
        let mut fx = fixture(
            ScriptedTransport::new().respond_with(200, "{}"),
            &[("google", "g-key")],
            &["google"],
        );
        fx.gateway
            .attach(image_payload("diagram.png"))
            .expect("attach");

        fx.gateway
            .send(&mut fx.conversation, &model("gemini-2.0-flash-exp"), "")
            .await
            .expect("send completes");

        assert_eq!(
            fx.conversation.messages()[0].text,
            "File uploaded: diagram.png"
        );
        let body = request_json(&fx.transport, 0);
        let parts = body["contents"][0]["parts"].as_array().expect("parts");
        // System prompt, image, caption; no text part for the blank input.
        assert_eq!(parts.len(), 3);
        assert!(parts[1]["inlineData"].is_object());
    }

    #[tokio::test]
    async fn non_image_attachments_contribute_their_extracted_text() {
        let mut fx = fixture(
            ScriptedTransport::new().respond_with(200, "{}"),
            &[("google", "g-key")],
            &["google"],
        );
        fx.gateway
            .attach(AttachedPayload {
                uri: "file:///tmp/notes.txt".to_string(),
                name: "notes.txt".to_string(),
                base64_content: "aGVsbG8=".to_string(),
                mime_category: MimeCategory::Other,
                extracted_text: Some("meeting notes".to_string()),
            })
            .expect("attach");

        fx.gateway
            .send(
                &mut fx.conversation,
                &model("gemini-2.0-flash-exp"),
                "summarize",
            )
            .await
            .expect("send completes");

        let body = request_json(&fx.transport, 0);
        let parts = body["contents"][0]["parts"].as_array().expect("parts");
        assert_eq!(
            parts[2]["text"],
            "Uploaded file: notes.txt\n\nmeeting notes"
        );
    }

    #[tokio::test]
    async fn attachments_are_cleared_even_when_the_provider_ignores_them() {
        let mut fx = fixture(
            ScriptedTransport::new().respond_with(200, &flat_completion_body("ok")),
            &[("openai", "sk-test")],
            &["openai"],
        );
        fx.gateway.attach(image_payload("pic.jpg")).expect("attach");

        fx.gateway
            .send(&mut fx.conversation, &model("gpt-4"), "hello")
            .await
            .expect("send completes");

        assert!(!fx.gateway.has_attachment());
        // And cleared on failures too.
        fx.gateway.attach(image_payload("pic.jpg")).expect("attach");
        fx.gateway
            .send(&mut fx.conversation, &model("gpt-4"), "hello again")
            .await
            .expect("send terminates normally");
        assert!(!fx.gateway.has_attachment());
    }

    #[test]
    fn oversized_non_image_attachments_are_rejected_at_attach_time() {
        let fx = fixture(ScriptedTransport::new(), &[], &[]);
        let oversized = "x".repeat(MAX_ATTACHMENT_BYTES + 1);

        let err = fx
            .gateway
            .attach(AttachedPayload {
                uri: "file:///tmp/big.pdf".to_string(),
                name: "big.pdf".to_string(),
                base64_content: oversized.clone(),
                mime_category: MimeCategory::Other,
                extracted_text: None,
            })
            .expect_err("oversized file rejected");
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(!fx.gateway.has_attachment());

        // Images are exempt from the size cap.
        fx.gateway
            .attach(AttachedPayload {
                uri: "file:///tmp/big.jpg".to_string(),
                name: "big.jpg".to_string(),
                base64_content: oversized,
                mime_category: MimeCategory::Image,
                extracted_text: None,
            })
            .expect("oversized image accepted");
        assert!(fx.gateway.has_attachment());
    }

    #[tokio::test]
    async fn titling_goes_through_the_pinned_backend() {
        let fx = fixture(
            ScriptedTransport::new().respond_with(200, &flat_completion_body("Cats and dogs")),
            &[("openrouter", "or-key")],
            &["openrouter"],
        );
        let messages = vec![Message::user("Tell me about cats")];

        let title = fx.gateway.generate_title(&messages).await;
        assert_eq!(title, "Cats and dogs");

        let request = fx.transport.request(0);
        assert_eq!(request.url, "https://openrouter.ai/api/v1/chat/completions");
        let body = request_json(&fx.transport, 0);
        assert_eq!(body["model"], "deepseek/deepseek-chat");
        let prompt = body["messages"][0]["content"].as_str().expect("prompt");
        assert!(prompt.contains("User: Tell me about cats"));
    }

    #[tokio::test]
    async fn titling_failures_fall_back_to_a_timestamp_name() {
        let fx = fixture(ScriptedTransport::new(), &[], &[]);
        let messages = vec![Message::user("hello")];

        let title = fx.gateway.generate_title(&messages).await;
        assert!(title.starts_with("Chat from "));
        assert_eq!(fx.transport.calls(), 0);

        let label = fx.gateway.archive_label(&messages).await;
        assert!(label.starts_with("Chat from "));
    }

    #[tokio::test]
    async fn archive_labels_append_the_timestamp_to_the_title() {
        let fx = fixture(
            ScriptedTransport::new().respond_with(200, &flat_completion_body("Trip planning")),
            &[("openrouter", "or-key")],
            &["openrouter"],
        );
        let messages = vec![Message::user("plan a trip")];

        let label = fx.gateway.archive_label(&messages).await;
        assert!(label.starts_with("Trip planning ("));
        assert!(label.ends_with(')'));
    }
}
