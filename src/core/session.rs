//! Process-wide wiring of the gateway components.
//!
//! A session owns the singletons: configuration, credential store,
//! validator, model registry, the active conversation, and the gateway
//! and transcription router dispatching over one shared transport.
//! Credential mutations trigger exactly one revalidation; startup runs
//! a sweep over every provider with a stored credential.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::catalog::{builtin_models, ProviderCatalog};
use crate::core::config::Config;
use crate::core::conversation::ConversationStore;
use crate::core::credentials::{CredentialStore, SecretStore};
use crate::core::error::GatewayError;
use crate::core::gateway::{ProviderGateway, SendOutcome};
use crate::core::registry::{ModelDescriptor, ModelFilter, ModelRegistry};
use crate::core::transcription::{merge_into_draft, AudioPayload, TranscriptionRouter};
use crate::core::transport::HttpTransport;
use crate::core::validation::{CredentialValidator, ValidationSnapshot, ValidationState};

pub struct Session {
    config: Config,
    catalog: ProviderCatalog,
    credentials: Arc<CredentialStore>,
    validator: Arc<CredentialValidator>,
    registry: ModelRegistry,
    conversation: Arc<Mutex<ConversationStore>>,
    gateway: ProviderGateway,
    transcription: TranscriptionRouter,
    history_path: Option<PathBuf>,
}

impl Session {
    pub fn new(
        config: Config,
        secrets: Box<dyn SecretStore>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let catalog = ProviderCatalog::builtin();
        let credentials = Arc::new(CredentialStore::new(secrets));
        let validator = Arc::new(CredentialValidator::new(transport.clone()));

        let mut models = builtin_models();
        models.extend(config.custom_models.iter().cloned());
        let registry = ModelRegistry::from_models(models);

        let gateway = ProviderGateway::new(
            transport.clone(),
            catalog.clone(),
            credentials.clone(),
            validator.clone(),
            config.system_prompt(),
        );
        let transcription =
            TranscriptionRouter::new(transport, catalog.clone(), credentials.clone());

        Session {
            config,
            catalog,
            credentials,
            validator,
            registry,
            conversation: Arc::new(Mutex::new(ConversationStore::new())),
            gateway,
            transcription,
            history_path: None,
        }
    }

    /// Persist archives to (and load them from) the given file.
    pub fn with_history_path(mut self, path: PathBuf) -> Self {
        self.history_path = Some(path);
        self
    }

    /// Replace the archive list with the persisted history. Call once
    /// at startup, before the first archive or restore.
    pub async fn load_history(&self) -> Result<(), GatewayError> {
        let Some(path) = &self.history_path else {
            return Ok(());
        };
        let loaded = ConversationStore::load_from_path(path)?;
        let mut conversation = self.conversation.lock().await;
        *conversation = loaded;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> &ProviderGateway {
        &self.gateway
    }

    pub fn conversation(&self) -> Arc<Mutex<ConversationStore>> {
        self.conversation.clone()
    }

    pub fn validation_snapshot(&self) -> ValidationSnapshot {
        self.validator.snapshot()
    }

    pub fn validation_state(&self, provider_id: &str) -> ValidationState {
        self.validator.state(provider_id)
    }

    /// Startup sweep: probe every provider that has a stored
    /// credential. Absent credentials stay `Unknown`. Probes run
    /// concurrently; per-provider generations keep them consistent.
    pub async fn validate_all(&self) {
        let mut pending = Vec::new();
        for provider in self.catalog.iter() {
            match self.credentials.get(&provider.id) {
                Ok(Some(secret)) => pending.push((provider, secret)),
                Ok(None) => {}
                Err(err) => {
                    debug!(provider = %provider.id, error = %err, "skipping unreadable credential");
                }
            }
        }
        join_all(pending.into_iter().map(|(provider, secret)| {
            let validator = self.validator.clone();
            async move {
                validator.validate(provider, &secret).await;
            }
        }))
        .await;
    }

    /// Store a credential and revalidate the provider once. Storage
    /// failures propagate without touching the validation state.
    pub async fn set_credential(
        &self,
        provider_id: &str,
        secret: &str,
    ) -> Result<ValidationState, GatewayError> {
        let provider = self.catalog.find(provider_id).ok_or_else(|| {
            GatewayError::configuration(format!("unknown provider '{provider_id}'"))
        })?;
        self.credentials.set(&provider.id, secret)?;
        Ok(self.validator.validate(provider, secret).await)
    }

    /// Remove a credential; the provider returns to `Unknown`.
    pub fn clear_credential(&self, provider_id: &str) -> Result<(), GatewayError> {
        self.credentials.clear(provider_id)?;
        self.validator.reset(provider_id);
        Ok(())
    }

    /// Quick-access models of currently validated providers, in
    /// selector order.
    pub fn selectable_models(&self) -> Vec<ModelDescriptor> {
        let snapshot = self.validator.snapshot();
        let filter = ModelFilter {
            quick_access_only: true,
            validated: Some(&snapshot),
            ..Default::default()
        };
        self.registry
            .list(&filter)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Register a user-defined model and remember it in the config.
    pub fn add_model(&mut self, descriptor: ModelDescriptor) -> Result<(), GatewayError> {
        let snapshot = self.validator.snapshot();
        self.registry.add(descriptor.clone(), &snapshot)?;
        self.config.add_custom_model(descriptor);
        Ok(())
    }

    pub fn remove_model(&mut self, model_id: &str) -> bool {
        self.config.remove_custom_model(model_id);
        self.registry.remove(model_id)
    }

    /// Route one message through the given model's provider.
    pub async fn send(&self, model_id: &str, text: &str) -> Result<SendOutcome, GatewayError> {
        let model = self
            .registry
            .find(model_id)
            .ok_or_else(|| {
                GatewayError::validation(format!("no model registered with id '{model_id}'"))
            })?
            .clone();
        let mut conversation = self.conversation.lock().await;
        self.gateway.send(&mut conversation, &model, text).await
    }

    /// Save-and-clear flow: title the current conversation (fail-soft),
    /// archive it, and start fresh. Returns the archive id, or `None`
    /// when there was nothing to archive.
    pub async fn archive_and_clear(&self) -> Option<i64> {
        let snapshot = {
            let conversation = self.conversation.lock().await;
            conversation.messages().to_vec()
        };
        if snapshot.is_empty() {
            return None;
        }

        let label = self.gateway.archive_label(&snapshot).await;
        let mut conversation = self.conversation.lock().await;
        let id = conversation.archive_current(label);
        if id.is_some() {
            conversation.clear_current();
            // Persistence is best-effort; a failed write never fails
            // the archive operation itself.
            if let Some(path) = &self.history_path {
                if let Err(err) = conversation.save_to_path(path) {
                    debug!(error = %err, "failed to persist archives");
                }
            }
        }
        id
    }

    /// Transcribe a recording and merge the result into the draft. The
    /// provider comes from the config, or is auto-selected when exactly
    /// one transcription-capable provider validates.
    pub async fn transcribe_to_draft(
        &self,
        draft: &str,
        audio: &AudioPayload,
    ) -> Result<String, GatewayError> {
        let configured = self.config.transcription_provider.clone();
        let selected = configured
            .or_else(|| self.transcription.auto_select(&self.validator.snapshot()));
        let text = self
            .transcription
            .transcribe(selected.as_deref(), audio)
            .await?;
        Ok(merge_into_draft(draft, &text))
    }
}
