//! Transcription routing.
//!
//! Audio capture is an external collaborator that yields an opaque
//! base64 payload. The router checks that the user-selected provider is
//! transcription-capable and holds a usable credential, uploads the
//! audio as multipart form data with the provider's fixed parameters,
//! and hands back plain text for the input draft.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

use crate::api::TranscriptionResponse;
use crate::core::catalog::ProviderCatalog;
use crate::core::credentials::CredentialStore;
use crate::core::error::GatewayError;
use crate::core::transport::{HttpRequest, HttpTransport, MultipartField};
use crate::core::validation::{ValidationSnapshot, ValidationState};

const TRANSCRIPTION_PATH: &str = "audio/transcriptions";
const AUDIO_FILE_NAME: &str = "recording.mp3";
const AUDIO_MIME_TYPE: &str = "audio/mp3";

/// Opaque recording handed over by the audio capture collaborator.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub base64_audio: String,
}

pub struct TranscriptionRouter {
    transport: Arc<dyn HttpTransport>,
    catalog: ProviderCatalog,
    credentials: Arc<CredentialStore>,
}

impl TranscriptionRouter {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        catalog: ProviderCatalog,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        TranscriptionRouter {
            transport,
            catalog,
            credentials,
        }
    }

    /// The lone transcription-capable provider that currently
    /// validates, if there is exactly one.
    pub fn auto_select(&self, snapshot: &ValidationSnapshot) -> Option<String> {
        let mut candidates = self.catalog.iter().filter(|provider| {
            provider.supports_transcription()
                && snapshot.get(&provider.id).copied().unwrap_or_default()
                    == ValidationState::Valid
        });
        let first = candidates.next()?;
        if candidates.next().is_some() {
            return None;
        }
        Some(first.id.clone())
    }

    /// Transcribe a recording through the selected provider.
    pub async fn transcribe(
        &self,
        selected_provider: Option<&str>,
        audio: &AudioPayload,
    ) -> Result<String, GatewayError> {
        let provider_id = selected_provider.ok_or_else(|| {
            GatewayError::configuration("no transcription provider is selected")
        })?;
        let provider = self.catalog.find(provider_id).ok_or_else(|| {
            GatewayError::configuration(format!("unknown provider '{provider_id}'"))
        })?;
        let Some(fields) = provider.transcription_fields.as_ref() else {
            return Err(GatewayError::configuration(format!(
                "provider '{}' does not support transcription",
                provider.id
            )));
        };
        let api_key = match self.credentials.get(&provider.id) {
            Ok(Some(key)) if !key.trim().is_empty() => key,
            _ => {
                return Err(GatewayError::configuration(format!(
                    "no usable API key stored for provider '{}'",
                    provider.id
                )))
            }
        };

        let bytes = BASE64
            .decode(audio.base64_audio.as_bytes())
            .map_err(|_| GatewayError::validation("audio payload is not valid base64"))?;

        let mut form = vec![MultipartField::file(
            "file",
            bytes,
            AUDIO_FILE_NAME,
            AUDIO_MIME_TYPE,
        )];
        for (name, value) in fields {
            form.push(MultipartField::text(name.clone(), value.clone()));
        }

        let url = provider.endpoint_url(TRANSCRIPTION_PATH, &api_key);
        let request = provider.authorize(HttpRequest::post_multipart(url, form), &api_key);

        debug!(provider = %provider.id, "uploading audio for transcription");
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|err| GatewayError::network(err.to_string()))?;
        if !response.is_success() {
            return Err(GatewayError::provider(response.status, response.body));
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&response.body)
            .map_err(|err| GatewayError::provider(response.status, err.to_string()))?;
        Ok(parsed.text.unwrap_or_default())
    }
}

/// Append transcribed text to the existing input draft, space-separated.
pub fn merge_into_draft(draft: &str, transcribed: &str) -> String {
    if draft.is_empty() {
        transcribed.to_string()
    } else {
        format!("{draft} {transcribed}")
    }
}
