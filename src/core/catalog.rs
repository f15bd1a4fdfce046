//! Built-in provider catalog.
//!
//! Providers and the seed model list are embedded from
//! `builtin_catalog.toml` at build time. A provider entry describes how
//! to reach and authenticate against one backend: probe endpoint for
//! credential validation, optional chat dialect, attachment support,
//! fixed request extras, and fixed transcription form fields.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::core::registry::ModelDescriptor;
use crate::core::transport::HttpRequest;
use crate::utils::url::{append_key_param, construct_api_url};

/// How a provider expects the API key to be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>` header.
    #[default]
    Bearer,
    /// `?key=<key>` query parameter.
    QueryKey,
}

/// Chat request/response shape a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatDialect {
    /// OpenAI-style role/content pairs on `chat/completions`.
    Flat,
    /// Google-style ordered parts on `models/{model}:generateContent`.
    Multimodal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSpec {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthScheme,
    pub probe_path: String,
    #[serde(default)]
    pub dialect: Option<ChatDialect>,
    #[serde(default)]
    pub supports_attachments: bool,
    #[serde(default)]
    pub request_extras: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub transcription_fields: Option<BTreeMap<String, String>>,
}

impl ProviderSpec {
    pub fn supports_chat(&self) -> bool {
        self.dialect.is_some()
    }

    pub fn supports_transcription(&self) -> bool {
        self.transcription_fields.is_some()
    }

    /// Full endpoint URL with query-parameter auth already applied.
    pub fn endpoint_url(&self, path: &str, api_key: &str) -> String {
        let url = construct_api_url(&self.base_url, path);
        match self.auth {
            AuthScheme::Bearer => url,
            AuthScheme::QueryKey => append_key_param(&url, api_key),
        }
    }

    /// Attach header auth where the scheme calls for it. Query-key
    /// providers already carry the key in the URL.
    pub fn authorize(&self, request: HttpRequest, api_key: &str) -> HttpRequest {
        match self.auth {
            AuthScheme::Bearer => request.bearer(api_key),
            AuthScheme::QueryKey => request,
        }
    }

    /// Minimal read-only probe used to classify a credential.
    pub fn probe_request(&self, api_key: &str) -> HttpRequest {
        let url = self.endpoint_url(&self.probe_path, api_key);
        self.authorize(HttpRequest::get(url), api_key)
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    providers: Vec<ProviderSpec>,
    #[serde(default)]
    models: Vec<ModelDescriptor>,
}

const CATALOG_CONTENT: &str = include_str!("../builtin_catalog.toml");

fn parse_catalog() -> CatalogFile {
    toml::from_str(CATALOG_CONTENT).expect("failed to parse builtin_catalog.toml")
}

#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    providers: Vec<ProviderSpec>,
}

impl ProviderCatalog {
    /// Catalog embedded at build time.
    pub fn builtin() -> Self {
        ProviderCatalog {
            providers: parse_catalog().providers,
        }
    }

    pub fn from_providers(providers: Vec<ProviderSpec>) -> Self {
        ProviderCatalog { providers }
    }

    /// Find a provider by id (case-insensitive).
    pub fn find(&self, id: &str) -> Option<&ProviderSpec> {
        self.providers
            .iter()
            .find(|provider| provider.id.eq_ignore_ascii_case(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderSpec> {
        self.providers.iter()
    }
}

/// Seed model descriptors shipped with the catalog.
pub fn builtin_models() -> Vec<ModelDescriptor> {
    parse_catalog().models
}
