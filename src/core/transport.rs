//! HTTP transport seam.
//!
//! Provider calls are described as plain [`HttpRequest`] values and
//! executed through the [`HttpTransport`] trait, so the gateway,
//! validator, and transcription router can be exercised in tests with a
//! scripted transport while production code runs on `reqwest`.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// Bounded request timeout. A hung provider turns into a transport
/// error instead of leaving a send in flight indefinitely.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<MultipartField>),
}

#[derive(Debug, Clone)]
pub struct MultipartField {
    pub name: String,
    pub value: MultipartValue,
}

#[derive(Debug, Clone)]
pub enum MultipartValue {
    Text(String),
    File {
        bytes: Vec<u8>,
        file_name: String,
        mime_type: String,
    },
}

impl MultipartField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        MultipartField {
            name: name.into(),
            value: MultipartValue::Text(value.into()),
        }
    }

    pub fn file(
        name: impl Into<String>,
        bytes: Vec<u8>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        MultipartField {
            name: name.into(),
            value: MultipartValue::File {
                bytes,
                file_name: file_name.into(),
                mime_type: mime_type.into(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        HttpRequest {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Json(body),
        }
    }

    pub fn post_multipart(url: impl Into<String>, fields: Vec<MultipartField>) -> Self {
        HttpRequest {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Multipart(fields),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, api_key: &str) -> Self {
        self.header("Authorization", format!("Bearer {api_key}"))
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct TransportError {
    message: String,
    timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
            timed_out: true,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(f, "request timed out: {}", self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::timeout(err.to_string())
        } else {
            TransportError::new(err.to_string())
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(ReqwestTransport { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(fields) => {
                let mut form = reqwest::multipart::Form::new();
                for field in fields {
                    form = match field.value {
                        MultipartValue::Text(value) => form.text(field.name, value),
                        MultipartValue::File {
                            bytes,
                            file_name,
                            mime_type,
                        } => {
                            let part = reqwest::multipart::Part::bytes(bytes)
                                .file_name(file_name)
                                .mime_str(&mime_type)
                                .map_err(TransportError::from)?;
                            form.part(field.name, part)
                        }
                    };
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        Ok(HttpResponse { status, body })
    }
}
