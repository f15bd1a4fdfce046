use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Transport double that replays scripted responses and records every
/// request so tests can assert on call counts and request shapes.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        ScriptedTransport {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn respond_with(self, status: u16, body: &str) -> Self {
        self.push_response(Ok(HttpResponse {
            status,
            body: body.to_string(),
        }));
        self
    }

    pub fn fail_with(self, error: TransportError) -> Self {
        self.push_response(Err(error));
        self
    }

    fn push_response(&self, response: Result<HttpResponse, TransportError>) {
        self.responses
            .lock()
            .expect("response script lock poisoned")
            .push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.requests
            .lock()
            .expect("request log lock poisoned")
            .len()
    }

    pub fn request(&self, index: usize) -> HttpRequest {
        self.requests
            .lock()
            .expect("request log lock poisoned")
            .get(index)
            .cloned()
            .expect("no request recorded at index")
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests
            .lock()
            .expect("request log lock poisoned")
            .last()
            .cloned()
            .expect("no requests recorded")
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests
            .lock()
            .expect("request log lock poisoned")
            .push(request);
        self.responses
            .lock()
            .expect("response script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new("no scripted response left")))
    }
}

/// Shorthand for the flat chat-completions success body used across
/// gateway tests.
pub fn flat_completion_body(content: &str) -> String {
    format!(
        r#"{{"choices":[{{"message":{{"role":"assistant","content":"{content}"}}}}]}}"#
    )
}
