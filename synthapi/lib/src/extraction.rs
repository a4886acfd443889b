//! OpenAI-compatible chat-completions client used as the extraction service.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ExtractionError;
use crate::parser::{ExtractionRequest, ExtractionService};
use crate::retry::with_timeout_retry;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extraction service backed by an OpenAI-compatible `/chat/completions` API.
///
/// Requests JSON-object output and returns the content of the first choice.
#[derive(Debug, Clone)]
pub struct OpenAiExtractor {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiExtractor {
    /// Creates an extractor for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        base_url: Url,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.base_url.as_str().trim_end_matches('/')
        )
    }

    async fn send(&self, request: &ExtractionRequest) -> Result<String, ExtractionError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            return Err(ExtractionError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let data: ChatResponse = response.json().await?;
        data.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ExtractionError::EmptyReply)
    }
}

impl ExtractionService for OpenAiExtractor {
    #[tracing::instrument(skip(self, request), fields(model = %self.model))]
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ExtractionError> {
        debug!("Sending extraction request to {}", self.completions_url());
        with_timeout_retry(
            self.timeout,
            "extraction request",
            || self.send(request),
            ExtractionError::Timeout,
        )
        .await
    }
}
