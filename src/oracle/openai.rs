use super::{Oracle, OracleFuture, OracleMessage};
use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::utils::truncate_with_ellipsis;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 300;

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiOracle {
    base_url: String,
    model: String,
    temperature: f64,
    /// Pre-computed `"Bearer <key>"` header value.
    cached_auth_header: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiOracle {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            cached_auth_header: config.api_key.as_ref().map(|k| format!("Bearer {k}")),
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .connect_timeout(Duration::from_secs(10))
                .pool_max_idle_per_host(4)
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request<'a>(&'a self, messages: &'a [OracleMessage]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| Message {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: self.temperature,
        }
    }

    async fn complete_inner(&self, messages: &[OracleMessage]) -> Result<String, OracleError> {
        let auth = self
            .cached_auth_header
            .as_ref()
            .ok_or(OracleError::MissingApiKey)?;

        tracing::debug!(model = %self.model, messages = messages.len(), "oracle request");

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", auth)
            .json(&self.build_request(messages))
            .send()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read oracle error body>".to_string());
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: truncate_with_ellipsis(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Request(format!("invalid response body: {e}")))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(OracleError::EmptyResponse)
    }
}

impl Oracle for OpenAiOracle {
    fn complete<'a>(&'a self, messages: &'a [OracleMessage]) -> OracleFuture<'a> {
        Box::pin(self.complete_inner(messages))
    }
}
