//! HTTP narrator speaking the OpenAI-compatible chat completions protocol.

use std::time::Duration;

use agora_core::narrator::{Narrator, NarratorError, NarratorPrompt};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Connection settings for [`HttpNarrator`].
#[derive(Debug, Clone)]
pub struct HttpNarratorConfig {
    /// Base URL; `/chat/completions` is appended.
    pub endpoint: String,
    /// Model name sent with each request.
    pub model: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Hard per-call timeout.
    pub timeout: Duration,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Narrator backed by a chat completions endpoint.
#[derive(Debug, Clone)]
pub struct HttpNarrator {
    client: Client,
    config: HttpNarratorConfig,
}

impl HttpNarrator {
    /// Builds the HTTP client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `NarratorError::Provider` if the client cannot be built.
    pub fn new(config: HttpNarratorConfig) -> Result<Self, NarratorError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NarratorError::Provider(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl Narrator for HttpNarrator {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn generate(&self, prompt: &NarratorPrompt) -> Result<String, NarratorError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        let mut request = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NarratorError::Timeout(self.timeout_ms())
            } else {
                NarratorError::Provider(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NarratorError::Provider(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                NarratorError::Timeout(self.timeout_ms())
            } else {
                NarratorError::Provider(format!("malformed completion response: {e}"))
            }
        })?;

        let text = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|content| content.trim().to_owned())
            .filter(|content| !content.is_empty())
            .ok_or(NarratorError::EmptyResponse)?;

        debug!(chars = text.len(), "narrator call succeeded");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: &str, timeout: Duration) -> HttpNarratorConfig {
        HttpNarratorConfig {
            endpoint: endpoint.to_owned(),
            model: "test-model".to_owned(),
            api_key: Some("secret".to_owned()),
            timeout,
            max_tokens: 256,
            temperature: 0.7,
        }
    }

    fn prompt() -> NarratorPrompt {
        NarratorPrompt {
            system: "You narrate.".to_owned(),
            user: "What happens?".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_generate_returns_trimmed_completion() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "  The vault opens.\n" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let narrator =
            HttpNarrator::new(config(&format!("{}/v1/", server.uri()), Duration::from_secs(5)))
                .unwrap();

        // Act
        let text = narrator.generate(&prompt()).await.unwrap();

        // Assert
        assert_eq!(text, "The vault opens.");
    }

    #[tokio::test]
    async fn test_generate_maps_server_error_to_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;
        let narrator =
            HttpNarrator::new(config(&server.uri(), Duration::from_secs(5))).unwrap();

        match narrator.generate(&prompt()).await {
            Err(NarratorError::Provider(msg)) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("overloaded"));
            }
            other => panic!("expected Provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_rejects_blank_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "   " } }]
            })))
            .mount(&server)
            .await;
        let narrator =
            HttpNarrator::new(config(&server.uri(), Duration::from_secs(5))).unwrap();

        assert!(matches!(
            narrator.generate(&prompt()).await,
            Err(NarratorError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_generate_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "choices": [] }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let narrator =
            HttpNarrator::new(config(&server.uri(), Duration::from_millis(50))).unwrap();

        assert!(matches!(
            narrator.generate(&prompt()).await,
            Err(NarratorError::Timeout(50))
        ));
    }
}
