//! OpenAI-compatible chat completions client.
//!
//! Works against any endpoint speaking the `/chat/completions` dialect; the
//! default configuration points at Fireworks AI. The base URL is injectable
//! so tests run against a local mock server.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EnrichError;

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

/// A model completion plus the tokens the provider billed for it.
#[derive(Debug)]
pub struct Completion {
    pub content: String,
    pub total_tokens: u64,
}

pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl LlmClient {
    /// # Errors
    ///
    /// Returns [`EnrichError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        max_tokens: u32,
        temperature: f64,
        timeout_secs: u64,
    ) -> Result<Self, EnrichError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.to_owned(),
            max_tokens,
            temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request a JSON-mode completion for the given messages.
    ///
    /// # Errors
    ///
    /// [`EnrichError::RateLimited`] on 429, [`EnrichError::Api`] on other
    /// non-success statuses, [`EnrichError::EmptyResponse`] when the model
    /// returns no content.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, EnrichError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        tracing::debug!(model = %self.model, "chat completion request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(EnrichError::RateLimited { message });
            }
            return Err(EnrichError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|source| EnrichError::Deserialize {
                context: "chat completion response".to_owned(),
                source,
            })?;

        let total_tokens = parsed.usage.map_or(0, |u| u.total_tokens);
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(EnrichError::EmptyResponse)?;

        Ok(Completion {
            content,
            total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: "user",
            content: "analyze this".to_owned(),
        }]
    }

    async fn client(server: &MockServer) -> LlmClient {
        LlmClient::new("test-key", &server.uri(), "test-model", 512, 0.2, 10)
            .expect("client builds")
    }

    #[tokio::test]
    async fn completion_returns_content_and_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"summary\": \"ok\"}"}}],
                "usage": {"total_tokens": 123}
            })))
            .mount(&server)
            .await;

        let completion = client(&server).await.complete(&messages()).await.unwrap();
        assert_eq!(completion.content, "{\"summary\": \"ok\"}");
        assert_eq!(completion.total_tokens, 123);
    }

    #[tokio::test]
    async fn status_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let err = client(&server).await.complete(&messages()).await.unwrap_err();
        assert!(matches!(err, EnrichError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn missing_content_maps_to_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": ""}}]
            })))
            .mount(&server)
            .await;

        let err = client(&server).await.complete(&messages()).await.unwrap_err();
        assert!(matches!(err, EnrichError::EmptyResponse));
    }
}
