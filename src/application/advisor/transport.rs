use crate::application::advisor::schema::{ChatCompletionRequest, ChatCompletionResponse};
use crate::domain::errors::GatewayError;
use async_trait::async_trait;
use std::time::Duration;

/// One fully-resolved outbound request: endpoint plus prompt parameters.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub base_url: String,
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Seam between the gateway and the wire. Tests substitute a scripted
/// transport; production uses [`HttpTransport`].
#[async_trait]
pub trait AdvisorTransport: Send + Sync {
    async fn chat(
        &self,
        request: &ProviderRequest,
        bearer: &str,
    ) -> Result<ChatCompletionResponse, GatewayError>;
}

/// reqwest-backed transport with a wall-clock timeout per call.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout_s: u64,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(5)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            timeout_s: timeout.as_secs(),
        }
    }
}

#[async_trait]
impl AdvisorTransport for HttpTransport {
    async fn chat(
        &self,
        request: &ProviderRequest,
        bearer: &str,
    ) -> Result<ChatCompletionResponse, GatewayError> {
        let body = ChatCompletionRequest::user_prompt(
            &request.model,
            &request.prompt,
            request.temperature,
            request.max_tokens,
        );

        let url = format!("{}/chat/completions", request.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout {
                        timeout_s: self.timeout_s,
                    }
                } else {
                    GatewayError::Transport {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GatewayError::RateLimited {
                provider: request.base_url.clone(),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::Transport {
                reason: format!("{} returned HTTP {}", url, status),
            });
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| GatewayError::InvalidResponse {
                reason: format!("malformed completion envelope: {}", e),
            })
    }
}
