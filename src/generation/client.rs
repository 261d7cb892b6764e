use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::Generator;
use super::error::GenerationError;
use super::types::{
    ChatCompletionBody, ChatCompletionResponse, ChatMessage, CompletionRequest,
    ImageGenerationBody, ImageGenerationResponse, ImageRequest,
};
use crate::config::GenerationConfig;

/// Client for an OpenAI-compatible text and image generation API.
pub struct GenerationClient {
    client: Client,
    base_url: String,
    api_key: String,
    image_api_key: String,
}

impl GenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            image_api_key: config.image_key().to_string(),
        })
    }

    async fn post<B, R>(&self, path: &str, key: &str, body: &B, timeout: Duration) -> Result<R, GenerationError>
    where
        B: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{path}", self.base_url);
        debug!(%url, "calling generation API");
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GenerationError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<R>().await?)
    }
}

impl Generator for GenerationClient {
    async fn complete(&self, req: &CompletionRequest) -> Result<String, GenerationError> {
        let body = ChatCompletionBody {
            model: req.model.clone(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: req.prompt.clone(),
            }],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let response: ChatCompletionResponse = self
            .post("chat/completions", &self.api_key, &body, req.timeout)
            .await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse("no completion text"))
    }

    async fn generate_image(&self, req: &ImageRequest) -> Result<String, GenerationError> {
        let body = ImageGenerationBody {
            model: req.model.clone(),
            prompt: req.prompt.clone(),
            response_format: "url".into(),
            size: req.size.clone(),
            watermark: !req.no_watermark,
        };

        let response: ImageGenerationResponse = self
            .post("images/generations", &self.image_api_key, &body, req.timeout)
            .await?;
        response
            .data
            .into_iter()
            .find_map(|image| image.url)
            .ok_or(GenerationError::EmptyResponse("no image url"))
    }
}
