use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{ApiKey, EnrichmentConfig};

/// One configured endpoint of the external AI service.
#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    api_key: ApiKey,
    model: String,
    timeout: Duration,
}

/// Client for the text-completion and image-generation endpoints.
///
/// Either side may be unconfigured; callers check [`AiGateway::text_enabled`]
/// and [`AiGateway::image_enabled`] and degrade instead of failing.
#[derive(Debug, Clone)]
pub struct AiGateway {
    http: Client,
    text: Option<Endpoint>,
    image: Option<Endpoint>,
    image_size: String,
    image_quality: String,
    max_image_bytes: usize,
}

/// Chat-style completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageBody>,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

/// Bytes of a generated image plus its sniffed format.
#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub format: image::ImageFormat,
}

impl DownloadedImage {
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("png")
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

impl AiGateway {
    pub fn new(config: &EnrichmentConfig) -> Result<Self, AiError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(AiError::Http)?;

        let text = config.verify_credential.clone().map(|api_key| Endpoint {
            url: config.verify_url.clone(),
            api_key,
            model: config.verify_model.clone(),
            timeout: config.verify_timeout,
        });

        let image = config.image_credential.clone().map(|api_key| Endpoint {
            url: config.image_url.clone(),
            api_key,
            model: config.image_model.clone(),
            timeout: config.image_timeout,
        });

        Ok(Self {
            http,
            text,
            image,
            image_size: config.image_size.clone(),
            image_quality: config.image_quality.clone(),
            max_image_bytes: config.max_image_bytes,
        })
    }

    pub fn text_enabled(&self) -> bool {
        self.text.is_some()
    }

    pub fn image_enabled(&self) -> bool {
        self.image.is_some()
    }

    /// Request a single completion and return its trimmed text.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, AiError> {
        let endpoint = self.text.as_ref().ok_or(AiError::NotConfigured("text completion"))?;

        let body = ChatRequest {
            model: &endpoint.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response: ChatResponse = self
            .http
            .post(&endpoint.url)
            .bearer_auth(endpoint.api_key.expose())
            .timeout(endpoint.timeout)
            .json(&body)
            .send()
            .await
            .map_err(AiError::Http)?
            .error_for_status()
            .map_err(AiError::Http)?
            .json()
            .await
            .map_err(AiError::Http)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(AiError::EmptyCompletion)
    }

    /// Ask for one image and return the URL it was published at.
    pub async fn generate_image(&self, prompt: &str) -> Result<String, AiError> {
        let endpoint = self.image.as_ref().ok_or(AiError::NotConfigured("image generation"))?;

        let body = ImageRequest {
            model: &endpoint.model,
            prompt,
            n: 1,
            size: &self.image_size,
            quality: &self.image_quality,
        };

        let response: ImageResponse = self
            .http
            .post(&endpoint.url)
            .bearer_auth(endpoint.api_key.expose())
            .timeout(endpoint.timeout)
            .json(&body)
            .send()
            .await
            .map_err(AiError::Http)?
            .error_for_status()
            .map_err(AiError::Http)?
            .json()
            .await
            .map_err(AiError::Http)?;

        response
            .data
            .into_iter()
            .next()
            .and_then(|datum| datum.url)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or(AiError::EmptyImageUrl)
    }

    /// Fetch a generated image and confirm the bytes really are an image.
    pub async fn download_image(&self, url: &str) -> Result<DownloadedImage, AiError> {
        let timeout = self
            .image
            .as_ref()
            .map(|endpoint| endpoint.timeout)
            .unwrap_or(Duration::from_secs(120));

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(AiError::Http)?
            .error_for_status()
            .map_err(AiError::Http)?;

        let limit = self.max_image_bytes;
        if let Some(size) = response.content_length() {
            if size > limit as u64 {
                return Err(AiError::ImageTooLarge { size, limit });
            }
        }

        let bytes = response.bytes().await.map_err(AiError::Http)?;
        if bytes.len() > limit {
            return Err(AiError::ImageTooLarge {
                size: bytes.len() as u64,
                limit,
            });
        }

        let format = image::guess_format(&bytes).map_err(|_| AiError::InvalidImage)?;
        Ok(DownloadedImage {
            bytes: bytes.to_vec(),
            format,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("{0} endpoint is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion response contained no text")]
    EmptyCompletion,

    #[error("image response contained no URL")]
    EmptyImageUrl,

    #[error("downloaded file is not a recognised image")]
    InvalidImage,

    #[error("downloaded image is {size} bytes, limit is {limit}")]
    ImageTooLarge { size: u64, limit: usize },
}
