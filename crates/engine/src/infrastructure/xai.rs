//! xAI adapters: Grok text (OpenAI-compatible chat), Grok Imagine images,
//! and Grok Imagine video (submit-then-poll).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::infrastructure::ports::{
    ChatMessage, ImageGenPort, MessageRole, ProviderError, TextGenPort, VideoGenPort, VideoJobId,
    VideoPoll,
};

const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
const TEXT_MODEL: &str = "grok-3";
const IMAGE_MODEL: &str = "grok-imagine-image";
const VIDEO_MODEL: &str = "grok-imagine-video";
const MAX_TOKENS: u32 = 2000;

fn build_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    if status == reqwest::StatusCode::BAD_REQUEST
        && (body.contains("moderation") || body.to_lowercase().contains("safety"))
    {
        ProviderError::ContentRefused(body.to_string())
    } else {
        ProviderError::Transient(body.to_string())
    }
}

/// Encode a local image file as a `data:` URL for JSON payloads.
async fn data_url_for(path: &Path) -> Result<String, ProviderError> {
    let mime = match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    };
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ProviderError::Transient(format!("reference read: {e}")))?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:{mime};base64,{b64}"))
}

// =============================================================================
// Text
// =============================================================================

#[derive(Clone)]
pub struct GrokTextClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GrokTextClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: build_client(120),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl TextGenPort for GrokTextClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let mut api_messages = vec![ApiMessage {
            role: "system".into(),
            content: system.to_string(),
        }];
        api_messages.extend(messages.iter().map(|m| ApiMessage {
            role: match m.role {
                MessageRole::User => "user".into(),
                MessageRole::Assistant => "assistant".into(),
            },
            content: m.content.clone(),
        }));

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: TEXT_MODEL.into(),
                max_tokens: MAX_TOKENS,
                messages: api_messages,
            })
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Transient(error_text));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("No completion choices".into()))
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

// =============================================================================
// Images
// =============================================================================

/// Grok Imagine image client. Reference editing goes through the same
/// generations endpoint with an `image_url` data URL (xAI takes JSON here,
/// not multipart); only the first reference is forwarded.
#[derive(Clone)]
pub struct GrokImageClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GrokImageClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: build_client(120),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl ImageGenPort for GrokImageClient {
    async fn generate(
        &self,
        prompt: &str,
        reference_images: &[PathBuf],
    ) -> Result<Vec<u8>, ProviderError> {
        let mut body = serde_json::json!({
            "model": IMAGE_MODEL,
            "prompt": prompt,
            "n": 1,
            "response_format": "b64_json",
        });

        if let Some(reference) = reference_images.iter().find(|p| p.exists()) {
            let ref_prompt = format!(
                "Use the person from the reference photo as the main character in this scene. \
                 Preserve their face, features, and likeness accurately. Scene: {prompt}"
            );
            body["prompt"] = serde_json::Value::String(ref_prompt);
            body["image_url"] = serde_json::Value::String(data_url_for(reference).await?);
            tracing::info!(reference = %reference.display(), "Grok Imagine editing with reference photo");
        }

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_error(status, &body));
        }

        let api_response: ImageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let datum = api_response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No image data in response".into()))?;

        datum
            .b64_json
            .ok_or_else(|| ProviderError::InvalidResponse("No b64_json in Grok Imagine response".into()))
            .and_then(|b64| {
                base64::engine::general_purpose::STANDARD
                    .decode(b64.as_bytes())
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
            })
    }
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
}

// =============================================================================
// Video (submit-then-poll)
// =============================================================================

/// Grok Imagine video client. Submits a job, then the port's default
/// `generate` drives polling. When a first frame is supplied the request is
/// image-conditioned for visual continuity with the scene's still.
#[derive(Clone)]
pub struct GrokVideoClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GrokVideoClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: build_client(30),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl VideoGenPort for GrokVideoClient {
    async fn submit(
        &self,
        prompt: &str,
        first_frame: Option<&Path>,
    ) -> Result<VideoJobId, ProviderError> {
        let mut body = serde_json::json!({
            "model": VIDEO_MODEL,
            "prompt": prompt,
            "duration": 8,
            "aspect_ratio": "1:1",
            "resolution": "720p",
        });

        if let Some(frame) = first_frame {
            body["image"] = serde_json::json!({ "url": data_url_for(frame).await? });
            tracing::info!("Using image-to-video generation");
        } else {
            tracing::info!("Using text-to-video generation (no first frame)");
        }

        let response = self
            .client
            .post(format!("{}/videos/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_error(status, &body));
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(VideoJobId(submitted.request_id))
    }

    async fn poll(&self, job: &VideoJobId) -> Result<VideoPoll, ProviderError> {
        let response = self
            .client
            .get(format!("{}/videos/{}", self.base_url, job.0))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let poll: PollResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if let Some(error) = poll.error {
            return Err(ProviderError::Transient(format!(
                "video generation error: {error}"
            )));
        }

        let url = poll.video.and_then(|v| v.url).or(poll.url);
        match url {
            Some(url) => {
                let bytes = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| ProviderError::Transient(e.to_string()))?
                    .bytes()
                    .await
                    .map_err(|e| ProviderError::Transient(e.to_string()))?;
                Ok(VideoPoll::Ready(bytes.to_vec()))
            }
            None => Ok(VideoPoll::Pending),
        }
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    request_id: String,
}

#[derive(Deserialize)]
struct PollResponse {
    video: Option<PollVideo>,
    url: Option<String>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct PollVideo {
    url: Option<String>,
}
