//! OpenAI adapters: Chat Completions text and GPT Image generation.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::infrastructure::ports::{
    ChatMessage, ImageGenPort, MessageRole, ProviderError, TextGenPort,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_TOKENS: u32 = 2000;
const IMAGE_SIZE: &str = "1024x1024";

fn build_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Classify a non-2xx image response body. Safety-filter rejections are a
/// distinct failure class: retrying the same provider will refuse again.
fn classify_image_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    if status == reqwest::StatusCode::BAD_REQUEST
        && (body.contains("moderation_blocked") || body.to_lowercase().contains("safety"))
    {
        ProviderError::ContentRefused(body.to_string())
    } else {
        ProviderError::Transient(body.to_string())
    }
}

// =============================================================================
// Text
// =============================================================================

/// Chat Completions client. One struct serves every OpenAI-compatible model
/// key; the model name is the only difference between "gpt" and "gpt5".
#[derive(Clone)]
pub struct OpenAiTextClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiTextClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            client: build_client(120),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl TextGenPort for OpenAiTextClient {
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

        // GPT-5+ renamed the token cap parameter.
        let (max_tokens, max_completion_tokens) = if self.model.starts_with("gpt-5") {
            (None, Some(MAX_TOKENS))
        } else {
            (Some(MAX_TOKENS), None)
        };

        let api_request = ChatRequest {
            model: self.model.clone(),
            messages: api_messages,
            max_tokens,
            max_completion_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&api_request)
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
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
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

/// GPT Image client. When reference images are present the edits endpoint
/// is used so the subject's likeness carries into the scene;
/// `input_fidelity=high` is only sent to models that support it.
#[derive(Clone)]
pub struct OpenAiImageClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    supports_input_fidelity: bool,
}

impl OpenAiImageClient {
    pub fn new(api_key: &str, model: &str, supports_input_fidelity: bool) -> Self {
        Self::with_base_url(api_key, model, supports_input_fidelity, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: &str,
        model: &str,
        supports_input_fidelity: bool,
        base_url: &str,
    ) -> Self {
        Self {
            client: build_client(120),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            supports_input_fidelity,
        }
    }

    async fn generate_plain(&self, prompt: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": prompt,
                "n": 1,
                "size": IMAGE_SIZE,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_image_error(status, &body));
        }

        let api_response: ImageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        extract_image_bytes(api_response).await
    }

    async fn generate_with_references(
        &self,
        prompt: &str,
        references: &[PathBuf],
    ) -> Result<Vec<u8>, ProviderError> {
        let ref_prompt = format!(
            "Use the person from the reference photo as the main character in this scene. \
             Preserve their face, features, and likeness accurately. Scene: {prompt}"
        );

        let mut form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("prompt", ref_prompt)
            .text("size", IMAGE_SIZE.to_string());
        if self.supports_input_fidelity {
            form = form.text("input_fidelity", "high");
        }

        for path in references {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| ProviderError::Transient(format!("reference read: {e}")))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "reference.png".to_string());
            form = form.part(
                "image[]",
                reqwest::multipart::Part::bytes(bytes).file_name(filename),
            );
        }

        let response = self
            .client
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_image_error(status, &body));
        }

        let api_response: ImageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        extract_image_bytes(api_response).await
    }
}

#[async_trait]
impl ImageGenPort for OpenAiImageClient {
    async fn generate(
        &self,
        prompt: &str,
        reference_images: &[PathBuf],
    ) -> Result<Vec<u8>, ProviderError> {
        let existing: Vec<PathBuf> = reference_images
            .iter()
            .filter(|p| p.exists())
            .cloned()
            .collect();

        if existing.is_empty() {
            self.generate_plain(prompt).await
        } else {
            tracing::info!(
                references = existing.len(),
                model = %self.model,
                "Generating with reference images via edits endpoint"
            );
            self.generate_with_references(prompt, &existing).await
        }
    }
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
    url: Option<String>,
}

async fn extract_image_bytes(response: ImageResponse) -> Result<Vec<u8>, ProviderError> {
    let datum = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("No image data in response".into()))?;

    if let Some(b64) = datum.b64_json {
        return base64::engine::general_purpose::STANDARD
            .decode(b64.as_bytes())
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()));
    }
    if let Some(url) = datum.url {
        // Some models return a short-lived URL instead of inline bytes.
        let bytes = reqwest::get(&url)
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        return Ok(bytes.to_vec());
    }
    Err(ProviderError::InvalidResponse(
        "Image response had neither b64_json nor url".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderation_block_is_content_refusal() {
        let err = classify_image_error(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":{"code":"moderation_blocked"}}"#,
        );
        assert!(matches!(err, ProviderError::ContentRefused(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn rate_limit_is_transient() {
        let err = classify_image_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, ProviderError::Transient(_)));
        assert!(err.is_retryable());
    }
}
