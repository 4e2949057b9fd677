//! Provider registry: closed provider id enums, capability flags, and
//! credential-gated resolution.
//!
//! Availability is a hard precondition: an unconfigured provider resolves
//! to `Unavailable` and the call is never attempted.

use std::str::FromStr;
use std::sync::Arc;

use crate::infrastructure::anthropic::AnthropicClient;
use crate::infrastructure::openai::{OpenAiImageClient, OpenAiTextClient};
use crate::infrastructure::ports::{ImageGenPort, ProviderError, TextGenPort, VideoGenPort};
use crate::infrastructure::settings::Settings;
use crate::infrastructure::xai::{GrokImageClient, GrokTextClient, GrokVideoClient};

// =============================================================================
// Text Providers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextProviderId {
    Claude,
    Gpt,
    Gpt5,
    Grok,
}

impl TextProviderId {
    pub const ALL: [TextProviderId; 4] = [Self::Claude, Self::Gpt, Self::Gpt5, Self::Grok];

    pub fn key(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gpt => "gpt",
            Self::Gpt5 => "gpt5",
            Self::Grok => "grok",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::Gpt => "GPT-4o",
            Self::Gpt5 => "GPT-5.2",
            Self::Grok => "Grok",
        }
    }
}

impl std::fmt::Display for TextProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TextProviderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "claude" => Ok(Self::Claude),
            "gpt" => Ok(Self::Gpt),
            "gpt5" => Ok(Self::Gpt5),
            "grok" => Ok(Self::Grok),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Image Providers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageProviderId {
    GptImage1,
    GptImage1Mini,
    GptImage15,
    GrokImagine,
}

impl ImageProviderId {
    pub const ALL: [ImageProviderId; 4] = [
        Self::GptImage1,
        Self::GptImage1Mini,
        Self::GptImage15,
        Self::GrokImagine,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::GptImage1 => "gpt-image-1",
            Self::GptImage1Mini => "gpt-image-1-mini",
            Self::GptImage15 => "gpt-image-1.5",
            Self::GrokImagine => "grok-imagine",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::GptImage1 => "GPT Image 1",
            Self::GptImage1Mini => "GPT Image 1 Mini",
            Self::GptImage15 => "GPT Image 1.5",
            Self::GrokImagine => "Grok Imagine",
        }
    }

    /// Whether the backend accepts `input_fidelity=high` on reference
    /// edits. The mini model does not.
    pub fn supports_input_fidelity(self) -> bool {
        matches!(self, Self::GptImage1 | Self::GptImage15)
    }
}

impl std::fmt::Display for ImageProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ImageProviderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            // "dalle" is a legacy alias from old saved stories
            "gpt-image-1" | "dalle" => Ok(Self::GptImage1),
            "gpt-image-1-mini" => Ok(Self::GptImage1Mini),
            "gpt-image-1.5" => Ok(Self::GptImage15),
            "grok-imagine" => Ok(Self::GrokImagine),
            _ => Err(()),
        }
    }
}

/// Fallback order when a provider refuses content. The refusing provider
/// is skipped; first success wins.
pub const IMAGE_FALLBACK_ORDER: [ImageProviderId; 2] =
    [ImageProviderId::GptImage1, ImageProviderId::GrokImagine];

/// Cheaper model used for picture-book extra illustrations.
pub const FAST_IMAGE_PROVIDER: ImageProviderId = ImageProviderId::GptImage1Mini;

// =============================================================================
// Resolution
// =============================================================================

/// Resolution seam between business logic and concrete adapters, so the
/// pipeline and orchestrator can be driven by mocks in tests.
pub trait ProviderResolver: Send + Sync {
    fn text(&self, id: TextProviderId) -> Result<Arc<dyn TextGenPort>, ProviderError>;
    fn image(&self, id: ImageProviderId) -> Result<Arc<dyn ImageGenPort>, ProviderError>;
    fn video(&self) -> Result<Arc<dyn VideoGenPort>, ProviderError>;

    /// Provider for picture-book extras: the fast model when configured,
    /// else the story's own provider.
    fn fast_image_provider(&self, story_provider: ImageProviderId) -> ImageProviderId;
}

pub struct ProviderRegistry {
    settings: Settings,
}

impl ProviderRegistry {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn text_key(&self, id: TextProviderId) -> &str {
        match id {
            TextProviderId::Claude => &self.settings.anthropic_api_key,
            TextProviderId::Gpt | TextProviderId::Gpt5 => &self.settings.openai_api_key,
            TextProviderId::Grok => &self.settings.xai_api_key,
        }
    }

    fn image_key(&self, id: ImageProviderId) -> &str {
        match id {
            ImageProviderId::GptImage1
            | ImageProviderId::GptImage1Mini
            | ImageProviderId::GptImage15 => &self.settings.openai_api_key,
            ImageProviderId::GrokImagine => &self.settings.xai_api_key,
        }
    }

    pub fn text_available(&self, id: TextProviderId) -> bool {
        !self.text_key(id).is_empty()
    }

    pub fn image_available(&self, id: ImageProviderId) -> bool {
        !self.image_key(id).is_empty()
    }

    pub fn video_available(&self) -> bool {
        !self.settings.xai_api_key.is_empty()
    }

    pub fn available_text_providers(&self) -> Vec<TextProviderId> {
        TextProviderId::ALL
            .into_iter()
            .filter(|id| self.text_available(*id))
            .collect()
    }

    pub fn available_image_providers(&self) -> Vec<ImageProviderId> {
        ImageProviderId::ALL
            .into_iter()
            .filter(|id| self.image_available(*id))
            .collect()
    }
}

impl ProviderResolver for ProviderRegistry {
    fn text(&self, id: TextProviderId) -> Result<Arc<dyn TextGenPort>, ProviderError> {
        let key = self.text_key(id);
        if key.is_empty() {
            return Err(ProviderError::Unavailable(id.key()));
        }
        Ok(match id {
            TextProviderId::Claude => Arc::new(AnthropicClient::new(key)),
            TextProviderId::Gpt => Arc::new(OpenAiTextClient::new(key, "gpt-4o")),
            TextProviderId::Gpt5 => Arc::new(OpenAiTextClient::new(key, "gpt-5.2")),
            TextProviderId::Grok => Arc::new(GrokTextClient::new(key)),
        })
    }

    fn image(&self, id: ImageProviderId) -> Result<Arc<dyn ImageGenPort>, ProviderError> {
        let key = self.image_key(id);
        if key.is_empty() {
            return Err(ProviderError::Unavailable(id.key()));
        }
        Ok(match id {
            ImageProviderId::GrokImagine => Arc::new(GrokImageClient::new(key)),
            openai_model => Arc::new(OpenAiImageClient::new(
                key,
                openai_model.key(),
                openai_model.supports_input_fidelity(),
            )),
        })
    }

    fn video(&self) -> Result<Arc<dyn VideoGenPort>, ProviderError> {
        if !self.video_available() {
            return Err(ProviderError::Unavailable("grok-imagine-video"));
        }
        Ok(Arc::new(GrokVideoClient::new(&self.settings.xai_api_key)))
    }

    fn fast_image_provider(&self, story_provider: ImageProviderId) -> ImageProviderId {
        if self.image_available(FAST_IMAGE_PROVIDER) {
            FAST_IMAGE_PROVIDER
        } else {
            story_provider
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(anthropic: &str, openai: &str, xai: &str) -> Settings {
        Settings {
            anthropic_api_key: anthropic.into(),
            openai_api_key: openai.into(),
            xai_api_key: xai.into(),
            ..Settings::default()
        }
    }

    #[test]
    fn unconfigured_provider_is_unavailable_without_a_call() {
        let registry = ProviderRegistry::new(settings("", "sk-x", ""));

        assert!(matches!(
            registry.text(TextProviderId::Claude),
            Err(ProviderError::Unavailable("claude"))
        ));
        assert!(matches!(
            registry.video(),
            Err(ProviderError::Unavailable(_))
        ));
        assert!(registry.text(TextProviderId::Gpt).is_ok());
    }

    #[test]
    fn availability_follows_credentials() {
        let registry = ProviderRegistry::new(settings("sk-a", "", "sk-x"));

        assert_eq!(
            registry.available_text_providers(),
            vec![TextProviderId::Claude, TextProviderId::Grok]
        );
        assert_eq!(
            registry.available_image_providers(),
            vec![ImageProviderId::GrokImagine]
        );
    }

    #[test]
    fn fast_provider_falls_back_to_story_provider() {
        let without_openai = ProviderRegistry::new(settings("", "", "sk-x"));
        assert_eq!(
            without_openai.fast_image_provider(ImageProviderId::GrokImagine),
            ImageProviderId::GrokImagine
        );

        let with_openai = ProviderRegistry::new(settings("", "sk-o", ""));
        assert_eq!(
            with_openai.fast_image_provider(ImageProviderId::GrokImagine),
            FAST_IMAGE_PROVIDER
        );
    }

    #[test]
    fn provider_keys_round_trip() {
        for id in TextProviderId::ALL {
            assert_eq!(id.key().parse::<TextProviderId>(), Ok(id));
        }
        for id in ImageProviderId::ALL {
            assert_eq!(id.key().parse::<ImageProviderId>(), Ok(id));
        }
        assert_eq!("dalle".parse::<ImageProviderId>(), Ok(ImageProviderId::GptImage1));
    }

    #[test]
    fn input_fidelity_excludes_mini() {
        assert!(ImageProviderId::GptImage1.supports_input_fidelity());
        assert!(ImageProviderId::GptImage15.supports_input_fidelity());
        assert!(!ImageProviderId::GptImage1Mini.supports_input_fidelity());
        assert!(!ImageProviderId::GrokImagine.supports_input_fidelity());
    }
}
