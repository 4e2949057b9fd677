//! Environment-backed application settings.

use std::path::PathBuf;

/// Default character budget before story context switches to summarized mode.
pub const DEFAULT_CONTEXT_CHAR_THRESHOLD: usize = 50_000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub anthropic_api_key: String,
    pub openai_api_key: String,
    pub xai_api_key: String,
    /// Character budget for verbatim story context.
    pub context_char_threshold: usize,
    /// Root for generated media (images/, videos/ subdirectories).
    pub media_root: PathBuf,
    /// Root for persisted stories and progress snapshots.
    pub data_root: PathBuf,
}

impl Settings {
    /// Load settings from the environment, reading a `.env` file if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let settings = Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            xai_api_key: std::env::var("XAI_API_KEY").unwrap_or_default(),
            context_char_threshold: std::env::var("CONTEXT_CHAR_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CONTEXT_CHAR_THRESHOLD),
            media_root: std::env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/media")),
            data_root: std::env::var("DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
        };
        settings.warn_on_missing_keys();
        settings
    }

    fn warn_on_missing_keys(&self) {
        let mut missing = Vec::new();
        if self.anthropic_api_key.is_empty() {
            missing.push("ANTHROPIC_API_KEY");
        }
        if self.openai_api_key.is_empty() {
            missing.push("OPENAI_API_KEY");
        }
        if !missing.is_empty() {
            tracing::warn!(
                missing = missing.join(", "),
                "Missing API keys; those providers will be unavailable"
            );
        }
        if self.xai_api_key.is_empty() {
            tracing::info!("XAI_API_KEY not configured; Grok text/image and video generation unavailable");
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            anthropic_api_key: String::new(),
            openai_api_key: String::new(),
            xai_api_key: String::new(),
            context_char_threshold: DEFAULT_CONTEXT_CHAR_THRESHOLD,
            media_root: PathBuf::from("data/media"),
            data_root: PathBuf::from("data"),
        }
    }
}
