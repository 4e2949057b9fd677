//! Typed scene draft parsed from the text provider's raw output.
//!
//! Providers wrap JSON in markdown fences or append trailing prose often
//! enough that the parser strips fences first and, when full parsing
//! fails, decodes only the leading JSON object before giving up.

use serde::Deserialize;

use crate::infrastructure::ports::GenerationError;

/// Generic filler used to pad a draft that proposed too few choices.
const FILLER_CHOICE: &str = "Continue onward...";
const MIN_CHOICES: usize = 2;
const MAX_CHOICES: usize = 4;

#[derive(Debug, Clone, Deserialize)]
struct RawDraft {
    title: Option<String>,
    content: Option<String>,
    image_prompt: Option<String>,
    is_ending: Option<bool>,
    chapter_title: Option<String>,
    choices: Option<Vec<RawChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawChoice {
    text: String,
}

/// A validated, repaired scene draft ready to attach to the tree.
#[derive(Debug, Clone)]
pub struct SceneDraft {
    pub title: String,
    pub content: String,
    pub image_prompt: String,
    pub is_ending: bool,
    pub chapter_title: Option<String>,
    pub choices: Vec<String>,
}

impl SceneDraft {
    /// Parse and validate a raw provider response.
    ///
    /// Missing required fields are `MissingField`; unparseable text is
    /// `MalformedResponse`. Non-ending drafts get their branching factor
    /// clamped to [2, 4]: too few choices are padded with filler, too
    /// many are truncated.
    pub fn parse(text: &str) -> Result<Self, GenerationError> {
        let cleaned = strip_fences(text);

        let raw: RawDraft = match serde_json::from_str(&cleaned) {
            Ok(raw) => raw,
            Err(full_err) => {
                // Common LLM failure: valid JSON followed by extra prose.
                // Decode just the leading object.
                let mut stream = serde_json::Deserializer::from_str(&cleaned).into_iter::<RawDraft>();
                match stream.next() {
                    Some(Ok(raw)) => {
                        tracing::warn!(error = %full_err, "Recovered scene draft by ignoring trailing data");
                        raw
                    }
                    _ => {
                        return Err(GenerationError::MalformedResponse(full_err.to_string()));
                    }
                }
            }
        };

        let title = raw.title.ok_or(GenerationError::MissingField("title"))?;
        let content = raw.content.ok_or(GenerationError::MissingField("content"))?;
        let image_prompt = raw
            .image_prompt
            .ok_or(GenerationError::MissingField("image_prompt"))?;
        let is_ending = raw.is_ending.ok_or(GenerationError::MissingField("is_ending"))?;
        let mut choices: Vec<String> = raw
            .choices
            .ok_or(GenerationError::MissingField("choices"))?
            .into_iter()
            .map(|c| c.text)
            .collect();

        if !is_ending {
            while choices.len() < MIN_CHOICES {
                choices.push(FILLER_CHOICE.to_string());
            }
            choices.truncate(MAX_CHOICES);
        }

        Ok(Self {
            title,
            content,
            image_prompt,
            is_ending,
            chapter_title: raw.chapter_title,
            choices,
        })
    }

    /// Force a finale: ending flag on, choices dropped. Applied when the
    /// depth budget says this must be the last scene, regardless of what
    /// the generator produced.
    pub fn force_ending(&mut self) {
        self.is_ending = true;
        self.choices.clear();
    }
}

fn strip_fences(text: &str) -> String {
    let cleaned = text.trim();
    if !cleaned.starts_with("```") {
        return cleaned.to_string();
    }
    let mut lines: Vec<&str> = cleaned.lines().collect();
    lines.remove(0);
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n")
}
