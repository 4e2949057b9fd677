//! Narrative context assembly for the text provider.
//!
//! Builds one text blob of "Chapter N" blocks from the active path. Past a
//! character budget the earlier chapters are collapsed into a crude
//! truncated summary block - a token-budget guard that trades fidelity for
//! guaranteed boundedness, not a semantic summarizer.

use fableforge_domain::Scene;

use crate::infrastructure::settings::DEFAULT_CONTEXT_CHAR_THRESHOLD;

/// Chapters kept verbatim when context switches to summarized mode.
const VERBATIM_TAIL: usize = 2;
/// Character cap on the collapsed earlier-chapter text.
const SUMMARY_CHAR_CAP: usize = 2000;

pub const SUMMARY_MARKER: &str = "Summary of earlier chapters";

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    pub char_threshold: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            char_threshold: DEFAULT_CONTEXT_CHAR_THRESHOLD,
        }
    }
}

impl ContextBuilder {
    pub fn new(char_threshold: usize) -> Self {
        Self { char_threshold }
    }

    /// Assemble the full story context from prior scenes.
    ///
    /// Each chapter block is annotated with the literal text of the choice
    /// that led to the NEXT block, resolved from the next scene's
    /// `choice_taken_id` against this scene's choice list.
    pub fn build(&self, prompt: &str, scenes: &[Scene]) -> String {
        let header = format!("Original adventure prompt: {prompt}\n\nStory so far:\n");
        let mut total_chars = header.chars().count();
        let mut chapter_texts = Vec::with_capacity(scenes.len());

        for (i, scene) in scenes.iter().enumerate() {
            let mut text = format!("--- Chapter {} ---\n{}", i + 1, scene.content);
            if let Some(next) = scenes.get(i + 1) {
                let taken = next
                    .choice_taken_id
                    .and_then(|cid| scene.find_choice(cid));
                if let Some(choice) = taken {
                    text.push_str(&format!("\n[Reader chose: \"{}\"]", choice.text));
                }
            }
            total_chars += text.chars().count();
            chapter_texts.push(text);
        }

        if total_chars > self.char_threshold && chapter_texts.len() > VERBATIM_TAIL {
            return summarize_long_context(prompt, &chapter_texts);
        }

        let mut parts = vec![header];
        parts.extend(chapter_texts);
        parts.join("\n\n")
    }
}

/// Keep the last chapters verbatim; collapse everything earlier into a
/// truncated explanatory block.
fn summarize_long_context(prompt: &str, chapter_texts: &[String]) -> String {
    let split = chapter_texts.len() - VERBATIM_TAIL;
    let (earlier, recent) = chapter_texts.split_at(split);

    let earlier_text = earlier.join("\n\n");
    format!(
        "Original adventure prompt: {prompt}\n\n\
         [{SUMMARY_MARKER}: The story has progressed through {} chapters. \
         Key events: {}...]\n\n\
         Recent chapters:\n\n{}",
        earlier.len(),
        truncate_chars(&earlier_text, SUMMARY_CHAR_CAP),
        recent.join("\n\n"),
    )
}

/// Char-boundary-safe prefix; byte slicing would panic mid-codepoint.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}
