//! System prompt template and pacing policy for scene generation.

/// Where the story sits relative to its target depth. Determines the
/// pacing instruction and how many choices the generator is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// `remaining <= 1`: this must be the final scene.
    Finale,
    /// `remaining <= 2`: begin wrapping up; the model may end here.
    WrapUp,
    /// Otherwise: keep building.
    Developing,
}

impl Pacing {
    pub fn for_depth(current_depth: u32, target_depth: u32) -> Self {
        let remaining = target_depth.saturating_sub(current_depth);
        if remaining <= 1 {
            Self::Finale
        } else if remaining <= 2 {
            Self::WrapUp
        } else {
            Self::Developing
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Self::Finale => "This MUST be the final scene. Set is_ending to true and choices to [].",
            Self::WrapUp => {
                "The story is approaching its conclusion. Begin wrapping up loose threads. \
                 You may end the story here or give 2-3 final choices."
            }
            Self::Developing => "The story is still developing. Build tension and expand the narrative.",
        }
    }

    pub fn choice_count(self) -> u32 {
        match self {
            Self::Finale => 0,
            Self::WrapUp | Self::Developing => 3,
        }
    }
}

/// Chapter placement for epic-length stories.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChapterPlacement {
    pub chapter_number: Option<u32>,
    pub total_chapters: Option<u32>,
    pub is_chapter_start: bool,
}

impl ChapterPlacement {
    fn instruction(&self) -> (String, &'static str) {
        let (Some(number), Some(total)) = (self.chapter_number, self.total_chapters) else {
            return (String::new(), "");
        };

        let mut text = format!(
            "\nCHAPTER STRUCTURE:\n\
             - You are writing Chapter {number} of {total}.\n\
             - Each chapter spans ~5 scenes with its own mini narrative arc.\n\
             - Maintain an overarching story thread across all chapters."
        );
        if number == 1 {
            text.push_str("\n- This is the opening chapter. Establish the world, characters, and central conflict.");
        } else if number == total {
            text.push_str("\n- This is the final chapter. Build toward the story's climax and resolution.");
        } else {
            text.push_str("\n- This is a middle chapter. Develop subplots and raise the stakes.");
        }

        let mut title_field = "";
        if self.is_chapter_start {
            text.push_str(
                "\n- This scene is the FIRST scene of a new chapter. Set a new tone or \
                 location shift to mark the chapter transition.",
            );
            title_field = "\n  \"chapter_title\": \"A short, evocative chapter title (3-6 words)\",";
        }
        (text, title_field)
    }
}

/// Build the system prompt for one scene generation. Content guidelines,
/// when present, are prepended ahead of the storyteller rules.
pub fn build_system_prompt(
    content_guidelines: &str,
    story_length: &str,
    current_depth: u32,
    target_depth: u32,
    pacing: Pacing,
    chapters: ChapterPlacement,
) -> String {
    let (chapter_instruction, chapter_title_field) = chapters.instruction();

    let system = format!(
        r#"You are a master storyteller creating an interactive choose-your-own-adventure story.

RULES:
1. Generate exactly ONE scene at a time.
2. Each scene must have vivid, engaging narrative text (2-4 paragraphs).
3. Non-ending scenes MUST have exactly {choice_count} distinct choices for the reader.
4. Each choice should lead to meaningfully different story directions.
5. Maintain narrative consistency with all prior scenes — characters, locations, and plot threads must remain coherent.
6. The user's original prompt is your creative north star. Every scene must reflect:
   - The THEME and GENRE specified (fantasy, sci-fi, mystery, romance, horror, etc.)
   - The TONE matching the genre (noir for detective, whimsical for fairy tales, tense for thrillers)
   - The SETTING established in the prompt — keep locations, time period, and world consistent
   - CHARACTER NAMES and traits that persist across all scenes
   - Even short prompts like "space pirates" should produce fully realized, genre-appropriate stories
7. Generate a detailed image_prompt that visually describes this scene for an AI image generator.
   - Describe composition, lighting, mood, and key visual elements in detail.
   - Include consistent character descriptions across ALL scenes (e.g., "a tall woman with silver hair and a blue cloak" should appear the same way every time).
   - Match the art style to the story genre (dark oil painting for horror, bright watercolor for children's fantasy, cinematic realism for thrillers, etc.).
   - Describe the specific environment, weather, and atmosphere.
   - Do NOT include any text, words, letters, or writing in the image description.

STORY PACING:
- Story length: {story_length} ({target_depth} chapters total)
- Current chapter: {chapter} of {target_depth}
- {pacing_instruction}
{chapter_instruction}

OUTPUT FORMAT (strict JSON, no markdown):
{{
  "title": "Scene title (short, evocative)",
  "content": "The narrative text for this scene. Multiple paragraphs separated by newlines.",
  "image_prompt": "Detailed visual description for AI image generation.",
  "is_ending": false,{chapter_title_field}
  "choices": [
    {{"text": "Choice 1 description"}},
    {{"text": "Choice 2 description"}},
    {{"text": "Choice 3 description"}}
  ]
}}

For ending scenes, set is_ending to true and choices to an empty array [].
Write a satisfying conclusion that wraps up the story thread.
"#,
        choice_count = pacing.choice_count(),
        chapter = current_depth + 1,
        pacing_instruction = pacing.instruction(),
    );

    if content_guidelines.is_empty() {
        system
    } else {
        format!("{content_guidelines}\n\n{system}")
    }
}

/// Recap summarizer system prompt. `sentence_count` stretches for long
/// stories; the recap style rides along when the caller supplies one.
pub fn build_recap_prompt(scene_count: usize, content_guidelines: &str, recap_style: &str) -> String {
    let sentence_count = if scene_count < 10 { "2-3" } else { "3-4" };
    let mut system = format!(
        "You are a story recap writer. Summarize the story events so far in \
         {sentence_count} short sentences. Write in the same tone and voice as \
         the story. Do not mention choices, options, or what might happen next. \
         Just summarize what has happened."
    );
    if !recap_style.is_empty() {
        system.push(' ');
        system.push_str(recap_style);
    }
    if content_guidelines.is_empty() {
        system
    } else {
        format!("{content_guidelines}\n\n{system}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_tie_breaks() {
        assert_eq!(Pacing::for_depth(2, 3), Pacing::Finale);
        assert_eq!(Pacing::for_depth(3, 3), Pacing::Finale);
        assert_eq!(Pacing::for_depth(5, 3), Pacing::Finale);
        assert_eq!(Pacing::for_depth(1, 3), Pacing::WrapUp);
        assert_eq!(Pacing::for_depth(0, 3), Pacing::Developing);
        assert_eq!(Pacing::for_depth(0, 25), Pacing::Developing);
    }

    #[test]
    fn system_prompt_carries_pacing_and_counters() {
        let prompt = build_system_prompt(
            "",
            "short",
            1,
            3,
            Pacing::WrapUp,
            ChapterPlacement::default(),
        );
        assert!(prompt.contains("Current chapter: 2 of 3"));
        assert!(prompt.contains("approaching its conclusion"));
        assert!(!prompt.contains("CHAPTER STRUCTURE"));
    }

    #[test]
    fn guidelines_are_prepended() {
        let prompt = build_system_prompt(
            "CONTENT POLICY: keep it gentle.",
            "medium",
            0,
            5,
            Pacing::Developing,
            ChapterPlacement::default(),
        );
        assert!(prompt.starts_with("CONTENT POLICY: keep it gentle."));
    }

    #[test]
    fn chapter_start_requests_a_title_field() {
        let prompt = build_system_prompt(
            "",
            "epic",
            5,
            25,
            Pacing::Developing,
            ChapterPlacement {
                chapter_number: Some(2),
                total_chapters: Some(5),
                is_chapter_start: true,
            },
        );
        assert!(prompt.contains("Chapter 2 of 5"));
        assert!(prompt.contains("FIRST scene of a new chapter"));
        assert!(prompt.contains("\"chapter_title\""));
    }
}
