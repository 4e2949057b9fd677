//! Content-guideline and image-style directive assembly.
//!
//! Directives arrive as free text from several optional sources and are
//! concatenated in append order; overlapping directives are upstream
//! behavior, not resolved here. The one non-append case is bedtime mode,
//! whose image style REPLACES whatever has accumulated.

use fableforge_domain::Story;

pub const BEDTIME_CONTENT_GUIDELINES: &str = "\
BEDTIME STORY MODE:
This is a bedtime story. You MUST follow these additional rules:
- Use an extra-gentle, soothing, calming tone throughout.
- No tension, conflict, danger, excitement, or suspense of any kind.
- Scenes should be warm, peaceful, and cozy — think soft blankets, starlight, gentle breezes.
- Keep sentences short and rhythmic, almost lullaby-like.
- The FINAL scene MUST end with the main character settling in for sleep, getting cozy in bed, closing their eyes, or peacefully drifting off to dreamland.
- Even non-final scenes should feel sleepy and winding down.";

pub const BEDTIME_IMAGE_STYLE: &str = "soft warm nighttime illustration, cozy moonlit scene, \
gentle pastel colors, warm amber lighting, starry sky, dreamy atmosphere, children's bedtime \
book style, soothing and peaceful, no bright or harsh colors";

/// Protagonist ages that trigger picture-book mode (3 images per scene).
const PICTURE_BOOK_AGES: [&str; 2] = ["toddler", "young-child"];

pub fn is_picture_book_age(protagonist_age: &str) -> bool {
    PICTURE_BOOK_AGES.contains(&protagonist_age)
}

/// Art style registry: key → prompt addition appended to the image style.
const ART_STYLES: [(&str, &str); 10] = [
    ("none", ""),
    (
        "oil-painting",
        "rich oil painting style, textured brushstrokes, dramatic lighting, classical fine art aesthetic",
    ),
    (
        "watercolor",
        "delicate watercolor painting style, soft washes of color, paper texture, flowing transparent layers",
    ),
    (
        "anime",
        "anime illustration style, vibrant colors, expressive characters, detailed backgrounds, Japanese animation aesthetic",
    ),
    (
        "comic-book",
        "bold comic book art style, strong ink outlines, dynamic composition, vivid colors, graphic novel aesthetic",
    ),
    (
        "pixel-art",
        "retro pixel art style, 16-bit aesthetic, crisp edges, limited color palette, nostalgic video game look",
    ),
    (
        "photo-cinematic",
        "photorealistic cinematic photography, movie-like composition, dramatic lighting, film grain, widescreen feel",
    ),
    (
        "photo-instagram",
        "photorealistic Instagram photography, perfect lighting, glamorous, curated aesthetic, high-end fashion look",
    ),
    (
        "photo-selfie",
        "photorealistic selfie style, natural casual phone photography, authentic candid moment",
    ),
    (
        "photo-casual",
        "photorealistic casual lifestyle photography, candid moments, natural lighting, everyday settings",
    ),
];

pub fn art_style_prompt(key: &str) -> &'static str {
    ART_STYLES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, prompt)| *prompt)
        .unwrap_or("")
}

const AGE_FLAVOR: [(&str, &str); 4] = [
    ("toddler", "The protagonist is a very young child (2-4 years old)."),
    ("young-child", "The protagonist is a young child (5-8 years old)."),
    ("teen", "The protagonist is a teenager."),
    ("adult", "The protagonist is an adult."),
];

fn age_flavor(protagonist_age: &str) -> &'static str {
    AGE_FLAVOR
        .iter()
        .find(|(k, _)| *k == protagonist_age)
        .map(|(_, text)| *text)
        .unwrap_or("")
}

/// Accumulated directives handed to the scene pipeline: a content
/// guideline blob for the system prompt and an image style suffix for
/// the image prompt.
#[derive(Debug, Clone, Default)]
pub struct Directives {
    pub content_guidelines: String,
    pub image_style: String,
}

impl Directives {
    /// Append a guideline block, blank-line separated.
    pub fn append_guidelines(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.content_guidelines.is_empty() {
            self.content_guidelines.push_str("\n\n");
        }
        self.content_guidelines.push_str(text);
    }

    /// Append an image style fragment, comma-joined.
    pub fn append_style(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.image_style.is_empty() {
            self.image_style.push_str(", ");
        }
        self.image_style.push_str(text);
    }

    fn append_character(&mut self, name: &str, description: &str) {
        if name.is_empty() {
            return;
        }
        let mut block = format!("CHARACTER:\nName: {name}");
        if !description.is_empty() {
            block.push_str(&format!("\nAppearance: {description}"));
        }
        block.push_str(
            "\nThis character MUST appear in every scene. Use their name consistently. \
             Maintain their physical description across all scenes.",
        );
        self.append_guidelines(&block);
        // Description rides into the image style for visual consistency.
        self.append_style(description);
    }

    /// Bedtime override: guidelines append, image style is replaced.
    fn apply_bedtime(&mut self) {
        self.append_guidelines(BEDTIME_CONTENT_GUIDELINES);
        self.image_style = BEDTIME_IMAGE_STYLE.to_string();
    }

    /// Rebuild the full directive set for a story, in append order: base
    /// guidelines/style, art style, story flavor, character block, then
    /// the bedtime override last.
    pub fn for_story(story: &Story, base_guidelines: &str, base_style: &str) -> Self {
        let mut directives = Directives::default();
        directives.append_guidelines(base_guidelines);
        directives.append_style(base_style);

        directives.append_style(art_style_prompt(&story.art_style));

        let flavor = age_flavor(&story.protagonist_age);
        if !flavor.is_empty() {
            directives.append_guidelines(&format!("STORY SETUP:\n{flavor}"));
        }

        directives.append_character(&story.character_name, &story.character_description);

        if story.bedtime_mode {
            directives.apply_bedtime();
        }

        directives
    }
}
