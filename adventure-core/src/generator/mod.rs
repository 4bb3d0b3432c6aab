//! The story and image generator boundary.
//!
//! The engine talks to its generative backends through two traits:
//! [`StoryGenerator`] turns history plus an action into a validated
//! [`GameStateUpdate`], and [`ImageGenerator`] turns a prompt into an image.
//! Raw model output never reaches the engine; [`schema`] validates it first.

pub mod anthropic;
pub mod schema;

use crate::characters::{CharacterCandidate, CharacterPortrait};
use crate::config::{GameSettings, ImageSize};
use crate::conversation::HistoryEntry;
use crate::image::EncodedImage;
use crate::inventory::QuestItem;
use crate::scene::{Choice, DialogueConfig};
use crate::session::VisualIdentity;
use async_trait::async_trait;
use thiserror::Error;

pub use anthropic::{ClaudeStoryGenerator, StoryGeneratorConfig};
pub use schema::{parse_story_response, to_wire_json};

/// Errors from the story generator. Any of these aborts the turn.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Generator API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed story response: {0}")]
    Malformed(String),

    #[error("No API key configured - set ANTHROPIC_API_KEY or store a key in settings")]
    NoApiKey,
}

impl From<claude::Error> for GeneratorError {
    fn from(error: claude::Error) -> Self {
        match error {
            claude::Error::NoApiKey => GeneratorError::NoApiKey,
            claude::Error::Network(msg) => GeneratorError::Network(msg),
            claude::Error::Api { status, message } => GeneratorError::Api { status, message },
            claude::Error::Parse(msg) => GeneratorError::Malformed(msg),
            claude::Error::Config(msg) => GeneratorError::Network(msg),
        }
    }
}

/// Failure of a single image request. Logged and degraded to an empty
/// image; never aborts a turn.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image backend error: {0}")]
    Backend(String),

    #[error("Image backend returned no image")]
    NoImage,

    #[error("Image generation is disabled")]
    Disabled,
}

/// One planned narrative segment and the prompt for its illustration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPlan {
    pub text: String,
    pub image_prompt: String,
}

impl SegmentPlan {
    pub fn new(text: impl Into<String>, image_prompt: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_prompt: image_prompt.into(),
        }
    }
}

/// A validated turn result from the story generator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameStateUpdate {
    /// Setting shared by every image of the scene.
    pub scene_visual_context: String,
    pub character_visual_identity: String,
    pub location_visual_identity: String,
    /// Never empty; every segment has text.
    pub story_segments: Vec<SegmentPlan>,
    /// At most three.
    pub choices: Vec<Choice>,
    pub inventory_add: Vec<String>,
    pub inventory_remove: Vec<String>,
    /// Complete quest list; replaces the previous one.
    pub quests: Vec<QuestItem>,
    pub is_game_over: bool,
    pub game_over_message: String,
    pub mandatory_dialogue: Option<DialogueConfig>,
    pub optional_talk_characters: Vec<DialogueConfig>,
    pub new_characters: Vec<CharacterCandidate>,
    pub visible_character_names: Vec<String>,
    pub highlighted_character: Option<String>,
    pub mood_track: Option<String>,
}

/// Everything the story generator sees for one turn.
#[derive(Debug, Clone, Copy)]
pub struct StoryRequest<'a> {
    pub history: &'a [HistoryEntry],
    pub action: &'a str,
    pub settings: &'a GameSettings,
    pub visual_identity: Option<&'a VisualIdentity>,
    pub known_characters: &'a [CharacterPortrait],
}

/// Produces the next scene from the story so far.
#[async_trait]
pub trait StoryGenerator: Send + Sync {
    async fn next_scene(&self, request: StoryRequest<'_>) -> Result<GameStateUpdate, GeneratorError>;
}

/// What an image is for. Scene art is wide, portraits are square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Scene,
    Portrait,
}

impl ImageKind {
    pub fn aspect_ratio(&self) -> &'static str {
        match self {
            ImageKind::Scene => "16:9",
            ImageKind::Portrait => "1:1",
        }
    }
}

/// A single image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub kind: ImageKind,
    pub size: ImageSize,
    /// Portraits of characters who appear in the image.
    pub reference_images: Vec<EncodedImage>,
}

/// Produces illustrations and portraits.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, request: ImageRequest) -> Result<EncodedImage, ImageError>;
}

/// An image generator that never produces anything. Every segment keeps
/// an empty image.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImages;

#[async_trait]
impl ImageGenerator for NoImages {
    async fn generate_image(&self, _request: ImageRequest) -> Result<EncodedImage, ImageError> {
        Err(ImageError::Disabled)
    }
}

/// Full prompt for one segment illustration:
/// `Scene: … . Main character: … . Location: … . Action: … . Style: …`
/// with empty parts left out.
pub fn scene_image_prompt(
    scene_visual_context: &str,
    identity: &VisualIdentity,
    action_prompt: &str,
    style: &str,
) -> String {
    let parts = [
        ("Scene", scene_visual_context),
        ("Main character", identity.character.as_str()),
        ("Location", identity.location.as_str()),
        ("Action", action_prompt),
        ("Style", style),
    ];
    parts
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(label, value)| format!("{label}: {}", value.trim()))
        .collect::<Vec<_>>()
        .join(". ")
}

/// Prompt for a square character portrait.
pub fn portrait_prompt(candidate: &CharacterCandidate, style: &str) -> String {
    let mut prompt = format!("Character portrait of {}", candidate.name);
    if !candidate.role.trim().is_empty() {
        prompt.push_str(&format!(", {}", candidate.role.trim()));
    }
    if !candidate.visual_description.trim().is_empty() {
        prompt.push_str(&format!(". {}", candidate.visual_description.trim()));
    }
    prompt.push_str(". Head and shoulders, facing the viewer, plain background");
    if !style.trim().is_empty() {
        prompt.push_str(&format!(". Style: {}", style.trim()));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_prompt_composition() {
        let identity = VisualIdentity {
            character: "young man, red scarf".into(),
            location: "foggy harbor".into(),
        };
        let prompt = scene_image_prompt("dawn, light rain", &identity, "He checks his watch", "watercolor");
        assert_eq!(
            prompt,
            "Scene: dawn, light rain. Main character: young man, red scarf. \
             Location: foggy harbor. Action: He checks his watch. Style: watercolor"
        );
    }

    #[test]
    fn test_scene_prompt_omits_empty_parts() {
        let prompt = scene_image_prompt("", &VisualIdentity::default(), "A door creaks", "comic");
        assert_eq!(prompt, "Action: A door creaks. Style: comic");
    }

    #[test]
    fn test_portrait_prompt() {
        let candidate = CharacterCandidate::new("Mira", "Blacksmith").with_description("soot-stained apron");
        let prompt = portrait_prompt(&candidate, "pixel art");
        assert!(prompt.starts_with("Character portrait of Mira, Blacksmith. soot-stained apron."));
        assert!(prompt.ends_with("Style: pixel art"));
    }

    #[test]
    fn test_aspect_ratios() {
        assert_eq!(ImageKind::Scene.aspect_ratio(), "16:9");
        assert_eq!(ImageKind::Portrait.aspect_ratio(), "1:1");
    }

    #[tokio::test]
    async fn test_no_images_is_disabled() {
        let request = ImageRequest {
            prompt: "x".into(),
            kind: ImageKind::Scene,
            size: ImageSize::OneK,
            reference_images: Vec::new(),
        };
        assert!(matches!(
            NoImages.generate_image(request).await,
            Err(ImageError::Disabled)
        ));
    }
}
