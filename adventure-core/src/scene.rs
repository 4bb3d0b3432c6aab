//! Scenes and the scene ledger.
//!
//! A [`Scene`] is one rendered beat of the story. The [`SceneLedger`] is the
//! append-only history of committed scenes plus a read cursor that lets the
//! player look back at earlier scenes without disturbing the latest one.

use crate::image::EncodedImage;
use serde::{Deserialize, Serialize};

/// One paragraph of narration paired with its illustration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,

    /// Empty while the illustration is pending or after it failed.
    #[serde(default)]
    pub image: EncodedImage,
}

impl Segment {
    /// A segment whose illustration has not arrived yet.
    pub fn pending(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: EncodedImage::empty(),
        }
    }
}

/// A choice offered to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
}

impl Choice {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Configuration for a conversation with an NPC.
///
/// Used both for a mandatory dialogue that gates the scene's choices and for
/// optional side conversations offered next to them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogueConfig {
    pub character_name: String,
    pub character_role: String,
    pub voice_name: String,
    pub initial_dialogue: String,
    pub system_instruction: String,
}

impl DialogueConfig {
    /// Voice used when the generator leaves `voice_name` blank.
    pub const DEFAULT_VOICE: &'static str = "Kore";

    pub fn new(character_name: impl Into<String>, character_role: impl Into<String>) -> Self {
        Self {
            character_name: character_name.into(),
            character_role: character_role.into(),
            voice_name: Self::DEFAULT_VOICE.to_string(),
            ..Self::default()
        }
    }

    pub fn with_initial_dialogue(mut self, line: impl Into<String>) -> Self {
        self.initial_dialogue = line.into();
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// A config without a character name cannot be started.
    pub fn is_usable(&self) -> bool {
        !self.character_name.trim().is_empty()
    }
}

/// One committed beat of the story.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// Narrative segments in reading order. Never empty once committed.
    pub segments: Vec<Segment>,

    /// Zero to three options. Empty on game over or while a mandatory
    /// dialogue gates progress.
    #[serde(default)]
    pub choices: Vec<Choice>,

    #[serde(default)]
    pub is_game_over: bool,

    #[serde(default)]
    pub game_over_message: String,

    /// Conversation the player must hold before the story continues.
    #[serde(default, rename = "voiceChat", skip_serializing_if = "Option::is_none")]
    pub mandatory_dialogue: Option<DialogueConfig>,

    /// NPCs available for an optional side conversation.
    #[serde(
        default,
        rename = "talkableCharacters",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub optional_talk_characters: Vec<DialogueConfig>,

    /// Known characters who appear in this scene's illustrations.
    #[serde(
        default,
        rename = "sceneCharacterNames",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub visible_character_names: Vec<String>,

    /// Character to bring to the front of the gallery.
    #[serde(
        default,
        rename = "highlightCharacter",
        skip_serializing_if = "Option::is_none"
    )]
    pub highlighted_character: Option<String>,

    /// Background music track picked for the scene's mood.
    #[serde(default, rename = "backsound", skip_serializing_if = "Option::is_none")]
    pub mood_track: Option<String>,
}

impl Scene {
    /// A plain scene with the given narration and choices.
    pub fn new(segments: Vec<Segment>, choices: Vec<Choice>) -> Self {
        Self {
            segments,
            choices,
            is_game_over: false,
            game_over_message: String::new(),
            mandatory_dialogue: None,
            optional_talk_characters: Vec::new(),
            visible_character_names: Vec::new(),
            highlighted_character: None,
            mood_track: None,
        }
    }

    /// Whether a mandatory conversation must happen before the next turn.
    pub fn requires_dialogue(&self) -> bool {
        self.mandatory_dialogue.is_some()
    }

    /// The illustration of the first segment, used as a save thumbnail.
    pub fn first_image(&self) -> EncodedImage {
        self.segments
            .first()
            .map(|s| s.image.clone())
            .unwrap_or_default()
    }

    /// Number of segments still waiting for an illustration.
    pub fn missing_images(&self) -> usize {
        self.segments.iter().filter(|s| s.image.is_empty()).count()
    }

    /// Look up an optional talk partner by name.
    pub fn talk_partner(&self, name: &str) -> Option<&DialogueConfig> {
        self.optional_talk_characters
            .iter()
            .find(|c| c.character_name == name)
    }
}

/// Append-only scene history with a movable read cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneLedger {
    scenes: Vec<Scene>,
    cursor: usize,
}

impl SceneLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted parts. The cursor is clamped.
    pub fn from_parts(scenes: Vec<Scene>, cursor: usize) -> Self {
        let cursor = cursor.min(scenes.len().saturating_sub(1));
        Self { scenes, cursor }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn get(&self, index: usize) -> Option<&Scene> {
        self.scenes.get(index)
    }

    /// Index currently being viewed.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The scene under the cursor.
    pub fn current(&self) -> Option<&Scene> {
        self.scenes.get(self.cursor)
    }

    pub fn latest(&self) -> Option<&Scene> {
        self.scenes.last()
    }

    pub fn latest_index(&self) -> Option<usize> {
        self.scenes.len().checked_sub(1)
    }

    /// True when the cursor sits on the newest scene (or there is none).
    pub fn is_viewing_latest(&self) -> bool {
        match self.latest_index() {
            Some(latest) => self.cursor == latest,
            None => true,
        }
    }

    /// Add a scene at the end and move the cursor onto it.
    ///
    /// Appending while the cursor is on an older scene is a caller bug; the
    /// scene still lands at the end and the cursor is forced onto it, so
    /// history is never spliced.
    pub fn append(&mut self, scene: Scene) -> usize {
        if !self.is_viewing_latest() {
            tracing::warn!(
                cursor = self.cursor,
                len = self.scenes.len(),
                "Scene appended while viewing history; moving cursor to the new end"
            );
        }
        self.scenes.push(scene);
        self.cursor = self.scenes.len() - 1;
        self.cursor
    }

    /// Move the cursor, clamped to the valid range. History is untouched.
    pub fn navigate(&mut self, index: usize) -> usize {
        self.cursor = index.min(self.scenes.len().saturating_sub(1));
        self.cursor
    }

    /// Replace one segment's image in place.
    ///
    /// Out-of-range indices are ignored and reported as `false`; late image
    /// arrivals can race with a reset.
    pub fn patch_segment_image(
        &mut self,
        scene_index: usize,
        segment_index: usize,
        image: EncodedImage,
    ) -> bool {
        match self
            .scenes
            .get_mut(scene_index)
            .and_then(|scene| scene.segments.get_mut(segment_index))
        {
            Some(segment) => {
                segment.image = image;
                true
            }
            None => false,
        }
    }

    /// Hand the scenes and cursor back for persistence.
    pub fn into_parts(self) -> (Vec<Scene>, usize) {
        (self.scenes, self.cursor)
    }
}
