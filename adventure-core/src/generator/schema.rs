//! Wire schema for story responses.
//!
//! The story model answers with one JSON object. It is parsed into
//! [`RawStoryResponse`], checked, and only then turned into a
//! [`GameStateUpdate`]. Anything that fails either step is a
//! [`GeneratorError::Malformed`]; nothing is partially trusted.

use super::{GameStateUpdate, GeneratorError, SegmentPlan};
use crate::characters::CharacterCandidate;
use crate::inventory::QuestItem;
use crate::scene::{Choice, DialogueConfig};
use serde::{Deserialize, Serialize};

/// Most choices a scene may offer.
pub const MAX_CHOICES: usize = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSegment {
    pub text: String,
    #[serde(default)]
    pub image_prompt: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawInventoryUpdates {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

/// The story response exactly as the model writes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStoryResponse {
    #[serde(default)]
    pub scene_visual_context: String,
    #[serde(default)]
    pub character_visual_identity: String,
    #[serde(default)]
    pub location_visual_identity: String,
    pub story_segments: Vec<RawSegment>,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub inventory_updates: RawInventoryUpdates,
    #[serde(default)]
    pub quests: Vec<QuestItem>,
    #[serde(default)]
    pub is_game_over: bool,
    #[serde(default)]
    pub game_over_message: String,
    #[serde(default)]
    pub requires_voice_chat: bool,
    #[serde(default)]
    pub voice_chat_config: DialogueConfig,
    #[serde(default)]
    pub talkable_characters: Vec<DialogueConfig>,
    #[serde(default)]
    pub new_characters: Vec<CharacterCandidate>,
    #[serde(default)]
    pub scene_character_names: Vec<String>,
    #[serde(default)]
    pub highlight_character: String,
    #[serde(default)]
    pub backsound: String,
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse and validate a story response.
pub fn parse_story_response(text: &str) -> Result<GameStateUpdate, GeneratorError> {
    let json = strip_code_fence(text);
    if json.is_empty() {
        return Err(GeneratorError::Malformed("empty response".to_string()));
    }
    let raw: RawStoryResponse =
        serde_json::from_str(json).map_err(|e| GeneratorError::Malformed(e.to_string()))?;
    raw.validate()
}

fn with_default_voice(mut config: DialogueConfig) -> DialogueConfig {
    if config.voice_name.trim().is_empty() {
        config.voice_name = DialogueConfig::DEFAULT_VOICE.to_string();
    }
    config
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl RawStoryResponse {
    /// Check the structural rules and convert.
    pub fn validate(self) -> Result<GameStateUpdate, GeneratorError> {
        if self.story_segments.is_empty() {
            return Err(GeneratorError::Malformed("no story segments".to_string()));
        }
        if let Some(i) = self
            .story_segments
            .iter()
            .position(|s| s.text.trim().is_empty())
        {
            return Err(GeneratorError::Malformed(format!("story segment {i} has no text")));
        }
        if self.choices.len() > MAX_CHOICES {
            return Err(GeneratorError::Malformed(format!(
                "{} choices offered, at most {MAX_CHOICES} allowed",
                self.choices.len()
            )));
        }

        let mandatory_dialogue = (self.requires_voice_chat && self.voice_chat_config.is_usable())
            .then(|| with_default_voice(self.voice_chat_config));

        Ok(GameStateUpdate {
            scene_visual_context: self.scene_visual_context,
            character_visual_identity: self.character_visual_identity,
            location_visual_identity: self.location_visual_identity,
            story_segments: self
                .story_segments
                .into_iter()
                .map(|s| SegmentPlan::new(s.text, s.image_prompt))
                .collect(),
            choices: self
                .choices
                .into_iter()
                .filter(|c| !c.text.trim().is_empty())
                .collect(),
            inventory_add: self.inventory_updates.add,
            inventory_remove: self.inventory_updates.remove,
            quests: self.quests,
            is_game_over: self.is_game_over,
            game_over_message: self.game_over_message,
            mandatory_dialogue,
            optional_talk_characters: self
                .talkable_characters
                .into_iter()
                .filter(DialogueConfig::is_usable)
                .map(with_default_voice)
                .collect(),
            new_characters: self
                .new_characters
                .into_iter()
                .filter(|c| !c.name.trim().is_empty())
                .collect(),
            visible_character_names: self.scene_character_names,
            highlighted_character: non_empty(self.highlight_character),
            mood_track: non_empty(self.backsound),
        })
    }
}

impl From<&GameStateUpdate> for RawStoryResponse {
    fn from(update: &GameStateUpdate) -> Self {
        Self {
            scene_visual_context: update.scene_visual_context.clone(),
            character_visual_identity: update.character_visual_identity.clone(),
            location_visual_identity: update.location_visual_identity.clone(),
            story_segments: update
                .story_segments
                .iter()
                .map(|s| RawSegment {
                    text: s.text.clone(),
                    image_prompt: s.image_prompt.clone(),
                })
                .collect(),
            choices: update.choices.clone(),
            inventory_updates: RawInventoryUpdates {
                add: update.inventory_add.clone(),
                remove: update.inventory_remove.clone(),
            },
            quests: update.quests.clone(),
            is_game_over: update.is_game_over,
            game_over_message: update.game_over_message.clone(),
            requires_voice_chat: update.mandatory_dialogue.is_some(),
            voice_chat_config: update.mandatory_dialogue.clone().unwrap_or_default(),
            talkable_characters: update.optional_talk_characters.clone(),
            new_characters: update.new_characters.clone(),
            scene_character_names: update.visible_character_names.clone(),
            highlight_character: update.highlighted_character.clone().unwrap_or_default(),
            backsound: update.mood_track.clone().unwrap_or_default(),
        }
    }
}

/// Serialize an update back into the wire form, for the story history.
pub fn to_wire_json(update: &GameStateUpdate) -> String {
    // Plain structs of strings and bools cannot fail to serialize.
    serde_json::to_string(&RawStoryResponse::from(update)).unwrap_or_default()
}
