//! In-memory state of one adventure.
//!
//! A [`Session`] owns the scene ledger, inventory, quests, story history,
//! character registry and the current scene's conversation logs. The turn
//! engine is its only writer; everything here is synchronous and pure
//! except for logging.

use crate::characters::{self, CharacterPortrait};
use crate::conversation::{ChatMessage, ConversationLogs, HistoryEntry};
use crate::generator::{to_wire_json, GameStateUpdate};
use crate::image::EncodedImage;
use crate::inventory::{apply_inventory_delta, replace_quests, QuestItem};
use crate::persist::SaveData;
use crate::scene::{Scene, SceneLedger, Segment};
use serde::{Deserialize, Serialize};

/// Appearance of the protagonist and the current location, carried from
/// turn to turn so illustrations stay consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualIdentity {
    pub character: String,
    pub location: String,
}

impl VisualIdentity {
    pub fn is_empty(&self) -> bool {
        self.character.trim().is_empty() && self.location.trim().is_empty()
    }

    /// Take the new descriptions, keeping the old ones where the new are blank.
    fn update(&mut self, character: &str, location: &str) {
        if !character.trim().is_empty() {
            self.character = character.to_string();
        }
        if !location.trim().is_empty() {
            self.location = location.to_string();
        }
    }
}

/// Identifies the scene committed by one turn. Image patches for that turn
/// go through the handle, never through the current cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnHandle {
    pub scene_index: usize,
    pub turn: u32,
}

/// What a commit changed beyond the appended scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub handle: TurnHandle,
    /// Completed quests the new quest list no longer mentions.
    pub dropped_completed_quests: Vec<QuestItem>,
}

/// One adventure in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    save_id: String,
    name: String,
    created_at: i64,
    ledger: SceneLedger,
    inventory: Vec<String>,
    quests: Vec<QuestItem>,
    history: Vec<HistoryEntry>,
    known_characters: Vec<CharacterPortrait>,
    logs: ConversationLogs,
    visual_identity: VisualIdentity,
    turn_count: u32,
}

impl Session {
    pub fn new(save_id: impl Into<String>, name: impl Into<String>, created_at: i64) -> Self {
        Self {
            save_id: save_id.into(),
            name: name.into(),
            created_at,
            ledger: SceneLedger::new(),
            inventory: Vec::new(),
            quests: Vec::new(),
            history: Vec::new(),
            known_characters: Vec::new(),
            logs: ConversationLogs::new(),
            visual_identity: VisualIdentity::default(),
            turn_count: 0,
        }
    }

    pub fn save_id(&self) -> &str {
        &self.save_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn ledger(&self) -> &SceneLedger {
        &self.ledger
    }

    pub fn inventory(&self) -> &[String] {
        &self.inventory
    }

    pub fn quests(&self) -> &[QuestItem] {
        &self.quests
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn known_characters(&self) -> &[CharacterPortrait] {
        &self.known_characters
    }

    pub fn conversation_logs(&self) -> &ConversationLogs {
        &self.logs
    }

    pub fn visual_identity(&self) -> &VisualIdentity {
        &self.visual_identity
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    /// The scene under the cursor.
    pub fn current_scene(&self) -> Option<&Scene> {
        self.ledger.current()
    }

    pub fn latest_scene(&self) -> Option<&Scene> {
        self.ledger.latest()
    }

    /// Whether the newest scene ended the adventure.
    pub fn is_game_over(&self) -> bool {
        self.latest_scene().is_some_and(|s| s.is_game_over)
    }

    pub fn game_over_message(&self) -> &str {
        self.latest_scene()
            .filter(|s| s.is_game_over)
            .map(|s| s.game_over_message.as_str())
            .unwrap_or("")
    }

    /// Known characters in gallery order for the scene under the cursor.
    pub fn gallery(&self) -> Vec<&CharacterPortrait> {
        let highlight = self
            .current_scene()
            .and_then(|s| s.highlighted_character.as_deref());
        characters::order_for_display(&self.known_characters, highlight)
    }

    /// Move the read cursor. Inventory and quests are unaffected.
    pub fn navigate(&mut self, index: usize) -> usize {
        self.ledger.navigate(index)
    }

    /// Add the transcript of an optional conversation held in this scene.
    /// Repeated conversations with one character accumulate.
    pub fn record_conversation(&mut self, character_name: &str, messages: Vec<ChatMessage>) {
        tracing::debug!(character = character_name, lines = messages.len(), "Recorded side conversation");
        self.logs.record(character_name, messages);
    }

    /// The action text actually sent to the story generator, with any side
    /// conversations folded in.
    pub fn compose_action(&self, action: &str) -> String {
        let partners = self
            .latest_scene()
            .map(|s| s.optional_talk_characters.as_slice())
            .unwrap_or(&[]);
        self.logs.fold_into_action(action, partners)
    }

    /// Fold a validated update into the session as a new scene.
    ///
    /// `sent_action` is the exact text the generator saw; it and the update
    /// are appended to the story history.
    pub fn commit_story(&mut self, sent_action: &str, update: &GameStateUpdate) -> Commit {
        self.turn_count += 1;

        if !self.ledger.is_viewing_latest() {
            tracing::debug!(cursor = self.ledger.cursor(), "Returning to latest scene for commit");
            if let Some(latest) = self.ledger.latest_index() {
                self.ledger.navigate(latest);
            }
        }
        let scene_index = self.ledger.append(build_scene(update));

        self.inventory = apply_inventory_delta(
            &self.inventory,
            &update.inventory_add,
            &update.inventory_remove,
        );
        let dropped_completed_quests = replace_quests(&mut self.quests, update.quests.clone());

        self.visual_identity.update(
            &update.character_visual_identity,
            &update.location_visual_identity,
        );
        self.logs.clear();

        self.history.push(HistoryEntry::user(sent_action));
        self.history.push(HistoryEntry::model(to_wire_json(update)));

        tracing::info!(
            turn = self.turn_count,
            scene = scene_index,
            segments = update.story_segments.len(),
            game_over = update.is_game_over,
            "Committed scene"
        );

        Commit {
            handle: TurnHandle {
                scene_index,
                turn: self.turn_count,
            },
            dropped_completed_quests,
        }
    }

    /// Put an arrived illustration into the scene the handle points at.
    pub fn patch_image(&mut self, handle: TurnHandle, segment_index: usize, image: EncodedImage) -> bool {
        let patched = self
            .ledger
            .patch_segment_image(handle.scene_index, segment_index, image);
        if !patched {
            tracing::debug!(?handle, segment_index, "Image patch target no longer exists");
        }
        patched
    }

    /// Add newly generated portraits after the existing characters.
    pub fn merge_portraits(&mut self, portraits: Vec<CharacterPortrait>) {
        let fresh: Vec<CharacterPortrait> = portraits
            .into_iter()
            .filter(|p| !self.known_characters.iter().any(|k| k.name == p.name))
            .collect();
        if fresh.is_empty() {
            return;
        }
        let existing = std::mem::take(&mut self.known_characters);
        self.known_characters = characters::merge(existing, fresh);
    }

    /// Full snapshot for the save store.
    pub fn to_save_data(&self, updated_at: i64) -> SaveData {
        SaveData {
            id: self.save_id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            updated_at,
            scene_history: self.ledger.scenes().to_vec(),
            current_scene_index: self.ledger.cursor(),
            inventory: self.inventory.clone(),
            quests: self.quests.clone(),
            story_history: self.history.clone(),
            thumbnail: self
                .latest_scene()
                .map(Scene::first_image)
                .unwrap_or_default(),
            turn_count: self.turn_count,
            is_game_over: self.is_game_over(),
            game_over_message: self.game_over_message().to_string(),
            character_visual_identity: self.visual_identity.character.clone(),
            location_visual_identity: self.visual_identity.location.clone(),
            known_characters: self.known_characters.clone(),
            conversation_logs: self.logs.clone(),
        }
    }

    /// Rebuild a session from a save. The cursor is clamped into range.
    pub fn from_save(save: SaveData) -> Self {
        Self {
            ledger: SceneLedger::from_parts(save.scene_history, save.current_scene_index),
            save_id: save.id,
            name: save.name,
            created_at: save.created_at,
            inventory: save.inventory,
            quests: save.quests,
            history: save.story_history,
            known_characters: save.known_characters,
            logs: save.conversation_logs,
            visual_identity: VisualIdentity {
                character: save.character_visual_identity,
                location: save.location_visual_identity,
            },
            turn_count: save.turn_count,
        }
    }
}

/// Turn an update into a scene with pending images, enforcing that a
/// finished game offers nothing further and that a mandatory dialogue
/// replaces every other way forward.
pub fn build_scene(update: &GameStateUpdate) -> Scene {
    let mut scene = Scene::new(
        update
            .story_segments
            .iter()
            .map(|s| Segment::pending(s.text.clone()))
            .collect(),
        update.choices.clone(),
    );
    scene.is_game_over = update.is_game_over;
    scene.game_over_message = update.game_over_message.clone();
    scene.mandatory_dialogue = update.mandatory_dialogue.clone();
    scene.optional_talk_characters = update.optional_talk_characters.clone();
    scene.visible_character_names = update.visible_character_names.clone();
    scene.highlighted_character = update.highlighted_character.clone();
    scene.mood_track = update.mood_track.clone();

    if scene.is_game_over {
        scene.choices.clear();
        scene.mandatory_dialogue = None;
        scene.optional_talk_characters.clear();
    } else if scene.mandatory_dialogue.is_some() {
        if !scene.choices.is_empty() || !scene.optional_talk_characters.is_empty() {
            tracing::warn!(
                choices = scene.choices.len(),
                talkable = scene.optional_talk_characters.len(),
                "Mandatory dialogue alongside other options; dropping the options"
            );
        }
        scene.choices.clear();
        scene.optional_talk_characters.clear();
    } else if scene.choices.is_empty() {
        tracing::warn!("Scene offers no choices and no dialogue");
    }

    scene
}
