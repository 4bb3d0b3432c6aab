//! Headless game interface for programmatic use.
//!
//! This module provides a simplified interface for running adventures
//! without a UI. It's designed for:
//! - Automated testing with real AI responses
//! - Coding agents playing the game
//! - Script-driven sessions
//!
//! # Example
//!
//! ```ignore
//! use adventure_core::headless::HeadlessGame;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut game = HeadlessGame::from_env()?;
//!
//!     let opening = game.start("The Drowned Lantern").await?;
//!     println!("{}", opening.narrative());
//!
//!     let next = game.choose(0).await?;
//!     println!("{}", next.narrative());
//!     println!("Inventory: {:?}", game.inventory());
//!
//!     Ok(())
//! }
//! ```

use crate::config::{EngineConfig, GameSettings};
use crate::conversation::ChatMessage;
use crate::engine::{TurnEngine, TurnError, TurnOutcome};
use crate::genre::Genre;
use crate::generator::{ClaudeStoryGenerator, GeneratorError, ImageGenerator, NoImages, StoryGenerator};
use crate::inventory::QuestItem;
use crate::persist::{MemorySaveStore, SaveStore};
use crate::scene::Scene;
use std::sync::Arc;

/// An entry in the game transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// The action as the player gave it.
    pub action: String,
    /// The narrative that came back.
    pub narrative: String,
    pub turn: u32,
}

/// An adventure driven from code.
pub struct HeadlessGame {
    engine: TurnEngine,
    settings: GameSettings,
    transcript: Vec<TranscriptEntry>,
}

impl HeadlessGame {
    pub fn new(engine: TurnEngine) -> Self {
        let settings = engine.settings();
        Self {
            engine,
            settings,
            transcript: Vec::new(),
        }
    }

    /// Claude for the story, no illustrations, saves kept in memory.
    ///
    /// Requires `ANTHROPIC_API_KEY` environment variable to be set.
    pub fn from_env() -> Result<Self, GeneratorError> {
        let story: Arc<dyn StoryGenerator> = Arc::new(ClaudeStoryGenerator::from_env()?);
        Ok(Self::with_collaborators(
            story,
            Arc::new(NoImages),
            Arc::new(MemorySaveStore::new()),
        ))
    }

    pub fn with_collaborators(
        story: Arc<dyn StoryGenerator>,
        images: Arc<dyn ImageGenerator>,
        store: Arc<dyn SaveStore>,
    ) -> Self {
        Self::new(TurnEngine::new(story, images, store, GameSettings::default()))
    }

    pub fn with_settings(mut self, settings: GameSettings) -> Self {
        self.engine.update_settings(settings.clone());
        self.settings = settings;
        self
    }

    /// Start a new adventure on the default premise, discarding the
    /// transcript of any previous one.
    pub async fn start(&mut self, name: &str) -> Result<TurnOutcome, TurnError> {
        self.start_with(EngineConfig::new(name)).await
    }

    /// Start a new adventure from a genre preset.
    pub async fn start_genre(&mut self, genre: &Genre) -> Result<TurnOutcome, TurnError> {
        self.start_with(EngineConfig::for_genre(genre)).await
    }

    /// Start a new adventure from any config, e.g. one with a custom
    /// opening action. The game's settings replace the config's.
    pub async fn start_with(&mut self, config: EngineConfig) -> Result<TurnOutcome, TurnError> {
        let config = config.with_settings(self.settings.clone());
        let action = config.opening_action.clone();
        let outcome = self.engine.start_game(config).await?;
        self.transcript.clear();
        self.record(action, &outcome);
        Ok(outcome)
    }

    /// Send any action, not necessarily one of the offered choices.
    pub async fn send(&mut self, action: &str) -> Result<TurnOutcome, TurnError> {
        let outcome = self.engine.submit_action(action).await?;
        self.record(action.to_string(), &outcome);
        Ok(outcome)
    }

    /// Pick one of the latest scene's choices. An index past the end picks
    /// the last choice.
    pub async fn choose(&mut self, index: usize) -> Result<TurnOutcome, TurnError> {
        let choice = self
            .latest_scene()
            .and_then(|scene| {
                let last = scene.choices.len().checked_sub(1)?;
                Some(scene.choices[index.min(last)].text.clone())
            });
        match choice {
            Some(text) => self.send(&text).await,
            None if self.is_game_over() => Err(TurnError::GameOver),
            None if self.latest_scene().is_some_and(|s| s.requires_dialogue()) => {
                Err(TurnError::DialogueRequired)
            }
            None => Err(TurnError::NoActiveSession),
        }
    }

    /// Hold a conversation with a character in the latest scene.
    ///
    /// If the scene requires talking to this character, the transcript
    /// advances the story right away. Otherwise it is kept and folded into
    /// the next action, and `None` is returned.
    pub async fn talk(
        &mut self,
        character: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<Option<TurnOutcome>, TurnError> {
        let mandatory = self
            .latest_scene()
            .and_then(|s| s.mandatory_dialogue)
            .is_some_and(|d| d.character_name == character);

        if !mandatory {
            self.engine.record_conversation(character, messages)?;
            return Ok(None);
        }

        let outcome = self.engine.submit_dialogue(messages).await?;
        self.record(format!("(conversation with {character})"), &outcome);
        Ok(Some(outcome))
    }

    fn record(&mut self, action: String, outcome: &TurnOutcome) {
        self.transcript.push(TranscriptEntry {
            action,
            narrative: outcome.narrative(),
            turn: outcome.handle.turn,
        });
    }

    // ========================================================================
    // Game State Queries
    // ========================================================================

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Get the last narrative, if any.
    pub fn last_narrative(&self) -> Option<&str> {
        self.transcript.last().map(|e| e.narrative.as_str())
    }

    pub fn latest_scene(&self) -> Option<Scene> {
        self.engine.with_session(|s| s.latest_scene().cloned()).flatten()
    }

    /// Texts of the choices on offer.
    pub fn choices(&self) -> Vec<String> {
        self.latest_scene()
            .map(|s| s.choices.into_iter().map(|c| c.text).collect())
            .unwrap_or_default()
    }

    pub fn turn_count(&self) -> u32 {
        self.engine.with_session(|s| s.turn_count()).unwrap_or(0)
    }

    pub fn inventory(&self) -> Vec<String> {
        self.engine
            .with_session(|s| s.inventory().to_vec())
            .unwrap_or_default()
    }

    pub fn quests(&self) -> Vec<QuestItem> {
        self.engine
            .with_session(|s| s.quests().to_vec())
            .unwrap_or_default()
    }

    pub fn is_game_over(&self) -> bool {
        self.engine.with_session(|s| s.is_game_over()).unwrap_or(false)
    }

    pub fn game_over_message(&self) -> Option<String> {
        self.engine
            .with_session(|s| s.game_over_message().to_string())
            .filter(|m| !m.is_empty())
    }

    /// Get the underlying engine for advanced use.
    pub fn engine(&self) -> &TurnEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::DialogueConfig;
    use crate::testing::{simple_update, ScriptedImageGenerator, ScriptedStoryGenerator, UpdateBuilder};

    fn game(story: ScriptedStoryGenerator) -> (HeadlessGame, Arc<ScriptedStoryGenerator>) {
        let story = Arc::new(story);
        let game = HeadlessGame::with_collaborators(
            story.clone(),
            Arc::new(ScriptedImageGenerator::new()),
            Arc::new(MemorySaveStore::new()),
        );
        (game, story)
    }

    #[tokio::test]
    async fn test_choose_sends_choice_text() {
        let (mut game, story) = game(
            ScriptedStoryGenerator::new()
                .then(simple_update(&["A fork in the road."], &["Left", "Right"]))
                .then(simple_update(&["The right path climbs."], &["Climb"])),
        );

        game.start("Fork").await.unwrap();
        assert_eq!(game.choices(), vec!["Left".to_string(), "Right".to_string()]);

        game.choose(7).await.unwrap();
        assert_eq!(story.last_action().as_deref(), Some("Right"));
        assert_eq!(game.turn_count(), 2);
        assert_eq!(game.transcript().len(), 2);
        assert_eq!(game.transcript()[1].action, "Right");
        assert_eq!(game.last_narrative(), Some("The right path climbs."));
    }

    #[tokio::test]
    async fn test_optional_talk_is_folded_into_next_action() {
        let (mut game, story) = game(
            ScriptedStoryGenerator::new()
                .then(
                    UpdateBuilder::new()
                        .segment("A ferryman waits.", "ferry")
                        .choice("Board")
                        .talkable(DialogueConfig::new("Eliot", "Ferryman"))
                        .build(),
                )
                .then(simple_update(&["You cross."], &["Land"])),
        );
        game.start("Ferry").await.unwrap();

        let held = game
            .talk("Eliot", vec![ChatMessage::player("Is it safe?"), ChatMessage::character("Mostly.")])
            .await
            .unwrap();
        assert!(held.is_none());

        game.choose(0).await.unwrap();
        let sent = story.last_action().unwrap();
        assert!(sent.contains("Player: Is it safe?"));
        assert!(sent.contains("Eliot: Mostly."));
        assert!(sent.ends_with("Board"));
    }

    #[tokio::test]
    async fn test_mandatory_talk_advances_story() {
        let (mut game, story) = game(
            ScriptedStoryGenerator::new()
                .then(
                    UpdateBuilder::new()
                        .segment("The guard stops you.", "guard")
                        .dialogue(DialogueConfig::new("Bram", "Gate guard").with_initial_dialogue("Papers."))
                        .build(),
                )
                .then(simple_update(&["He waves you through."], &["Enter"])),
        );
        game.start("Gate").await.unwrap();

        assert!(matches!(game.choose(0).await, Err(TurnError::DialogueRequired)));

        let outcome = game
            .talk("Bram", vec![ChatMessage::player("I have none.")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.handle.turn, 2);
        let sent = story.last_action().unwrap();
        assert!(sent.contains("[The player spoke directly with Bram (Gate guard)]"));
        assert!(sent.contains("Player: I have none."));
    }

    #[tokio::test]
    async fn test_start_genre_sends_its_premise_and_names_the_save() {
        let (mut game, story) = game(ScriptedStoryGenerator::new().then(simple_update(&["Sails."], &["Board"])));
        let pirate = crate::genre::find("pirate").unwrap();

        game.start_genre(pirate).await.unwrap();

        assert_eq!(story.last_action(), Some(pirate.initial_prompt()));
        assert_eq!(game.transcript()[0].action, pirate.initial_prompt());
        let name = game.engine().with_session(|s| s.name().to_string()).unwrap();
        assert!(name.starts_with("Pirates — "), "save name was {name}");
    }

    #[tokio::test]
    async fn test_start_uses_default_premise_and_start_with_a_custom_one() {
        let (mut game, story) = game(
            ScriptedStoryGenerator::new()
                .then(simple_update(&["Trees."], &["Walk"]))
                .then(simple_update(&["Harbor."], &["Dock"])),
        );

        game.start("Woods").await.unwrap();
        assert_eq!(story.last_action().as_deref(), Some(crate::genre::DEFAULT_PREMISE));

        game.start_with(EngineConfig::new("Harbor").with_opening_action("A misty harbor town"))
            .await
            .unwrap();
        assert_eq!(story.last_action().as_deref(), Some("A misty harbor town"));
        assert_eq!(game.transcript().len(), 1);
    }
}
