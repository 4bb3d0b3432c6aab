//! Testing utilities for the adventure engine.
//!
//! This module provides tools for integration testing:
//! - `ScriptedStoryGenerator` and `ScriptedImageGenerator` for deterministic
//!   turns without API calls
//! - `UpdateBuilder` for writing generator responses tersely
//! - `TestHarness` wiring an engine to scripted collaborators and an
//!   in-memory store
//! - Assertion helpers for verifying session state

use crate::characters::CharacterCandidate;
use crate::config::{EngineConfig, GameSettings};
use crate::engine::{TurnEngine, TurnError, TurnOutcome};
use crate::generator::{
    GameStateUpdate, GeneratorError, ImageError, ImageGenerator, ImageRequest, SegmentPlan,
    StoryGenerator, StoryRequest,
};
use crate::image::EncodedImage;
use crate::inventory::QuestItem;
use crate::persist::MemorySaveStore;
use crate::scene::{Choice, DialogueConfig, Scene};
use crate::session::{Session, VisualIdentity};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a story generator was asked.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStoryRequest {
    pub action: String,
    pub history_len: usize,
    pub visual_identity: Option<VisualIdentity>,
    pub known_characters: Vec<String>,
}

/// A story generator that replays scripted results in order.
///
/// Once the script runs out every call fails with a malformed-response
/// error.
#[derive(Default)]
pub struct ScriptedStoryGenerator {
    script: Mutex<VecDeque<Result<GameStateUpdate, GeneratorError>>>,
    requests: Mutex<Vec<RecordedStoryRequest>>,
    delay: Option<Duration>,
}

impl ScriptedStoryGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn then(self, update: GameStateUpdate) -> Self {
        self.push(Ok(update));
        self
    }

    /// Queue a failure.
    pub fn then_fail(self, error: GeneratorError) -> Self {
        self.push(Err(error));
        self
    }

    /// Sleep before answering. Combine with a paused clock to hold a turn
    /// in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a result on a generator that is already shared.
    pub fn push(&self, result: Result<GameStateUpdate, GeneratorError>) {
        lock(&self.script).push_back(result);
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }

    pub fn requests(&self) -> Vec<RecordedStoryRequest> {
        lock(&self.requests).clone()
    }

    /// The action text of the most recent request.
    pub fn last_action(&self) -> Option<String> {
        lock(&self.requests).last().map(|r| r.action.clone())
    }
}

#[async_trait]
impl StoryGenerator for ScriptedStoryGenerator {
    async fn next_scene(&self, request: StoryRequest<'_>) -> Result<GameStateUpdate, GeneratorError> {
        lock(&self.requests).push(RecordedStoryRequest {
            action: request.action.to_string(),
            history_len: request.history.len(),
            visual_identity: request.visual_identity.cloned(),
            known_characters: request.known_characters.iter().map(|c| c.name.clone()).collect(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = lock(&self.script).pop_front();
        next.unwrap_or_else(|| Err(GeneratorError::Malformed("no scripted response left".to_string())))
    }
}

#[derive(Debug, Clone)]
enum ImageRule {
    Fail,
    Empty,
    Delay(Duration),
}

/// An image generator that returns a PNG data URL whose bytes are the
/// prompt text, so tests can tell which request produced which image.
#[derive(Default)]
pub struct ScriptedImageGenerator {
    rules: Vec<(String, ImageRule)>,
    requests: Mutex<Vec<ImageRequest>>,
}

impl ScriptedImageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_when_prompt_contains(mut self, needle: impl Into<String>) -> Self {
        self.rules.push((needle.into(), ImageRule::Fail));
        self
    }

    pub fn empty_when_prompt_contains(mut self, needle: impl Into<String>) -> Self {
        self.rules.push((needle.into(), ImageRule::Empty));
        self
    }

    /// Delay matching requests; used to force an arrival order.
    pub fn delay_when_prompt_contains(mut self, needle: impl Into<String>, delay: Duration) -> Self {
        self.rules.push((needle.into(), ImageRule::Delay(delay)));
        self
    }

    pub fn requests(&self) -> Vec<ImageRequest> {
        lock(&self.requests).clone()
    }

    /// The image this generator returns for a prompt.
    pub fn image_for(prompt: &str) -> EncodedImage {
        EncodedImage::png(prompt.as_bytes())
    }
}

#[async_trait]
impl ImageGenerator for ScriptedImageGenerator {
    async fn generate_image(&self, request: ImageRequest) -> Result<EncodedImage, ImageError> {
        lock(&self.requests).push(request.clone());

        let mut result = Ok(Self::image_for(&request.prompt));
        for (needle, rule) in &self.rules {
            if !request.prompt.contains(needle.as_str()) {
                continue;
            }
            match rule {
                ImageRule::Delay(delay) => tokio::time::sleep(*delay).await,
                ImageRule::Fail => {
                    result = Err(ImageError::Backend(format!("scripted failure for {needle}")))
                }
                ImageRule::Empty => result = Ok(EncodedImage::empty()),
            }
        }
        result
    }
}

/// Builder for generator responses.
#[derive(Debug, Clone, Default)]
pub struct UpdateBuilder {
    update: GameStateUpdate,
}

impl UpdateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segment(mut self, text: impl Into<String>, image_prompt: impl Into<String>) -> Self {
        self.update.story_segments.push(SegmentPlan::new(text, image_prompt));
        self
    }

    pub fn choice(mut self, text: impl Into<String>) -> Self {
        self.update.choices.push(Choice::new(text));
        self
    }

    pub fn add_item(mut self, item: impl Into<String>) -> Self {
        self.update.inventory_add.push(item.into());
        self
    }

    pub fn remove_item(mut self, item: impl Into<String>) -> Self {
        self.update.inventory_remove.push(item.into());
        self
    }

    pub fn quest(mut self, text: impl Into<String>, completed: bool) -> Self {
        self.update.quests.push(QuestItem {
            text: text.into(),
            completed,
        });
        self
    }

    pub fn identity(mut self, character: impl Into<String>, location: impl Into<String>) -> Self {
        self.update.character_visual_identity = character.into();
        self.update.location_visual_identity = location.into();
        self
    }

    pub fn visual_context(mut self, context: impl Into<String>) -> Self {
        self.update.scene_visual_context = context.into();
        self
    }

    pub fn talkable(mut self, config: DialogueConfig) -> Self {
        self.update.optional_talk_characters.push(config);
        self
    }

    pub fn dialogue(mut self, config: DialogueConfig) -> Self {
        self.update.mandatory_dialogue = Some(config);
        self
    }

    pub fn new_character(mut self, candidate: CharacterCandidate) -> Self {
        self.update.new_characters.push(candidate);
        self
    }

    pub fn visible(mut self, name: impl Into<String>) -> Self {
        self.update.visible_character_names.push(name.into());
        self
    }

    pub fn highlight(mut self, name: impl Into<String>) -> Self {
        self.update.highlighted_character = Some(name.into());
        self
    }

    pub fn mood(mut self, track: impl Into<String>) -> Self {
        self.update.mood_track = Some(track.into());
        self
    }

    pub fn game_over(mut self, message: impl Into<String>) -> Self {
        self.update.is_game_over = true;
        self.update.game_over_message = message.into();
        self
    }

    pub fn build(self) -> GameStateUpdate {
        self.update
    }
}

/// Shorthand for an update with one segment per text and the given choices.
pub fn simple_update(texts: &[&str], choices: &[&str]) -> GameStateUpdate {
    let builder = texts
        .iter()
        .enumerate()
        .fold(UpdateBuilder::new(), |b, (i, text)| b.segment(*text, format!("picture {i}")));
    choices.iter().fold(builder, |b, c| b.choice(*c)).build()
}

/// Test harness for running engine scenarios.
pub struct TestHarness {
    pub engine: TurnEngine,
    pub story: Arc<ScriptedStoryGenerator>,
    pub images: Arc<ScriptedImageGenerator>,
    pub store: Arc<MemorySaveStore>,
}

impl TestHarness {
    /// Create a harness with default settings and images that always work.
    pub fn new() -> Self {
        Self::with_images(ScriptedImageGenerator::new())
    }

    pub fn with_images(images: ScriptedImageGenerator) -> Self {
        Self::with_parts(ScriptedStoryGenerator::new(), images, GameSettings::default())
    }

    pub fn with_parts(
        story: ScriptedStoryGenerator,
        images: ScriptedImageGenerator,
        settings: GameSettings,
    ) -> Self {
        let story = Arc::new(story);
        let images = Arc::new(images);
        let store = Arc::new(MemorySaveStore::new());
        let engine = TurnEngine::new(story.clone(), images.clone(), store.clone(), settings);
        Self {
            engine,
            story,
            images,
            store,
        }
    }

    /// Queue a successful story response.
    pub fn expect(&self, update: GameStateUpdate) -> &Self {
        self.story.push(Ok(update));
        self
    }

    /// Queue a story failure.
    pub fn expect_failure(&self, error: GeneratorError) -> &Self {
        self.story.push(Err(error));
        self
    }

    pub async fn start(&self) -> Result<TurnOutcome, TurnError> {
        let config = EngineConfig::new("Test Adventure").with_settings(self.engine.settings());
        self.engine.start_game(config).await
    }

    pub async fn act(&self, action: &str) -> Result<TurnOutcome, TurnError> {
        self.engine.submit_action(action).await
    }

    pub fn session(&self) -> Option<Session> {
        self.engine.snapshot()
    }

    pub fn turn_count(&self) -> u32 {
        self.engine.with_session(Session::turn_count).unwrap_or(0)
    }

    pub fn inventory(&self) -> Vec<String> {
        self.engine
            .with_session(|s| s.inventory().to_vec())
            .unwrap_or_default()
    }

    pub fn latest_scene(&self) -> Option<Scene> {
        self.engine.with_session(|s| s.latest_scene().cloned()).flatten()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the session has played exactly `expected` turns.
#[track_caller]
pub fn assert_turn_count(harness: &TestHarness, expected: u32) {
    let actual = harness.turn_count();
    assert_eq!(actual, expected, "Expected {expected} turns, got {actual}");
}

/// Assert the inventory holds exactly these items, in this order.
#[track_caller]
pub fn assert_inventory(harness: &TestHarness, expected: &[&str]) {
    let actual = harness.inventory();
    assert_eq!(actual, expected, "Unexpected inventory");
}

/// Assert every segment of the scene has its illustration.
#[track_caller]
pub fn assert_fully_illustrated(scene: &Scene) {
    let missing = scene.missing_images();
    assert_eq!(missing, 0, "Expected every segment illustrated, {missing} missing");
}

/// Assert a scene offers no way forward.
#[track_caller]
pub fn assert_terminal(scene: &Scene) {
    assert!(scene.is_game_over, "Expected a game-over scene");
    assert!(scene.choices.is_empty(), "Game-over scene still offers choices");
    assert!(scene.mandatory_dialogue.is_none(), "Game-over scene still requires dialogue");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageSize;
    use crate::generator::ImageKind;

    fn request(prompt: &str) -> ImageRequest {
        ImageRequest {
            prompt: prompt.to_string(),
            kind: ImageKind::Scene,
            size: ImageSize::OneK,
            reference_images: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_scripted_story_replays_in_order_then_fails() {
        let story = ScriptedStoryGenerator::new()
            .then(simple_update(&["one"], &["a"]))
            .then_fail(GeneratorError::Network("down".into()));
        let settings = GameSettings::default();
        let req = StoryRequest {
            history: &[],
            action: "Begin",
            settings: &settings,
            visual_identity: None,
            known_characters: &[],
        };

        assert!(story.next_scene(req).await.is_ok());
        assert!(matches!(story.next_scene(req).await, Err(GeneratorError::Network(_))));
        assert!(matches!(story.next_scene(req).await, Err(GeneratorError::Malformed(_))));
        assert_eq!(story.requests().len(), 3);
        assert_eq!(story.last_action().as_deref(), Some("Begin"));
    }

    #[tokio::test]
    async fn test_scripted_images_follow_rules() {
        let images = ScriptedImageGenerator::new()
            .fail_when_prompt_contains("broken")
            .empty_when_prompt_contains("blank");

        let ok = images.generate_image(request("a harbor")).await.unwrap();
        assert_eq!(ok, ScriptedImageGenerator::image_for("a harbor"));
        assert!(images.generate_image(request("broken bridge")).await.is_err());
        assert!(images.generate_image(request("blank wall")).await.unwrap().is_empty());
        assert_eq!(images.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_harness_plays_a_turn() {
        let harness = TestHarness::new();
        harness
            .expect(UpdateBuilder::new().segment("Dawn.", "sunrise").choice("Rise").add_item("map").build())
            .expect(UpdateBuilder::new().segment("Noon.", "sun").choice("Rest").remove_item("map").build());

        harness.start().await.unwrap();
        assert_turn_count(&harness, 1);
        assert_inventory(&harness, &["map"]);

        let outcome = harness.act("Rise").await.unwrap();
        assert_fully_illustrated(&outcome.scene);
        assert_turn_count(&harness, 2);
        assert_inventory(&harness, &[]);
        assert_eq!(harness.story.last_action().as_deref(), Some("Rise"));
    }
}
