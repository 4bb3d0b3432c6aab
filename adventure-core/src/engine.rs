//! Turn orchestration.
//!
//! [`TurnEngine`] owns the active [`Session`] and runs one turn at a time:
//!
//! ```text
//! Idle ──submit──▶ AwaitingStory ──story ok──▶ AwaitingImages ──settled──▶ Idle
//!                        │                      (StoryReady, ImageReady…,
//!                        └──story failed──▶ Idle   AllImagesReady, Saved)
//! ```
//!
//! The scene is committed as soon as the story arrives. Illustrations and
//! portraits are then requested concurrently and patched in through the
//! turn's [`TurnHandle`] as they finish, in whatever order they finish.
//! Progress is broadcast as [`TurnEvent`]s to every [`TurnEngine::subscribe`]r.
//!
//! Session state sits behind a plain mutex that is never held across an
//! await. Replacing the session (new game, resume) bumps an epoch so that
//! late results of an abandoned turn are discarded instead of landing in
//! the wrong adventure.

use crate::characters::{self, CharacterPortrait};
use crate::config::{EngineConfig, GameSettings};
use crate::conversation::{summarize_dialogue, ChatMessage, HistoryEntry};
use crate::generator::{
    scene_image_prompt, GameStateUpdate, GeneratorError, ImageGenerator, ImageKind, ImageRequest,
    StoryGenerator, StoryRequest,
};
use crate::image::EncodedImage;
use crate::inventory::QuestItem;
use crate::persist::{generate_save_id, now_millis, SaveStore, StoreError};
use crate::scene::Scene;
use crate::session::{Session, TurnHandle, VisualIdentity};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from turn submission and session management.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("A turn is already in progress")]
    TurnInFlight,

    #[error("Return to the latest scene before choosing")]
    NotViewingLatest,

    #[error("The adventure has ended; start a new one to keep playing")]
    GameOver,

    #[error("This scene requires a conversation before the story can continue")]
    DialogueRequired,

    #[error("This scene has no conversation waiting")]
    NoDialoguePending,

    #[error("No adventure is loaded")]
    NoActiveSession,

    #[error("The adventure was replaced while the turn was running")]
    SessionReplaced,

    #[error("Story generation failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Save failed: {0}")]
    Store(#[from] StoreError),
}

/// Where the orchestrator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TurnPhase {
    Idle = 0,
    AwaitingStory = 1,
    AwaitingImages = 2,
}

impl TurnPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TurnPhase::AwaitingStory,
            2 => TurnPhase::AwaitingImages,
            _ => TurnPhase::Idle,
        }
    }
}

/// Progress of a turn, in the order it happens.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Text, choices and state deltas are committed; images are pending.
    StoryReady { handle: TurnHandle, scene: Scene },
    ImageReady {
        handle: TurnHandle,
        segment_index: usize,
        image: EncodedImage,
    },
    /// Every image and portrait request of the turn has settled.
    AllImagesReady { handle: TurnHandle },
    Saved { save_id: String },
    SaveFailed { message: String },
    /// The turn was aborted; nothing was committed.
    Failed { message: String },
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub handle: TurnHandle,
    /// The committed scene with every image that arrived.
    pub scene: Scene,
    pub dropped_completed_quests: Vec<QuestItem>,
    /// Characters whose portraits were added this turn.
    pub new_characters: Vec<String>,
    /// Whether the auto-save after this turn succeeded.
    pub saved: bool,
}

impl TurnOutcome {
    pub fn is_game_over(&self) -> bool {
        self.scene.is_game_over
    }

    /// The scene's narrative as one block of text.
    pub fn narrative(&self) -> String {
        self.scene
            .segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

struct EngineState {
    session: Option<Session>,
    settings: GameSettings,
    epoch: u64,
}

struct EngineInner {
    story: Arc<dyn StoryGenerator>,
    images: Arc<dyn ImageGenerator>,
    store: Arc<dyn SaveStore>,
    state: Mutex<EngineState>,
    phase: AtomicU8,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<TurnEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive right to run a turn. Dropping it, including when the turn's
/// future is abandoned, returns the engine to idle.
struct TurnSlot {
    inner: Arc<EngineInner>,
}

impl TurnSlot {
    fn acquire(inner: &Arc<EngineInner>) -> Result<Self, TurnError> {
        inner
            .phase
            .compare_exchange(
                TurnPhase::Idle as u8,
                TurnPhase::AwaitingStory as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| TurnError::TurnInFlight)?;
        tracing::debug!("Turn started");
        Ok(Self {
            inner: Arc::clone(inner),
        })
    }

    fn advance(&self, phase: TurnPhase) {
        self.inner.phase.store(phase as u8, Ordering::Release);
        tracing::debug!(?phase, "Turn phase changed");
    }
}

impl Drop for TurnSlot {
    fn drop(&mut self) {
        self.inner.phase.store(TurnPhase::Idle as u8, Ordering::Release);
    }
}

/// Which session a turn commits into.
enum Target {
    /// The active session, as long as it has not been replaced.
    Active { epoch: u64 },
    /// A new session installed only once its opening scene arrives.
    Fresh(Box<Session>),
}

/// Everything a turn reads from the session before the story call.
struct TurnContext {
    target: Target,
    sent_action: String,
    history: Vec<HistoryEntry>,
    settings: GameSettings,
    visual_identity: VisualIdentity,
    known_characters: Vec<CharacterPortrait>,
}

/// What the story commit hands to the rest of the turn.
struct Committed {
    epoch: u64,
    handle: TurnHandle,
    scene: Scene,
    identity: VisualIdentity,
    dropped_completed_quests: Vec<QuestItem>,
}

/// The turn orchestrator. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct TurnEngine {
    inner: Arc<EngineInner>,
}

impl TurnEngine {
    pub fn new(
        story: Arc<dyn StoryGenerator>,
        images: Arc<dyn ImageGenerator>,
        store: Arc<dyn SaveStore>,
        settings: GameSettings,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                story,
                images,
                store,
                state: Mutex::new(EngineState {
                    session: None,
                    settings: settings.normalized(),
                    epoch: 0,
                }),
                phase: AtomicU8::new(TurnPhase::Idle as u8),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Receive every event from now on. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TurnEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.subscribers).push(tx);
        rx
    }

    fn emit(&self, event: TurnEvent) {
        lock(&self.inner.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        lock(&self.inner.state)
    }

    pub fn phase(&self) -> TurnPhase {
        TurnPhase::from_u8(self.inner.phase.load(Ordering::Acquire))
    }

    pub fn settings(&self) -> GameSettings {
        self.state().settings.clone()
    }

    /// Settings apply from the next turn on.
    pub fn update_settings(&self, settings: GameSettings) {
        self.state().settings = settings.normalized();
    }

    pub fn store(&self) -> Arc<dyn SaveStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn has_session(&self) -> bool {
        self.state().session.is_some()
    }

    /// A copy of the active session.
    pub fn snapshot(&self) -> Option<Session> {
        self.state().session.clone()
    }

    /// Read the active session without copying it.
    pub fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> Option<R> {
        self.state().session.as_ref().map(f)
    }

    /// Move the read cursor of the active session. Allowed mid-turn.
    pub fn navigate(&self, index: usize) -> Result<usize, TurnError> {
        let mut state = self.state();
        let session = state.session.as_mut().ok_or(TurnError::NoActiveSession)?;
        Ok(session.navigate(index))
    }

    /// Store the transcript of an optional conversation in the latest scene.
    /// It is folded into the next action.
    pub fn record_conversation(
        &self,
        character_name: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<(), TurnError> {
        if self.phase() == TurnPhase::AwaitingStory {
            return Err(TurnError::TurnInFlight);
        }
        let mut state = self.state();
        let session = state.session.as_mut().ok_or(TurnError::NoActiveSession)?;
        if session
            .latest_scene()
            .and_then(|s| s.talk_partner(character_name))
            .is_none()
        {
            tracing::warn!(character = character_name, "Conversation with a character the scene does not offer");
        }
        session.record_conversation(character_name, messages);
        Ok(())
    }

    /// Begin a new adventure. The previous session stays active until the
    /// opening scene has been generated.
    pub async fn start_game(&self, config: EngineConfig) -> Result<TurnOutcome, TurnError> {
        let slot = TurnSlot::acquire(&self.inner)?;
        let settings = config.settings.normalized();
        self.state().settings = settings.clone();

        let session = Session::new(generate_save_id(), config.save_name, now_millis());
        tracing::info!(save_id = session.save_id(), "Starting new adventure");

        let context = TurnContext {
            target: Target::Fresh(Box::new(session)),
            sent_action: config.opening_action,
            history: Vec::new(),
            settings,
            visual_identity: VisualIdentity::default(),
            known_characters: Vec::new(),
        };
        self.run_turn(slot, context).await
    }

    /// Play a choice, or any free-form action, from the latest scene.
    pub async fn submit_action(&self, action: &str) -> Result<TurnOutcome, TurnError> {
        let slot = TurnSlot::acquire(&self.inner)?;
        let context = self.prepare(|session| {
            if session.latest_scene().is_some_and(Scene::requires_dialogue) {
                return Err(TurnError::DialogueRequired);
            }
            Ok(session.compose_action(action))
        })?;
        self.run_turn(slot, context).await
    }

    /// Finish the latest scene's mandatory conversation. Its transcript
    /// becomes the action for the next turn.
    pub async fn submit_dialogue(&self, messages: Vec<ChatMessage>) -> Result<TurnOutcome, TurnError> {
        let slot = TurnSlot::acquire(&self.inner)?;
        let context = self.prepare(|session| {
            let config = session
                .latest_scene()
                .and_then(|s| s.mandatory_dialogue.as_ref())
                .ok_or(TurnError::NoDialoguePending)?;
            Ok(summarize_dialogue(config, &messages))
        })?;
        self.run_turn(slot, context).await
    }

    /// Check the shared preconditions and snapshot what the story call needs.
    fn prepare(
        &self,
        action: impl FnOnce(&Session) -> Result<String, TurnError>,
    ) -> Result<TurnContext, TurnError> {
        let state = self.state();
        let session = state.session.as_ref().ok_or(TurnError::NoActiveSession)?;
        if session.is_game_over() {
            return Err(TurnError::GameOver);
        }
        if !session.ledger().is_viewing_latest() {
            return Err(TurnError::NotViewingLatest);
        }
        let sent_action = action(session)?;

        Ok(TurnContext {
            target: Target::Active { epoch: state.epoch },
            sent_action,
            history: session.history().to_vec(),
            settings: state.settings.clone(),
            visual_identity: session.visual_identity().clone(),
            known_characters: session.known_characters().to_vec(),
        })
    }

    async fn run_turn(&self, slot: TurnSlot, context: TurnContext) -> Result<TurnOutcome, TurnError> {
        let request = StoryRequest {
            history: &context.history,
            action: &context.sent_action,
            settings: &context.settings,
            visual_identity: Some(&context.visual_identity).filter(|v| !v.is_empty()),
            known_characters: &context.known_characters,
        };
        let update = match self.inner.story.next_scene(request).await {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(error = %e, "Turn aborted, nothing committed");
                self.emit(TurnEvent::Failed {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let Committed {
            epoch,
            handle,
            scene,
            identity,
            dropped_completed_quests,
        } = match self.commit(context.target, &context.sent_action, &update) {
            Ok(committed) => committed,
            Err(e) => {
                self.emit(TurnEvent::Failed {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        slot.advance(TurnPhase::AwaitingImages);
        self.emit(TurnEvent::StoryReady {
            handle,
            scene: scene.clone(),
        });

        let new_characters = self
            .illustrate(epoch, handle, &update, &identity, &context.known_characters, &context.settings)
            .await;
        self.emit(TurnEvent::AllImagesReady { handle });

        let saved = if context.settings.auto_save {
            self.auto_save(epoch).await
        } else {
            false
        };

        let scene = self
            .with_epoch(epoch, |session| session.ledger().get(handle.scene_index).cloned())
            .flatten()
            .unwrap_or(scene);
        Ok(TurnOutcome {
            handle,
            scene,
            dropped_completed_quests,
            new_characters,
            saved,
        })
    }

    fn commit(
        &self,
        target: Target,
        sent_action: &str,
        update: &GameStateUpdate,
    ) -> Result<Committed, TurnError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let session = match target {
            Target::Fresh(session) => {
                state.epoch += 1;
                state.session.insert(*session)
            }
            Target::Active { epoch } => {
                if state.epoch != epoch {
                    tracing::warn!("Session replaced during the story call; dropping the result");
                    return Err(TurnError::SessionReplaced);
                }
                state.session.as_mut().ok_or(TurnError::NoActiveSession)?
            }
        };

        let commit = session.commit_story(sent_action, update);
        for quest in &commit.dropped_completed_quests {
            tracing::warn!(quest = %quest.text, "Completed quest missing from the new quest list");
        }
        Ok(Committed {
            epoch: state.epoch,
            handle: commit.handle,
            scene: session
                .ledger()
                .get(commit.handle.scene_index)
                .cloned()
                .unwrap_or_default(),
            identity: session.visual_identity().clone(),
            dropped_completed_quests: commit.dropped_completed_quests,
        })
    }

    /// Run `f` on the active session if it is still the one from `epoch`.
    fn with_epoch<R>(&self, epoch: u64, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut state = self.state();
        if state.epoch != epoch {
            return None;
        }
        state.session.as_mut().map(f)
    }

    /// Request every segment illustration and every new portrait at once.
    /// Returns the names of the characters added to the registry.
    async fn illustrate(
        &self,
        epoch: u64,
        handle: TurnHandle,
        update: &GameStateUpdate,
        identity: &VisualIdentity,
        known: &[CharacterPortrait],
        settings: &GameSettings,
    ) -> Vec<String> {
        let style = settings.art_style.prompt();
        let references = characters::reference_portraits(known, &update.visible_character_names);

        let mut pending: FuturesUnordered<_> = update
            .story_segments
            .iter()
            .enumerate()
            .map(|(segment_index, segment)| {
                let request = ImageRequest {
                    prompt: scene_image_prompt(
                        &update.scene_visual_context,
                        identity,
                        &segment.image_prompt,
                        style,
                    ),
                    kind: ImageKind::Scene,
                    size: settings.image_size,
                    reference_images: references.clone(),
                };
                let images = Arc::clone(&self.inner.images);
                async move { (segment_index, images.generate_image(request).await) }
            })
            .collect();

        let scene_images = async {
            while let Some((segment_index, result)) = pending.next().await {
                let image = match result {
                    Ok(image) if !image.is_empty() => image,
                    Ok(_) => {
                        tracing::warn!(segment_index, "Scene image came back empty");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(segment_index, error = %e, "Scene image failed");
                        continue;
                    }
                };
                let patched = self
                    .with_epoch(epoch, |session| session.patch_image(handle, segment_index, image.clone()))
                    .unwrap_or(false);
                if patched {
                    tracing::debug!(segment_index, "Scene image ready");
                    self.emit(TurnEvent::ImageReady {
                        handle,
                        segment_index,
                        image,
                    });
                }
            }
        };

        let known_names: Vec<&str> = known.iter().map(|c| c.name.as_str()).collect();
        let fresh = characters::resolve_new_characters(&update.new_characters, &known_names);
        let portraits = characters::request_portraits(self.inner.images.as_ref(), fresh, settings);

        let ((), portraits) = futures::join!(scene_images, portraits);

        let names: Vec<String> = portraits.iter().map(|p| p.name.clone()).collect();
        if !portraits.is_empty() {
            let merged = self.with_epoch(epoch, |session| session.merge_portraits(portraits));
            if merged.is_none() {
                return Vec::new();
            }
            tracing::info!(characters = ?names, "Added character portraits");
        }
        names
    }

    async fn auto_save(&self, epoch: u64) -> bool {
        let Some(data) = self.with_epoch(epoch, |session| session.to_save_data(now_millis())) else {
            return false;
        };
        match self.inner.store.put(&data).await {
            Ok(()) => {
                tracing::info!(save_id = %data.id, turn = data.turn_count, "Auto-saved");
                self.emit(TurnEvent::Saved { save_id: data.id });
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Auto-save failed");
                self.emit(TurnEvent::SaveFailed {
                    message: e.to_string(),
                });
                false
            }
        }
    }

    /// Write the active session now, regardless of the auto-save setting.
    pub async fn save_now(&self) -> Result<String, TurnError> {
        let data = self
            .with_session(|session| session.to_save_data(now_millis()))
            .ok_or(TurnError::NoActiveSession)?;
        self.inner.store.put(&data).await?;
        tracing::info!(save_id = %data.id, "Saved");
        self.emit(TurnEvent::Saved {
            save_id: data.id.clone(),
        });
        Ok(data.id)
    }

    /// Replace the active session with a stored one. A turn still running
    /// for the previous session is abandoned.
    pub async fn resume(&self, save_id: &str) -> Result<(), TurnError> {
        let save = self.inner.store.load(save_id).await?;
        let session = Session::from_save(save);
        tracing::info!(save_id, scenes = session.ledger().len(), "Resumed adventure");

        let mut state = self.state();
        state.epoch += 1;
        state.session = Some(session);
        Ok(())
    }

    /// Drop the active session, e.g. after a game over.
    pub fn new_session(&self) {
        let mut state = self.state();
        state.epoch += 1;
        state.session = None;
        tracing::debug!("Session cleared");
    }
}
