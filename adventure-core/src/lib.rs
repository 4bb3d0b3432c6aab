//! Turn engine for illustrated, AI-generated choose-your-path adventures.
//!
//! This crate provides:
//! - A turn orchestrator that commits each scene as soon as its text
//!   arrives and streams illustrations in afterwards
//! - Scene history with read-only navigation
//! - Inventory and quest reconciliation
//! - A character registry with generated portraits
//! - Save persistence and zip backup/restore with image deduplication
//!
//! # Quick Start
//!
//! ```ignore
//! use adventure_core::{ClaudeStoryGenerator, EngineConfig, JsonDirSaveStore, NoImages, TurnEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = TurnEngine::new(
//!         Arc::new(ClaudeStoryGenerator::from_env()?),
//!         Arc::new(NoImages),
//!         Arc::new(JsonDirSaveStore::default_location()),
//!         Default::default(),
//!     );
//!
//!     let opening = engine.start_game(EngineConfig::new("My Adventure")).await?;
//!     println!("{}", opening.narrative());
//!
//!     let next = engine.submit_action(&opening.scene.choices[0].text).await?;
//!     println!("{}", next.narrative());
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod characters;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod generator;
pub mod genre;
pub mod headless;
pub mod image;
pub mod inventory;
pub mod persist;
pub mod scene;
pub mod session;
pub mod testing;

// Primary public API
pub use backup::{backup_store, create_backup, restore_backup, BackupError, RestoreSummary};
pub use characters::{CharacterCandidate, CharacterPortrait};
pub use config::{ApiKeys, ConfigStore, EngineConfig, GameSettings, JsonFileConfigStore, MemoryConfigStore};
pub use conversation::ChatMessage;
pub use engine::{TurnEngine, TurnError, TurnEvent, TurnOutcome, TurnPhase};
pub use generator::{
    ClaudeStoryGenerator, GameStateUpdate, GeneratorError, ImageGenerator, NoImages, StoryGenerator,
};
pub use genre::{Genre, GENRES};
pub use headless::HeadlessGame;
pub use image::EncodedImage;
pub use inventory::QuestItem;
pub use persist::{JsonDirSaveStore, MemorySaveStore, SaveData, SaveStore, SaveSummary, StoreError};
pub use scene::{Choice, DialogueConfig, Scene, SceneLedger, Segment};
pub use session::{Session, TurnHandle};
pub use testing::{ScriptedImageGenerator, ScriptedStoryGenerator, TestHarness};
