//! Settings, the key-value `ConfigStore`, and API key resolution.
//!
//! Nothing in the engine reads ambient global state: settings and keys are
//! read through a [`ConfigStore`] handed in by the caller, so tests can use
//! [`MemoryConfigStore`] and a desktop shell can use [`JsonFileConfigStore`].

use crate::genre::{Genre, DEFAULT_PREMISE};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Key under which [`GameSettings`] are stored.
pub const SETTINGS_KEY: &str = "adventure-engine-settings";

/// Key for an API key kept only for the current session.
pub const SESSION_API_KEY: &str = "adventure-engine-api-key";

/// Key for an API key that survives restarts.
pub const PERSISTENT_API_KEY: &str = "adventure-engine-api-key-persistent";

/// Errors from reading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Flat string key-value configuration storage.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError>;
    fn remove(&self, key: &str) -> Result<(), ConfigError>;
    fn clear(&self) -> Result<(), ConfigError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory store. Also serves as the "session" scope, which is gone when
/// the process exits.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        lock(&self.values).remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), ConfigError> {
        lock(&self.values).clear();
        Ok(())
    }
}

/// A flat JSON object on disk. Every write rewrites the whole file.
#[derive(Debug)]
pub struct JsonFileConfigStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileConfigStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file is an empty store. A file that does not parse is
    /// logged and treated as empty; it is overwritten on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Open the store at the platform default location.
    pub fn open_default() -> Result<Self, ConfigError> {
        Self::open(default_config_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl ConfigStore for JsonFileConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut values = lock(&self.values);
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        let mut values = lock(&self.values);
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), ConfigError> {
        let mut values = lock(&self.values);
        values.clear();
        self.flush(&values)
    }
}

/// `<config dir>/adventure-engine/config.json`, or the working directory if
/// the platform has no config dir.
pub fn default_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("adventure-engine");
    path.push("config.json");
    path
}

/// Illustration style for generated images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtStyle {
    #[default]
    Ghibli,
    DarkFantasy,
    Watercolor,
    Realistic,
    PixelArt,
    Comic,
}

impl ArtStyle {
    pub fn label(&self) -> &'static str {
        match self {
            ArtStyle::Ghibli => "Studio Ghibli",
            ArtStyle::DarkFantasy => "Dark Fantasy",
            ArtStyle::Watercolor => "Watercolor",
            ArtStyle::Realistic => "Realistic",
            ArtStyle::PixelArt => "Pixel Art",
            ArtStyle::Comic => "Comic / Manga",
        }
    }

    /// Style fragment appended to every image prompt.
    pub fn prompt(&self) -> &'static str {
        match self {
            ArtStyle::Ghibli => "in a vibrant, detailed digital painting style with a hint of Ghibli-inspired fantasy, maintaining consistent character designs throughout.",
            ArtStyle::DarkFantasy => "in a dark, atmospheric fantasy art style with dramatic lighting, deep shadows, and rich textures reminiscent of Dark Souls concept art.",
            ArtStyle::Watercolor => "in a beautiful traditional watercolor painting style with soft edges, flowing colors, and delicate brushstrokes.",
            ArtStyle::Realistic => "in a photorealistic digital art style with cinematic lighting, high detail, and realistic textures.",
            ArtStyle::PixelArt => "in a detailed pixel art style with vibrant colors, reminiscent of classic 16-bit RPG games.",
            ArtStyle::Comic => "in a detailed manga/comic book art style with bold linework, dynamic compositions, and expressive characters.",
        }
    }
}

/// Requested resolution for generated images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }
}

/// Protagonist gender used when narrating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

/// Player-facing settings. Unknown keys are ignored and missing keys take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSettings {
    pub image_size: ImageSize,
    /// Narrative segments per turn, 2 or 3.
    pub segments_per_turn: u8,
    pub art_style: ArtStyle,
    pub auto_save: bool,
    pub gender: Gender,
    /// Keep the API key across restarts instead of only for this session.
    pub persist_api_key: bool,
    pub master_volume: f32,
    pub music_volume: f32,
    pub voice_volume: f32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            image_size: ImageSize::OneK,
            segments_per_turn: 2,
            art_style: ArtStyle::Ghibli,
            auto_save: true,
            gender: Gender::Male,
            persist_api_key: false,
            master_volume: 1.0,
            music_volume: 0.1,
            voice_volume: 1.0,
        }
    }
}

impl GameSettings {
    /// Read settings, falling back to defaults when absent or unparseable.
    pub fn load(store: &dyn ConfigStore) -> Self {
        let Some(raw) = store.get(SETTINGS_KEY) else {
            return Self::default();
        };
        match serde_json::from_str::<GameSettings>(&raw) {
            Ok(settings) => settings.normalized(),
            Err(e) => {
                tracing::warn!(error = %e, "Stored settings are unreadable; using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, store: &dyn ConfigStore) -> Result<(), ConfigError> {
        let json = serde_json::to_string(self)?;
        store.set(SETTINGS_KEY, &json)
    }

    /// Clamp values into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.segments_per_turn = self.segments_per_turn.clamp(2, 3);
        self.master_volume = self.master_volume.clamp(0.0, 1.0);
        self.music_volume = self.music_volume.clamp(0.0, 1.0);
        self.voice_volume = self.voice_volume.clamp(0.0, 1.0);
        self
    }
}

/// API key lookup across the environment, a persistent store and a
/// session store.
pub struct ApiKeys<'a> {
    persistent: &'a dyn ConfigStore,
    session: &'a dyn ConfigStore,
}

impl<'a> ApiKeys<'a> {
    pub fn new(persistent: &'a dyn ConfigStore, session: &'a dyn ConfigStore) -> Self {
        Self {
            persistent,
            session,
        }
    }

    /// Environment first, then the persistent store, then the session store.
    pub fn resolve(&self) -> Option<String> {
        self.resolve_with_env(env_key())
    }

    fn resolve_with_env(&self, env: Option<String>) -> Option<String> {
        env.or_else(|| non_empty(self.persistent.get(PERSISTENT_API_KEY)))
            .or_else(|| non_empty(self.session.get(SESSION_API_KEY)))
    }

    /// Whether the key in use comes from the environment.
    pub fn is_env_key(&self) -> bool {
        env_key().is_some()
    }

    /// Whether the user has stored a key in either scope.
    pub fn has_stored_key(&self) -> bool {
        non_empty(self.persistent.get(PERSISTENT_API_KEY)).is_some()
            || non_empty(self.session.get(SESSION_API_KEY)).is_some()
    }

    /// Store `key` in exactly one scope, removing it from the other. A blank
    /// key clears both.
    pub fn set(&self, key: &str, persist: bool) -> Result<(), ConfigError> {
        let key = key.trim();
        if key.is_empty() {
            self.session.remove(SESSION_API_KEY)?;
            return self.persistent.remove(PERSISTENT_API_KEY);
        }
        if persist {
            self.persistent.set(PERSISTENT_API_KEY, key)?;
            self.session.remove(SESSION_API_KEY)
        } else {
            self.session.set(SESSION_API_KEY, key)?;
            self.persistent.remove(PERSISTENT_API_KEY)
        }
    }

    /// Move an existing key to the scope matching the new `persist` setting.
    pub fn migrate_persistence(&self, persist: bool) -> Result<(), ConfigError> {
        let (from, from_key, to, to_key) = if persist {
            (self.session, SESSION_API_KEY, self.persistent, PERSISTENT_API_KEY)
        } else {
            (self.persistent, PERSISTENT_API_KEY, self.session, SESSION_API_KEY)
        };
        if let Some(key) = non_empty(from.get(from_key)) {
            to.set(to_key, &key)?;
            from.remove(from_key)?;
            tracing::debug!(persist, "Moved API key between stores");
        }
        Ok(())
    }
}

fn env_key() -> Option<String> {
    non_empty(std::env::var(claude::API_KEY_ENV).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Configuration for starting an adventure.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Display name of the save.
    pub save_name: String,

    pub settings: GameSettings,

    /// Action sent to the story generator to open the adventure.
    pub opening_action: String,
}

impl EngineConfig {
    pub fn new(save_name: impl Into<String>) -> Self {
        Self {
            save_name: save_name.into(),
            settings: GameSettings::default(),
            opening_action: DEFAULT_PREMISE.to_string(),
        }
    }

    /// Open with a genre's premise; the save is named after the genre and
    /// the current local time.
    pub fn for_genre(genre: &Genre) -> Self {
        Self::for_genre_at(genre, chrono::Local::now().naive_local())
    }

    pub fn for_genre_at(genre: &Genre, started_at: NaiveDateTime) -> Self {
        let name = format!("{} — {}", genre.name, started_at.format("%-d %b %Y %H:%M"));
        Self::new(name).with_opening_action(genre.initial_prompt())
    }

    pub fn with_settings(mut self, settings: GameSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Open with a genre or premise chosen by the player.
    pub fn with_opening_action(mut self, action: impl Into<String>) -> Self {
        self.opening_action = action.into();
        self
    }

    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        self.settings.auto_save = enabled;
        self
    }

    pub fn with_art_style(mut self, style: ArtStyle) -> Self {
        self.settings.art_style = style;
        self
    }

    pub fn with_segments_per_turn(mut self, segments: u8) -> Self {
        self.settings.segments_per_turn = segments.clamp(2, 3);
        self
    }
}
