//! Save records and the save store.
//!
//! A [`SaveData`] is a whole-session snapshot. Stores only ever overwrite a
//! record in full; there are no partial or delta saves.

use crate::characters::CharacterPortrait;
use crate::conversation::{ConversationLogs, HistoryEntry};
use crate::image::EncodedImage;
use crate::inventory::QuestItem;
use crate::scene::Scene;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

/// Errors from save store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Save not found: {0}")]
    NotFound(String),
}

/// A durable snapshot of one adventure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveData {
    pub id: String,
    pub name: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
    pub scene_history: Vec<Scene>,
    pub current_scene_index: usize,
    pub inventory: Vec<String>,
    pub quests: Vec<QuestItem>,
    pub story_history: Vec<HistoryEntry>,
    /// First image of the latest scene, or empty.
    #[serde(default)]
    pub thumbnail: EncodedImage,
    pub turn_count: u32,
    #[serde(default)]
    pub is_game_over: bool,
    #[serde(default)]
    pub game_over_message: String,
    #[serde(default)]
    pub character_visual_identity: String,
    #[serde(default)]
    pub location_visual_identity: String,
    #[serde(default)]
    pub known_characters: Vec<CharacterPortrait>,
    /// Only written when some conversation was logged.
    #[serde(default, skip_serializing_if = "ConversationLogs::is_empty")]
    pub conversation_logs: ConversationLogs,
}

impl SaveData {
    pub fn summary(&self) -> SaveSummary {
        SaveSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            updated_at: self.updated_at,
            turn_count: self.turn_count,
            is_game_over: self.is_game_over,
            thumbnail: self.thumbnail.clone(),
        }
    }
}

/// What a save list needs, without the full history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSummary {
    pub id: String,
    pub name: String,
    pub updated_at: i64,
    pub turn_count: u32,
    #[serde(default)]
    pub is_game_over: bool,
    #[serde(default)]
    pub thumbnail: EncodedImage,
}

/// Key-value storage of saves by id.
#[async_trait]
pub trait SaveStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<SaveData>, StoreError>;

    /// Insert or fully overwrite the save with this id.
    async fn put(&self, save: &SaveData) -> Result<(), StoreError>;

    /// All saves, most recently updated first.
    async fn list(&self) -> Result<Vec<SaveData>, StoreError>;

    /// Remove a save. Removing an absent id is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Summaries, most recently updated first.
    async fn summaries(&self) -> Result<Vec<SaveSummary>, StoreError> {
        Ok(self.list().await?.iter().map(SaveData::summary).collect())
    }

    /// Like [`get`](Self::get), but a missing save is an error.
    async fn load(&self, id: &str) -> Result<SaveData, StoreError> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

fn sort_by_recency(saves: &mut [SaveData]) {
    saves.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// Saves kept in memory only.
#[derive(Debug, Default)]
pub struct MemorySaveStore {
    saves: RwLock<HashMap<String, SaveData>>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SaveStore for MemorySaveStore {
    async fn get(&self, id: &str) -> Result<Option<SaveData>, StoreError> {
        Ok(self.saves.read().await.get(id).cloned())
    }

    async fn put(&self, save: &SaveData) -> Result<(), StoreError> {
        self.saves
            .write()
            .await
            .insert(save.id.clone(), save.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SaveData>, StoreError> {
        let mut saves: Vec<SaveData> = self.saves.read().await.values().cloned().collect();
        sort_by_recency(&mut saves);
        Ok(saves)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.saves.write().await.remove(id);
        Ok(())
    }
}

/// One pretty-printed JSON file per save in a directory.
#[derive(Debug, Clone)]
pub struct JsonDirSaveStore {
    dir: PathBuf,
}

impl JsonDirSaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data dir>/adventure-engine/saves`, or `./saves` if the platform has
    /// no data dir.
    pub fn default_location() -> Self {
        let mut dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        dir.push("adventure-engine");
        dir.push("saves");
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        save_path(&self.dir, id)
    }

    async fn read_save(path: &Path) -> Result<SaveData, StoreError> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn json_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut files = Vec::new();
        if !fs::try_exists(&self.dir).await? {
            return Ok(files);
        }
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl SaveStore for JsonDirSaveStore {
    async fn get(&self, id: &str) -> Result<Option<SaveData>, StoreError> {
        match Self::read_save(&self.path_for(id)).await {
            Ok(save) if save.id == id => Ok(Some(save)),
            Ok(save) => {
                tracing::warn!(requested = id, found = %save.id, "Save file holds a different id");
                Ok(None)
            }
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put(&self, save: &SaveData) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&save.id);
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(save)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(id = %save.id, path = %path.display(), "Wrote save");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SaveData>, StoreError> {
        let mut saves = Vec::new();
        for path in self.json_files().await? {
            match Self::read_save(&path).await {
                Ok(save) => saves.push(save),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable save");
                }
            }
        }
        sort_by_recency(&mut saves);
        Ok(saves)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads only the summary fields of each file.
    async fn summaries(&self) -> Result<Vec<SaveSummary>, StoreError> {
        let mut summaries = Vec::new();
        for path in self.json_files().await? {
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable save");
                    continue;
                }
            };
            match serde_json::from_str::<SaveSummary>(&content) {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable save");
                }
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

/// File path for a save id. ASCII alphanumerics, `_` and `-` are kept and
/// every other byte is written as `%XX`, so distinct ids never share a file.
pub fn save_path(dir: impl AsRef<Path>, id: &str) -> PathBuf {
    let mut name = String::with_capacity(id.len() + 5);
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            name.push(byte as char);
        } else {
            name.push_str(&format!("%{byte:02X}"));
        }
    }
    name.push_str(".json");
    dir.as_ref().join(name)
}

/// A fresh save id: `save_<epoch millis>_<7 base36 chars>`.
pub fn generate_save_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..7)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("save_{}_{suffix}", now_millis())
}

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
