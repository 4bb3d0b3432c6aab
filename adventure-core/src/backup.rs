//! Backup and restore of every save as one zip archive.
//!
//! ```text
//! backup.zip
//! ├── manifest.json   {version, appName, createdAt, saveCount, saveIds}
//! ├── saves.json      every save, images replaced by "ref:<filename>"
//! └── images/         one binary file per distinct image
//! ```
//!
//! Backup works on a deep copy and never touches the live saves. Identical
//! image bytes are stored once and referenced from every field that embeds
//! them. On restore a reference to a missing file degrades to an empty
//! image, while a missing manifest or an unknown version aborts before any
//! save is written.

use crate::image::{extension_for_mime, mime_for_extension, EncodedImage};
use crate::persist::{SaveData, SaveStore, StoreError};
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use std::io::{Cursor, Read, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Archive format version written and accepted.
pub const BACKUP_VERSION: u32 = 1;

pub const APP_NAME: &str = "Adventure Engine";

const MANIFEST_FILE: &str = "manifest.json";
const SAVES_FILE: &str = "saves.json";
const IMAGES_DIR: &str = "images/";

/// Errors from backup and restore.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid backup archive: {0} not found")]
    MissingEntry(String),

    #[error("Unsupported backup version: {0}")]
    UnsupportedVersion(u32),

    #[error("There are no saves to back up")]
    NothingToBackUp,

    #[error("Save store error: {0}")]
    Store(#[from] StoreError),
}

/// `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub version: u32,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub save_count: usize,
    #[serde(default)]
    pub save_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPhase {
    Reading,
    Extracting,
    Packing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    Parsing,
    Images,
    Writing,
    Done,
}

/// A progress report for a long-running backup or restore.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress<P> {
    pub phase: P,
    pub message: String,
    /// 0 to 100.
    pub percent: f32,
}

fn report<P>(on_progress: &mut impl FnMut(Progress<P>), phase: P, message: impl Into<String>, percent: f32) {
    on_progress(Progress {
        phase,
        message: message.into(),
        percent,
    });
}

/// Result of a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    pub save_count: usize,
    pub image_count: usize,
}

/// Deterministic 64-bit content hash used in image file names.
pub fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`, cap at 30 chars.
pub fn sanitize_file_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .take(30)
        .collect()
}

/// Suggested download name, e.g. `Adventure-Backup_2026-02-16_2013.zip`.
pub fn backup_file_name(at: chrono::NaiveDateTime) -> String {
    format!("Adventure-Backup_{}.zip", at.format("%Y-%m-%d_%H%M"))
}

/// Images collected for the archive, deduplicated by content.
#[derive(Default)]
struct ImagePool {
    entries: Vec<(String, Vec<u8>)>,
    by_hash: FxHashMap<u64, Vec<usize>>,
}

impl ImagePool {
    /// Move an inline image into the pool and return its reference.
    ///
    /// `name` builds the file name from the content hash and extension; it
    /// is only used when these bytes have not been seen before. Images that
    /// do not decode become empty.
    fn extract(&mut self, image: &EncodedImage, name: impl FnOnce(u64, &str) -> String) -> EncodedImage {
        if !image.is_inline() {
            return image.clone();
        }
        let bytes = match image.decode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable image from backup");
                return EncodedImage::empty();
            }
        };

        let hash = content_hash(&bytes);
        let candidates = self.by_hash.entry(hash).or_default();
        if let Some(&existing) = candidates.iter().find(|&&i| self.entries[i].1 == bytes) {
            return EncodedImage::from_reference(&self.entries[existing].0);
        }

        let extension = extension_for_mime(image.mime_type()).unwrap_or("png");
        let filename = name(hash, extension);
        candidates.push(self.entries.len());
        self.entries.push((filename.clone(), bytes));
        EncodedImage::from_reference(&filename)
    }
}

/// Pack the given saves into a backup archive.
pub fn create_backup(
    saves: &[SaveData],
    mut on_progress: impl FnMut(Progress<BackupPhase>),
) -> Result<Vec<u8>, BackupError> {
    report(&mut on_progress, BackupPhase::Reading, "Reading saves", 5.0);
    if saves.is_empty() {
        return Err(BackupError::NothingToBackUp);
    }

    report(&mut on_progress, BackupPhase::Extracting, "Collecting images", 10.0);
    let mut pool = ImagePool::default();
    let mut packed: Vec<SaveData> = saves.to_vec();
    let total = packed.len();

    for (si, save) in packed.iter_mut().enumerate() {
        let percent = 10.0 + (si as f32 / total as f32) * 60.0;
        report(
            &mut on_progress,
            BackupPhase::Extracting,
            format!("Packing adventure {}/{total}", si + 1),
            percent,
        );

        for (sci, scene) in save.scene_history.iter_mut().enumerate() {
            for (segi, segment) in scene.segments.iter_mut().enumerate() {
                segment.image = pool.extract(&segment.image, |hash, ext| {
                    format!("s{si}_sc{sci}_seg{segi}_{hash:016x}.{ext}")
                });
            }
        }

        for (ci, character) in save.known_characters.iter_mut().enumerate() {
            let name = sanitize_file_component(&character.name);
            character.portrait_image = pool.extract(&character.portrait_image, |_, ext| {
                format!("s{si}_port_{name}_{ci}.{ext}")
            });
        }

        save.thumbnail = pool.extract(&save.thumbnail, |hash, ext| {
            format!("s{si}_thumb_{hash:016x}.{ext}")
        });
    }

    report(&mut on_progress, BackupPhase::Packing, "Writing manifest", 75.0);
    let manifest = BackupManifest {
        version: BACKUP_VERSION,
        app_name: APP_NAME.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        save_count: saves.len(),
        save_ids: saves.iter().map(|s| s.id.clone()).collect(),
    };

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    writer.start_file(MANIFEST_FILE, deflated)?;
    writer.write_all(&serde_json::to_vec_pretty(&manifest)?)?;
    writer.start_file(SAVES_FILE, deflated)?;
    writer.write_all(&serde_json::to_vec_pretty(&packed)?)?;

    report(
        &mut on_progress,
        BackupPhase::Packing,
        format!("Compressing {} images", pool.entries.len()),
        85.0,
    );
    writer.add_directory(IMAGES_DIR, stored)?;
    for (filename, bytes) in &pool.entries {
        // Image formats are already compressed.
        writer.start_file(format!("{IMAGES_DIR}{filename}"), stored)?;
        writer.write_all(bytes)?;
    }
    let archive = writer.finish()?.into_inner();

    tracing::info!(
        saves = saves.len(),
        images = pool.entries.len(),
        bytes = archive.len(),
        "Created backup"
    );
    report(
        &mut on_progress,
        BackupPhase::Done,
        format!("Backup complete: {} saves, {} images", saves.len(), pool.entries.len()),
        100.0,
    );
    Ok(archive)
}

/// Back up everything in a store.
pub async fn backup_store(
    store: &dyn SaveStore,
    on_progress: impl FnMut(Progress<BackupPhase>),
) -> Result<Vec<u8>, BackupError> {
    let saves = store.list().await?;
    create_backup(&saves, on_progress)
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Vec<u8>, BackupError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(BackupError::MissingEntry(name.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn resolve_reference(image: &mut EncodedImage, cache: &FxHashMap<String, Vec<u8>>) {
    let Some(filename) = image.reference() else {
        return;
    };
    *image = match cache.get(filename) {
        Some(bytes) => {
            let extension = filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("png");
            EncodedImage::from_bytes(bytes, mime_for_extension(extension))
        }
        None => {
            tracing::warn!(filename, "Backup references a missing image");
            EncodedImage::empty()
        }
    };
}

/// Parse an archive and rebuild every save with its images inline.
fn decode_with_progress(
    bytes: &[u8],
    on_progress: &mut impl FnMut(Progress<RestorePhase>),
) -> Result<(BackupManifest, Vec<SaveData>, usize), BackupError> {
    report(on_progress, RestorePhase::Parsing, "Opening archive", 5.0);
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let manifest: BackupManifest = serde_json::from_slice(&read_entry(&mut archive, MANIFEST_FILE)?)?;
    if manifest.version != BACKUP_VERSION {
        return Err(BackupError::UnsupportedVersion(manifest.version));
    }

    report(on_progress, RestorePhase::Parsing, "Reading saves", 15.0);
    let mut saves: Vec<SaveData> = serde_json::from_slice(&read_entry(&mut archive, SAVES_FILE)?)?;

    report(on_progress, RestorePhase::Images, "Restoring images", 25.0);
    let image_names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with(IMAGES_DIR) && name.len() > IMAGES_DIR.len())
        .map(str::to_string)
        .collect();
    let mut cache: FxHashMap<String, Vec<u8>> = FxHashMap::default();
    let total = image_names.len();
    for (i, name) in image_names.iter().enumerate() {
        let data = read_entry(&mut archive, name)?;
        cache.insert(name[IMAGES_DIR.len()..].to_string(), data);
        report(
            on_progress,
            RestorePhase::Images,
            format!("Restoring image {}/{total}", i + 1),
            25.0 + (i as f32 / total as f32) * 40.0,
        );
    }

    for save in &mut saves {
        for scene in &mut save.scene_history {
            for segment in &mut scene.segments {
                resolve_reference(&mut segment.image, &cache);
            }
        }
        for character in &mut save.known_characters {
            resolve_reference(&mut character.portrait_image, &cache);
        }
        resolve_reference(&mut save.thumbnail, &cache);
    }

    Ok((manifest, saves, cache.len()))
}

/// Read the manifest and saves of an archive without writing anything.
pub fn decode_backup(bytes: &[u8]) -> Result<(BackupManifest, Vec<SaveData>), BackupError> {
    let (manifest, saves, _) = decode_with_progress(bytes, &mut |_| {})?;
    Ok((manifest, saves))
}

/// Restore every save of an archive into the store, overwriting saves
/// with the same id.
pub async fn restore_backup(
    bytes: &[u8],
    store: &dyn SaveStore,
    mut on_progress: impl FnMut(Progress<RestorePhase>),
) -> Result<RestoreSummary, BackupError> {
    let (_, saves, image_count) = decode_with_progress(bytes, &mut on_progress)?;

    report(&mut on_progress, RestorePhase::Writing, "Writing saves", 70.0);
    let total = saves.len();
    for (si, save) in saves.iter().enumerate() {
        report(
            &mut on_progress,
            RestorePhase::Writing,
            format!("Saving adventure {}/{total}", si + 1),
            70.0 + (si as f32 / total.max(1) as f32) * 25.0,
        );
        store.put(save).await?;
    }

    tracing::info!(saves = total, images = image_count, "Restored backup");
    report(
        &mut on_progress,
        RestorePhase::Done,
        format!("Restore complete: {total} adventures restored"),
        100.0,
    );
    Ok(RestoreSummary {
        save_count: total,
        image_count,
    })
}
