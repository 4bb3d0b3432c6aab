//! Backup archives: round trip, progress reporting and rejection of bad
//! archives.

mod common;

use adventure_core::backup::{
    backup_store, create_backup, decode_backup, restore_backup, BackupError, BackupPhase, RestorePhase,
    BACKUP_VERSION,
};
use adventure_core::image::EncodedImage;
use adventure_core::persist::{MemorySaveStore, SaveData, SaveStore};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;

fn fixture_saves() -> Vec<SaveData> {
    let red = common::red_image();
    let jpeg = EncodedImage::from_bytes(&[0xff, 0xd8, 0xff, 0xe0, 1, 2, 3], "image/jpeg");
    vec![
        common::save_fixture("save_b", 2_000, &[&[red.clone(), EncodedImage::empty()]]),
        common::save_fixture("save_a", 1_000, &[&[jpeg], &[red.clone(), red]]),
    ]
}

fn archive_names(bytes: &[u8]) -> Vec<String> {
    let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    archive.file_names().map(str::to_string).collect()
}

fn rewrite_entry(bytes: &[u8], name: &str, replacement: Option<&[u8]>) -> Vec<u8> {
    let mut source = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..source.len() {
        let mut file = source.by_index(i).unwrap();
        let entry = file.name().to_string();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        if entry == name {
            match replacement {
                Some(new) => data = new.to_vec(),
                None => continue,
            }
        }
        if entry.ends_with('/') {
            writer.add_directory(entry, SimpleFileOptions::default()).unwrap();
        } else {
            writer.start_file(entry, SimpleFileOptions::default()).unwrap();
            writer.write_all(&data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_restore_reproduces_every_save() {
    let saves = fixture_saves();
    let archive = create_backup(&saves, |_| {}).unwrap();

    let store = MemorySaveStore::new();
    let summary = restore_backup(&archive, &store, |_| {}).await.unwrap();

    assert_eq!(summary.save_count, 2);
    // The red PNG, the jpeg and the portrait PNG; repeats are stored once.
    assert_eq!(summary.image_count, 3);
    assert_eq!(store.list().await.unwrap(), saves);
}

#[tokio::test]
async fn test_one_scene_with_red_png_and_empty_segment() {
    let save = common::save_fixture("save_1", 1_000, &[&[common::red_image(), EncodedImage::empty()]]);
    let archive = create_backup(std::slice::from_ref(&save), |_| {}).unwrap();

    let (manifest, restored) = decode_backup(&archive).unwrap();

    assert_eq!(manifest.version, BACKUP_VERSION);
    assert_eq!(manifest.save_count, 1);
    let segments = &restored[0].scene_history[0].segments;
    assert_eq!(segments[0].image, common::red_image());
    assert!(segments[1].image.is_empty());
    assert_eq!(restored, vec![save]);
}

#[tokio::test]
async fn test_archive_layout_and_references() {
    let saves = fixture_saves();
    let archive = create_backup(&saves, |_| {}).unwrap();

    let names = archive_names(&archive);
    assert!(names.contains(&"manifest.json".to_string()));
    assert!(names.contains(&"saves.json".to_string()));
    let images: Vec<&String> = names.iter().filter(|n| n.starts_with("images/") && n.len() > 7).collect();
    assert_eq!(images.len(), 3);
    assert!(images.iter().any(|n| n.ends_with(".jpg")));
    assert!(images.iter().any(|n| n.starts_with("images/s0_port_Eliot_0.")));

    let mut zip = zip::ZipArchive::new(Cursor::new(archive.as_slice())).unwrap();
    let mut saves_json = String::new();
    zip.by_name("saves.json").unwrap().read_to_string(&mut saves_json).unwrap();
    assert!(saves_json.contains("\"ref:s0_sc0_seg0_"));
    assert!(!saves_json.contains("data:image"));
}

#[tokio::test]
async fn test_backup_is_reproducible_apart_from_the_timestamp() {
    let saves = fixture_saves();
    let first = decode_backup(&create_backup(&saves, |_| {}).unwrap()).unwrap();
    let second = decode_backup(&create_backup(&saves, |_| {}).unwrap()).unwrap();

    assert_eq!(first.1, second.1);
    assert_eq!(
        archive_names(&create_backup(&saves, |_| {}).unwrap()),
        archive_names(&create_backup(&saves, |_| {}).unwrap())
    );
}

#[tokio::test]
async fn test_progress_phases_in_order() {
    let store = MemorySaveStore::new();
    for save in fixture_saves() {
        store.put(&save).await.unwrap();
    }

    let mut backup_phases = Vec::new();
    let mut last_percent = 0.0f32;
    let archive = backup_store(&store, |p| {
        assert!(p.percent >= last_percent, "progress went backwards: {}", p.message);
        last_percent = p.percent;
        backup_phases.push(p.phase);
    })
    .await
    .unwrap();
    backup_phases.dedup();
    assert_eq!(
        backup_phases,
        vec![BackupPhase::Reading, BackupPhase::Extracting, BackupPhase::Packing, BackupPhase::Done]
    );
    assert_eq!(last_percent, 100.0);

    let mut restore_phases = Vec::new();
    restore_backup(&archive, &MemorySaveStore::new(), |p| restore_phases.push(p.phase))
        .await
        .unwrap();
    restore_phases.dedup();
    assert_eq!(
        restore_phases,
        vec![RestorePhase::Parsing, RestorePhase::Images, RestorePhase::Writing, RestorePhase::Done]
    );
}

#[tokio::test]
async fn test_restore_overwrites_saves_with_the_same_id() {
    let saves = fixture_saves();
    let archive = create_backup(&saves, |_| {}).unwrap();

    let store = MemorySaveStore::new();
    let mut local = saves[0].clone();
    local.inventory = vec!["something newer".to_string()];
    store.put(&local).await.unwrap();
    store.put(&common::save_fixture("save_local", 5_000, &[&[]])).await.unwrap();

    restore_backup(&archive, &store, |_| {}).await.unwrap();

    assert_eq!(store.load("save_b").await.unwrap(), saves[0]);
    assert_eq!(store.list().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_bad_archives_write_nothing() {
    let archive = create_backup(&fixture_saves(), |_| {}).unwrap();
    let store = MemorySaveStore::new();

    let future_version = rewrite_entry(
        &archive,
        "manifest.json",
        Some(br#"{"version": 2, "appName": "x", "createdAt": "", "saveCount": 0, "saveIds": []}"#),
    );
    assert!(matches!(
        restore_backup(&future_version, &store, |_| {}).await,
        Err(BackupError::UnsupportedVersion(2))
    ));

    let no_manifest = rewrite_entry(&archive, "manifest.json", None);
    assert!(matches!(
        restore_backup(&no_manifest, &store, |_| {}).await,
        Err(BackupError::MissingEntry(_))
    ));

    assert!(matches!(
        restore_backup(b"not a zip file", &store, |_| {}).await,
        Err(BackupError::Zip(_))
    ));

    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_image_file_restores_as_empty() {
    let save = common::save_fixture("save_1", 1_000, &[&[common::red_image()]]);
    let archive = create_backup(std::slice::from_ref(&save), |_| {}).unwrap();
    let scene_image = archive_names(&archive)
        .into_iter()
        .find(|n| n.starts_with("images/s0_sc0_seg0_"))
        .unwrap();
    let damaged = rewrite_entry(&archive, &scene_image, None);

    let store = MemorySaveStore::new();
    let summary = restore_backup(&damaged, &store, |_| {}).await.unwrap();

    assert_eq!(summary.image_count, 1);
    let restored = store.load("save_1").await.unwrap();
    assert!(restored.scene_history[0].segments[0].image.is_empty());
    assert!(restored.thumbnail.is_empty());
    assert_eq!(restored.known_characters, save.known_characters);
}

#[test]
fn test_empty_save_set_cannot_be_backed_up() {
    assert!(matches!(create_backup(&[], |_| {}), Err(BackupError::NothingToBackUp)));
}

#[tokio::test]
async fn test_restore_into_directory_keeps_lookalike_ids_apart() {
    let saves = vec![
        common::save_fixture("trip.1", 2_000, &[&[common::red_image()]]),
        common::save_fixture("trip_1", 1_000, &[&[EncodedImage::empty()]]),
    ];
    let archive = create_backup(&saves, |_| {}).unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let store = adventure_core::persist::JsonDirSaveStore::new(dir.path());
    let summary = restore_backup(&archive, &store, |_| {}).await.unwrap();

    assert_eq!(summary.save_count, 2);
    assert_eq!(store.list().await.unwrap(), saves);
}
