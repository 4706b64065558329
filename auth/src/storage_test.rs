use std::collections::HashMap;

use uuid::Uuid;

use super::*;
use crate::types::Identity;

fn session(token: &str) -> Session {
    Session {
        access_token: token.into(),
        refresh_token: "refresh".into(),
        token_type: "bearer".into(),
        expires_in: 3600,
        expires_at: Some(1_700_000_000),
        user: Identity {
            id: Uuid::nil(),
            email: Some("a@b.com".into()),
            phone: None,
            user_metadata: HashMap::new(),
            app_metadata: HashMap::new(),
        },
    }
}

// =============================================================================
// MemoryStorage
// =============================================================================

#[test]
fn memory_starts_empty_and_round_trips() {
    let storage = MemoryStorage::new();
    assert_eq!(storage.load().unwrap(), None);
    storage.save(&session("one")).unwrap();
    assert_eq!(storage.load().unwrap().unwrap().access_token, "one");
    storage.clear().unwrap();
    assert_eq!(storage.load().unwrap(), None);
}

// =============================================================================
// FileStorage
// =============================================================================

#[test]
fn file_missing_loads_none() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("session.json"));
    assert_eq!(storage.load().unwrap(), None);
}

#[test]
fn file_save_creates_parent_dirs_and_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("nested/deeper/session.json"));
    storage.save(&session("first")).unwrap();
    storage.save(&session("second")).unwrap();
    assert_eq!(storage.load().unwrap().unwrap().access_token, "second");
    let entries: Vec<_> = std::fs::read_dir(dir.path().join("nested/deeper"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("session.json")]);
}

#[cfg(unix)]
#[test]
fn file_is_readable_by_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{}").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    FileStorage::new(&path).save(&session("secret")).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn concurrent_writers_never_collide_on_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let writers: Vec<_> = (0..8)
        .map(|i| {
            let storage = FileStorage::new(&path);
            std::thread::spawn(move || {
                for round in 0..20 {
                    storage.save(&session(&format!("w{i}-{round}"))).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    let token = FileStorage::new(&path).load().unwrap().unwrap().access_token;
    assert!(token.ends_with("-19"));
}

#[test]
fn file_corrupt_contents_load_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{not json").unwrap();
    let storage = FileStorage::new(&path);
    assert_eq!(storage.load().unwrap(), None);
}

#[test]
fn file_clear_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("session.json"));
    storage.clear().unwrap();
    storage.save(&session("x")).unwrap();
    storage.clear().unwrap();
    assert!(!storage.path().exists());
    storage.clear().unwrap();
}
