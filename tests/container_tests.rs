use docprops::container::{
    AccessMode, ContainerStorage, FileContainer, MAGIC_NUMBER, PropertySetStorage, RootStorage,
    StatCursor, StorageError,
};
use docprops::{Error, PropertySpec, PropertyStore, USER_DEFINED_PROPERTIES};
use std::io::{Read, Seek, SeekFrom, Write};

fn create_tempfile() -> tempfile::NamedTempFile {
    tempfile::NamedTempFile::new().unwrap()
}

fn seed_document(path: &std::path::Path) {
    let mut store = PropertyStore::open(path).unwrap();
    store.add("Author", "Jane").unwrap();
    store.add("Revision", 7i32).unwrap();
}

#[test]
fn test_file_starts_with_magic_number() {
    let tmpfile = create_tempfile();
    seed_document(tmpfile.path());
    let mut prefix = [0u8; 8];
    let mut file = std::fs::File::open(tmpfile.path()).unwrap();
    file.read_exact(&mut prefix).unwrap();
    assert_eq!(prefix, MAGIC_NUMBER);
}

#[test]
fn test_header_corruption_surfaces_as_storage_failure() {
    let tmpfile = create_tempfile();
    seed_document(tmpfile.path());

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .open(tmpfile.path())
        .unwrap();
    file.seek(SeekFrom::Start(100)).unwrap();
    file.write_all(&[0xff]).unwrap();

    match PropertyStore::open(tmpfile.path()) {
        Err(Error::Storage(StorageError::Corrupted(msg))) => {
            assert!(msg.contains("checksum"), "unexpected message: {msg}");
        }
        other => panic!("expected Corrupted, got {other:?}"),
    }
}

#[test]
fn test_text_file_rejected_as_bad_magic() {
    let tmpfile = create_tempfile();
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .open(tmpfile.path())
        .unwrap();
    file.write_all(&b"not a container at all".repeat(300)).unwrap();

    match PropertyStore::open(tmpfile.path()) {
        Err(Error::Storage(StorageError::Corrupted(msg))) => {
            assert!(msg.contains("magic"), "unexpected message: {msg}");
        }
        other => panic!("expected Corrupted, got {other:?}"),
    }
}

#[test]
fn test_uncommitted_mutations_discarded_on_drop() {
    let tmpfile = create_tempfile();
    let container = FileContainer::new();
    {
        let mut root = container
            .open_root(tmpfile.path(), AccessMode::ReadWriteExclusive)
            .unwrap();
        let mut set = root.create_property_set(USER_DEFINED_PROPERTIES).unwrap();
        set.write(
            &PropertySpec::Name("Author".to_string()),
            &[0x03, 0x00, 0x00, 0x00, 0x2a, 0x00, 0x00, 0x00],
            2,
        )
        .unwrap();
        // Dropped without commit: nothing reaches the file.
    }
    let store = PropertyStore::open(tmpfile.path()).unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_write_to_reserved_id_rejected() {
    let tmpfile = create_tempfile();
    let container = FileContainer::new();
    let mut root = container
        .open_root(tmpfile.path(), AccessMode::ReadWriteExclusive)
        .unwrap();
    let mut set = root.create_property_set(USER_DEFINED_PROPERTIES).unwrap();
    for reserved in [0u32, 1u32] {
        match set.write(&PropertySpec::Id(reserved), &[0x03, 0, 0, 0, 1, 0, 0, 0], 2) {
            Err(StorageError::ReservedId(id)) => assert_eq!(id, reserved),
            other => panic!("expected ReservedId, got {other:?}"),
        }
    }
}

#[test]
fn test_enumeration_skips_reserved_ids_and_carries_names() {
    let tmpfile = create_tempfile();
    seed_document(tmpfile.path());

    let container = FileContainer::new();
    let root = container
        .open_root(tmpfile.path(), AccessMode::ReadShared)
        .unwrap();
    let set = root.open_property_set(USER_DEFINED_PROPERTIES).unwrap();
    let mut cursor = set.enum_stats().unwrap();
    let mut stats = Vec::new();
    while let Some(stat) = cursor.next().unwrap() {
        stats.push(stat);
    }

    assert_eq!(stats.len(), 2);
    for stat in &stats {
        assert!(stat.id >= 2, "reserved id {} enumerated", stat.id);
        assert!(stat.name.is_some());
    }
    let names: Vec<_> = stats.iter().map(|s| s.name.clone().unwrap()).collect();
    assert!(names.contains(&"Author".to_string()));
    assert!(names.contains(&"Revision".to_string()));
}

#[test]
fn test_shared_and_exclusive_locks_conflict() {
    let tmpfile = create_tempfile();
    seed_document(tmpfile.path());
    let container = FileContainer::new();

    let reader = container
        .open_root(tmpfile.path(), AccessMode::ReadShared)
        .unwrap();
    assert!(matches!(
        container.open_root(tmpfile.path(), AccessMode::ReadWriteExclusive),
        Err(StorageError::SharingViolation)
    ));
    drop(reader);

    let writer = container
        .open_root(tmpfile.path(), AccessMode::ReadWriteExclusive)
        .unwrap();
    assert!(matches!(
        container.open_root(tmpfile.path(), AccessMode::ReadShared),
        Err(StorageError::SharingViolation)
    ));
    drop(writer);

    // Two readers coexist.
    let _first = container
        .open_root(tmpfile.path(), AccessMode::ReadShared)
        .unwrap();
    let _second = container
        .open_root(tmpfile.path(), AccessMode::ReadShared)
        .unwrap();
}

#[test]
fn test_concurrent_reader_blocks_store_mutation() {
    let tmpfile = create_tempfile();
    seed_document(tmpfile.path());

    let mut store = PropertyStore::open(tmpfile.path()).unwrap();
    let container = FileContainer::new();
    let _reader = container
        .open_root(tmpfile.path(), AccessMode::ReadShared)
        .unwrap();

    match store.add("Draft", true) {
        Err(Error::Storage(StorageError::SharingViolation)) => {}
        other => panic!("expected a sharing violation, got {other:?}"),
    }
    assert_eq!(store.len(), 2);
}

#[test]
fn test_stream_survives_repeated_reopen_cycles() {
    let tmpfile = create_tempfile();
    for round in 0..5i32 {
        let mut store = PropertyStore::open(tmpfile.path()).unwrap();
        match store.get("Round") {
            Some(_) => store.update("Round", round).unwrap(),
            None => store.add("Round", round).unwrap(),
        }
        store.add(format!("Entry{round}"), round).unwrap();
    }

    let mut store = PropertyStore::open(tmpfile.path()).unwrap();
    assert_eq!(store.len(), 6);
    assert_eq!(store["Round"].as_i32(), Some(4));
    for round in 0..5i32 {
        assert_eq!(store[format!("Entry{round}").as_str()].as_i32(), Some(round));
    }

    store.delete("Entry2").unwrap();
    let reopened = PropertyStore::open(tmpfile.path()).unwrap();
    assert_eq!(reopened.len(), 5);
    assert!(reopened.get("Entry2").is_none());
}

#[test]
fn test_shrinking_rewrite_truncates_file() {
    let tmpfile = create_tempfile();
    {
        let mut store = PropertyStore::open(tmpfile.path()).unwrap();
        store
            .add("Blurb", "x".repeat(6000).as_str())
            .unwrap();
    }
    let large = std::fs::metadata(tmpfile.path()).unwrap().len();
    {
        let mut store = PropertyStore::open(tmpfile.path()).unwrap();
        store.update("Blurb", "short").unwrap();
    }
    let small = std::fs::metadata(tmpfile.path()).unwrap().len();
    assert!(small < large, "rewrite did not shrink: {small} >= {large}");

    let store = PropertyStore::open(tmpfile.path()).unwrap();
    assert_eq!(store["Blurb"].as_str(), Some("short"));
}

#[test]
fn test_committed_empty_set_loads_empty() {
    let tmpfile = create_tempfile();
    {
        // Commit an empty image so the file has a valid header but no set.
        let container = FileContainer::new();
        let mut root = container
            .open_root(tmpfile.path(), AccessMode::ReadWriteExclusive)
            .unwrap();
        let mut set = root.create_property_set(USER_DEFINED_PROPERTIES).unwrap();
        set.commit().unwrap();
    }
    let store = PropertyStore::open(tmpfile.path()).unwrap();
    assert!(store.is_empty());
}
