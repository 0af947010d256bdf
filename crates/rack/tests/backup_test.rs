//! Backup/restore round-trips through the JSON-in-zip archive.

use std::io::Read;

use rack::prelude::*;
use rack::{BackupManifest, FieldKind, MANIFEST_MEMBER};
use tempfile::TempDir;

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            "book",
            vec![
                FieldSpec::required("title", FieldKind::Str),
                FieldSpec::required("author", FieldKind::Str),
                FieldSpec::optional("rating", FieldKind::Int, serde_json::json!(0)),
            ],
        )
        .unwrap();
    registry
        .register(
            "author",
            vec![
                FieldSpec::required("name", FieldKind::Str),
                FieldSpec::foreign("fk_books").unwrap(),
            ],
        )
        .unwrap();
    registry
}

fn seeded_db() -> (Database, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db = Database::open(temp_dir.path(), registry()).unwrap();
    db.put(
        UNIQUE,
        Entry::auto("book")
            .with("title", "The A")
            .with("author", "A.B. Cee")
            .with("rating", 1),
    )
    .unwrap();
    db.put(
        UNIQUE,
        Entry::auto("author")
            .with("name", "A.B. Cee")
            .with("fk_books", serde_json::json!(["book_0"])),
    )
    .unwrap();
    db.make_once("hot", Entry::tag_query("book: rating >= 1"))
        .unwrap();
    (db, temp_dir)
}

#[test]
fn backup_then_restore_round_trips() {
    let (db, _temp) = seeded_db();
    let before = db.to_json().unwrap();

    db.backup(Some("snap")).unwrap();
    db.wipe().unwrap();
    assert_eq!(db.keys().unwrap().count(), 0);

    db.restore(Some("snap")).unwrap();
    assert_eq!(db.to_json().unwrap(), before);

    // Keys survive verbatim: no id reassignment.
    let keys: Vec<String> = db.keys().unwrap().map(|k| k.unwrap()).collect();
    assert_eq!(keys, vec!["author_0", "book_0", "tag_hot"]);
}

#[test]
fn archive_layout_is_one_member_per_type() {
    let (db, _temp) = seeded_db();
    let path = db.backup(Some("layout")).unwrap();

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec![MANIFEST_MEMBER, "author.json", "book.json", "tag.json"]
    );

    let manifest: BackupManifest = {
        let mut member = archive.by_name(MANIFEST_MEMBER).unwrap();
        let mut raw = Vec::new();
        member.read_to_end(&mut raw).unwrap();
        serde_json::from_slice(&raw).unwrap()
    };
    assert_eq!(manifest.version, 1);
    // Registration order, tag last: drives a stable restore.
    assert_eq!(manifest.types, vec!["book", "author", "tag"]);

    let books: Vec<serde_json::Value> = {
        let mut member = archive.by_name("book.json").unwrap();
        let mut raw = Vec::new();
        member.read_to_end(&mut raw).unwrap();
        serde_json::from_slice(&raw).unwrap()
    };
    assert_eq!(books.len(), 1);
    assert_eq!(books[0]["id"], serde_json::json!(0));
    assert_eq!(books[0]["type"], serde_json::json!("book"));
}

#[test]
fn unknown_type_archives_are_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open(temp_dir.path(), registry()).unwrap();
        db.put(
            UNIQUE,
            Entry::auto("book").with("title", "A").with("author", "X"),
        )
        .unwrap();
        db.backup(Some("snap")).unwrap();
        db.close().unwrap();
    }

    // Reopen with a registry that no longer knows 'book'.
    let db = Database::open(temp_dir.path(), SchemaRegistry::new()).unwrap();
    let err = db.restore(Some("snap")).unwrap_err();
    assert!(matches!(err, RackError::Restore(_)));
    // A rejected restore leaves the store untouched.
    assert!(db.contains("book_0").unwrap());
}

#[test]
fn missing_archive_is_a_restore_error() {
    let (db, _temp) = seeded_db();
    assert!(matches!(
        db.restore(Some("nope")).unwrap_err(),
        RackError::Restore(_)
    ));
}

#[test]
fn fresh_store_restores_from_default_archive() {
    let temp_dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open(temp_dir.path(), registry()).unwrap();
        db.put(
            UNIQUE,
            Entry::auto("book").with("title", "A").with("author", "X"),
        )
        .unwrap();
        db.backup(None).unwrap();
        db.close().unwrap();
    }

    // Lose the data directory; the default archive stays behind.
    std::fs::remove_dir_all(temp_dir.path().join("kv")).unwrap();

    let db = Database::open(temp_dir.path(), registry()).unwrap();
    assert!(db.contains("book_0").unwrap());
}

#[test]
fn restored_tags_still_rerun_their_queries() {
    let (db, _temp) = seeded_db();
    db.backup(Some("snap")).unwrap();
    db.wipe().unwrap();
    db.restore(Some("snap")).unwrap();

    match db.get("tag_hot").unwrap() {
        Resolved::Many(entries) => assert_eq!(entries.len(), 1),
        other => panic!("expected entries, got {:?}", other),
    }
}
