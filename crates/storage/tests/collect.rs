#![forbid(unsafe_code)]

use nr_core::{Document, ItemId, ItemKind};
use nr_storage::{DocumentSource, MemoryDocuments, RevisionConfig, SqliteStore, StoreError};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("nr_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn item(id: &str) -> ItemId {
    ItemId::try_new(id).expect("item id")
}

fn edited(document: &Document, body: &str, at_ms: i64) -> Document {
    Document {
        body: body.to_string(),
        updated_at_ms: at_ms,
        ..document.clone()
    }
}

fn revision_count(store: &SqliteStore, id: &str) -> usize {
    store
        .revisions_for_item(ItemKind::Note, &item(id))
        .expect("list revisions")
        .len()
}

#[test]
fn each_edit_followed_by_collection_adds_one_chained_revision() {
    init_tracing();
    let storage_dir = temp_dir("each_edit_followed_by_collection_adds_one_chained_revision");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let since = store.state().expect("state").revisions_enabled_since_ms;

    let mut docs = MemoryDocuments::new();
    let mut current = Document::note(item("n1"), "Diary", "day 0", since + 1);
    docs.save(current.clone());

    let report = store.collect_revisions(&docs).expect("collect");
    assert_eq!(report.scanned, 1);
    assert_eq!(report.created, 0);
    assert_eq!(revision_count(&store, "n1"), 0);

    let mut versions = Vec::new();
    for step in 1..=3_i64 {
        current = edited(&current, &format!("day {step}"), since + 1 + step * 10);
        docs.save(current.clone());
        versions.push(current.clone());

        let report = store.collect_revisions(&docs).expect("collect");
        assert_eq!(report.created, 1, "step {step}");
        assert_eq!(report.checkpoint_ms, current.updated_at_ms);
    }

    let revisions = store
        .revisions_for_item(ItemKind::Note, &item("n1"))
        .expect("list revisions");
    assert_eq!(revisions.len(), 3);
    assert!(revisions[0].is_root());
    for pair in revisions.windows(2) {
        assert_eq!(pair[1].parent_id.as_deref(), Some(pair[0].id.as_str()));
    }
    for (index, version) in versions.iter().enumerate() {
        assert_eq!(
            store.revision_note(&revisions, index).expect("reconstruct"),
            version.state()
        );
        assert_eq!(revisions[index].item_updated_at_ms, version.updated_at_ms);
    }
}

#[test]
fn collection_is_idempotent_over_overlapping_windows() {
    let storage_dir = temp_dir("collection_is_idempotent_over_overlapping_windows");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let since = store.state().expect("state").revisions_enabled_since_ms;

    let mut docs = MemoryDocuments::new();
    let doc = Document::note(item("n1"), "T", "draft", since + 1);
    docs.save(edited(&doc, "final", since + 50));

    let first = store.collect_revisions(&docs).expect("first pass");
    assert_eq!(first.created, 1);
    let second = store.collect_revisions(&docs).expect("second pass");
    assert_eq!(second.scanned, 1);
    assert_eq!(second.created, 0);
    assert_eq!(second.checkpoint_ms, since + 50);
    assert_eq!(revision_count(&store, "n1"), 1);
}

#[test]
fn unchanged_content_produces_no_revision() {
    let storage_dir = temp_dir("unchanged_content_produces_no_revision");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let since = store.state().expect("state").revisions_enabled_since_ms;

    let mut docs = MemoryDocuments::new();
    let doc = Document::note(item("n1"), "T", "body", since + 1);
    docs.save(edited(&doc, "body v2", since + 10));
    store.collect_revisions(&docs).expect("collect");

    // Touched without a content change.
    docs.save(edited(&doc, "body v2", since + 20));
    let report = store.collect_revisions(&docs).expect("collect");
    assert_eq!(report.created, 0);
    assert_eq!(report.checkpoint_ms, since + 20);
    assert_eq!(revision_count(&store, "n1"), 1);
}

#[test]
fn pre_existing_document_gets_one_revision_on_first_overwrite() {
    let storage_dir = temp_dir("pre_existing_document_gets_one_revision_on_first_overwrite");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let since = store.state().expect("state").revisions_enabled_since_ms;

    let mut docs = MemoryDocuments::new();
    let original = Document::note(item("old"), "Old note", "written long ago", 1_000);
    let replaced = docs.save(original.clone());
    assert!(replaced.is_none());
    assert!(
        store
            .on_document_saved(replaced.as_ref(), &original)
            .expect("creation hook")
            .is_none()
    );
    assert_eq!(revision_count(&store, "old"), 0);

    let first_edit = edited(&original, "edited once", since + 10);
    let replaced = docs.save(first_edit.clone());
    let revision = store
        .on_document_saved(replaced.as_ref(), &first_edit)
        .expect("first overwrite hook")
        .expect("revision of the overwritten content");
    assert!(revision.is_root());
    assert_eq!(revision.item_updated_at_ms, 1_000);
    assert_eq!(revision_count(&store, "old"), 1);

    let second_edit = edited(&first_edit, "edited twice", since + 20);
    let replaced = docs.save(second_edit.clone());
    assert!(
        store
            .on_document_saved(replaced.as_ref(), &second_edit)
            .expect("second overwrite hook")
            .is_none()
    );
    assert_eq!(revision_count(&store, "old"), 1);

    let report = store.collect_revisions(&docs).expect("collect");
    assert_eq!(report.created, 1);
    let revisions = store
        .revisions_for_item(ItemKind::Note, &item("old"))
        .expect("list revisions");
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[1].parent_id.as_deref(), Some(revisions[0].id.as_str()));
    assert_eq!(
        store.revision_note(&revisions, 0).expect("r1"),
        original.state()
    );
    assert_eq!(
        store.revision_note(&revisions, 1).expect("r2"),
        second_edit.state()
    );
}

#[test]
fn untouched_pre_existing_document_is_left_to_the_overwrite_hook() {
    let storage_dir = temp_dir("untouched_pre_existing_document_is_left_to_the_overwrite_hook");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let state = store.state().expect("state");
    assert_eq!(state.collected_until_ms, state.revisions_enabled_since_ms);

    let mut docs = MemoryDocuments::new();
    let original = Document::note(item("old"), "Old", "untouched", 1_000);
    docs.save(original.clone());

    let report = store.collect_revisions(&docs).expect("collect");
    assert_eq!(report.created, 0);
    assert_eq!(revision_count(&store, "old"), 0);
    assert!(
        store
            .collect_item(&docs, ItemKind::Note, &item("old"))
            .expect("collect item")
            .is_none()
    );
    assert_eq!(revision_count(&store, "old"), 0);

    let overwrite = edited(&original, "finally edited", state.revisions_enabled_since_ms + 5);
    let replaced = docs.save(overwrite.clone());
    let revision = store
        .on_document_saved(replaced.as_ref(), &overwrite)
        .expect("overwrite hook")
        .expect("first revision holds the pre-overwrite content");
    let revisions = store
        .revisions_for_item(ItemKind::Note, &item("old"))
        .expect("list revisions");
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].id, revision.id);
    assert_eq!(
        store.revision_note(&revisions, 0).expect("reconstruct"),
        original.state()
    );
}

#[test]
fn save_hook_ignores_documents_created_while_enabled() {
    let storage_dir = temp_dir("save_hook_ignores_documents_created_while_enabled");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let since = store.state().expect("state").revisions_enabled_since_ms;

    let before = Document::note(item("new"), "T", "v1", since + 1);
    let after = edited(&before, "v2", since + 2);
    assert!(
        store
            .on_document_saved(Some(&before), &after)
            .expect("hook")
            .is_none()
    );

    let pre_existing = Document::note(item("old"), "T", "same", 1_000);
    let touched = edited(&pre_existing, "same", 2_000);
    assert!(
        store
            .on_document_saved(Some(&pre_existing), &touched)
            .expect("hook")
            .is_none()
    );
    assert_eq!(revision_count(&store, "new"), 0);
    assert_eq!(revision_count(&store, "old"), 0);
}

#[test]
fn save_hook_rejects_mismatched_versions() {
    let storage_dir = temp_dir("save_hook_rejects_mismatched_versions");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");

    let before = Document::note(item("a"), "T", "one", 1_000);
    let after = Document::note(item("b"), "T", "two", 2_000);
    let err = store
        .on_document_saved(Some(&before), &after)
        .expect_err("mismatched ids must fail");
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[test]
fn deleting_a_document_without_revisions_keeps_its_last_state() {
    let storage_dir = temp_dir("deleting_a_document_without_revisions_keeps_its_last_state");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let since = store.state().expect("state").revisions_enabled_since_ms;

    let mut docs = MemoryDocuments::new();
    let doc = Document::note(item("gone"), "Scratch", "about to vanish", since + 1);
    docs.save(doc.clone());

    let last = docs
        .delete(ItemKind::Note, &item("gone"))
        .expect("document existed");
    let revision = store
        .on_document_deleted(&last)
        .expect("delete hook")
        .expect("safety revision");
    assert!(revision.is_root());

    let revisions = store
        .revisions_for_item(ItemKind::Note, &item("gone"))
        .expect("list revisions");
    assert_eq!(revisions.len(), 1);
    assert_eq!(
        store.revision_note(&revisions, 0).expect("reconstruct"),
        doc.state()
    );

    // A second deletion report for the same item adds nothing.
    assert!(
        store
            .on_document_deleted(&last)
            .expect("delete hook")
            .is_none()
    );
    assert_eq!(revision_count(&store, "gone"), 1);
}

#[test]
fn disabled_config_turns_collection_into_a_no_op() {
    let storage_dir = temp_dir("disabled_config_turns_collection_into_a_no_op");
    let config = RevisionConfig {
        enabled: false,
        ..RevisionConfig::default()
    };
    let mut store = SqliteStore::open_with_config(&storage_dir, config).expect("open store");

    let mut docs = MemoryDocuments::new();
    let original = Document::note(item("n1"), "T", "v1", 1_000);
    docs.save(edited(&original, "v2", 2_000));

    let report = store.collect_revisions(&docs).expect("collect");
    assert_eq!(report.scanned, 0);
    assert_eq!(report.created, 0);
    assert_eq!(
        report.checkpoint_ms,
        store.state().expect("state").revisions_enabled_since_ms
    );

    let after = edited(&original, "v3", 3_000);
    assert!(
        store
            .on_document_saved(Some(&original), &after)
            .expect("save hook")
            .is_none()
    );
    assert!(
        store
            .on_document_deleted(&after)
            .expect("delete hook")
            .is_none()
    );
    assert!(
        store
            .collect_item(&docs, ItemKind::Note, &item("n1"))
            .expect("collect item")
            .is_none()
    );
    assert_eq!(revision_count(&store, "n1"), 0);
}

#[test]
fn minimum_interval_defers_rapid_edits() {
    let storage_dir = temp_dir("minimum_interval_defers_rapid_edits");
    let config = RevisionConfig {
        min_revision_interval_ms: 1_000,
        ..RevisionConfig::default()
    };
    let mut store = SqliteStore::open_with_config(&storage_dir, config).expect("open store");
    let since = store.state().expect("state").revisions_enabled_since_ms;

    let mut docs = MemoryDocuments::new();
    let doc = Document::note(item("n1"), "T", "v1", since + 10);
    docs.save(edited(&doc, "v2", since + 20));
    let report = store.collect_revisions(&docs).expect("first pass");
    assert_eq!(report.created, 1);

    docs.save(edited(&doc, "v3", since + 500));
    let report = store.collect_revisions(&docs).expect("deferred pass");
    assert_eq!(report.created, 0);
    assert_eq!(report.deferred, 1);
    assert!(report.checkpoint_ms <= since + 500);
    assert_eq!(revision_count(&store, "n1"), 1);

    let latest = edited(&doc, "v4", since + 1_100);
    docs.save(latest.clone());
    let report = store.collect_revisions(&docs).expect("late pass");
    assert_eq!(report.created, 1);
    assert_eq!(report.deferred, 0);

    let revisions = store
        .revisions_for_item(ItemKind::Note, &item("n1"))
        .expect("list revisions");
    assert_eq!(revisions.len(), 2);
    assert_eq!(
        store.revision_note(&revisions, 1).expect("reconstruct"),
        latest.state()
    );
}

#[test]
fn collect_item_captures_one_document_on_demand() {
    let storage_dir = temp_dir("collect_item_captures_one_document_on_demand");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let since = store.state().expect("state").revisions_enabled_since_ms;

    let mut docs = MemoryDocuments::new();
    let doc = Document::note(item("n1"), "T", "v1", since + 1);
    docs.save(edited(&doc, "v2", since + 2));

    let revision = store
        .collect_item(&docs, ItemKind::Note, &item("n1"))
        .expect("collect item")
        .expect("revision created");
    assert_eq!(revision.item_updated_at_ms, since + 2);
    assert!(
        store
            .collect_item(&docs, ItemKind::Note, &item("n1"))
            .expect("collect item again")
            .is_none()
    );

    let err = store
        .collect_item(&docs, ItemKind::Note, &item("missing"))
        .expect_err("unknown document");
    assert!(matches!(err, StoreError::UnknownId));

    // The periodic pass finds nothing left to do.
    assert_eq!(store.collect_revisions(&docs).expect("collect").created, 0);
}

#[test]
fn memory_source_lists_documents_by_update_time() {
    let mut docs = MemoryDocuments::new();
    docs.save(Document::note(item("b"), "B", "", 300));
    docs.save(Document::note(item("a"), "A", "", 100));
    docs.save(Document::note(item("c"), "C", "", 300));

    let listed = docs
        .documents_updated_since(ItemKind::Note, 300)
        .expect("list");
    assert_eq!(
        listed.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
        vec!["b", "c"]
    );
    assert!(
        docs.document(ItemKind::Note, &item("a"))
            .expect("lookup")
            .is_some()
    );
    assert_eq!(docs.len(), 3);
}
