use std::sync::Arc;

use ingestion::{DeterministicEmbedder, IndexBuildError, IndexBuilder};
use storage::{IndexStore, LocalObjectStore, ObjectStore};
use tempfile::tempdir;

async fn seeded_store(root: &std::path::Path) -> Arc<dyn ObjectStore> {
    let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(root));
    for (key, body) in [
        ("datasets/fruit/apple.txt", "Apples are red fruit."),
        ("datasets/fruit/banana.txt", "Bananas are yellow fruit."),
        ("datasets/notes.txt", "   "),
        ("elsewhere/ignored.txt", "Outside the prefix."),
    ] {
        store.put("docs", key, body.as_bytes().to_vec()).await.unwrap();
    }
    store
}

#[tokio::test]
async fn build_from_store_publishes_a_loadable_snapshot() {
    let dir = tempdir().unwrap();
    let objects = seeded_store(dir.path()).await;
    let index_store = Arc::new(IndexStore::new(Arc::clone(&objects)));
    let builder = IndexBuilder::new(Arc::new(DeterministicEmbedder::new(16)), Arc::clone(&index_store));

    let summary = builder.build_from_store("docs", "datasets/").await.unwrap();
    assert_eq!(summary.document_count, 2);

    let reader = IndexStore::new(objects);
    assert_eq!(reader.current("docs").await.unwrap(), summary.version);
    let snapshot = reader.load("docs", &summary.version).await.unwrap();
    assert_eq!(snapshot.key_prefix(), "datasets/");
    assert_eq!(
        snapshot.metadata().get(0).unwrap().doc_key,
        "datasets/fruit/apple.txt"
    );
    assert_eq!(snapshot.index().dimension(), 16);
}

#[tokio::test]
async fn rebuild_does_not_index_previous_snapshots() {
    let dir = tempdir().unwrap();
    let objects = seeded_store(dir.path()).await;
    let index_store = Arc::new(IndexStore::new(Arc::clone(&objects)));
    let builder = IndexBuilder::new(Arc::new(DeterministicEmbedder::new(4)), index_store);

    builder.build_from_store("docs", "").await.unwrap();
    let second = builder.build_from_store("docs", "").await.unwrap();

    // apple, banana, ignored; the blank note and _indexes/ objects are skipped.
    assert_eq!(second.document_count, 3);
}

#[tokio::test]
async fn empty_prefix_fails_without_publishing() {
    let dir = tempdir().unwrap();
    let objects = seeded_store(dir.path()).await;
    let index_store = Arc::new(IndexStore::new(Arc::clone(&objects)));
    let builder = IndexBuilder::new(Arc::new(DeterministicEmbedder::new(4)), Arc::clone(&index_store));

    let err = builder.build_from_store("docs", "missing/").await.unwrap_err();
    assert!(matches!(err, IndexBuildError::NoDocuments { .. }));
    assert!(index_store.current("docs").await.is_err());
}

#[tokio::test]
async fn invalid_utf8_document_fails_the_build() {
    let dir = tempdir().unwrap();
    let objects = seeded_store(dir.path()).await;
    objects
        .put("docs", "datasets/binary.txt", vec![0xc3, 0x28])
        .await
        .unwrap();
    let builder = IndexBuilder::new(
        Arc::new(DeterministicEmbedder::new(4)),
        Arc::new(IndexStore::new(objects)),
    );

    let err = builder.build_from_store("docs", "datasets/").await.unwrap_err();
    assert_eq!(err.failed_doc_key(), Some("datasets/binary.txt"));
}
