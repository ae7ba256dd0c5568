use std::sync::Arc;

use ingestion::embedding::BoxFuture;
use ingestion::{DeterministicEmbedder, Embedder, EmbeddingError, IndexBuilder};
use llm::{InferenceConfig, ScriptedGenerator};
use query::{search, RagOrchestrator, RagQueryRequest, RetrievalError, Retriever};
use ragraph_core::error::RagraphError;
use ragraph_core::model::Document;
use storage::{InMemoryObjectStore, IndexStore, LocalObjectStore, ObjectStore};
use tempfile::tempdir;

/// Counts fruit words, so similarity follows topic overlap.
struct FruitEmbedder;

impl Embedder for FruitEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbeddingError>> {
        Box::pin(async move {
            let lower = text.to_lowercase();
            let count = |word: &str| lower.matches(word).count() as f32;
            Ok(vec![count("apple"), count("banana"), 0.1])
        })
    }

    fn model_id(&self) -> &str {
        "fruit-counter"
    }
}

fn docs(texts: &[&str]) -> Vec<Document> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| Document::new(format!("datasets/{i}.txt"), *text))
        .collect()
}

fn builder(embedder: Arc<dyn Embedder>) -> (IndexBuilder, Arc<IndexStore>) {
    let objects: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
    let index_store = Arc::new(IndexStore::new(objects));
    (IndexBuilder::new(embedder, Arc::clone(&index_store)), index_store)
}

#[tokio::test]
async fn ranking_is_reproducible() {
    let embedder = Arc::new(DeterministicEmbedder::new(32));
    let (builder, _) = builder(embedder.clone());
    let texts: Vec<String> = (0..20).map(|i| format!("document number {i}")).collect();
    let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
    let snapshot = builder.build("docs", "datasets/", docs(&texts)).await.unwrap();

    let first = search(&snapshot, embedder.as_ref(), "document number 7", 5).await.unwrap();
    let second = search(&snapshot, embedder.as_ref(), "document number 7", 5).await.unwrap();
    assert_eq!(first, second);
    assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn result_count_is_min_of_k_and_n() {
    let embedder = Arc::new(DeterministicEmbedder::new(8));
    let (builder, _) = builder(embedder.clone());
    let snapshot = builder
        .build("docs", "datasets/", docs(&["a", "b", "c"]))
        .await
        .unwrap();

    for (k, expected) in [(1, 1), (3, 3), (10, 3)] {
        let hits = search(&snapshot, embedder.as_ref(), "q", k).await.unwrap();
        assert_eq!(hits.len(), expected, "k = {k}");
    }
}

#[tokio::test]
async fn apple_query_ranks_apple_document_first() {
    let (builder, index_store) = builder(Arc::new(FruitEmbedder));
    let snapshot = builder
        .build(
            "fruit",
            "datasets/",
            docs(&["I like apple pie and apple juice.", "Banana bread with banana."]),
        )
        .await
        .unwrap();
    index_store.publish(snapshot).await.unwrap();

    let generator = Arc::new(ScriptedGenerator::new(["Apple pie."]));
    let orchestrator = RagOrchestrator::new(
        Retriever::new(index_store, Arc::new(FruitEmbedder)),
        generator.clone(),
        InferenceConfig::default(),
    );
    let mut request = RagQueryRequest::new("fruit", "Tell me about apple");
    request.k = 1;

    let answer = orchestrator.answer_request(&request).await.unwrap();
    assert_eq!(answer.answer, "Apple pie.");
    assert_eq!(answer.retrieved_docs.len(), 1);
    assert_eq!(answer.retrieved_docs[&0].doc_key, "datasets/0.txt");

    let requests = generator.requests().await;
    let prompt = requests[0].conversation.last().unwrap().text();
    assert!(prompt.starts_with("Document 1 (source: datasets/0.txt):\nI like apple pie"));
    assert!(prompt.ends_with("Question: Tell me about apple\n"));
}

#[tokio::test]
async fn missing_index_is_not_found() {
    let (_, index_store) = builder(Arc::new(FruitEmbedder));
    let retriever = Retriever::new(index_store, Arc::new(FruitEmbedder));

    let err = retriever.retrieve("empty", None, "apple", 3).await.unwrap_err();
    assert!(err.is_index_not_found());
    assert_eq!(err.status_code(), 404);

    let version = storage::IndexVersion::parse("idx-1-deadbeef").unwrap();
    let err = retriever
        .retrieve("empty", Some(&version), "apple", 3)
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::Index(_)));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn readers_keep_their_snapshot_during_rebuild() {
    let dir = tempdir().unwrap();
    let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path()));
    objects
        .put("docs", "datasets/a.txt", b"apple".to_vec())
        .await
        .unwrap();
    let index_store = Arc::new(IndexStore::new(Arc::clone(&objects)));
    let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new(16));
    let builder = Arc::new(IndexBuilder::new(Arc::clone(&embedder), Arc::clone(&index_store)));

    let first = builder.build_from_store("docs", "datasets/").await.unwrap();
    objects
        .put("docs", "datasets/b.txt", b"banana".to_vec())
        .await
        .unwrap();

    let pinned = index_store.load("docs", &first.version).await.unwrap();
    let rebuild = {
        let builder = Arc::clone(&builder);
        tokio::spawn(async move { builder.build_from_store("docs", "datasets/").await })
    };

    // A fresh reader sees either the old or the new snapshot, never a partial one.
    let reader = IndexStore::new(Arc::clone(&objects));
    for _ in 0..20 {
        if let Ok(snapshot) = reader.resolve("docs", None).await {
            assert!(matches!(snapshot.document_count(), 1 | 2));
        }
        reader.clear_cache();
        tokio::task::yield_now().await;
    }

    let second = rebuild.await.unwrap().unwrap();
    assert_ne!(first.version, second.version);
    assert_eq!(second.document_count, 2);

    let hits = search(&pinned, embedder.as_ref(), "banana", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(index_store.current("docs").await.unwrap(), second.version);
}
