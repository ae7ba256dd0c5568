use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ingestion::DeterministicEmbedder;
use storage::{IndexSnapshot, IndexVersion, MetadataTable, VectorIndex};

const DIMS: usize = 256;
const MODEL_ID: &str = "embedding-default-v1";

fn build_snapshot(docs: usize, embedder: &DeterministicEmbedder) -> IndexSnapshot {
    let mut index = VectorIndex::new(DIMS).unwrap();
    let mut metadata = MetadataTable::new();
    for i in 0..docs {
        let text = format!("benchmark document {i} about fruit, markets and logistics");
        let id = metadata.push(format!("datasets/doc-{i}.txt"), text.clone());
        index.push(id, embedder.vector(&text)).unwrap();
    }
    let version = IndexVersion::derive(0, [b"bench".as_slice()]);
    IndexSnapshot::new(version, "bench", "datasets/", 0, index, metadata).unwrap()
}

fn search_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let embedder = DeterministicEmbedder::with_model(MODEL_ID, DIMS);
    let mut group = c.benchmark_group("search");

    for docs in [100usize, 1_000, 10_000] {
        let snapshot = build_snapshot(docs, &embedder);
        group.bench_with_input(BenchmarkId::new("top5", docs), &snapshot, |b, snapshot| {
            b.iter(|| {
                runtime
                    .block_on(query::search(snapshot, &embedder, "fresh fruit prices", 5))
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, search_benchmark);
criterion_main!(benches);
