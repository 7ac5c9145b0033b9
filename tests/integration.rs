//! Integration tests for docqa

use async_trait::async_trait;
use docqa::{
    cache::{CacheBackend, InMemoryCache},
    embed::{Embedder, EmbeddingMode, MockEmbedder},
    generate::{AnswerGenerator, PlaceholderGenerator},
    job::JobState,
    pipeline::PipelineBuilder,
    store::{DocumentStore, InMemoryDocumentStore},
    Availability, Error, ErrorKind, PipelineConfig, ProcessingMode, ProviderErrorKind, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Maps every text to the same unit vector
struct IdenticalEmbedder;

#[async_trait]
impl Embedder for IdenticalEmbedder {
    async fn embed(&self, _text: &str, _mode: EmbeddingMode) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }

    fn dimension(&self) -> usize {
        4
    }

    fn model_id(&self) -> &str {
        "identical"
    }
}

/// Answers by quoting the first sentence of the context that mentions a keyword
struct QuotingGenerator;

#[async_trait]
impl AnswerGenerator for QuotingGenerator {
    async fn generate(&self, context: &str, question: &str) -> Result<String> {
        let keyword = question
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .trim_end_matches('?');
        Ok(context
            .split(". ")
            .find(|s| s.contains(keyword))
            .unwrap_or(docqa::generate::NO_ANSWER)
            .to_string())
    }

    fn model_id(&self) -> &str {
        "quoting"
    }
}

/// Every read and write fails
struct UnreachableCache {
    calls: AtomicUsize,
}

#[async_trait]
impl CacheBackend for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Cache("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Cache("connection refused".into()))
    }
}

/// Fails the first `failures` calls with a network error
struct FlakyEmbedder {
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, _text: &str, _mode: EmbeddingMode) -> Result<Vec<f32>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            Err(Error::provider(ProviderErrorKind::Network, "connection reset"))
        } else {
            Ok(vec![0.0, 1.0])
        }
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_id(&self) -> &str {
        "flaky"
    }
}

// ============ End-to-End Tests ============

#[tokio::test]
async fn test_end_to_end_single_chunk_answer() {
    let pipeline = PipelineBuilder::new()
        .embedder(IdenticalEmbedder)
        .generator(QuotingGenerator)
        .without_queue()
        .build()
        .expect("Failed to build pipeline");

    let ingestion = pipeline
        .ingest("colors.txt", "The sky is blue. Grass is green.")
        .await
        .expect("Failed to ingest");
    assert_eq!(ingestion.mode, ProcessingMode::Completed);

    let result = pipeline
        .answer(ingestion.document_id, "What color is the sky?")
        .await
        .expect("Query failed");

    assert_eq!(result.answer, "The sky is blue");
    assert_eq!(result.relevant_chunks.len(), 1);
    assert!((result.relevant_chunks[0].score - 1.0).abs() < 1e-6);
    assert_eq!(
        result.relevant_chunks[0].text,
        "The sky is blue. Grass is green...."
    );
}

#[tokio::test]
async fn test_ranking_prefers_relevant_chunk() {
    let mut config = PipelineConfig::default();
    config.chunking.chunk_size = 40;
    config.retrieval.top_k = 1;

    let pipeline = PipelineBuilder::new()
        .embedder(MockEmbedder::new(64))
        .generator(PlaceholderGenerator)
        .config(config)
        .without_queue()
        .build()
        .expect("Failed to build pipeline");

    let first = "a".repeat(40);
    let second = "b".repeat(40);
    let id = pipeline
        .ingest("ab.txt", &format!("{first}{second}"))
        .await
        .expect("Failed to ingest")
        .document_id;

    // the mock embeds identical text to identical vectors
    let chunks = pipeline.retrieve(id, &second).await.expect("Retrieve failed");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk.content, second);
    assert!((chunks[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_unconfigured_providers_answer_with_placeholder() {
    let pipeline = PipelineBuilder::from_config(PipelineConfig::default())
        .expect("Failed to configure")
        .without_queue()
        .build()
        .expect("Failed to build pipeline");

    let id = pipeline
        .ingest("notes.txt", "Placeholder providers keep the pipeline usable.")
        .await
        .expect("Failed to ingest")
        .document_id;
    let answer = pipeline.ask(id, "Does it work?").await.expect("Query failed");

    assert!(answer.result.answer.starts_with("[placeholder answer]"));
    assert_eq!(pipeline.availability().generator, Availability::Fallback);
}

// ============ Cache Tests ============

#[tokio::test]
async fn test_failing_cache_does_not_break_answers() {
    let cache = Arc::new(UnreachableCache {
        calls: AtomicUsize::new(0),
    });
    let pipeline = PipelineBuilder::new()
        .embedder(IdenticalEmbedder)
        .generator(QuotingGenerator)
        .cache_backend(cache.clone())
        .without_queue()
        .build()
        .expect("Failed to build pipeline");

    let id = pipeline
        .ingest("colors.txt", "The sky is blue. Grass is green.")
        .await
        .expect("Failed to ingest")
        .document_id;

    for _ in 0..2 {
        let answer = pipeline
            .ask(id, "Which one is green?")
            .await
            .expect("Query failed");
        assert_eq!(answer.result.answer, "Grass is green.");
        assert!(!answer.cached);
    }
    assert_eq!(cache.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_cache_hit_matches_fresh_answer() {
    let pipeline = PipelineBuilder::new()
        .embedder(IdenticalEmbedder)
        .generator(QuotingGenerator)
        .cache_backend(Arc::new(InMemoryCache::new()))
        .without_queue()
        .build()
        .expect("Failed to build pipeline");

    let id = pipeline
        .ingest("colors.txt", "The sky is blue. Grass is green.")
        .await
        .expect("Failed to ingest")
        .document_id;

    let fresh = pipeline.ask(id, "sky").await.expect("Query failed");
    let cached = pipeline.ask(id, "sky").await.expect("Query failed");
    assert!(cached.cached);
    assert_eq!(fresh.result, cached.result);
}

// ============ Processing Tests ============

#[tokio::test]
async fn test_reprocessing_is_idempotent() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let pipeline = PipelineBuilder::new()
        .embedder(MockEmbedder::new(32))
        .store(store.clone())
        .without_queue()
        .build()
        .expect("Failed to build pipeline");

    let text = "Chunked text. ".repeat(100);
    let id = pipeline
        .ingest("long.txt", &text)
        .await
        .expect("Failed to ingest")
        .document_id;
    let before = store.get(id).await.expect("missing document");

    pipeline.reprocess(id).await.expect("Reprocess failed");
    let after = store.get(id).await.expect("missing document");

    assert_eq!(before.chunks.len(), after.chunks.len());
    for (a, b) in before.chunks.iter().zip(&after.chunks) {
        assert_eq!(a.content, b.content);
        assert_eq!(a.embedding, b.embedding);
    }
}

#[tokio::test]
async fn test_processing_error_names_document() {
    let pipeline = PipelineBuilder::new()
        .embedder(FlakyEmbedder {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        })
        .without_queue()
        .build()
        .expect("Failed to build pipeline");

    let err = pipeline
        .ingest("doomed.txt", "never embedded")
        .await
        .expect_err("processing should fail");
    assert_eq!(err.kind(), ErrorKind::ProviderTransient);

    let listed = pipeline.list().await.expect("List failed");
    assert_eq!(listed.len(), 1);
    assert!(err.to_string().contains(&listed[0].document_id.to_string()));
    assert!(!listed[0].processed);
}

#[tokio::test]
async fn test_query_before_processing_is_not_found() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let doc = store
        .create("raw.txt", "stored but never processed")
        .await
        .expect("create failed");
    let pipeline = PipelineBuilder::new()
        .embedder(MockEmbedder::new(8))
        .store(store)
        .without_queue()
        .build()
        .expect("Failed to build pipeline");

    let err = pipeline.ask(doc.id, "anything?").await.expect_err("no chunks");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ============ Queue Tests ============

#[tokio::test(start_paused = true)]
async fn test_queued_ingestion_retries_then_succeeds() {
    let mut config = PipelineConfig::default();
    config.queue.retain_completed = true;

    let embedder = Arc::new(FlakyEmbedder {
        failures: 2,
        calls: AtomicUsize::new(0),
    });
    let pipeline = PipelineBuilder::new()
        .shared_embedder(embedder.clone())
        .config(config)
        .build()
        .expect("Failed to build pipeline");

    let ingestion = pipeline
        .ingest("queued.txt", "processed in the background")
        .await
        .expect("Failed to ingest");
    assert_eq!(ingestion.mode, ProcessingMode::Queued);
    let job_id = ingestion.job_id.expect("queued job id");

    let record = loop {
        match pipeline.job(job_id) {
            Some(record) if record.state.is_final() => break record,
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    };

    assert_eq!(record.state, JobState::Succeeded);
    assert_eq!(record.attempts, 3);
    assert!(pipeline.failed_jobs().is_empty());

    let status = pipeline
        .status(ingestion.document_id)
        .await
        .expect("Status failed");
    assert!(status.processed);
    assert_eq!(status.chunk_count, 1);

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_pipeline_processes_inline() {
    let pipeline = PipelineBuilder::new()
        .embedder(MockEmbedder::new(8))
        .build()
        .expect("Failed to build pipeline");
    assert_eq!(pipeline.availability().queue, Availability::Available);

    pipeline.shutdown().await;
    let ingestion = pipeline
        .ingest("late.txt", "after shutdown")
        .await
        .expect("Failed to ingest");
    assert_eq!(ingestion.mode, ProcessingMode::Completed);
}

#[tokio::test]
async fn test_list_newest_first() {
    let pipeline = PipelineBuilder::new()
        .embedder(MockEmbedder::new(8))
        .without_queue()
        .build()
        .expect("Failed to build pipeline");

    pipeline.ingest("first.txt", "one").await.expect("ingest");
    tokio::time::sleep(Duration::from_millis(5)).await;
    pipeline.ingest("second.txt", "two").await.expect("ingest");

    let names: Vec<String> = pipeline
        .list()
        .await
        .expect("List failed")
        .into_iter()
        .map(|s| s.filename)
        .collect();
    assert_eq!(names, vec!["second.txt", "first.txt"]);
}
