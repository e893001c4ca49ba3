//! End-to-end tests: ingest a small corpus from disk, then ask questions.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use lexqa_rag::store;
use lexqa_rag::{
    AskOutcome, ChunkingStrategy, MockAnswerGenerator, MockEmbeddingProvider, RagConfig, RagError,
    RagPipeline,
};
use lexqa_telemetry::SpanCapture;

const DIMS: usize = 1024;

fn udhr_pages() -> Vec<String> {
    vec![
        "Article 20. Everyone has the right to freedom of peaceful assembly and association. "
            .repeat(30),
        "Article 21. Everyone has the right to take part in the government of his country. "
            .repeat(30),
        "Article 26. Everyone has the right to education. Education shall be free. ".repeat(30),
    ]
}

fn write_corpus(dir: &Path) {
    fs::write(dir.join("udhr.txt"), udhr_pages().join("\u{c}")).unwrap();
}

fn pipeline(
    config: RagConfig,
    embedder: Arc<MockEmbeddingProvider>,
    generator: Arc<MockAnswerGenerator>,
) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .answer_generator(generator)
        .build()
        .unwrap()
}

fn default_pipeline(generator: Arc<MockAnswerGenerator>) -> RagPipeline {
    pipeline(RagConfig::default(), Arc::new(MockEmbeddingProvider::new(DIMS)), generator)
}

#[tokio::test]
async fn three_page_document_chunks_respect_size_and_overlap() {
    let source = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    let index_path = index_dir.path().join("udhr");
    write_corpus(source.path());

    let pipeline = default_pipeline(Arc::new(MockAnswerGenerator::new("unused")));
    let report = pipeline.ingest(source.path(), &index_path).await.unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.pages, 3);
    assert_eq!(report.chunks, 9);
    assert!(report.failures.is_empty());

    let index = store::load(&index_path).unwrap();
    let chunks: Vec<_> = index.entries().iter().map(|e| &e.chunk).collect();
    assert_eq!(chunks.len(), 9);

    for chunk in &chunks {
        assert!(chunk.text.chars().count() <= 1000, "chunk {} too long", chunk.id);
        assert_eq!(chunk.source_path, source.path().join("udhr.txt"));
    }

    let pages: Vec<usize> = chunks.iter().map(|c| c.page_number).collect();
    assert_eq!(pages, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);
    let starts: Vec<Option<usize>> = chunks.iter().take(3).map(|c| c.start_index).collect();
    assert_eq!(starts, vec![Some(0), Some(800), Some(1600)]);

    for pair in chunks.windows(2) {
        if pair[0].page_number != pair[1].page_number {
            continue;
        }
        let prev: Vec<char> = pair[0].text.chars().collect();
        let next: Vec<char> = pair[1].text.chars().collect();
        assert_eq!(prev[prev.len() - 200..], next[..200], "{} / {}", pair[0].id, pair[1].id);
    }
}

#[tokio::test]
async fn ask_answers_from_retrieved_passages() {
    let source = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    write_corpus(source.path());

    let generator = Arc::new(MockAnswerGenerator::new("Article 20 protects peaceful assembly."));
    let pipeline = default_pipeline(generator.clone());
    pipeline.ingest(source.path(), index_dir.path()).await.unwrap();

    let question = "Which articles protect peaceful assembly?";
    let outcome = pipeline.ask(question, index_dir.path(), Some(2)).await.unwrap();

    let AskOutcome::Answered(answer) = outcome else { panic!("expected an answer") };
    assert_eq!(answer.text, "Article 20 protects peaceful assembly.");
    assert_eq!(answer.sources.len(), 2);
    assert!(answer.sources.iter().all(|s| s.chunk.page_number == 1));
    assert!(answer.sources[0].score >= answer.sources[1].score);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(&format!("Question: {question}")));
    assert!(prompts[0].contains("freedom of peaceful assembly"));
    assert!(!prompts[0].contains("Education shall be free"));
}

#[tokio::test]
async fn unrelated_question_yields_no_relevant_documents() {
    let source = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    write_corpus(source.path());

    let generator = Arc::new(MockAnswerGenerator::new("should not be called"));
    let config = RagConfig::builder().similarity_threshold(0.2).build().unwrap();
    let pipeline = pipeline(config, Arc::new(MockEmbeddingProvider::new(DIMS)), generator.clone());
    pipeline.ingest(source.path(), index_dir.path()).await.unwrap();

    let outcome =
        pipeline.ask("photosynthesis chlorophyll sunlight", index_dir.path(), None).await.unwrap();

    assert_eq!(outcome, AskOutcome::NoRelevantDocuments);
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn asking_a_missing_index_is_index_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("never-built");
    let pipeline = default_pipeline(Arc::new(MockAnswerGenerator::new("unused")));

    let err = pipeline.ask("anything", &missing, None).await.unwrap_err();
    match err {
        RagError::IndexNotFound(path) => assert_eq!(path, missing),
        other => panic!("expected IndexNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn switching_embedding_model_is_detected() {
    let source = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    write_corpus(source.path());
    default_pipeline(Arc::new(MockAnswerGenerator::new("unused")))
        .ingest(source.path(), index_dir.path())
        .await
        .unwrap();

    let generator = Arc::new(MockAnswerGenerator::new("unused"));
    let smaller = pipeline(
        RagConfig::default(),
        Arc::new(MockEmbeddingProvider::new(DIMS / 2)),
        generator.clone(),
    );
    let err = smaller.open_index(index_dir.path()).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingMismatch { .. }), "got {err:?}");

    let renamed = pipeline(
        RagConfig::default(),
        Arc::new(MockEmbeddingProvider::new(DIMS).with_model("bag-of-words-v2")),
        generator.clone(),
    );
    let err = renamed.ask("peaceful assembly", index_dir.path(), None).await.unwrap_err();
    match err {
        RagError::EmbeddingMismatch { expected, actual } => {
            assert_eq!(expected.model, "bag-of-words");
            assert_eq!(actual.model, "bag-of-words-v2");
        }
        other => panic!("expected EmbeddingMismatch, got {other:?}"),
    }
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn generation_failure_is_reported_as_generation_error() {
    let source = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    write_corpus(source.path());

    let pipeline = default_pipeline(Arc::new(MockAnswerGenerator::failing("model overloaded")));
    pipeline.ingest(source.path(), index_dir.path()).await.unwrap();

    let err = pipeline.ask("peaceful assembly", index_dir.path(), None).await.unwrap_err();
    assert!(matches!(err, RagError::Generation { .. }));
    assert!(err.to_string().contains("model overloaded"));
}

#[tokio::test]
async fn embedding_failure_aborts_ingest_and_names_the_document() {
    let source = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    let index_path = index_dir.path().join("idx");
    write_corpus(source.path());

    let embedder = Arc::new(MockEmbeddingProvider::new(DIMS).failing("connection refused"));
    let pipeline = pipeline(RagConfig::default(), embedder, Arc::new(MockAnswerGenerator::new("x")));

    let err = pipeline.ingest(source.path(), &index_path).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding { .. }));
    assert!(err.to_string().contains("udhr.txt"), "{err}");
    assert!(!index_path.exists());
}

#[tokio::test]
async fn reingesting_replaces_the_live_index() {
    let source = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    write_corpus(source.path());

    let pipeline = default_pipeline(Arc::new(MockAnswerGenerator::new("ok")));
    let first = pipeline.ingest(source.path(), index_dir.path()).await.unwrap();
    let engine = pipeline.open_index(index_dir.path()).await.unwrap();

    fs::write(source.path().join("article3.md"), "Article 3. Everyone has the right to life.").unwrap();
    let second = pipeline.ingest(source.path(), index_dir.path()).await.unwrap();
    assert_eq!(second.chunks, first.chunks + 1);
    assert_ne!(first.version_dir, second.version_dir);

    // An engine opened before the rebuild keeps serving the old snapshot.
    assert_eq!(engine.index().len(), first.chunks);
    assert_eq!(pipeline.open_index(index_dir.path()).await.unwrap().index().len(), second.chunks);

    let versions = fs::read_dir(index_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("v-"))
        .count();
    assert_eq!(versions, 2);
}

#[tokio::test]
async fn query_engine_serves_concurrent_questions() {
    let source = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    write_corpus(source.path());

    let generator = Arc::new(MockAnswerGenerator::echo());
    let pipeline = default_pipeline(generator.clone());
    pipeline.ingest(source.path(), index_dir.path()).await.unwrap();
    let engine = pipeline.open_index(index_dir.path()).await.unwrap();

    let other = engine.clone();
    let (a, b) = tokio::join!(
        engine.ask("peaceful assembly", Some(1)),
        other.ask("education shall be free", Some(1))
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.answer().unwrap().sources[0].chunk.page_number, 1);
    assert_eq!(b.answer().unwrap().sources[0].chunk.page_number, 3);
    assert_eq!(generator.prompts().len(), 2);
}

#[tokio::test]
async fn recursive_strategy_keeps_chunks_within_size() {
    let source = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    write_corpus(source.path());

    let config = RagConfig::builder()
        .chunking_strategy(ChunkingStrategy::Recursive)
        .chunk_size(300)
        .chunk_overlap(60)
        .build()
        .unwrap();
    let pipeline = pipeline(
        config,
        Arc::new(MockEmbeddingProvider::new(DIMS)),
        Arc::new(MockAnswerGenerator::new("x")),
    );
    let report = pipeline.ingest(source.path(), index_dir.path()).await.unwrap();
    assert!(report.chunks > 9);

    let index = store::load(index_dir.path()).unwrap();
    assert!(index.entries().iter().all(|e| e.chunk.text.chars().count() <= 300));
}

#[tokio::test]
async fn pipeline_stages_are_traced() {
    let capture = SpanCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let source = tempfile::tempdir().unwrap();
    let index_dir = tempfile::tempdir().unwrap();
    write_corpus(source.path());

    let pipeline = default_pipeline(Arc::new(MockAnswerGenerator::new("Article 20.")));
    pipeline.ingest(source.path(), index_dir.path()).await.unwrap();
    pipeline.ask("peaceful assembly", index_dir.path(), None).await.unwrap();

    let ingest = capture.spans_named("rag.ingest");
    assert_eq!(ingest.len(), 1);
    assert_eq!(ingest[0].field_u64("chunks"), Some(9));

    let ask = capture.spans_named("rag.ask");
    assert_eq!(ask.len(), 1);
    assert_eq!(ask[0].field_str("outcome"), Some("answered"));

    let retrieve = capture.spans_named("rag.retrieve");
    assert_eq!(retrieve.len(), 1);
    assert_eq!(retrieve[0].parent.as_deref(), Some("rag.ask"));
    assert_eq!(retrieve[0].field_u64("k"), Some(4));

    let generate = capture.spans_named("rag.generate");
    assert_eq!(generate.len(), 1);
    assert_eq!(generate[0].field_str("backend"), Some("mock"));
}
