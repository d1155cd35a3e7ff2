//! End-to-end tests for process/ask with in-process fakes for the embedding
//! service and the language model.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use doc_chat::config::{Config, ReprocessPolicy};
use doc_chat::embedding::Embedder;
use doc_chat::extract::{ExtractError, FileExtractor};
use doc_chat::llm::{LanguageModel, Prompt, PromptRole};
use doc_chat::models::{Role, Turn, UploadedFile};
use doc_chat::{Error, FileOutcome, Pipeline, Session};

const VOCAB: &[&str] = &["paris", "capital", "france", "rust", "ownership", "deadline", "friday"];

/// Bag-of-words over a tiny vocabulary plus a constant bias component.
#[derive(Default)]
struct KeywordEmbedder {
    fail: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keywords"
    }
    fn dims(&self) -> usize {
        VOCAB.len() + 1
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).collect();
    let mut v: Vec<f32> = VOCAB
        .iter()
        .map(|w| words.iter().filter(|x| *x == w).count() as f32)
        .collect();
    v.push(1.0);
    v
}

/// Records every prompt and answers from the last context message.
#[derive(Default)]
struct RecordingModel {
    prompts: Mutex<Vec<Prompt>>,
    fail: AtomicBool,
}

impl RecordingModel {
    fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn model_name(&self) -> &str {
        "recording"
    }
    async fn complete(&self, prompt: &Prompt, _temperature: f32) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("model overloaded");
        }
        let last = prompt.messages.last().map(|m| m.content.as_str()).unwrap_or("");
        if last.contains("Paris") {
            Ok("The capital of France is Paris.".to_string())
        } else {
            Ok("I don't know.".to_string())
        }
    }
}

struct Harness {
    pipeline: Pipeline,
    embedder: Arc<KeywordEmbedder>,
    model: Arc<RecordingModel>,
    session: Session,
}

fn harness(config: Config) -> Harness {
    let embedder = Arc::new(KeywordEmbedder::default());
    let model = Arc::new(RecordingModel::default());
    let pipeline = Pipeline::new(
        &config,
        Box::new(FileExtractor::from_config(&config.extract)),
        embedder.clone(),
        model.clone(),
    );
    Harness {
        pipeline,
        embedder,
        model,
        session: Session::new().unwrap(),
    }
}

const PARIS: &str = "Paris is the capital of France.";

fn paris_file() -> UploadedFile {
    UploadedFile::new("france.txt", PARIS)
}

fn rust_file() -> UploadedFile {
    UploadedFile::new("rust.txt", "Rust ownership rules prevent data races.")
}

#[tokio::test]
async fn single_small_file_answers_from_its_chunk() {
    let mut h = harness(Config::default());

    let report = h.pipeline.process(&mut h.session, &[paris_file()]).await.unwrap();
    assert_eq!(report.chunks, 1);
    assert!(h.session.is_ready());
    assert_eq!(h.session.index().unwrap().len(), 1);

    let answer = h
        .pipeline
        .ask(&mut h.session, "What is the capital of France?")
        .await
        .unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].chunk.text, PARIS);
    assert!(answer.text.contains("Paris"));

    let prompts = h.model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].messages.last().unwrap().content.contains(PARIS));
}

#[tokio::test]
async fn zero_files_is_an_empty_corpus() {
    let mut h = harness(Config::default());

    let err = h.pipeline.process(&mut h.session, &[]).await.unwrap_err();
    assert!(matches!(err, Error::EmptyCorpus { .. }));
    assert!(!h.session.is_ready());
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn asking_before_processing_is_not_ready() {
    let mut h = harness(Config::default());

    let err = h.pipeline.ask(&mut h.session, "anything?").await.unwrap_err();
    assert!(matches!(err, Error::NotReady));
    assert!(h.model.prompts().is_empty());
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert!(h.session.memory().is_empty());
}

#[tokio::test]
async fn undecodable_file_is_skipped_not_fatal() {
    let mut config = Config::default();
    config.extract.detect_encoding = false;
    let mut h = harness(config);

    let bad = UploadedFile::new("broken.txt", vec![0x66, 0xC3, 0x28, 0xA0, 0xA1]);
    let report = h
        .pipeline
        .process(&mut h.session, &[bad, paris_file()])
        .await
        .unwrap();

    assert_eq!(report.chunks, 1);
    assert_eq!(report.outcomes.len(), 2);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].file(), "broken.txt");
    match failures[0] {
        FileOutcome::Failed { error, .. } => {
            assert!(matches!(error, Error::Extraction { file, .. } if file == "broken.txt"));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let index = h.session.index().unwrap();
    assert_eq!(index.len(), 1);
}

#[tokio::test]
async fn undecodable_file_is_rejected_with_detection_on() {
    let mut h = harness(Config::default());

    // UTF-16LE BOM followed by half a code unit.
    let bad = UploadedFile::new("truncated.txt", vec![0xFF, 0xFE, 0x41]);
    let report = h
        .pipeline
        .process(&mut h.session, &[bad, paris_file()])
        .await
        .unwrap();

    assert_eq!(report.chunks, 1);
    match report.failures().next() {
        Some(FileOutcome::Failed { file, error }) => {
            assert_eq!(file, "truncated.txt");
            assert!(matches!(
                error,
                Error::Extraction {
                    source: ExtractError::Decode { encoding: "UTF-16LE" },
                    ..
                }
            ));
        }
        other => panic!("expected one failure, got {:?}", other),
    };
}

#[tokio::test]
async fn all_files_failing_reports_each_error() {
    let mut h = harness(Config::default());
    let files = [
        UploadedFile::new("a.docx", b"PK".to_vec()),
        UploadedFile::new("b.pdf", b"nope".to_vec()),
    ];

    let err = h.pipeline.process(&mut h.session, &files).await.unwrap_err();
    let outcomes = match err {
        Error::EmptyCorpus { outcomes } => outcomes,
        other => panic!("expected empty corpus, got {:?}", other),
    };

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].file(), "a.docx");
    assert!(matches!(
        &outcomes[0],
        FileOutcome::Failed {
            error: Error::Extraction {
                source: ExtractError::UnsupportedFormat(_),
                ..
            },
            ..
        }
    ));
    assert_eq!(outcomes[1].file(), "b.pdf");
    assert!(matches!(
        &outcomes[1],
        FileOutcome::Failed {
            error: Error::Extraction {
                source: ExtractError::Pdf(_),
                ..
            },
            ..
        }
    ));
    assert!(!h.session.is_ready());
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn zero_files_carry_no_outcomes() {
    let mut h = harness(Config::default());
    let err = h.pipeline.process(&mut h.session, &[]).await.unwrap_err();
    assert!(matches!(err, Error::EmptyCorpus { outcomes } if outcomes.is_empty()));
}

#[tokio::test]
async fn follow_up_prompt_carries_prior_turns() {
    let mut h = harness(Config::default());
    h.pipeline.process(&mut h.session, &[paris_file()]).await.unwrap();

    let first = h
        .pipeline
        .ask(&mut h.session, "What is the capital of France?")
        .await
        .unwrap();
    h.pipeline
        .ask(&mut h.session, "And what country is it in?")
        .await
        .unwrap();

    let prompts = h.model.prompts();
    assert_eq!(prompts.len(), 2);
    let second = &prompts[1].messages;
    assert_eq!(second.len(), 4);
    assert_eq!(second[0].role, PromptRole::System);
    assert_eq!(second[1].role, PromptRole::User);
    assert_eq!(second[1].content, "What is the capital of France?");
    assert_eq!(second[2].role, PromptRole::Assistant);
    assert_eq!(second[2].content, first.text);
    assert!(second[3].content.ends_with("Question: And what country is it in?"));

    assert_eq!(h.session.memory().len(), 4);
    assert_eq!(h.session.transcript().len(), 4);
}

#[tokio::test]
async fn unsupported_format_is_reported() {
    let mut h = harness(Config::default());
    let docx = UploadedFile::new("report.docx", b"PK\x03\x04".to_vec());

    let report = h
        .pipeline
        .process(&mut h.session, &[docx, rust_file()])
        .await
        .unwrap();
    assert_eq!(report.failures().count(), 1);
    assert_eq!(report.chunks, 1);
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_index() {
    let mut h = harness(Config::default());
    h.pipeline.process(&mut h.session, &[paris_file()]).await.unwrap();

    let err = h.pipeline.process(&mut h.session, &[]).await.unwrap_err();
    assert!(matches!(err, Error::EmptyCorpus { .. }));

    h.embedder.fail.store(true, Ordering::SeqCst);
    let err = h
        .pipeline
        .process(&mut h.session, &[rust_file()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
    h.embedder.fail.store(false, Ordering::SeqCst);

    assert!(h.session.is_ready());
    let answer = h
        .pipeline
        .ask(&mut h.session, "capital of France?")
        .await
        .unwrap();
    assert_eq!(answer.sources[0].chunk.text, PARIS);
}

#[tokio::test]
async fn rebuild_replaces_the_index() {
    let mut h = harness(Config::default());
    h.pipeline.process(&mut h.session, &[paris_file()]).await.unwrap();
    h.pipeline.process(&mut h.session, &[rust_file()]).await.unwrap();

    let answer = h.pipeline.ask(&mut h.session, "capital?").await.unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].chunk.source.as_deref(), Some("rust.txt"));
}

#[tokio::test]
async fn retrieval_ranks_by_similarity() {
    let mut config = Config::default();
    config.retrieval.top_k = 2;
    let mut h = harness(config);
    h.pipeline
        .process(&mut h.session, &[rust_file(), paris_file()])
        .await
        .unwrap();

    let answer = h
        .pipeline
        .ask(&mut h.session, "What is the capital of France?")
        .await
        .unwrap();
    assert_eq!(answer.sources.len(), 2);
    assert_eq!(answer.sources[0].chunk.source.as_deref(), Some("france.txt"));
    assert!(answer.sources[0].score > answer.sources[1].score);
}

#[tokio::test]
async fn reprocess_resets_memory_but_keeps_transcript_by_default() {
    let mut h = harness(Config::default());
    h.pipeline.process(&mut h.session, &[paris_file()]).await.unwrap();
    h.pipeline.ask(&mut h.session, "capital?").await.unwrap();

    h.pipeline.process(&mut h.session, &[rust_file()]).await.unwrap();
    assert!(h.session.memory().is_empty());
    assert_eq!(h.session.transcript().len(), 2);
    assert_eq!(h.session.transcript()[0], Turn::user("capital?"));

    h.pipeline.ask(&mut h.session, "ownership?").await.unwrap();
    let prompts = h.model.prompts();
    assert_eq!(prompts[1].messages.len(), 2);
    assert_eq!(prompts[1].messages[0].role, PromptRole::System);
    assert_eq!(h.session.transcript().len(), 4);
}

#[tokio::test]
async fn reprocess_can_retain_conversation() {
    let mut config = Config::default();
    config.session.on_reprocess = ReprocessPolicy::Retain;
    let mut h = harness(config);
    h.pipeline.process(&mut h.session, &[paris_file()]).await.unwrap();
    h.pipeline.ask(&mut h.session, "capital?").await.unwrap();

    h.pipeline.process(&mut h.session, &[rust_file()]).await.unwrap();
    assert_eq!(h.session.memory().len(), 2);

    h.pipeline.ask(&mut h.session, "ownership?").await.unwrap();
    let prompts = h.model.prompts();
    assert_eq!(prompts[1].messages[1].content, "capital?");
}

#[tokio::test]
async fn reprocess_can_clear_conversation() {
    let mut config = Config::default();
    config.session.on_reprocess = ReprocessPolicy::Clear;
    let mut h = harness(config);
    h.pipeline.process(&mut h.session, &[paris_file()]).await.unwrap();
    h.pipeline.ask(&mut h.session, "capital?").await.unwrap();

    h.pipeline.process(&mut h.session, &[rust_file()]).await.unwrap();
    assert!(h.session.memory().is_empty());
    assert!(h.session.transcript().is_empty());
}

#[tokio::test]
async fn failed_rebuild_never_clears_conversation() {
    let mut config = Config::default();
    config.session.on_reprocess = ReprocessPolicy::Clear;
    let mut h = harness(config);
    h.pipeline.process(&mut h.session, &[paris_file()]).await.unwrap();
    h.pipeline.ask(&mut h.session, "capital?").await.unwrap();

    assert!(h.pipeline.process(&mut h.session, &[]).await.is_err());
    assert_eq!(h.session.memory().len(), 2);
}

#[tokio::test]
async fn not_ready_adds_visible_notice_only() {
    let mut h = harness(Config::default());
    h.pipeline.ask(&mut h.session, "hello?").await.unwrap_err();

    let transcript = h.session.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0], Turn::user("hello?"));
    assert_eq!(transcript[1].role, Role::Assistant);
    assert!(transcript[1].content.contains("upload and process documents"));
    assert!(h.session.memory().is_empty());
}

#[tokio::test]
async fn error_notices_can_be_disabled() {
    let mut config = Config::default();
    config.session.error_notices = false;
    let mut h = harness(config);
    h.pipeline.ask(&mut h.session, "hello?").await.unwrap_err();
    assert!(h.session.transcript().is_empty());
}

#[tokio::test]
async fn model_failure_leaves_memory_untouched() {
    let mut h = harness(Config::default());
    h.pipeline.process(&mut h.session, &[paris_file()]).await.unwrap();
    h.model.fail.store(true, Ordering::SeqCst);

    let err = h.pipeline.ask(&mut h.session, "capital?").await.unwrap_err();
    assert!(matches!(err, Error::LanguageModel(_)));
    assert!(h.session.memory().is_empty());
    assert_eq!(h.session.transcript().len(), 2);
    assert!(h.session.transcript()[1].content.contains("model overloaded"));
}

#[tokio::test]
async fn embedding_failure_on_question_leaves_memory_untouched() {
    let mut h = harness(Config::default());
    h.pipeline.process(&mut h.session, &[paris_file()]).await.unwrap();
    h.embedder.fail.store(true, Ordering::SeqCst);

    let err = h.pipeline.ask(&mut h.session, "capital?").await.unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
    assert!(h.model.prompts().is_empty());
    assert!(h.session.memory().is_empty());
}

#[tokio::test]
async fn long_document_is_chunked_with_overlap() {
    let mut config = Config::default();
    config.chunking.chunk_size = 60;
    config.chunking.overlap = 10;
    let mut h = harness(config);

    let text = "Rust ownership keeps memory safe. ".repeat(10);
    let file = UploadedFile::new("long.txt", text.clone());
    let report = h.pipeline.process(&mut h.session, &[file]).await.unwrap();
    assert!(report.chunks > 1);

    let chunks = h.pipeline.chunk_file(&h.session, &UploadedFile::new("long.txt", text)).unwrap();
    assert_eq!(chunks.len(), report.chunks);
    assert!(chunks.iter().all(|c| c.char_len() <= 60));
    assert!(chunks.iter().enumerate().all(|(i, c)| c.index == i));
}
