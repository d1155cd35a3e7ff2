//! Ingestion and question orchestration.
//!
//! [`Pipeline`] bundles the injected capabilities (extractor, embedder,
//! language model) with their configuration and drives a [`Session`]
//! through the two user actions:
//!
//! - [`process`](Pipeline::process): extract → chunk → embed → index. Each
//!   file succeeds or fails on its own; the session's index is replaced
//!   only if the whole build succeeds.
//! - [`ask`](Pipeline::ask): retrieve → prompt → complete, then update the
//!   transcript according to the error-notice policy.

use std::sync::Arc;

use crate::chunk::split_text;
use crate::config::{ChunkingConfig, Config, SessionConfig};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{Error, Result};
use crate::extract::{Extractor, FileExtractor};
use crate::index::build_index;
use crate::llm::{create_language_model, LanguageModel};
use crate::models::{Answer, Chunk, Turn, UploadedFile};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::responder::Responder;
use crate::session::Session;

/// What happened to one file during [`Pipeline::process`].
#[derive(Debug)]
pub enum FileOutcome {
    Indexed { file: String, chunks: usize },
    Failed { file: String, error: Error },
}

impl FileOutcome {
    pub fn file(&self) -> &str {
        match self {
            FileOutcome::Indexed { file, .. } | FileOutcome::Failed { file, .. } => file,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }
}

/// Per-file results of a successful build.
#[derive(Debug)]
pub struct BuildReport {
    pub outcomes: Vec<FileOutcome>,
    /// Chunks in the new index.
    pub chunks: usize,
}

impl BuildReport {
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }
}

pub struct Pipeline {
    extractor: Box<dyn Extractor>,
    embedder: Arc<dyn Embedder>,
    responder: Responder,
    chunking: ChunkingConfig,
    batch_size: usize,
    session: SessionConfig,
    progress: Box<dyn ProgressReporter>,
}

impl Pipeline {
    /// Wire up the providers named in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let llm = create_language_model(&config.llm)?;
        let extractor = Box::new(FileExtractor::from_config(&config.extract));
        Ok(Self::new(config, extractor, embedder, llm))
    }

    pub fn new(
        config: &Config,
        extractor: Box<dyn Extractor>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            extractor,
            responder: Responder::new(config, Arc::clone(&embedder), llm),
            embedder,
            chunking: config.chunking.clone(),
            batch_size: config.embedding.batch_size,
            session: config.session.clone(),
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Extract and chunk a single file using the session's scratch space.
    pub fn chunk_file(&self, session: &Session, file: &UploadedFile) -> Result<Vec<Chunk>> {
        let text = self
            .extractor
            .extract(file, session.scratch_dir())
            .map_err(|source| Error::Extraction {
                file: file.name.clone(),
                source,
            })?;
        Ok(split_text(&text, &self.chunking, Some(&file.name)))
    }

    /// Build a new index from `files` and install it in `session`.
    ///
    /// Per-file extraction failures are logged and reported in the
    /// [`BuildReport`]; they do not stop the batch. If no chunks survive the
    /// build fails with [`Error::EmptyCorpus`], which carries the per-file
    /// outcomes instead. On any error the session is left exactly as it
    /// was, including a previously built index.
    pub async fn process(&self, session: &mut Session, files: &[UploadedFile]) -> Result<BuildReport> {
        let total = files.len() as u64;
        let mut outcomes = Vec::with_capacity(files.len());
        let mut corpus = Vec::new();

        for (i, file) in files.iter().enumerate() {
            self.progress.report(ProgressEvent::Extracting {
                file: file.name.clone(),
                n: i as u64 + 1,
                total,
            });

            match self.chunk_file(session, file) {
                Ok(chunks) => {
                    tracing::debug!(file = %file.name, chunks = chunks.len(), "chunked file");
                    outcomes.push(FileOutcome::Indexed {
                        file: file.name.clone(),
                        chunks: chunks.len(),
                    });
                    corpus.extend(chunks);
                }
                Err(error) => {
                    tracing::warn!(file = %file.name, "{}", error);
                    outcomes.push(FileOutcome::Failed {
                        file: file.name.clone(),
                        error,
                    });
                }
            }
        }

        if corpus.is_empty() {
            tracing::warn!(files = files.len(), "no usable chunks; keeping previous state");
            return Err(Error::EmptyCorpus { outcomes });
        }

        let chunks = corpus.len();
        let index = build_index(corpus, self.embedder.as_ref(), self.batch_size, self.progress.as_ref())
            .await?;
        session.install_index(Box::new(index), self.session.on_reprocess);

        tracing::info!(
            session = session.id(),
            files = files.len(),
            failed = outcomes.iter().filter(|o| o.is_failed()).count(),
            chunks,
            "index ready"
        );

        Ok(BuildReport { outcomes, chunks })
    }

    /// Answer a question and update the transcript.
    ///
    /// Success appends the question and answer to both memory and
    /// transcript. Failure never touches memory; with
    /// `session.error_notices` on, the question and an assistant notice
    /// describing the error are appended to the transcript.
    pub async fn ask(&self, session: &mut Session, question: &str) -> Result<Answer> {
        match self.responder.answer(session, question).await {
            Ok(answer) => {
                session.push_transcript(Turn::user(question));
                session.push_transcript(Turn::assistant(answer.text.clone()));
                Ok(answer)
            }
            Err(error) => {
                tracing::warn!(session = session.id(), "question failed: {}", error);
                if self.session.error_notices {
                    session.push_transcript(Turn::user(question));
                    session.push_transcript(Turn::assistant(notice_for(&error)));
                }
                Err(error)
            }
        }
    }
}

fn notice_for(error: &Error) -> String {
    match error {
        Error::NotReady => "Please upload and process documents first!".to_string(),
        other => format!("Error: {}", other),
    }
}
