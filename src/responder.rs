//! Retrieval-augmented answering.
//!
//! For each question the responder retrieves the top-k chunks (using the
//! question alone, history plays no part in retrieval), builds a prompt of
//! system framing + full history + retrieved context + question, and asks
//! the language model. Memory is only updated when the model answers.

use std::sync::Arc;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::retrieve;
use crate::llm::{LanguageModel, Prompt, PromptRole};
use crate::models::{Answer, Role, ScoredChunk, Turn};
use crate::session::Session;

pub struct Responder {
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    top_k: usize,
    temperature: f32,
    system_prompt: String,
}

impl Responder {
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            embedder,
            llm,
            top_k: config.retrieval.top_k,
            temperature: config.llm.temperature,
            system_prompt: config.session.system_prompt.clone(),
        }
    }

    /// Answer `question` against the session's index.
    ///
    /// Fails with [`Error::NotReady`] before touching any service when the
    /// session has no index. On any failure the session memory is left as
    /// it was.
    pub async fn answer(&self, session: &mut Session, question: &str) -> Result<Answer> {
        let index = session.index().ok_or(Error::NotReady)?;

        let sources = retrieve(index, self.embedder.as_ref(), question, self.top_k).await?;
        for hit in &sources {
            tracing::debug!(
                score = hit.score,
                source = hit.chunk.source.as_deref().unwrap_or("-"),
                chunk = hit.chunk.index,
                "retrieved chunk"
            );
        }

        let prompt = build_prompt(
            &self.system_prompt,
            session.memory().history(),
            &sources,
            question,
        );
        let text = self
            .llm
            .complete(&prompt, self.temperature)
            .await
            .map_err(Error::LanguageModel)?;
        tracing::debug!(
            model = self.llm.model_name(),
            turns = session.memory().len(),
            "answered question"
        );

        let memory = session.memory_mut();
        memory.record(Role::User, question);
        memory.record(Role::Assistant, text.clone());

        Ok(Answer { text, sources })
    }
}

/// Assemble the model prompt.
///
/// Message order: system framing, every history turn, then one user
/// message carrying the retrieved context followed by the question.
pub fn build_prompt(
    system_prompt: &str,
    history: &[Turn],
    context: &[ScoredChunk],
    question: &str,
) -> Prompt {
    let mut prompt = Prompt::default();
    prompt.push(PromptRole::System, system_prompt);

    for turn in history {
        prompt.push(turn.role.into(), turn.content.clone());
    }

    let context_text = context
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    prompt.push(
        PromptRole::User,
        format!(
            "Use the following pieces of context to answer the question at the end.\n\n\
             Context:\n{}\n\nQuestion: {}",
            context_text, question
        ),
    );
    prompt
}
