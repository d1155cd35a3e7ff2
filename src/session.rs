//! Per-user session state.
//!
//! A [`Session`] owns everything one conversation needs: the responder
//! state (which holds the vector index once built), the conversation memory
//! fed to the model, the visible transcript, and a private scratch
//! directory. Nothing is shared between sessions and nothing outlives one;
//! the scratch directory is deleted when the session is dropped.

use std::path::Path;
use tempfile::TempDir;
use uuid::Uuid;

use crate::config::ReprocessPolicy;
use crate::index::VectorIndex;
use crate::memory::ConversationMemory;
use crate::models::Turn;

/// Whether questions can be answered yet.
pub enum ResponderState {
    /// No successful build so far.
    Uninitialized,
    /// An index is built and queryable.
    Ready(Box<dyn VectorIndex>),
}

pub struct Session {
    id: String,
    state: ResponderState,
    memory: ConversationMemory,
    transcript: Vec<Turn>,
    scratch: TempDir,
}

impl Session {
    /// Create a session with a fresh scratch directory under the system
    /// temp dir.
    pub fn new() -> std::io::Result<Self> {
        let id = Uuid::new_v4().to_string();
        let scratch = tempfile::Builder::new()
            .prefix(&format!("docchat-{}-", &id[..8]))
            .tempdir()?;
        Ok(Self {
            id,
            state: ResponderState::Uninitialized,
            memory: ConversationMemory::new(),
            transcript: Vec::new(),
            scratch,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ResponderState::Ready(_))
    }

    pub fn index(&self) -> Option<&dyn VectorIndex> {
        match &self.state {
            ResponderState::Ready(index) => Some(index.as_ref()),
            ResponderState::Uninitialized => None,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub(crate) fn memory_mut(&mut self) -> &mut ConversationMemory {
        &mut self.memory
    }

    /// The visible conversation, including any error notices.
    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub(crate) fn push_transcript(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Swap in a freshly built index. The previous index is dropped.
    pub(crate) fn install_index(&mut self, index: Box<dyn VectorIndex>, policy: ReprocessPolicy) {
        let rebuilt = self.is_ready();
        self.state = ResponderState::Ready(index);
        if !rebuilt {
            return;
        }
        match policy {
            ReprocessPolicy::Retain => {}
            ReprocessPolicy::ResetMemory => self.memory.clear(),
            ReprocessPolicy::Clear => {
                self.memory.clear();
                self.transcript.clear();
            }
        }
    }
}
