//! # Doc Chat
//!
//! Chat with your documents. Upload PDF or plain-text files, and doc-chat
//! extracts their text and splits it into overlapping chunks. It embeds the
//! chunks into an in-memory vector index, then answers questions with a
//! language model grounded in the most similar chunks and the conversation
//! so far.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────┐   ┌──────────┐   ┌────────────┐
//! │ Extractor │──▶│ Chunker │──▶│ Embedder │──▶│ FlatIndex  │
//! │ PDF/text  │   │         │   │          │   │ (session)  │
//! └───────────┘   └─────────┘   └──────────┘   └─────┬──────┘
//!                                                    │ top-k
//!                      ┌──────────────┐        ┌─────▼──────┐
//!                      │    Memory    │───────▶│ Responder  │──▶ LLM
//!                      └──────────────┘        └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! docchat chat report.pdf notes.txt   # interactive
//! docchat ask "What is the deadline?" --file report.pdf
//! docchat chunks notes.txt            # inspect chunking
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`extract`] | PDF and plain-text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index and retrieval |
//! | [`llm`] | Chat model abstraction |
//! | [`memory`] | Conversation memory |
//! | [`responder`] | Retrieval-augmented answering |
//! | [`session`] | Per-user session state |
//! | [`pipeline`] | Process/ask orchestration |
//! | [`progress`] | CLI progress reporting |
//! | [`logging`] | `tracing` subscriber setup |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod responder;
mod retry;
pub mod session;

pub use error::{Error, Result};
pub use pipeline::{BuildReport, FileOutcome, Pipeline};
pub use session::Session;
