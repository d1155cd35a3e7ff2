//! Pipeline error taxonomy.
//!
//! Provider internals report failures as `anyhow::Error`; the pipeline wraps
//! them into [`Error`] so callers can tell a missing index from an outage.

use thiserror::Error;

use crate::extract::ExtractError;
use crate::pipeline::FileOutcome;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not extract {file}: {source}")]
    Extraction {
        file: String,
        #[source]
        source: ExtractError,
    },

    /// Nothing indexable survived extraction. `outcomes` holds the result of
    /// every file in the batch (empty when no files were given).
    #[error("no valid text chunks were extracted from the files")]
    EmptyCorpus { outcomes: Vec<FileOutcome> },

    #[error("embedding service failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("language model failed: {0:#}")]
    LanguageModel(anyhow::Error),

    #[error("please upload and process documents first")]
    NotReady,
}

pub type Result<T> = std::result::Result<T, Error>;
