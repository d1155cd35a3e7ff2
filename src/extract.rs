//! Text extraction for uploaded files (PDF and plain text).
//!
//! Files supply bytes plus a name; the extension decides the format and this
//! module returns the document text. PDFs are staged in the caller's scratch
//! directory because the parser works from a path; the staged copy is
//! removed on every exit path, including a parser panic.

use encoding_rs::{Encoding, UTF_8};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::config::ExtractConfig;
use crate::models::UploadedFile;

/// Extraction error. The pipeline reports it for the file and moves on.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("text is not valid {encoding}")]
    Decode { encoding: &'static str },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("scratch file error: {0}")]
    Scratch(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
}

/// Converts an uploaded file into a single text string.
pub trait Extractor: Send + Sync {
    /// `scratch` is a directory the extractor may stage files in. Anything
    /// written there must be gone when this returns.
    fn extract(&self, file: &UploadedFile, scratch: &Path) -> Result<String, ExtractError>;
}

/// Guesses the character encoding of raw text bytes.
pub trait EncodingDetector: Send + Sync {
    /// Returns `None` when detection is inconclusive; callers fall back to UTF-8.
    fn detect(&self, bytes: &[u8]) -> Option<&'static Encoding>;
}

/// BOM, then UTF-8 validity, then a statistical guess via `chardetng`.
/// A guess chardetng has no confidence in counts as inconclusive.
pub struct SniffingDetector;

impl EncodingDetector for SniffingDetector {
    fn detect(&self, bytes: &[u8]) -> Option<&'static Encoding> {
        if let Some((encoding, _)) = Encoding::for_bom(bytes) {
            return Some(encoding);
        }
        if std::str::from_utf8(bytes).is_ok() {
            return Some(UTF_8);
        }
        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(bytes, true);
        confident(detector.guess_assess(None, false))
    }
}

fn confident((encoding, high_confidence): (&'static Encoding, bool)) -> Option<&'static Encoding> {
    high_confidence.then_some(encoding)
}

/// Never guesses: every text file is decoded as UTF-8.
pub struct Utf8Detector;

impl EncodingDetector for Utf8Detector {
    fn detect(&self, _bytes: &[u8]) -> Option<&'static Encoding> {
        None
    }
}

/// Default [`Extractor`]: `pdf-extract` for PDFs, encoding detection for text.
pub struct FileExtractor {
    detector: Box<dyn EncodingDetector>,
    text_extensions: Vec<String>,
}

impl FileExtractor {
    pub fn new(detector: Box<dyn EncodingDetector>, text_extensions: Vec<String>) -> Self {
        let text_extensions = text_extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        Self {
            detector,
            text_extensions,
        }
    }

    pub fn from_config(config: &ExtractConfig) -> Self {
        let detector: Box<dyn EncodingDetector> = if config.detect_encoding {
            Box::new(SniffingDetector)
        } else {
            Box::new(Utf8Detector)
        };
        Self::new(detector, config.text_extensions.clone())
    }

    pub fn format_of(&self, file: &UploadedFile) -> Result<DocumentFormat, ExtractError> {
        match file.extension() {
            Some(ext) if ext == "pdf" => Ok(DocumentFormat::Pdf),
            Some(ext) if self.text_extensions.contains(&ext) => Ok(DocumentFormat::PlainText),
            Some(ext) => Err(ExtractError::UnsupportedFormat(format!(".{}", ext))),
            None => Err(ExtractError::UnsupportedFormat(format!(
                "{} has no extension",
                file.name
            ))),
        }
    }

    fn decode_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let encoding = self.detector.detect(bytes).unwrap_or(UTF_8);
        let body = match Encoding::for_bom(bytes) {
            Some((bom_encoding, bom_len)) if bom_encoding == encoding => &bytes[bom_len..],
            _ => bytes,
        };
        encoding
            .decode_without_bom_handling_and_without_replacement(body)
            .map(|text| text.into_owned())
            .ok_or(ExtractError::Decode {
                encoding: encoding.name(),
            })
    }
}

impl Default for FileExtractor {
    fn default() -> Self {
        Self::from_config(&ExtractConfig::default())
    }
}

impl Extractor for FileExtractor {
    fn extract(&self, file: &UploadedFile, scratch: &Path) -> Result<String, ExtractError> {
        match self.format_of(file)? {
            DocumentFormat::Pdf => extract_pdf(&file.bytes, scratch),
            DocumentFormat::PlainText => self.decode_text(&file.bytes),
        }
    }
}

/// Pages are joined with a newline in page order.
fn extract_pdf(bytes: &[u8], scratch: &Path) -> Result<String, ExtractError> {
    let mut staged = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".pdf")
        .tempfile_in(scratch)?;
    staged.write_all(bytes)?;
    staged.flush()?;

    let path = staged.path();
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_by_pages(path))
        .map_err(|_| ExtractError::Pdf("parser panicked".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    Ok(pages.join("\n"))
}
