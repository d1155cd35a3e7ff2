//! Boundary-seeking text chunker with overlap.
//!
//! Splits extracted text into [`Chunk`]s of at most `chunk_size` characters.
//! Each cut is placed at the strongest boundary available inside the window
//! (paragraph, then line, then sentence, then word), falling back to a raw
//! character cut. The next chunk starts `overlap` characters before the
//! previous one ended.
//!
//! # Algorithm
//!
//! 1. Starting at char position `s`, if the rest of the text fits in
//!    `chunk_size` characters it becomes the final chunk.
//! 2. Otherwise look in the window `[s, s + chunk_size)` for the last
//!    occurrence of each boundary kind, in preference order. The cut goes
//!    right after the separator, and must land more than `overlap`
//!    characters past `s` so the next chunk makes progress.
//! 3. With no usable boundary, cut at exactly `s + chunk_size`.
//! 4. Continue from `cut - overlap`.
//!
//! Chunks are exact substrings of the input. Removing the first `overlap`
//! characters of every chunk after the first and concatenating gives back
//! the source text.
//!
//! # Example
//!
//! ```rust
//! use doc_chat::chunk::split_text;
//! use doc_chat::config::ChunkingConfig;
//!
//! let chunks = split_text("Paris is the capital of France.", &ChunkingConfig::default(), None);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "Paris is the capital of France.");
//! ```

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// A kind of place where a chunk may be cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// Blank line (`\n\n`).
    Paragraph,
    /// Single newline.
    Line,
    /// Sentence terminator followed by a space.
    Sentence,
    /// Any space or tab.
    Word,
}

impl Boundary {
    fn separators(&self) -> &'static [&'static str] {
        match self {
            Boundary::Paragraph => &["\n\n"],
            Boundary::Line => &["\n"],
            Boundary::Sentence => &[". ", "! ", "? "],
            Boundary::Word => &[" ", "\t"],
        }
    }

    /// Byte offset just past the last separator of this kind in `window`.
    fn last_cut(&self, window: &str) -> Option<usize> {
        self.separators()
            .iter()
            .filter_map(|sep| window.rfind(sep).map(|pos| pos + sep.len()))
            .max()
    }
}

/// Split `text` into overlapping chunks.
///
/// Returns an empty vector when `text` has no non-whitespace content.
/// `source` is copied into every chunk. `config` is expected to satisfy
/// `overlap < chunk_size` (see [`Config::validate`](crate::config::Config::validate));
/// an out-of-range overlap is clamped to `chunk_size - 1`.
pub fn split_text(text: &str, config: &ChunkingConfig, source: Option<&str>) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chunk_size = config.chunk_size.max(1);
    let overlap = config.overlap.min(chunk_size - 1);

    // Byte offset of every char, plus the end of the text.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = offsets.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        if total_chars - start <= chunk_size {
            chunks.push(make_chunk(text, &offsets, chunks.len(), start, total_chars, source));
            break;
        }

        let window_end = start + chunk_size;
        let window = &text[offsets[start]..offsets[window_end]];
        let cut = config
            .boundaries
            .iter()
            .filter_map(|b| b.last_cut(window))
            .map(|byte_pos| char_index(&offsets, offsets[start] + byte_pos))
            .find(|&cut| cut - start > overlap)
            .unwrap_or(window_end);

        chunks.push(make_chunk(text, &offsets, chunks.len(), start, cut, source));
        start = cut - overlap;
    }

    chunks
}

// Separators are ASCII, so a cut always lands on a char boundary.
fn char_index(offsets: &[usize], byte_pos: usize) -> usize {
    offsets.binary_search(&byte_pos).unwrap_or_else(|i| i)
}

fn make_chunk(
    text: &str,
    offsets: &[usize],
    index: usize,
    start_char: usize,
    end_char: usize,
    source: Option<&str>,
) -> Chunk {
    let start = offsets[start_char];
    let end = offsets[end_char];
    let content = &text[start..end];

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        index,
        source: source.map(str::to_string),
        text: content.to_string(),
        start,
        end,
        hash,
    }
}

/// Rebuild the source text from chunks produced with `overlap`.
pub fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(&chunk.text);
        } else {
            out.extend(chunk.text.chars().skip(overlap));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(chunk_size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            overlap,
            ..ChunkingConfig::default()
        }
    }

    fn sample_text() -> String {
        (0..40)
            .map(|i| {
                format!(
                    "Paragraph {} talks about topic {}. It has a second sentence! And a third?",
                    i,
                    i * 7
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn small_text_single_chunk() {
        let text = "Paris is the capital of France.";
        let chunks = split_text(text, &ChunkingConfig::default(), Some("paris.txt"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].source.as_deref(), Some("paris.txt"));
        assert_eq!((chunks[0].start, chunks[0].end), (0, text.len()));
    }

    #[test]
    fn empty_and_blank_text_yield_nothing() {
        assert!(split_text("", &ChunkingConfig::default(), None).is_empty());
        assert!(split_text(" \n\n\t ", &ChunkingConfig::default(), None).is_empty());
    }

    #[test]
    fn chunks_respect_size_limit() {
        let text = sample_text();
        let config = cfg(120, 30);
        let chunks = split_text(&text, &config, None);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.char_len() <= 120, "chunk {} has {} chars", c.index, c.char_len());
        }
    }

    #[test]
    fn overlap_is_removed_on_reassembly() {
        let text = sample_text();
        for (size, overlap) in [(120, 30), (80, 0), (57, 56), (1000, 200), (33, 10)] {
            let chunks = split_text(&text, &cfg(size, overlap), None);
            assert_eq!(reassemble(&chunks, overlap), text, "size={} overlap={}", size, overlap);
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text = sample_text();
        let chunks = split_text(&text, &cfg(150, 40), None);
        for pair in chunks.windows(2) {
            let tail: String = {
                let chars: Vec<char> = pair[0].text.chars().collect();
                chars[chars.len() - 40..].iter().collect()
            };
            let head: String = pair[1].text.chars().take(40).collect();
            assert_eq!(tail, head);
            assert!(pair[1].start < pair[0].end);
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = split_text(&text, &cfg(100, 0), None);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("{}\n\n", "a".repeat(60)));
        assert_eq!(chunks[1].text, "b".repeat(60));
    }

    #[test]
    fn falls_back_to_sentence_then_word() {
        let text = "One two three. Four five six seven eight nine ten eleven";
        let chunks = split_text(text, &cfg(30, 0), None);
        assert_eq!(chunks[0].text, "One two three. ");

        let words = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = split_text(words, &cfg(20, 0), None);
        assert_eq!(chunks[0].text, "alpha beta gamma ");
    }

    #[test]
    fn hard_cut_without_boundaries() {
        let text = "x".repeat(250);
        let chunks = split_text(&text, &cfg(100, 20), None);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].char_len(), 100);
        assert_eq!(chunks[1].char_len(), 100);
        assert_eq!(chunks[2].char_len(), 90);
    }

    #[test]
    fn boundary_inside_overlap_is_skipped() {
        // The only space sits within the first `overlap` chars, so using it
        // would stall; the chunker must hard-cut instead.
        let text = format!("ab {}", "c".repeat(100));
        let chunks = split_text(&text, &cfg(50, 10), None);
        assert_eq!(chunks[0].char_len(), 50);
        assert_eq!(reassemble(&chunks, 10), text);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "日本語のテキスト。".repeat(30);
        let chunks = split_text(&text, &cfg(25, 5), None);
        for c in &chunks {
            assert!(c.char_len() <= 25);
            assert_eq!(&text[c.start..c.end], c.text);
        }
        assert_eq!(reassemble(&chunks, 5), text);
    }

    #[test]
    fn indices_contiguous_and_deterministic() {
        let text = sample_text();
        let c1 = split_text(&text, &cfg(90, 15), None);
        let c2 = split_text(&text, &cfg(90, 15), None);
        assert_eq!(c1, c2);
        for (i, c) in c1.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }
}
