//! Recursive passage splitter.
//!
//! Text is cut at the coarsest boundary that occurs in it (paragraph,
//! line, sentence, word) and only pieces still longer than `chunk_size`
//! are split again with the next finer boundary, down to single
//! characters. Pieces are then merged greedily back up to `chunk_size`,
//! carrying at most `chunk_overlap` characters of trailing pieces into
//! the next passage. Sizes are counted in characters.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::config::ChunkingConfig;
use crate::core::errors::RagError;

/// Boundaries tried in order; `""` is the hard character cut.
pub const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// A retrievable span of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Source document identifier (file name)
    pub document_id: String,
    /// Position within the document's passage sequence
    pub index: usize,
    /// Passage text, whitespace-trimmed
    pub text: String,
    /// Byte offset of `text` in the source document
    pub start: usize,
    /// Byte offset one past the end of `text`
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, RagError> {
        if config.chunk_size == 0 {
            return Err(RagError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Splits `text` into ordered passages. Empty input yields none.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Passage> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let whole = Span {
            start: 0,
            end: text.len(),
        };
        self.split_text(text, whole, &SEPARATORS)
            .into_iter()
            .enumerate()
            .map(|(index, span)| Passage {
                document_id: document_id.to_string(),
                index,
                text: span.slice(text).to_string(),
                start: span.start,
                end: span.end,
            })
            .collect()
    }

    fn split_text(&self, text: &str, span: Span, separators: &[&str]) -> Vec<Span> {
        let piece = span.slice(text);
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if piece.contains(candidate) {
                separator = *candidate;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting: Vec<Span> = Vec::new();
        for split in split_keeping_separator(text, span, separator) {
            if char_len(split.slice(text)) < self.config.chunk_size {
                fitting.push(split);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(text, &fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.extend(split.trimmed(text));
            } else {
                chunks.extend(self.split_text(text, split, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(text, &fitting));
        }

        chunks
    }

    /// Greedily joins adjacent splits. Splits are contiguous in `text`, so
    /// every emitted passage is the range from its first to its last split.
    fn merge(&self, text: &str, splits: &[Span]) -> Vec<Span> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut docs = Vec::new();
        let mut current: VecDeque<Span> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split.slice(text));
            if total + len > size && !current.is_empty() {
                docs.extend(joined(&current).and_then(|span| span.trimmed(text)));
                while total > overlap || (total + len > size && total > 0) {
                    match current.pop_front() {
                        Some(dropped) => total -= char_len(dropped.slice(text)),
                        None => break,
                    }
                }
            }
            current.push_back(*split);
            total += len;
        }

        docs.extend(joined(&current).and_then(|span| span.trimmed(text)));
        docs
    }
}

/// Byte range into the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

impl Span {
    fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    /// Narrows the range past surrounding whitespace; `None` if nothing is left.
    fn trimmed(&self, text: &str) -> Option<Span> {
        let piece = self.slice(text);
        let trimmed = piece.trim_start();
        let start = self.start + (piece.len() - trimmed.len());
        let end = start + trimmed.trim_end().len();
        (end > start).then_some(Span { start, end })
    }
}

fn joined(spans: &VecDeque<Span>) -> Option<Span> {
    Some(Span {
        start: spans.front()?.start,
        end: spans.back()?.end,
    })
}

/// Splits `span` after every occurrence of `separator`, which stays
/// attached to the end of the preceding piece. An empty separator splits
/// into chars.
fn split_keeping_separator(text: &str, span: Span, separator: &str) -> Vec<Span> {
    let piece = span.slice(text);
    if separator.is_empty() {
        return piece
            .char_indices()
            .map(|(i, c)| Span {
                start: span.start + i,
                end: span.start + i + c.len_utf8(),
            })
            .collect();
    }

    let mut offset = span.start;
    piece
        .split_inclusive(separator)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let split = Span {
                start: offset,
                end: offset + part.len(),
            };
            offset = split.end;
            split
        })
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
