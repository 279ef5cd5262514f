use crate::error::IndexError;
use crate::models::{TextChunk, TextSegment};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.max_chars == 0 {
            return Err(IndexError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IndexError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than window {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits on the coarsest separator present, recursing into pieces that are
/// still longer than the window, then merges neighbours back into windows.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    split_with(text, &SEPARATORS, config)
}

fn split_with(text: &str, separators: &[&str], config: ChunkingConfig) -> Vec<String> {
    let position = separators
        .iter()
        .position(|separator| separator.is_empty() || text.contains(separator))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");
    let finer = separators.get(position + 1..).unwrap_or(&[]);

    let pieces: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator)
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect()
    };

    let mut windows = Vec::new();
    let mut fitting = Vec::new();
    for piece in pieces {
        if char_len(&piece) <= config.max_chars {
            fitting.push(piece);
            continue;
        }

        if !fitting.is_empty() {
            windows.extend(merge_pieces(&fitting, separator, config));
            fitting.clear();
        }

        if finer.is_empty() {
            windows.push(piece);
        } else {
            windows.extend(split_with(&piece, finer, config));
        }
    }

    if !fitting.is_empty() {
        windows.extend(merge_pieces(&fitting, separator, config));
    }

    windows
}

fn merge_pieces(pieces: &[String], separator: &str, config: ChunkingConfig) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut windows = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);
        let joiner = if current.is_empty() { 0 } else { separator_len };

        if total + len + joiner > config.max_chars && !current.is_empty() {
            push_window(&mut windows, &current, separator);

            // Keep a tail of the previous window as overlap for the next one.
            while total > config.overlap_chars
                || (total > 0
                    && total + len + if current.is_empty() { 0 } else { separator_len }
                        > config.max_chars)
            {
                let Some(front) = current.pop_front() else {
                    break;
                };
                total -= char_len(front) + if current.is_empty() { 0 } else { separator_len };
            }
        }

        let joiner = if current.is_empty() { 0 } else { separator_len };
        current.push_back(piece);
        total += len + joiner;
    }

    push_window(&mut windows, &current, separator);
    windows
}

fn push_window(windows: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        windows.push(trimmed.to_string());
    }
}

/// Cuts every segment into windows, numbering chunks across the document.
pub fn build_chunks(
    segments: &[TextSegment],
    config: ChunkingConfig,
) -> Result<Vec<TextChunk>, IndexError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for segment in segments {
        for window in split_text(&segment.content, config) {
            chunks.push(TextChunk {
                chunk_id: make_chunk_id(&segment.source, segment.page, cursor, &window),
                chunk_index: cursor,
                source: segment.source.clone(),
                page: segment.page,
                method: segment.method,
                text: window,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

fn make_chunk_id(source: &str, page: Option<u32>, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(page.unwrap_or(0).to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
