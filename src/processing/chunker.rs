//! Structure-aware chunking.
//!
//! Content is cut into paragraphs and table fragments. Paragraphs are packed
//! together up to `max_size` characters; a table fragment is kept whole in a
//! chunk of its own when `preserve_tables` is set, whatever its size.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{KbenrichError, Result};
use crate::processing::config::ChunkingConfig;
use crate::processing::types::{Chunk, ChunkInfo, EnhancedMetadata};

const PARAGRAPH_SEPARATOR: &str = "\n\n";

static HTML_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<table\b.*?</table\s*>").expect("html table pattern should compile")
});

/// A unit of the source text before packing.
#[derive(Debug, Clone, PartialEq)]
enum Block {
    Text(String),
    Table(String),
}

#[derive(Debug)]
struct Piece {
    text: String,
    table: bool,
}

impl Piece {
    fn text(text: String) -> Self {
        Self { text, table: false }
    }
}

#[derive(Debug, Clone)]
pub struct SemanticChunker {
    min_size: usize,
    max_size: usize,
    preserve_tables: bool,
}

impl SemanticChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            min_size: config.min_size,
            max_size: config.max_size.max(1),
            preserve_tables: config.preserve_tables,
        }
    }

    /// Split content into chunks that each carry a copy of `metadata` with
    /// `chunk_info` filled in. Always returns at least one chunk.
    pub fn chunk(&self, content: &str, metadata: &EnhancedMetadata) -> Result<Vec<Chunk>> {
        let mut pieces: Vec<Piece> = Vec::new();
        let mut current = String::new();

        for block in split_blocks(content) {
            match block {
                Block::Table(table) if self.preserve_tables => {
                    flush(&mut current, &mut pieces);
                    pieces.push(Piece { text: table, table: true });
                }
                Block::Table(text) | Block::Text(text) => {
                    self.append_text(text, &mut current, &mut pieces)?;
                }
            }
        }
        flush(&mut current, &mut pieces);

        let mut pieces = self.merge_small(pieces);
        if pieces.is_empty() {
            pieces.push(Piece::text(String::new()));
        }

        let total = pieces.len();
        log::debug!("Chunked {} chars into {} chunks", char_len(content), total);

        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(index, piece)| {
                let mut metadata = metadata.clone();
                metadata.chunk_info = Some(ChunkInfo {
                    index,
                    total,
                    has_table_fragment: piece.table,
                });
                Chunk {
                    content: piece.text,
                    metadata,
                }
            })
            .collect())
    }

    fn append_text(&self, text: String, current: &mut String, pieces: &mut Vec<Piece>) -> Result<()> {
        if char_len(&text) > self.max_size {
            flush(current, pieces);
            let mut parts = hard_split(&text, self.max_size)?;
            // the tail keeps accumulating with whatever follows
            if let Some(tail) = parts.pop() {
                pieces.extend(parts.into_iter().map(Piece::text));
                *current = tail;
            }
            return Ok(());
        }

        if current.is_empty() {
            *current = text;
        } else if char_len(current) + PARAGRAPH_SEPARATOR.len() + char_len(&text) <= self.max_size {
            current.push_str(PARAGRAPH_SEPARATOR);
            current.push_str(&text);
        } else {
            flush(current, pieces);
            *current = text;
        }
        Ok(())
    }

    /// Fold text chunks shorter than `min_size` into the text chunk before them.
    fn merge_small(&self, pieces: Vec<Piece>) -> Vec<Piece> {
        let mut merged: Vec<Piece> = Vec::with_capacity(pieces.len());
        for piece in pieces {
            if !piece.table && char_len(&piece.text) < self.min_size {
                if let Some(previous) = merged.last_mut() {
                    let combined =
                        char_len(&previous.text) + PARAGRAPH_SEPARATOR.len() + char_len(&piece.text);
                    if !previous.table && combined <= self.max_size {
                        previous.text.push_str(PARAGRAPH_SEPARATOR);
                        previous.text.push_str(&piece.text);
                        continue;
                    }
                }
            }
            merged.push(piece);
        }
        merged
    }
}

fn flush(current: &mut String, pieces: &mut Vec<Piece>) {
    if !current.trim().is_empty() {
        pieces.push(Piece::text(std::mem::take(current)));
    } else {
        current.clear();
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn is_table_row(line: &str) -> bool {
    line.matches('|').count() >= 2 || line.matches('\t').count() >= 2
}

fn split_blocks(content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut last = 0;
    for m in HTML_TABLE.find_iter(content) {
        split_lines(&content[last..m.start()], &mut blocks);
        blocks.push(Block::Table(m.as_str().trim().to_string()));
        last = m.end();
    }
    split_lines(&content[last..], &mut blocks);
    blocks
}

/// Group lines into paragraphs (blank-line separated) and runs of table rows.
fn split_lines(text: &str, blocks: &mut Vec<Block>) {
    let mut paragraph: Vec<&str> = Vec::new();
    let mut table: Vec<&str> = Vec::new();

    for line in text.lines() {
        if is_table_row(line) {
            push_block(&mut paragraph, blocks, Block::Text);
            table.push(line.trim_end());
        } else {
            push_block(&mut table, blocks, Block::Table);
            if line.trim().is_empty() {
                push_block(&mut paragraph, blocks, Block::Text);
            } else {
                paragraph.push(line.trim_end());
            }
        }
    }

    push_block(&mut paragraph, blocks, Block::Text);
    push_block(&mut table, blocks, Block::Table);
}

fn push_block(lines: &mut Vec<&str>, blocks: &mut Vec<Block>, make: fn(String) -> Block) {
    if lines.is_empty() {
        return;
    }
    let joined = lines.join("\n");
    lines.clear();
    let trimmed = joined.trim_matches(|c| c == '\n' || c == ' ');
    if !trimmed.is_empty() {
        blocks.push(make(trimmed.to_string()));
    }
}

/// Byte offset `n` characters after `start`, or the end of the text.
fn advance_chars(text: &str, start: usize, n: usize) -> usize {
    text.get(start..)
        .and_then(|rest| rest.char_indices().nth(n))
        .map(|(offset, _)| start + offset)
        .unwrap_or(text.len())
}

/// Split text into pieces of at most `max_chars` characters.
///
/// Cuts fall on the last whitespace or punctuation inside the final 20% of
/// each window, or at the window end when there is none. Slicing always
/// happens on character boundaries.
fn hard_split(text: &str, max_chars: usize) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let end = advance_chars(text, start, max_chars);

        let cut = if end < text.len() {
            let window_start = advance_chars(text, start, max_chars - max_chars / 5);
            text.get(window_start..end)
                .and_then(|window| {
                    window
                        .char_indices()
                        .rev()
                        .find(|(_, c)| c.is_whitespace() || matches!(c, '.' | '!' | '?' | ',' | ';'))
                        .map(|(offset, c)| window_start + offset + c.len_utf8())
                })
                .unwrap_or(end)
        } else {
            end
        };

        let part = text.get(start..cut).ok_or_else(|| {
            KbenrichError::Processing(format!(
                "Failed to slice text at byte boundaries: start={}, end={}, len={}",
                start,
                cut,
                text.len()
            ))
        })?;
        let part = part.trim();
        if !part.is_empty() {
            parts.push(part.to_string());
        }

        start = cut;
    }

    Ok(parts)
}
