use std::collections::VecDeque;

use bytes::Bytes;

use super::decode::{Utf8StreamDecoder, count_newlines};

/// What the drain should do with the chunk at the front of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStep {
    /// Trimmed text matches the previous emission; drop without delay.
    Suppressed(Bytes),
    /// No newline in the chunk; emit right away.
    Immediate(Bytes),
    /// Newline-bearing chunk; wait before emitting. `remaining_lines` is the
    /// line budget after this chunk's own newlines were subtracted.
    Paced { chunk: Bytes, remaining_lines: usize },
}

/// FIFO of chunks awaiting emission, plus the line accounting and
/// duplicate-suppression state that goes with it.
///
/// Ingestion and drain each own a streaming decoder. Both see chunks in the
/// same order, so a character split across two chunks decodes the same way
/// on either side.
#[derive(Debug, Default)]
pub struct PendingQueue {
    chunks: VecDeque<Bytes>,
    line_budget: usize,
    last_emitted: Option<String>,
    ingest_decoder: Utf8StreamDecoder,
    drain_decoder: Utf8StreamDecoder,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a chunk from upstream. Returns the number of newlines it added
    /// to the line budget.
    pub fn push(&mut self, chunk: Bytes) -> usize {
        let text = self.ingest_decoder.decode(&chunk);
        let lines = count_newlines(&text);
        self.line_budget += lines;
        self.chunks.push_back(chunk);
        lines
    }

    /// Dequeue the front chunk and decide how to emit it.
    pub fn pop(&mut self) -> Option<DrainStep> {
        let chunk = self.chunks.pop_front()?;
        let text = self.drain_decoder.decode(&chunk);

        // A chunk holding only part of a character decodes to nothing; it is
        // never a repeat, and dropping it would corrupt the next character.
        let fragment = text.is_empty() && self.drain_decoder.has_pending();
        if let Some(last) = &self.last_emitted {
            if !fragment && last.trim() == text.trim() {
                return Some(DrainStep::Suppressed(chunk));
            }
        }

        let lines = count_newlines(&text);
        self.last_emitted = Some(text);

        if lines == 0 {
            return Some(DrainStep::Immediate(chunk));
        }

        self.line_budget = self.line_budget.saturating_sub(lines);
        Some(DrainStep::Paced {
            chunk,
            remaining_lines: self.line_budget,
        })
    }

    /// Drop every queued chunk. Used on cancellation and upstream error.
    pub fn clear(&mut self) -> usize {
        let dropped = self.chunks.len();
        self.chunks.clear();
        self.line_budget = 0;
        dropped
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn line_budget(&self) -> usize {
        self.line_budget
    }

    pub fn last_emitted(&self) -> Option<&str> {
        self.last_emitted.as_deref()
    }
}
