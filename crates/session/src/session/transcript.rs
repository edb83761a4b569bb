//! Local view of AI-Live results

use crate::signaling::{ResultPayload, ResultTag};
use std::collections::HashMap;

/// One transcript line, updated in place as results for its id arrive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub line_id: String,
    pub who: String,
    pub timestamp_ms: i64,
    pub text: String,
    pub tags: Vec<ResultTag>,
}

impl From<&ResultPayload> for TranscriptLine {
    fn from(payload: &ResultPayload) -> Self {
        let who = if payload.speaker_label.is_empty() {
            "-".to_string()
        } else {
            payload.speaker_label.clone()
        };
        Self {
            line_id: payload.line_id.clone(),
            who,
            timestamp_ms: payload.timestamp_ms,
            text: payload.text.clone(),
            tags: payload.tags.clone(),
        }
    }
}

/// Ordered transcript, idempotent by line id
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<TranscriptLine>,
    index: HashMap<String, usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a line or replace the one with the same id in place.
    ///
    /// Returns `false` for lines without an id, which are dropped.
    pub fn upsert(&mut self, line: TranscriptLine) -> bool {
        if line.line_id.is_empty() {
            return false;
        }
        match self.index.get(&line.line_id) {
            Some(&pos) => self.lines[pos] = line,
            None => {
                self.index.insert(line.line_id.clone(), self.lines.len());
                self.lines.push(line);
            }
        }
        true
    }

    pub fn get(&self, line_id: &str) -> Option<&TranscriptLine> {
        self.index.get(line_id).map(|&pos| &self.lines[pos])
    }

    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.index.clear();
    }
}
