//! Cursor-driven batch state machine.
//!
//! Each pass takes the current cursor, yields a request, and consumes one
//! batch envelope. The machine finishes when the model reports no more
//! records or when the pass bound is reached, whichever comes first.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::records::BatchEnvelope;
use crate::models::enums::{BatchedPhaseKind, Termination};

/// A record that can be batched and deduplicated.
pub trait BatchRecord: DeserializeOwned {
    /// Identity across passes. The first record seen with a key wins.
    fn dedup_key(&self) -> String;

    /// Cursor value used when the model omits `last_control_id`.
    fn cursor_value(&self) -> String;
}

/// Position of a batched phase, scoped to one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionCursor {
    pub phase: BatchedPhaseKind,
    pub last_control_id: Option<String>,
    pub has_more: bool,
}

/// What the next pass should ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// 1-based pass number.
    pub pass: u32,
    pub cursor: Option<String>,
}

/// Bookkeeping for one applied batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub pass: u32,
    pub received: usize,
    pub added: usize,
    pub duplicates: usize,
    pub has_more: bool,
}

/// Everything a finished batched phase produced.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub records: Vec<T>,
    pub passes: u32,
    pub duplicates_discarded: usize,
    pub termination: Termination,
    pub last_cursor: Option<String>,
}

pub struct BatchMachine<T> {
    cursor: ExtractionCursor,
    passes: u32,
    max_passes: u32,
    seen: HashSet<String>,
    records: Vec<T>,
    duplicates: usize,
    termination: Option<Termination>,
}

impl<T: BatchRecord> BatchMachine<T> {
    /// `max_passes` is clamped to at least 1.
    pub fn new(phase: BatchedPhaseKind, max_passes: u32) -> Self {
        Self {
            cursor: ExtractionCursor {
                phase,
                last_control_id: None,
                has_more: true,
            },
            passes: 0,
            max_passes: max_passes.max(1),
            seen: HashSet::new(),
            records: Vec::new(),
            duplicates: 0,
            termination: None,
        }
    }

    pub fn cursor(&self) -> &ExtractionCursor {
        &self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.termination.is_some()
    }

    /// The request for the next pass, or `None` once finished.
    pub fn next_request(&self) -> Option<BatchRequest> {
        if self.is_finished() {
            return None;
        }
        Some(BatchRequest {
            pass: self.passes + 1,
            cursor: self.cursor.last_control_id.clone(),
        })
    }

    /// Consume one batch: drop records already seen, advance the cursor,
    /// and decide whether another pass is allowed.
    pub fn apply(&mut self, envelope: BatchEnvelope<T>) -> PassOutcome {
        self.passes += 1;
        let received = envelope.extraction.controls.len();
        let mut added = 0;
        let mut duplicates = 0;
        let mut last_value = None;

        for record in envelope.extraction.controls {
            last_value = Some(record.cursor_value());
            if self.seen.insert(record.dedup_key()) {
                self.records.push(record);
                added += 1;
            } else {
                duplicates += 1;
            }
        }
        self.duplicates += duplicates;

        let next_cursor = envelope
            .meta
            .last_control_id
            .or(last_value.filter(|v| !v.is_empty()));
        if next_cursor.is_some() {
            self.cursor.last_control_id = next_cursor;
        }
        self.cursor.has_more = envelope.meta.has_more;

        if !self.cursor.has_more {
            self.termination = Some(Termination::Exhausted);
        } else if self.passes >= self.max_passes {
            self.termination = Some(Termination::MaxPassExceeded);
        }

        PassOutcome {
            pass: self.passes,
            received,
            added,
            duplicates,
            has_more: self.cursor.has_more,
        }
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn finish(self) -> BatchOutcome<T> {
        BatchOutcome {
            records: self.records,
            passes: self.passes,
            duplicates_discarded: self.duplicates,
            termination: self.termination.unwrap_or(Termination::Exhausted),
            last_cursor: self.cursor.last_control_id,
        }
    }
}
