/*!
 * Aggregation of part results
 *
 * Results arrive out of order from many workers. Each part number owns one
 * slot; recording a part again replaces its slot.
 */

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::progress::{ProgressEvent, ProgressReporter};
use super::session::{FailedPart, PartResult, PartStatus};
use crate::protocol::CompletedPart;

/// Thread-safe record of every part's latest result
#[derive(Debug)]
pub struct ProgressTracker {
    key: String,
    total_bytes: u64,
    results: Mutex<BTreeMap<u32, PartResult>>,
    reporter: ProgressReporter,
}

impl ProgressTracker {
    pub fn new(key: impl Into<String>, total_bytes: u64, reporter: ProgressReporter) -> Self {
        Self {
            key: key.into(),
            total_bytes,
            results: Mutex::new(BTreeMap::new()),
            reporter,
        }
    }

    /// Record a result, replacing any earlier one for the same part.
    ///
    /// Returns true if this is the first result for the part.
    pub fn record(&self, result: PartResult) -> bool {
        let event = match &result.status {
            PartStatus::Success => ProgressEvent::PartCompleted {
                key: self.key.clone(),
                part_number: result.part_number,
                part_bytes: result.size,
                attempts: result.attempts,
            },
            PartStatus::Failed { kind, reason } => ProgressEvent::PartFailed {
                key: self.key.clone(),
                part_number: result.part_number,
                kind: *kind,
                reason: reason.clone(),
            },
        };

        let (first, bytes) = {
            let mut results = self.results();
            let first = results.insert(result.part_number, result).is_none();
            (first, bytes_of(&results))
        };

        debug!(key = %self.key, first, bytes_uploaded = bytes, "Recorded part result");
        self.reporter.report(event);
        self.reporter.progress(&self.key, bytes, self.total_bytes);
        first
    }

    /// Distinct part numbers with a result
    pub fn parts_seen(&self) -> usize {
        self.results().len()
    }

    pub fn succeeded(&self) -> usize {
        self.results().values().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results().values().filter(|r| !r.is_success()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.results().values().any(|r| !r.is_success())
    }

    /// Bytes of every successful part
    pub fn bytes_uploaded(&self) -> u64 {
        bytes_of(&self.results())
    }

    /// True once parts 1..=expected all have a terminal result
    pub fn all_terminal(&self, expected: u64) -> bool {
        let results = self.results();
        results.len() as u64 == expected
            && (1..=expected).all(|n| u32::try_from(n).is_ok_and(|n| results.contains_key(&n)))
    }

    /// True once parts 1..=expected all succeeded
    pub fn all_succeeded(&self, expected: u64) -> bool {
        self.all_terminal(expected) && !self.has_failures()
    }

    /// Successful parts sorted ascending by part number
    pub fn completed_parts(&self) -> Vec<CompletedPart> {
        self.results()
            .values()
            .filter_map(|r| {
                r.content_tag
                    .as_ref()
                    .filter(|_| r.is_success())
                    .map(|tag| CompletedPart::new(r.part_number, tag.clone()))
            })
            .collect()
    }

    /// Failed parts sorted ascending by part number
    pub fn failures(&self) -> Vec<FailedPart> {
        self.results()
            .values()
            .filter_map(|r| match &r.status {
                PartStatus::Success => None,
                PartStatus::Failed { kind, reason } => Some(FailedPart {
                    part_number: r.part_number,
                    kind: *kind,
                    attempts: r.attempts,
                    reason: reason.clone(),
                }),
            })
            .collect()
    }

    /// Whether a part has a recorded result
    pub fn contains(&self, part_number: u32) -> bool {
        self.results().contains_key(&part_number)
    }

    fn results(&self) -> MutexGuard<'_, BTreeMap<u32, PartResult>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn bytes_of(results: &BTreeMap<u32, PartResult>) -> u64 {
    results
        .values()
        .filter(|r| r.is_success())
        .map(|r| r.size)
        .sum()
}
