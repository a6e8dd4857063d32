// Batch report payload and helpers
// Every batch operation (weighting, landing load, sequence building) returns one of these
// so dropped records are always counted.

use std::collections::BTreeMap;
use std::fmt;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub operation: String,
    pub processed: usize,
    /// Skip counts keyed by stable S_* token
    pub skipped: BTreeMap<String, usize>,
}

impl BatchReport {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            processed: 0,
            skipped: BTreeMap::new(),
        }
    }

    pub fn success(&mut self) {
        self.processed += 1;
    }

    pub fn skip(&mut self, token: &str) {
        *self.skipped.entry(token.to_string()).or_insert(0) += 1;
    }

    pub fn skipped_for(&self, token: &str) -> usize {
        self.skipped.get(token).copied().unwrap_or(0)
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn total(&self) -> usize {
        self.processed + self.total_skipped()
    }

    /// Fold another report for the same operation into this one
    pub fn merge(&mut self, other: &BatchReport) {
        self.processed += other.processed;
        for (token, count) in &other.skipped {
            *self.skipped.entry(token.clone()).or_insert(0) += count;
        }
    }

    pub fn log_summary(&self) {
        log::info!("{}", self);
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} processed", self.operation, self.processed)?;
        for (token, count) in &self.skipped {
            write!(f, ", {} {}", count, token)?;
        }
        Ok(())
    }
}
