use std::collections::BTreeMap;

use serde::Serialize;

use crate::crm::RawRecord;
use crate::errors::RecordProcessingError;

/// One record flattened to string values; `None` serializes as JSON `null`.
pub type NormalizedRecord = BTreeMap<String, Option<String>>;

/// A raw record the executor could not flatten, with the reason it was dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedRecord {
    pub raw: RawRecord,
    pub reason: RecordProcessingError,
}

/// Partial-result accumulator: records that flattened cleanly plus the ones
/// that were skipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordBatch {
    pub successes: Vec<NormalizedRecord>,
    pub skipped: Vec<SkippedRecord>,
}

impl RecordBatch {
    pub fn push(&mut self, raw: RawRecord, outcome: Result<NormalizedRecord, RecordProcessingError>) {
        match outcome {
            Ok(record) => self.successes.push(record),
            Err(reason) => self.skipped.push(SkippedRecord { raw, reason }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionResult {
    Success {
        records: Vec<NormalizedRecord>,
        count: usize,
        #[serde(rename = "moreRecords")]
        more_records: bool,
        #[serde(skip)]
        skipped: Vec<SkippedRecord>,
    },
    Error {
        message: String,
    },
}

impl ExecutionResult {
    pub fn empty() -> Self {
        Self::Success { records: Vec::new(), count: 0, more_records: false, skipped: Vec::new() }
    }

    pub fn from_batch(batch: RecordBatch, more_records: bool) -> Self {
        let RecordBatch { successes, skipped } = batch;
        Self::Success { count: successes.len(), records: successes, more_records, skipped }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
        }
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        match self {
            Self::Success { records, .. } => records,
            Self::Error { .. } => &[],
        }
    }

    pub fn skipped(&self) -> &[SkippedRecord] {
        match self {
            Self::Success { skipped, .. } => skipped,
            Self::Error { .. } => &[],
        }
    }
}
