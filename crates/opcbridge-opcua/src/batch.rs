// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Records handed to the host pipeline.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::browse::TagMetadata;
use crate::client::NormalizedValue;

/// One acquired value with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Normalized value.
    pub value: NormalizedValue,
    /// Metadata keyed by the `opcua_*` names.
    pub metadata: BTreeMap<String, String>,
    /// Source timestamp, if the server supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl Record {
    /// Creates a record from a value and node metadata.
    pub fn new(
        value: NormalizedValue,
        metadata: &TagMetadata,
        source_timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            value,
            metadata: metadata.to_map(),
            source_timestamp,
        }
    }

    /// Looks up a metadata value.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Records produced by one `read_batch` call, in acquisition order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RecordBatch {
    records: Vec<Record>,
}

impl RecordBatch {
    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over the records.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// The records as a slice.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn push(&mut self, record: Record) {
        self.records.push(record);
    }
}

impl From<Vec<Record>> for RecordBatch {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl IntoIterator for RecordBatch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordBatch {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Acknowledgement callback returned with every batch.
///
/// Values are not redelivered, so acknowledging only closes the loop with
/// the host. Repeated calls are no-ops.
#[derive(Debug, Clone, Default)]
pub struct AckHandle {
    done: Arc<AtomicBool>,
    records: usize,
}

impl AckHandle {
    pub(crate) fn new(records: usize) -> Self {
        Self {
            done: Arc::new(AtomicBool::new(false)),
            records,
        }
    }

    /// Acknowledges the batch.
    pub fn ack(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            tracing::trace!(records = self.records, "Batch acknowledged");
        }
    }

    /// Rejects the batch. The values are not redelivered.
    pub fn nack(&self, reason: &str) {
        if !self.done.swap(true, Ordering::AcqRel) {
            tracing::debug!(records = self.records, reason, "Batch rejected by host");
        }
    }

    /// Returns `true` once acked or nacked.
    pub fn is_settled(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browse::{META_TAG_NAME, META_TAG_TYPE};
    use crate::types::TagType;

    fn metadata() -> TagMetadata {
        TagMetadata {
            path: "ns_3_s_StepUp".into(),
            tag_path: "Basic.StepUp".into(),
            group: "Basic".into(),
            name: "StepUp".into(),
            tag_type: TagType::Number,
        }
    }

    #[test]
    fn test_record_metadata() {
        let record = Record::new(NormalizedValue::number(3u32), &metadata(), None);
        assert_eq!(record.meta(META_TAG_NAME), Some("StepUp"));
        assert_eq!(record.meta(META_TAG_TYPE), Some("number"));
        assert_eq!(record.meta("missing"), None);
    }

    #[test]
    fn test_record_serializes_number_as_json_number() {
        let record = Record::new(NormalizedValue::number(-17i32), &metadata(), None);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["value"], serde_json::json!(-17));
        assert_eq!(json["metadata"]["opcua_tag_group"], "Basic");
        assert!(json.get("source_timestamp").is_none());
    }

    #[test]
    fn test_batch_iteration_order() {
        let batch = RecordBatch::from(vec![
            Record::new(NormalizedValue::Bool(true), &metadata(), None),
            Record::new(NormalizedValue::Bool(false), &metadata(), None),
        ]);
        assert_eq!(batch.len(), 2);
        let values: Vec<_> = batch.iter().map(|r| r.value.as_bool()).collect();
        assert_eq!(values, [Some(true), Some(false)]);
    }

    #[test]
    fn test_ack_is_idempotent() {
        let ack = AckHandle::new(2);
        let clone = ack.clone();
        assert!(!ack.is_settled());
        ack.ack();
        clone.nack("late");
        ack.ack();
        assert!(clone.is_settled());
    }
}
