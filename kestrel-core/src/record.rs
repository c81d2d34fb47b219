//! Records as the console sees them.
//!
//! The console never interprets payloads: key and value stay opaque bytes
//! from the broker until the response layer encodes them for transport.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// A record header (key-value metadata).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    /// Header key.
    pub key: String,
    /// Header value; `None` for a null header value.
    pub value: Option<Bytes>,
}

impl RecordHeader {
    /// Creates a new header.
    #[must_use]
    pub fn new(key: impl Into<String>, value: Option<Bytes>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Renders the value for display: UTF-8 (lossy), empty for null.
    #[must_use]
    pub fn value_text(&self) -> String {
        self.value
            .as_ref()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_default()
    }
}

/// A record read from a partition.
///
/// Immutable once built; produced by fetch and tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition index.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Broker or producer timestamp in epoch milliseconds (-1 when absent).
    pub timestamp: i64,
    /// Optional key bytes.
    pub key: Option<Bytes>,
    /// Value bytes; `None` for a tombstone.
    pub value: Option<Bytes>,
    /// Headers in wire order.
    pub headers: Vec<RecordHeader>,
}

impl ConsumedRecord {
    /// Approximate serialized size: key plus value bytes.
    ///
    /// Returns `None` when the record has neither key nor value.
    #[must_use]
    pub fn size_bytes(&self) -> Option<usize> {
        match (&self.key, &self.value) {
            (None, None) => None,
            (key, value) => {
                Some(key.as_ref().map_or(0, Bytes::len) + value.as_ref().map_or(0, Bytes::len))
            }
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Timestamps won't overflow i64 for centuries.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
