use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cask_types::Digest;

/// Metadata of a committed blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    pub digest: Digest,
    pub size: u64,
    pub committed_at: DateTime<Utc>,
}

/// Progress of an in-flight ingest, keyed by its caller-chosen ref.
///
/// A status exists from the first `writer` open until the ingest is committed
/// or aborted. Closing a writer leaves the status in place for resumption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteStatus {
    #[serde(rename = "ref")]
    pub reference: String,
    /// Bytes ingested so far.
    pub offset: u64,
    /// Size hint given when the ingest was opened, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_total: Option<u64>,
    /// Digest hint given when the ingest was opened, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Digest>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WriteStatus {
    pub(crate) fn new(
        reference: impl Into<String>,
        expected_total: Option<u64>,
        expected: Option<Digest>,
    ) -> Self {
        let now = Utc::now();
        Self {
            reference: reference.into(),
            offset: 0,
            expected_total,
            expected,
            started_at: now,
            updated_at: now,
        }
    }

    /// Fill in hints that were not known when the ingest was first opened.
    pub(crate) fn merge_hints(&mut self, expected_total: Option<u64>, expected: Option<&Digest>) {
        if expected_total.is_some() {
            self.expected_total = expected_total;
        }
        if let Some(d) = expected {
            self.expected = Some(d.clone());
        }
    }
}
