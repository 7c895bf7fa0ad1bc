//! Core data models for the versioned knowledge catalog.
//!
//! These types form the immutable building blocks of a unit's version
//! chain: pool entries, per-version source snapshots, and the numbered
//! version records themselves. Versions are produced only by the
//! [`SemanticUnit`](crate::unit::SemanticUnit) aggregate and never
//! mutated in place (the one sanctioned exception: a snapshot's
//! projection-id list grows as embeddings are recorded for it).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a piece of extracted content.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One ingested, extracted piece of raw content attached to a unit.
///
/// Pool entries are append-only: a source, once added, is retained
/// forever even after removal from later versions, so it stays
/// queryable and auditable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSource {
    pub source_id: String,
    pub name: String,
    /// Content type label, e.g. `"pdf"`, `"html"`, `"text"`.
    pub source_type: String,
    /// Extracted text content.
    pub content: String,
    pub content_hash: String,
    pub attached_at: DateTime<Utc>,
}

impl UnitSource {
    /// Build a pool entry, computing the content hash from `content`.
    pub fn new(
        source_id: impl Into<String>,
        name: impl Into<String>,
        source_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let hash = content_hash(&content);
        Self {
            source_id: source_id.into(),
            name: name.into(),
            source_type: source_type.into(),
            content,
            content_hash: hash,
            attached_at: Utc::now(),
        }
    }
}

/// Per-source record inside a version: identity, content hash, and the
/// projection (embedding-batch) ids produced for it in that version.
///
/// Full source content is never stored here — only identity plus
/// derived-artifact ids — keeping versions cheap to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSourceSnapshot {
    pub source_id: String,
    pub content_hash: String,
    /// Grows via `record_projection`; reset to empty on `reprocess`.
    pub projection_ids: Vec<String>,
}

impl VersionSourceSnapshot {
    pub fn new(source_id: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            content_hash: content_hash.into(),
            projection_ids: Vec::new(),
        }
    }

    /// Copy of this snapshot with its projection ids cleared.
    pub fn without_projections(&self) -> Self {
        Self {
            source_id: self.source_id.clone(),
            content_hash: self.content_hash.clone(),
            projection_ids: Vec::new(),
        }
    }
}

/// An immutable, monotonically numbered snapshot of a unit's content.
///
/// Records which sources were active and which processing profile
/// produced their embeddings. Version numbers start at 1 and are never
/// reused or skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitVersion {
    pub version: u32,
    pub processing_profile_id: String,
    pub processing_profile_version: u32,
    /// Ordered, source-id-unique.
    pub source_snapshots: Vec<VersionSourceSnapshot>,
    pub created_at: DateTime<Utc>,
    /// Human-readable reason this version was created.
    pub reason: String,
}

impl UnitVersion {
    /// Snapshot for `source_id`, if it is active in this version.
    pub fn snapshot(&self, source_id: &str) -> Option<&VersionSourceSnapshot> {
        self.source_snapshots
            .iter()
            .find(|s| s.source_id == source_id)
    }

    /// Ids of the sources active in this version, in snapshot order.
    pub fn active_source_ids(&self) -> Vec<&str> {
        self.source_snapshots
            .iter()
            .map(|s| s.source_id.as_str())
            .collect()
    }
}
