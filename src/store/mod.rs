//! Repository abstraction for the knowledge catalog.
//!
//! These traits define the persistence operations the service and
//! pipeline layers need, enabling pluggable backends (in-memory,
//! embedded, browser-local). The design assumes the backend enforces
//! single-writer-at-a-time per aggregate id (optimistic versioning or a
//! per-id lock); the core never mutates an aggregate it did not load.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`SemanticUnitRepository`] | Load/save unit aggregates, catalog queries |
//! | [`KnowledgeLineageRepository`] | Load/save lineage, inbound-trace discovery |
//! | [`ManifestRepository`] | Append-mostly pipeline audit records |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::lineage::KnowledgeLineage;
use crate::manifest::ContentManifestEntry;
use crate::state::UnitState;
use crate::unit::SemanticUnit;

/// Storage backend for [`SemanticUnit`] aggregates.
#[async_trait]
pub trait SemanticUnitRepository: Send + Sync {
    /// Load a unit by id.
    async fn find_by_id(&self, id: &str) -> Result<Option<SemanticUnit>>;

    /// Persist a unit aggregate. Atomic for the one aggregate.
    async fn save(&self, unit: &SemanticUnit) -> Result<()>;

    /// Whether a unit with this id exists.
    async fn exists(&self, id: &str) -> Result<bool>;

    /// Units whose source pool contains `source_id`.
    async fn find_by_source_id(&self, source_id: &str) -> Result<Vec<SemanticUnit>>;

    /// Units currently in `state`.
    async fn find_by_state(&self, state: UnitState) -> Result<Vec<SemanticUnit>>;

    /// Units tagged with any of `tags`.
    async fn find_by_tags(&self, tags: &[String]) -> Result<Vec<SemanticUnit>>;
}

/// Storage backend for [`KnowledgeLineage`] aggregates.
#[async_trait]
pub trait KnowledgeLineageRepository: Send + Sync {
    /// Load the lineage owned by `unit_id`.
    async fn find_by_unit_id(&self, unit_id: &str) -> Result<Option<KnowledgeLineage>>;

    /// Persist a lineage aggregate.
    async fn save(&self, lineage: &KnowledgeLineage) -> Result<()>;

    /// Lineages containing a trace whose target is `unit_id`.
    ///
    /// Inbound traces are discovered by scanning other units' lineages;
    /// no inverted index is maintained. Acceptable at expected trace
    /// volume; a secondary index would be a storage-layer change only.
    async fn find_by_trace_target(&self, unit_id: &str) -> Result<Vec<KnowledgeLineage>>;
}

/// Append-mostly store for pipeline audit records.
#[async_trait]
pub trait ManifestRepository: Send + Sync {
    async fn save(&self, entry: &ContentManifestEntry) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<ContentManifestEntry>>;
    async fn find_by_resource_id(&self, resource_id: &str) -> Result<Vec<ContentManifestEntry>>;
    async fn find_by_source_id(&self, source_id: &str) -> Result<Vec<ContentManifestEntry>>;
    async fn find_by_unit_id(&self, unit_id: &str) -> Result<Vec<ContentManifestEntry>>;
    async fn find_all(&self) -> Result<Vec<ContentManifestEntry>>;
}
