//! Domain events and the publisher seam.
//!
//! Aggregates buffer events while they mutate; the service layer drains
//! and publishes them after a successful save. Events are a narrative
//! log for external subscribers (search indexing, notifications) — they
//! are never required to reconstruct aggregate state, and a publish
//! failure never blocks persistence.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An event recorded by an aggregate during one mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    UnitCreated {
        unit_id: String,
        occurred_at: DateTime<Utc>,
    },
    SourceAdded {
        unit_id: String,
        source_id: String,
        occurred_at: DateTime<Utc>,
    },
    SourceRemoved {
        unit_id: String,
        source_id: String,
        occurred_at: DateTime<Utc>,
    },
    UnitVersioned {
        unit_id: String,
        version: u32,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    UnitRolledBack {
        unit_id: String,
        from_version: u32,
        to_version: u32,
        occurred_at: DateTime<Utc>,
    },
    ProjectionRecorded {
        unit_id: String,
        source_id: String,
        projection_id: String,
        occurred_at: DateTime<Utc>,
    },
    UnitDeprecated {
        unit_id: String,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    UnitArchived {
        unit_id: String,
        occurred_at: DateTime<Utc>,
    },
    TraceAdded {
        from_unit_id: String,
        to_unit_id: String,
        relationship: String,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Event name as used in the serialized `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::UnitCreated { .. } => "unit_created",
            DomainEvent::SourceAdded { .. } => "source_added",
            DomainEvent::SourceRemoved { .. } => "source_removed",
            DomainEvent::UnitVersioned { .. } => "unit_versioned",
            DomainEvent::UnitRolledBack { .. } => "unit_rolled_back",
            DomainEvent::ProjectionRecorded { .. } => "projection_recorded",
            DomainEvent::UnitDeprecated { .. } => "unit_deprecated",
            DomainEvent::UnitArchived { .. } => "unit_archived",
            DomainEvent::TraceAdded { .. } => "trace_added",
        }
    }
}

/// Fire-and-forget integration hook for domain events.
///
/// Implementations deliver events to external subscribers. Callers
/// treat failures as non-fatal: they are logged and discarded.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_all(&self, events: &[DomainEvent]) -> Result<()>;
}
