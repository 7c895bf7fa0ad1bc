//! In-memory repository implementations for tests and embedding.
//!
//! `HashMap` and `Vec` behind `std::sync::RwLock`, clone-on-read. One
//! process, one writer per aggregate at a time — the same assumption
//! the repository traits document for real backends.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::events::{DomainEvent, EventPublisher};
use crate::lineage::KnowledgeLineage;
use crate::manifest::ContentManifestEntry;
use crate::state::UnitState;
use crate::unit::SemanticUnit;

use super::{KnowledgeLineageRepository, ManifestRepository, SemanticUnitRepository};

/// In-memory unit store.
#[derive(Default)]
pub struct MemoryUnitStore {
    units: RwLock<HashMap<String, SemanticUnit>>,
}

impl MemoryUnitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SemanticUnitRepository for MemoryUnitStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<SemanticUnit>> {
        let units = self.units.read().unwrap();
        Ok(units.get(id).cloned())
    }

    async fn save(&self, unit: &SemanticUnit) -> Result<()> {
        let mut units = self.units.write().unwrap();
        units.insert(unit.id().to_string(), unit.clone());
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let units = self.units.read().unwrap();
        Ok(units.contains_key(id))
    }

    async fn find_by_source_id(&self, source_id: &str) -> Result<Vec<SemanticUnit>> {
        let units = self.units.read().unwrap();
        Ok(units
            .values()
            .filter(|u| u.source(source_id).is_some())
            .cloned()
            .collect())
    }

    async fn find_by_state(&self, state: UnitState) -> Result<Vec<SemanticUnit>> {
        let units = self.units.read().unwrap();
        Ok(units
            .values()
            .filter(|u| u.state() == state)
            .cloned()
            .collect())
    }

    async fn find_by_tags(&self, tags: &[String]) -> Result<Vec<SemanticUnit>> {
        let units = self.units.read().unwrap();
        Ok(units
            .values()
            .filter(|u| u.tags().iter().any(|t| tags.contains(t)))
            .cloned()
            .collect())
    }
}

/// In-memory lineage store.
#[derive(Default)]
pub struct MemoryLineageStore {
    lineages: RwLock<HashMap<String, KnowledgeLineage>>,
}

impl MemoryLineageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeLineageRepository for MemoryLineageStore {
    async fn find_by_unit_id(&self, unit_id: &str) -> Result<Option<KnowledgeLineage>> {
        let lineages = self.lineages.read().unwrap();
        Ok(lineages.get(unit_id).cloned())
    }

    async fn save(&self, lineage: &KnowledgeLineage) -> Result<()> {
        let mut lineages = self.lineages.write().unwrap();
        lineages.insert(lineage.semantic_unit_id().to_string(), lineage.clone());
        Ok(())
    }

    async fn find_by_trace_target(&self, unit_id: &str) -> Result<Vec<KnowledgeLineage>> {
        let lineages = self.lineages.read().unwrap();
        Ok(lineages
            .values()
            .filter(|l| l.traces_to(unit_id))
            .cloned()
            .collect())
    }
}

/// In-memory manifest store. Append order is preserved.
#[derive(Default)]
pub struct MemoryManifestStore {
    entries: RwLock<Vec<ContentManifestEntry>>,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManifestRepository for MemoryManifestStore {
    async fn save(&self, entry: &ContentManifestEntry) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        if let Some(existing) = entries.iter_mut().find(|e| e.id == entry.id) {
            *existing = entry.clone();
        } else {
            entries.push(entry.clone());
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ContentManifestEntry>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }

    async fn find_by_resource_id(&self, resource_id: &str) -> Result<Vec<ContentManifestEntry>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn find_by_source_id(&self, source_id: &str) -> Result<Vec<ContentManifestEntry>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn find_by_unit_id(&self, unit_id: &str) -> Result<Vec<ContentManifestEntry>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.semantic_unit_id.as_deref() == Some(unit_id))
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> Result<Vec<ContentManifestEntry>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.clone())
    }
}

/// Event publisher that retains everything published, for assertions.
#[derive(Default)]
pub struct MemoryEventLog {
    events: RwLock<Vec<DomainEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far, in publish order.
    pub fn published(&self) -> Vec<DomainEvent> {
        self.events.read().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventLog {
    async fn publish_all(&self, events: &[DomainEvent]) -> Result<()> {
        let mut log = self.events.write().unwrap();
        log.extend_from_slice(events);
        Ok(())
    }
}
