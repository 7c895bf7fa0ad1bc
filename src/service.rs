//! Granular catalog operations over the repositories.
//!
//! `KnowledgeService` is the write path for unit and lineage
//! aggregates: load, mutate, save, then publish the drained domain
//! events fire-and-forget. Everything here is usable outside the
//! pipeline — the orchestrator composes these same operations.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::error::{KnowledgeError, Result};
use crate::events::EventPublisher;
use crate::lineage::{KnowledgeLineage, Trace, Transformation, TransformationType};
use crate::models::{UnitSource, UnitVersion};
use crate::store::{KnowledgeLineageRepository, SemanticUnitRepository};
use crate::unit::SemanticUnit;

const STORE_READ_FAILED: &str = "STORE_READ_FAILED";
const STORE_WRITE_FAILED: &str = "STORE_WRITE_FAILED";

/// Catalog write/read operations over unit and lineage aggregates.
pub struct KnowledgeService {
    units: Arc<dyn SemanticUnitRepository>,
    lineages: Arc<dyn KnowledgeLineageRepository>,
    events: Arc<dyn EventPublisher>,
}

impl KnowledgeService {
    pub fn new(
        units: Arc<dyn SemanticUnitRepository>,
        lineages: Arc<dyn KnowledgeLineageRepository>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            units,
            lineages,
            events,
        }
    }

    /// Create a unit in `Draft`. Rejects duplicate ids.
    pub async fn create_unit(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
        tags: Vec<String>,
    ) -> Result<SemanticUnit> {
        let exists = self
            .units
            .exists(id)
            .await
            .map_err(|e| KnowledgeError::operation_failed(STORE_READ_FAILED, e))?;
        if exists {
            return Err(KnowledgeError::AlreadyExists(format!(
                "unit '{id}' already exists"
            )));
        }
        let mut unit = SemanticUnit::new(id, name)?;
        if let Some(desc) = description {
            unit.set_description(desc);
        }
        if !tags.is_empty() {
            unit.set_tags(tags);
        }
        self.persist(&mut unit).await?;
        Ok(unit)
    }

    /// Load a unit, failing with not-found if absent.
    pub async fn get_unit(&self, unit_id: &str) -> Result<SemanticUnit> {
        self.units
            .find_by_id(unit_id)
            .await
            .map_err(|e| KnowledgeError::operation_failed(STORE_READ_FAILED, e))?
            .ok_or_else(|| KnowledgeError::NotFound(format!("unit '{unit_id}' not found")))
    }

    /// Attach a source to a unit, allocating a new version.
    pub async fn attach_source(
        &self,
        unit_id: &str,
        source: UnitSource,
        processing_profile_id: &str,
        processing_profile_version: u32,
    ) -> Result<UnitVersion> {
        let mut unit = self.get_unit(unit_id).await?;
        let version = unit
            .attach_source(source, processing_profile_id, processing_profile_version)?
            .clone();
        self.persist(&mut unit).await?;
        Ok(version)
    }

    /// Remove a source from a unit's active set (it stays pooled).
    pub async fn detach_source(&self, unit_id: &str, source_id: &str) -> Result<UnitVersion> {
        let mut unit = self.get_unit(unit_id).await?;
        let version = unit.detach_source(source_id)?.clone();
        self.persist(&mut unit).await?;
        Ok(version)
    }

    /// Rebuild a unit's current content under a new processing profile.
    pub async fn reprocess(
        &self,
        unit_id: &str,
        processing_profile_id: &str,
        processing_profile_version: u32,
        reason: &str,
    ) -> Result<UnitVersion> {
        let mut unit = self.get_unit(unit_id).await?;
        let version = unit
            .reprocess(processing_profile_id, processing_profile_version, reason)?
            .clone();
        self.persist(&mut unit).await?;
        Ok(version)
    }

    /// Move a unit's current-version pointer.
    pub async fn rollback(&self, unit_id: &str, target_version: u32) -> Result<UnitVersion> {
        let mut unit = self.get_unit(unit_id).await?;
        unit.rollback(target_version)?;
        let version = unit
            .current_version()
            .cloned()
            .ok_or_else(|| KnowledgeError::NotFound(format!("unit '{unit_id}' has no versions")))?;
        self.persist(&mut unit).await?;
        Ok(version)
    }

    /// Record one produced projection id on the current version.
    pub async fn record_projection(
        &self,
        unit_id: &str,
        source_id: &str,
        projection_id: &str,
    ) -> Result<()> {
        let mut unit = self.get_unit(unit_id).await?;
        unit.record_projection(source_id, projection_id)?;
        self.persist(&mut unit).await
    }

    /// Transition a unit to `Active`.
    pub async fn activate(&self, unit_id: &str) -> Result<()> {
        let mut unit = self.get_unit(unit_id).await?;
        unit.activate()?;
        self.persist(&mut unit).await
    }

    /// Transition a unit to `Deprecated`, recording the reason.
    pub async fn deprecate(&self, unit_id: &str, reason: &str) -> Result<()> {
        let mut unit = self.get_unit(unit_id).await?;
        unit.deprecate(reason)?;
        self.persist(&mut unit).await
    }

    /// Transition a unit to the terminal `Archived` state.
    pub async fn archive(&self, unit_id: &str) -> Result<()> {
        let mut unit = self.get_unit(unit_id).await?;
        unit.archive()?;
        self.persist(&mut unit).await
    }

    /// Append a transformation to a unit's lineage, creating the
    /// lineage aggregate lazily.
    pub async fn register_transformation(
        &self,
        unit_id: &str,
        transformation_type: TransformationType,
        strategy_used: &str,
        input_version: Option<u32>,
        output_version: u32,
        parameters: Value,
    ) -> Result<Transformation> {
        let mut lineage = self.load_or_create_lineage(unit_id).await?;
        let transformation = lineage
            .register_transformation(
                transformation_type,
                strategy_used,
                input_version,
                output_version,
                parameters,
            )?
            .clone();
        self.save_lineage(&lineage).await?;
        Ok(transformation)
    }

    /// Add a trace edge between two existing units.
    pub async fn link_units(
        &self,
        from_unit_id: &str,
        to_unit_id: &str,
        relationship: &str,
    ) -> Result<Trace> {
        for id in [from_unit_id, to_unit_id] {
            let exists = self
                .units
                .exists(id)
                .await
                .map_err(|e| KnowledgeError::operation_failed(STORE_READ_FAILED, e))?;
            if !exists {
                return Err(KnowledgeError::NotFound(format!("unit '{id}' not found")));
            }
        }
        let mut lineage = self.load_or_create_lineage(from_unit_id).await?;
        let trace = lineage.add_trace(to_unit_id, relationship)?.clone();
        self.save_lineage(&lineage).await?;
        Ok(trace)
    }

    /// Union of a unit's outbound and inbound traces, deduplicated by
    /// `(from, to, relationship)` and optionally filtered by label.
    pub async fn get_linked_units(
        &self,
        unit_id: &str,
        relationship: Option<&str>,
    ) -> Result<Vec<Trace>> {
        let mut traces: Vec<Trace> = Vec::new();

        if let Some(lineage) = self
            .lineages
            .find_by_unit_id(unit_id)
            .await
            .map_err(|e| KnowledgeError::operation_failed(STORE_READ_FAILED, e))?
        {
            traces.extend(lineage.traces().iter().cloned());
        }

        let inbound = self
            .lineages
            .find_by_trace_target(unit_id)
            .await
            .map_err(|e| KnowledgeError::operation_failed(STORE_READ_FAILED, e))?;
        for lineage in inbound {
            traces.extend(
                lineage
                    .traces()
                    .iter()
                    .filter(|t| t.to_unit_id == unit_id)
                    .cloned(),
            );
        }

        let mut seen: Vec<(String, String, String)> = Vec::new();
        traces.retain(|t| {
            let key = (
                t.from_unit_id.clone(),
                t.to_unit_id.clone(),
                t.relationship.clone(),
            );
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });

        if let Some(label) = relationship {
            traces.retain(|t| t.relationship == label);
        }
        Ok(traces)
    }

    /// The lineage aggregate owned by a unit. Not-found until the first
    /// transformation or trace creates it.
    pub async fn get_lineage_for_unit(&self, unit_id: &str) -> Result<KnowledgeLineage> {
        self.lineages
            .find_by_unit_id(unit_id)
            .await
            .map_err(|e| KnowledgeError::operation_failed(STORE_READ_FAILED, e))?
            .ok_or_else(|| {
                KnowledgeError::NotFound(format!("no lineage recorded for unit '{unit_id}'"))
            })
    }

    async fn load_or_create_lineage(&self, unit_id: &str) -> Result<KnowledgeLineage> {
        let existing = self
            .lineages
            .find_by_unit_id(unit_id)
            .await
            .map_err(|e| KnowledgeError::operation_failed(STORE_READ_FAILED, e))?;
        Ok(existing.unwrap_or_else(|| KnowledgeLineage::new(unit_id)))
    }

    async fn save_lineage(&self, lineage: &KnowledgeLineage) -> Result<()> {
        self.lineages
            .save(lineage)
            .await
            .map_err(|e| KnowledgeError::operation_failed(STORE_WRITE_FAILED, e))
    }

    /// Save the aggregate, then publish its drained events. A publish
    /// failure is logged and discarded; persistence has already
    /// happened and events are not required for reconstruction.
    async fn persist(&self, unit: &mut SemanticUnit) -> Result<()> {
        let events = unit.take_events();
        self.units
            .save(unit)
            .await
            .map_err(|e| KnowledgeError::operation_failed(STORE_WRITE_FAILED, e))?;
        if !events.is_empty() {
            if let Err(e) = self.events.publish_all(&events).await {
                warn!(unit_id = unit.id(), error = %e, "event publish failed; continuing");
            }
        }
        Ok(())
    }
}
