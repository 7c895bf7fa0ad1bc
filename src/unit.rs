//! The `SemanticUnit` aggregate root.
//!
//! A unit owns its lifecycle state, the full source pool, the ordered
//! version chain, and the movable current-version pointer. It is the
//! only component that may create a [`UnitVersion`].
//!
//! The version chain is an arena: a growable list of immutable version
//! records indexed by `version - 1`, plus a separate current-version
//! number. Rollback and roll-forward reassign the number; no version is
//! ever deleted or rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KnowledgeError, Result};
use crate::events::DomainEvent;
use crate::models::{UnitSource, UnitVersion, VersionSourceSnapshot};
use crate::state::{check_transition, UnitState};

/// The top-level versioned knowledge entity: one logical piece of
/// knowledge assembled from one or more sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticUnit {
    id: String,
    name: String,
    description: Option<String>,
    tags: Vec<String>,
    state: UnitState,
    /// Append-only pool; entries are never removed, even after a source
    /// is excluded from newer versions.
    source_pool: Vec<UnitSource>,
    /// Append-only, 1-indexed version chain.
    versions: Vec<UnitVersion>,
    /// 0 while no version exists, otherwise a valid version number.
    current_version_number: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    pending_events: Vec<DomainEvent>,
}

impl SemanticUnit {
    /// Create a new unit in `Draft` with no sources and no versions.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() {
            return Err(KnowledgeError::Validation("unit id must not be empty".into()));
        }
        if name.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "unit name must not be empty".into(),
            ));
        }
        let now = Utc::now();
        let mut unit = Self {
            id: id.clone(),
            name,
            description: None,
            tags: Vec::new(),
            state: UnitState::Draft,
            source_pool: Vec::new(),
            versions: Vec::new(),
            current_version_number: 0,
            created_at: now,
            updated_at: now,
            pending_events: Vec::new(),
        };
        unit.record_event(DomainEvent::UnitCreated {
            unit_id: id,
            occurred_at: now,
        });
        Ok(unit)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
        self.touch();
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = tags;
        self.touch();
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// All pool entries, in attachment order.
    pub fn source_pool(&self) -> &[UnitSource] {
        &self.source_pool
    }

    /// Pool entry for `source_id`, whether or not it is active in the
    /// current version.
    pub fn source(&self, source_id: &str) -> Option<&UnitSource> {
        self.source_pool.iter().find(|s| s.source_id == source_id)
    }

    /// The full version chain, oldest first.
    pub fn versions(&self) -> &[UnitVersion] {
        &self.versions
    }

    /// Version record with the given number, if it exists.
    pub fn version(&self, number: u32) -> Option<&UnitVersion> {
        if number == 0 {
            return None;
        }
        self.versions.get((number - 1) as usize)
    }

    /// Current version number, `None` while no version exists.
    pub fn current_version_number(&self) -> Option<u32> {
        if self.current_version_number == 0 {
            None
        } else {
            Some(self.current_version_number)
        }
    }

    /// The version the current pointer refers to.
    pub fn current_version(&self) -> Option<&UnitVersion> {
        self.version(self.current_version_number)
    }

    /// Ids of the sources active in the current version.
    pub fn active_source_ids(&self) -> Vec<&str> {
        self.current_version()
            .map(|v| v.active_source_ids())
            .unwrap_or_default()
    }

    /// Drain the events buffered since the last drain.
    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Attach a new source and allocate the next version.
    ///
    /// The new version carries every snapshot active in the current
    /// version plus a fresh snapshot (empty projection ids) for
    /// `source`. Rejected if a source with the same id is already in the
    /// pool, or if the unit is archived.
    pub fn attach_source(
        &mut self,
        source: UnitSource,
        processing_profile_id: &str,
        processing_profile_version: u32,
    ) -> Result<&UnitVersion> {
        self.ensure_mutable("attach_source")?;
        if source.source_id.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "source id must not be empty".into(),
            ));
        }
        if self.source(&source.source_id).is_some() {
            return Err(KnowledgeError::AlreadyExists(format!(
                "source '{}' is already attached to unit '{}'",
                source.source_id, self.id
            )));
        }

        let mut snapshots: Vec<VersionSourceSnapshot> = self
            .current_version()
            .map(|v| v.source_snapshots.clone())
            .unwrap_or_default();
        snapshots.push(VersionSourceSnapshot::new(
            source.source_id.clone(),
            source.content_hash.clone(),
        ));

        let source_id = source.source_id.clone();
        self.source_pool.push(source);
        self.record_event(DomainEvent::SourceAdded {
            unit_id: self.id.clone(),
            source_id: source_id.clone(),
            occurred_at: Utc::now(),
        });

        let reason = format!("attached source '{source_id}'");
        self.allocate_version(
            processing_profile_id,
            processing_profile_version,
            snapshots,
            reason,
        )
    }

    /// Remove a source from the active set by allocating a new version
    /// without it. The source stays in the pool.
    ///
    /// Rejected if `source_id` is not active in the current version, or
    /// if it is the only active snapshot (a version must reference at
    /// least one source once any version exists).
    pub fn detach_source(&mut self, source_id: &str) -> Result<&UnitVersion> {
        self.ensure_mutable("detach_source")?;
        let current = self.current_version().ok_or_else(|| {
            KnowledgeError::InvalidState(format!(
                "unit '{}' has no versions to detach from",
                self.id
            ))
        })?;
        if current.snapshot(source_id).is_none() {
            return Err(KnowledgeError::NotFound(format!(
                "source '{}' is not active in version {} of unit '{}'",
                source_id, current.version, self.id
            )));
        }
        if current.source_snapshots.len() == 1 {
            return Err(KnowledgeError::InvalidState(format!(
                "cannot remove '{}': it is the last active source of unit '{}'",
                source_id, self.id
            )));
        }

        let snapshots: Vec<VersionSourceSnapshot> = current
            .source_snapshots
            .iter()
            .filter(|s| s.source_id != source_id)
            .cloned()
            .collect();
        let (profile_id, profile_version) = (
            current.processing_profile_id.clone(),
            current.processing_profile_version,
        );

        self.record_event(DomainEvent::SourceRemoved {
            unit_id: self.id.clone(),
            source_id: source_id.to_string(),
            occurred_at: Utc::now(),
        });

        let reason = format!("detached source '{source_id}'");
        self.allocate_version(&profile_id, profile_version, snapshots, reason)
    }

    /// Allocate a new version with the same active sources as the
    /// current one, under a new processing profile, with every
    /// projection-id list reset to empty.
    ///
    /// Used when a chunking/embedding strategy changes and existing
    /// vectors must be regenerated under the new profile.
    pub fn reprocess(
        &mut self,
        processing_profile_id: &str,
        processing_profile_version: u32,
        reason: &str,
    ) -> Result<&UnitVersion> {
        self.ensure_mutable("reprocess")?;
        if reason.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "reprocess reason must not be empty".into(),
            ));
        }
        let current = self.current_version().ok_or_else(|| {
            KnowledgeError::InvalidState(format!(
                "unit '{}' has no versions to reprocess",
                self.id
            ))
        })?;

        let snapshots: Vec<VersionSourceSnapshot> = current
            .source_snapshots
            .iter()
            .map(|s| s.without_projections())
            .collect();

        self.allocate_version(
            processing_profile_id,
            processing_profile_version,
            snapshots,
            reason.to_string(),
        )
    }

    /// Move the current-version pointer to `target_version`.
    ///
    /// Non-destructive: no version is deleted or altered, so rolling
    /// forward again later remains possible.
    pub fn rollback(&mut self, target_version: u32) -> Result<()> {
        if self.version(target_version).is_none() {
            return Err(KnowledgeError::NotFound(format!(
                "unit '{}' has no version {}",
                self.id, target_version
            )));
        }
        let from = self.current_version_number;
        self.current_version_number = target_version;
        self.touch();
        self.record_event(DomainEvent::UnitRolledBack {
            unit_id: self.id.clone(),
            from_version: from,
            to_version: target_version,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Append a projection id to the current version's snapshot for
    /// `source_id`.
    ///
    /// Duplicate ids are not deduplicated; the caller calls this once
    /// per actually-produced projection.
    pub fn record_projection(&mut self, source_id: &str, projection_id: &str) -> Result<()> {
        if projection_id.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "projection id must not be empty".into(),
            ));
        }
        if self.current_version_number == 0 {
            return Err(KnowledgeError::InvalidState(format!(
                "unit '{}' has no versions to record a projection on",
                self.id
            )));
        }
        let unit_id = self.id.clone();
        let current = self.current_version_number;
        let version = &mut self.versions[(current - 1) as usize];
        let snapshot = version
            .source_snapshots
            .iter_mut()
            .find(|s| s.source_id == source_id)
            .ok_or_else(|| {
                KnowledgeError::NotFound(format!(
                    "source '{source_id}' is not active in version {current} of unit '{unit_id}'"
                ))
            })?;
        snapshot.projection_ids.push(projection_id.to_string());
        self.touch();
        self.record_event(DomainEvent::ProjectionRecorded {
            unit_id,
            source_id: source_id.to_string(),
            projection_id: projection_id.to_string(),
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Transition `Draft -> Active` (or `Deprecated -> Active`).
    pub fn activate(&mut self) -> Result<()> {
        self.state = check_transition(self.state, UnitState::Active)?;
        self.touch();
        Ok(())
    }

    /// Transition `Active -> Deprecated`, recording the reason.
    pub fn deprecate(&mut self, reason: &str) -> Result<()> {
        if reason.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "deprecation reason must not be empty".into(),
            ));
        }
        self.state = check_transition(self.state, UnitState::Deprecated)?;
        self.touch();
        self.record_event(DomainEvent::UnitDeprecated {
            unit_id: self.id.clone(),
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Transition into the terminal `Archived` state. Archived units
    /// reject all further content mutation.
    pub fn archive(&mut self) -> Result<()> {
        self.state = check_transition(self.state, UnitState::Archived)?;
        self.touch();
        self.record_event(DomainEvent::UnitArchived {
            unit_id: self.id.clone(),
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    fn ensure_mutable(&self, operation: &str) -> Result<()> {
        if self.state == UnitState::Archived {
            return Err(KnowledgeError::InvalidState(format!(
                "unit '{}' is archived; {operation} is not allowed",
                self.id
            )));
        }
        Ok(())
    }

    fn allocate_version(
        &mut self,
        processing_profile_id: &str,
        processing_profile_version: u32,
        source_snapshots: Vec<VersionSourceSnapshot>,
        reason: String,
    ) -> Result<&UnitVersion> {
        let number = self.versions.len() as u32 + 1;
        let version = UnitVersion {
            version: number,
            processing_profile_id: processing_profile_id.to_string(),
            processing_profile_version,
            source_snapshots,
            created_at: Utc::now(),
            reason: reason.clone(),
        };
        self.versions.push(version);
        self.current_version_number = number;
        self.touch();
        self.record_event(DomainEvent::UnitVersioned {
            unit_id: self.id.clone(),
            version: number,
            reason,
            occurred_at: Utc::now(),
        });
        Ok(&self.versions[(number - 1) as usize])
    }

    fn record_event(&mut self, event: DomainEvent) {
        self.pending_events.push(event);
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
