//! Pipeline run audit records.
//!
//! A [`ContentManifestEntry`] captures the outcome of one pipeline run:
//! which steps completed, where it failed, and the extraction/embedding
//! metrics gathered along the way. Manifests are written best-effort by
//! the orchestrator and are never authoritative state — their absence
//! or a write failure must not change the pipeline's own result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of the pipeline run the manifest describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    Complete,
    Failed,
    Partial,
}

/// Best-effort audit record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentManifestEntry {
    pub id: String,
    /// Caller-supplied resource identifier. Manifest recording is opted
    /// into by supplying one.
    pub resource_id: String,
    pub source_id: String,
    pub extraction_job_id: Option<String>,
    pub semantic_unit_id: Option<String>,
    pub projection_id: Option<String>,
    pub status: ManifestStatus,
    /// Ordered step names that committed before the run ended.
    pub completed_steps: Vec<String>,
    pub failed_step: Option<String>,
    pub content_hash: Option<String>,
    pub extracted_length: Option<usize>,
    pub chunks_count: Option<u32>,
    pub embedding_dimensions: Option<u32>,
    pub embedding_model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ContentManifestEntry {
    /// Start a manifest for a run, with a fresh id and no outcome yet.
    pub fn started(resource_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            resource_id: resource_id.into(),
            source_id: source_id.into(),
            extraction_job_id: None,
            semantic_unit_id: None,
            projection_id: None,
            status: ManifestStatus::Partial,
            completed_steps: Vec::new(),
            failed_step: None,
            content_hash: None,
            extracted_length: None,
            chunks_count: None,
            embedding_dimensions: None,
            embedding_model: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Mark the run complete with the steps that committed.
    pub fn complete(mut self, completed_steps: Vec<String>) -> Self {
        self.status = ManifestStatus::Complete;
        self.completed_steps = completed_steps;
        self.failed_step = None;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Mark the run failed at `failed_step`, with the steps that
    /// committed before it.
    pub fn failed(mut self, failed_step: impl Into<String>, completed_steps: Vec<String>) -> Self {
        self.status = ManifestStatus::Failed;
        self.completed_steps = completed_steps;
        self.failed_step = Some(failed_step.into());
        self.completed_at = Some(Utc::now());
        self
    }
}
