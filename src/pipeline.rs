//! Multi-step pipeline orchestration with partial-failure tracking.
//!
//! Coordinates the end-to-end flow: ingestion (extract text) → catalog
//! mutation (create/attach, allocate a version) → processing (chunk and
//! embed under the version's profile) → projection/lineage bookkeeping
//! → audit manifest. There is no cross-step rollback: each step runs
//! against a separate subsystem, so the orchestrator tracks completed
//! steps explicitly and reports, for any failure, exactly which steps
//! already committed side effects.
//!
//! Manifest persistence is strictly best-effort. A manifest write
//! failure is logged and swallowed; the pipeline's own result is
//! determined solely by the domain steps.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{
    IngestOutcome, IngestRequest, IngestionService, ProcessOutcome, ProcessRequest,
    ProcessingService,
};
use crate::error::KnowledgeError;
use crate::lineage::TransformationType;
use crate::manifest::ContentManifestEntry;
use crate::models::UnitSource;
use crate::service::KnowledgeService;
use crate::store::ManifestRepository;

/// One stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Ingestion,
    Cataloging,
    AddSource,
    Processing,
}

impl PipelineStep {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStep::Ingestion => "ingestion",
            PipelineStep::Cataloging => "cataloging",
            PipelineStep::AddSource => "add_source",
            PipelineStep::Processing => "processing",
        }
    }

    fn code_fragment(self) -> &'static str {
        match self {
            PipelineStep::Ingestion => "INGESTION",
            PipelineStep::Cataloging => "CATALOGING",
            PipelineStep::AddSource => "ADD_SOURCE",
            PipelineStep::Processing => "PROCESSING",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which workflow produced an error; selects the error-code namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Workflow {
    /// `execute`: new unit from a new resource.
    Full,
    /// `ingest_and_add_source` / `process_unit`: existing unit.
    Management,
}

impl Workflow {
    fn code_prefix(self) -> &'static str {
        match self {
            Workflow::Full => "PIPELINE",
            Workflow::Management => "MANAGEMENT",
        }
    }
}

/// Structured failure of one pipeline run.
///
/// Always names the first step that failed and the exact ordered list
/// of steps that committed before it — the contract client code relies
/// on for "ingestion succeeded, processing failed" messages.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineError {
    pub step: PipelineStep,
    /// Namespaced machine-readable code, e.g. `PIPELINE_PROCESSING_FAILED`.
    pub code: String,
    pub message: String,
    pub completed_steps: Vec<PipelineStep>,
    pub original_code: Option<String>,
    pub original_message: Option<String>,
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for PipelineError {}

/// Input for the full pipeline: ingest a brand-new resource, create a
/// brand-new unit, attach the source, process it.
#[derive(Debug, Clone)]
pub struct ExecutePipelineInput {
    /// Opt-in to manifest auditing by supplying a resource id.
    pub resource_id: Option<String>,
    /// Generated when absent.
    pub source_id: Option<String>,
    pub source_name: String,
    pub uri: String,
    pub source_type: String,
    pub extraction_job_id: Option<String>,
    /// Generated when absent.
    pub unit_id: Option<String>,
    /// Defaults to the source name.
    pub unit_name: Option<String>,
    pub tags: Vec<String>,
    pub processing_profile_id: String,
    pub processing_profile_version: u32,
}

/// Successful full-pipeline result.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSuccess {
    pub unit_id: String,
    pub source_id: String,
    pub version: u32,
    pub projection_id: String,
    /// Absent when no resource id was supplied or the audit write failed.
    pub manifest_id: Option<String>,
    pub chunks_count: u32,
    pub embedding_dimensions: u32,
    pub embedding_model: String,
    pub completed_steps: Vec<PipelineStep>,
}

/// Input for the incremental pipeline: ingest a resource and attach it
/// to an existing unit.
#[derive(Debug, Clone)]
pub struct IngestAndAddSourceInput {
    pub unit_id: String,
    pub resource_id: Option<String>,
    pub source_id: Option<String>,
    pub source_name: String,
    pub uri: String,
    pub source_type: String,
    pub extraction_job_id: Option<String>,
    pub processing_profile_id: String,
    pub processing_profile_version: u32,
}

/// Successful incremental-pipeline result.
#[derive(Debug, Clone, Serialize)]
pub struct IngestAndAddSourceSuccess {
    pub unit_id: String,
    pub source_id: String,
    pub version: u32,
    pub projection_id: String,
    pub manifest_id: Option<String>,
    pub chunks_count: u32,
    pub embedding_dimensions: u32,
    pub embedding_model: String,
    pub completed_steps: Vec<PipelineStep>,
}

/// Successful standalone processing run over a unit's current version.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessUnitSuccess {
    pub unit_id: String,
    pub version: u32,
    /// One projection id per active source, in snapshot order.
    pub projection_ids: Vec<String>,
}

/// Manifest lookup request; exactly one key is honored, in priority
/// order manifest-id > resource-id > source-id > unit-id > all.
#[derive(Debug, Clone, Default)]
pub struct ManifestQuery {
    pub manifest_id: Option<String>,
    pub resource_id: Option<String>,
    pub source_id: Option<String>,
    pub semantic_unit_id: Option<String>,
}

/// Stateless coordinator for the ingestion/cataloging/processing flow.
pub struct PipelineOrchestrator {
    ingestion: Arc<dyn IngestionService>,
    processing: Arc<dyn ProcessingService>,
    knowledge: Arc<KnowledgeService>,
    manifests: Arc<dyn ManifestRepository>,
}

impl PipelineOrchestrator {
    pub fn new(
        ingestion: Arc<dyn IngestionService>,
        processing: Arc<dyn ProcessingService>,
        knowledge: Arc<KnowledgeService>,
        manifests: Arc<dyn ManifestRepository>,
    ) -> Self {
        Self {
            ingestion,
            processing,
            knowledge,
            manifests,
        }
    }

    /// Full pipeline: ingest, create a unit, attach the source, process.
    ///
    /// Steps: `ingestion → cataloging → processing` (attaching the
    /// source is implicit in cataloging).
    pub async fn execute(
        &self,
        input: ExecutePipelineInput,
    ) -> Result<PipelineSuccess, PipelineError> {
        let workflow = Workflow::Full;
        let source_id = input
            .source_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut completed: Vec<PipelineStep> = Vec::new();
        let mut audit = self.start_audit(input.resource_id.as_deref(), &source_id);
        if let Some(m) = audit.as_mut() {
            m.extraction_job_id = input.extraction_job_id.clone();
        }

        // Step 1: ingestion
        let outcome = match self
            .ingest(&input.source_name, &source_id, &input.uri, &input.source_type, input.extraction_job_id.clone())
            .await
        {
            Ok(o) => o,
            Err(e) => {
                return Err(self
                    .step_failed(workflow, PipelineStep::Ingestion, &completed, None, e, audit)
                    .await)
            }
        };
        completed.push(PipelineStep::Ingestion);
        if let Some(m) = audit.as_mut() {
            m.content_hash = Some(outcome.content_hash.clone());
            m.extracted_length = Some(outcome.extracted_text.len());
        }

        // Step 2: cataloging (create unit, attach source, allocate version 1)
        let unit_id = input
            .unit_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let unit_name = input
            .unit_name
            .clone()
            .unwrap_or_else(|| input.source_name.clone());
        let version = match self
            .catalog(&input, &unit_id, &unit_name, &source_id, &outcome)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                return Err(self
                    .domain_step_failed(workflow, PipelineStep::Cataloging, &completed, e, audit)
                    .await)
            }
        };
        completed.push(PipelineStep::Cataloging);
        if let Some(m) = audit.as_mut() {
            m.semantic_unit_id = Some(unit_id.clone());
        }
        info!(unit_id = %unit_id, version, "cataloged new unit");

        // Step 3: processing (chunk + embed, record projection, log lineage)
        let processed = match self
            .process_source(
                workflow,
                &unit_id,
                version,
                None,
                &source_id,
                &outcome.extracted_text,
                &outcome.content_type,
                &input.processing_profile_id,
                input.processing_profile_version,
                &completed,
            )
            .await
        {
            Ok(p) => p,
            Err(err) => return Err(self.finish_failed(audit, err).await),
        };
        completed.push(PipelineStep::Processing);

        let manifest_id = self
            .finish_complete(audit, &completed, &processed)
            .await;

        Ok(PipelineSuccess {
            unit_id,
            source_id,
            version,
            projection_id: processed.projection_id,
            manifest_id,
            chunks_count: processed.chunks_count,
            embedding_dimensions: processed.dimensions,
            embedding_model: processed.model,
            completed_steps: completed,
        })
    }

    /// Incremental pipeline: ingest a resource and attach it to an
    /// existing unit, then process it.
    ///
    /// Steps: `ingestion → add_source → processing`.
    pub async fn ingest_and_add_source(
        &self,
        input: IngestAndAddSourceInput,
    ) -> Result<IngestAndAddSourceSuccess, PipelineError> {
        let workflow = Workflow::Management;
        let source_id = input
            .source_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut completed: Vec<PipelineStep> = Vec::new();
        let mut audit = self.start_audit(input.resource_id.as_deref(), &source_id);
        if let Some(m) = audit.as_mut() {
            m.extraction_job_id = input.extraction_job_id.clone();
            m.semantic_unit_id = Some(input.unit_id.clone());
        }

        // Step 1: ingestion
        let outcome = match self
            .ingest(&input.source_name, &source_id, &input.uri, &input.source_type, input.extraction_job_id.clone())
            .await
        {
            Ok(o) => o,
            Err(e) => {
                return Err(self
                    .step_failed(workflow, PipelineStep::Ingestion, &completed, None, e, audit)
                    .await)
            }
        };
        completed.push(PipelineStep::Ingestion);
        if let Some(m) = audit.as_mut() {
            m.content_hash = Some(outcome.content_hash.clone());
            m.extracted_length = Some(outcome.extracted_text.len());
        }

        // Step 2: attach to the existing unit
        let source = UnitSource {
            source_id: source_id.clone(),
            name: input.source_name.clone(),
            source_type: outcome.content_type.clone(),
            content: outcome.extracted_text.clone(),
            content_hash: outcome.content_hash.clone(),
            attached_at: Utc::now(),
        };
        let version = match self
            .knowledge
            .attach_source(
                &input.unit_id,
                source,
                &input.processing_profile_id,
                input.processing_profile_version,
            )
            .await
        {
            Ok(v) => v.version,
            Err(e) => {
                return Err(self
                    .domain_step_failed(workflow, PipelineStep::AddSource, &completed, e, audit)
                    .await)
            }
        };
        completed.push(PipelineStep::AddSource);
        let input_version = version.checked_sub(1).filter(|v| *v > 0);

        // Step 3: processing
        let processed = match self
            .process_source(
                workflow,
                &input.unit_id,
                version,
                input_version,
                &source_id,
                &outcome.extracted_text,
                &outcome.content_type,
                &input.processing_profile_id,
                input.processing_profile_version,
                &completed,
            )
            .await
        {
            Ok(p) => p,
            Err(err) => return Err(self.finish_failed(audit, err).await),
        };
        completed.push(PipelineStep::Processing);

        let manifest_id = self
            .finish_complete(audit, &completed, &processed)
            .await;

        Ok(IngestAndAddSourceSuccess {
            unit_id: input.unit_id,
            source_id,
            version,
            projection_id: processed.projection_id,
            manifest_id,
            chunks_count: processed.chunks_count,
            embedding_dimensions: processed.dimensions,
            embedding_model: processed.model,
            completed_steps: completed,
        })
    }

    /// Standalone processing over a unit's current version.
    ///
    /// Recovery path for a run that failed after cataloging: every
    /// active source of the current version is chunked and embedded
    /// under the version's recorded profile. No manifest is written —
    /// there is no resource-level run to audit.
    pub async fn process_unit(&self, unit_id: &str) -> Result<ProcessUnitSuccess, PipelineError> {
        let workflow = Workflow::Management;
        let completed: Vec<PipelineStep> = Vec::new();

        let unit = match self.knowledge.get_unit(unit_id).await {
            Ok(u) => u,
            Err(e) => {
                return Err(self
                    .domain_step_failed(workflow, PipelineStep::Processing, &completed, e, None)
                    .await)
            }
        };
        let current = match unit.current_version() {
            Some(v) => v.clone(),
            None => {
                let err = KnowledgeError::InvalidState(format!(
                    "unit '{unit_id}' has no versions to process"
                ));
                return Err(self
                    .domain_step_failed(workflow, PipelineStep::Processing, &completed, err, None)
                    .await);
            }
        };

        let mut projection_ids = Vec::new();
        for snapshot in &current.source_snapshots {
            let pooled = match unit.source(&snapshot.source_id) {
                Some(s) => s.clone(),
                None => {
                    let err = KnowledgeError::NotFound(format!(
                        "source '{}' missing from pool of unit '{unit_id}'",
                        snapshot.source_id
                    ));
                    return Err(self
                        .domain_step_failed(
                            workflow,
                            PipelineStep::Processing,
                            &completed,
                            err,
                            None,
                        )
                        .await);
                }
            };
            let processed = match self
                .process_source(
                    workflow,
                    unit_id,
                    current.version,
                    None,
                    &snapshot.source_id,
                    &pooled.content,
                    &pooled.source_type,
                    &current.processing_profile_id,
                    current.processing_profile_version,
                    &completed,
                )
                .await
            {
                Ok(p) => p,
                Err(err) => return Err(err),
            };
            projection_ids.push(processed.projection_id);
        }

        Ok(ProcessUnitSuccess {
            unit_id: unit_id.to_string(),
            version: current.version,
            projection_ids,
        })
    }

    /// Run N full pipelines concurrently with all-settled semantics:
    /// one item's failure never cancels or affects its siblings.
    pub async fn execute_batch(
        &self,
        inputs: Vec<ExecutePipelineInput>,
    ) -> Vec<Result<PipelineSuccess, PipelineError>> {
        join_all(inputs.into_iter().map(|input| self.execute(input))).await
    }

    /// Run N incremental pipelines concurrently, all-settled.
    pub async fn ingest_and_add_source_batch(
        &self,
        inputs: Vec<IngestAndAddSourceInput>,
    ) -> Vec<Result<IngestAndAddSourceSuccess, PipelineError>> {
        join_all(
            inputs
                .into_iter()
                .map(|input| self.ingest_and_add_source(input)),
        )
        .await
    }

    /// Look up manifests by exactly one key, in priority order
    /// manifest-id > resource-id > source-id > unit-id, falling back to
    /// all entries when no key is supplied.
    pub async fn get_manifest(
        &self,
        query: ManifestQuery,
    ) -> Result<Vec<ContentManifestEntry>, KnowledgeError> {
        let read_failed =
            |e: anyhow::Error| KnowledgeError::operation_failed("MANIFEST_READ_FAILED", e);

        if let Some(id) = query.manifest_id {
            let entry = self
                .manifests
                .find_by_id(&id)
                .await
                .map_err(read_failed)?
                .ok_or_else(|| KnowledgeError::NotFound(format!("manifest '{id}' not found")))?;
            return Ok(vec![entry]);
        }
        if let Some(resource_id) = query.resource_id {
            return self
                .manifests
                .find_by_resource_id(&resource_id)
                .await
                .map_err(read_failed);
        }
        if let Some(source_id) = query.source_id {
            return self
                .manifests
                .find_by_source_id(&source_id)
                .await
                .map_err(read_failed);
        }
        if let Some(unit_id) = query.semantic_unit_id {
            return self
                .manifests
                .find_by_unit_id(&unit_id)
                .await
                .map_err(read_failed);
        }
        self.manifests.find_all().await.map_err(read_failed)
    }

    async fn ingest(
        &self,
        source_name: &str,
        source_id: &str,
        uri: &str,
        source_type: &str,
        extraction_job_id: Option<String>,
    ) -> Result<IngestOutcome, String> {
        self.ingestion
            .ingest_and_extract(IngestRequest {
                source_id: source_id.to_string(),
                source_name: source_name.to_string(),
                uri: uri.to_string(),
                source_type: source_type.to_string(),
                extraction_job_id,
            })
            .await
            .map_err(|e| e.to_string())
    }

    async fn catalog(
        &self,
        input: &ExecutePipelineInput,
        unit_id: &str,
        unit_name: &str,
        source_id: &str,
        outcome: &IngestOutcome,
    ) -> Result<u32, KnowledgeError> {
        self.knowledge
            .create_unit(unit_id, unit_name, None, input.tags.clone())
            .await?;
        let source = UnitSource {
            source_id: source_id.to_string(),
            name: input.source_name.clone(),
            source_type: outcome.content_type.clone(),
            content: outcome.extracted_text.clone(),
            content_hash: outcome.content_hash.clone(),
            attached_at: Utc::now(),
        };
        let version = self
            .knowledge
            .attach_source(
                unit_id,
                source,
                &input.processing_profile_id,
                input.processing_profile_version,
            )
            .await?;
        Ok(version.version)
    }

    /// Chunk + embed one source and record the results: projection id
    /// onto the current version's snapshot, transformation into the
    /// lineage log. All of it belongs to the processing step; any
    /// failure fails that step.
    #[allow(clippy::too_many_arguments)]
    async fn process_source(
        &self,
        workflow: Workflow,
        unit_id: &str,
        version: u32,
        input_version: Option<u32>,
        source_id: &str,
        content: &str,
        content_type: &str,
        profile_id: &str,
        profile_version: u32,
        completed: &[PipelineStep],
    ) -> Result<ProcessOutcome, PipelineError> {
        let projection_id = Uuid::new_v4().to_string();
        let outcome = match self
            .processing
            .process_content(ProcessRequest {
                projection_id: projection_id.clone(),
                semantic_unit_id: unit_id.to_string(),
                semantic_unit_version: version,
                content: content.to_string(),
                content_type: content_type.to_string(),
                processing_profile_id: profile_id.to_string(),
                processing_profile_version: profile_version,
            })
            .await
        {
            Ok(o) => o,
            Err(e) => {
                return Err(self.build_error(
                    workflow,
                    PipelineStep::Processing,
                    completed,
                    None,
                    e.to_string(),
                ))
            }
        };

        if let Err(e) = self
            .knowledge
            .record_projection(unit_id, source_id, &outcome.projection_id)
            .await
        {
            return Err(self.build_error(
                workflow,
                PipelineStep::Processing,
                completed,
                Some(e.kind().to_string()),
                e.to_string(),
            ));
        }

        if let Err(e) = self
            .knowledge
            .register_transformation(
                unit_id,
                TransformationType::Embedding,
                profile_id,
                input_version,
                version,
                json!({
                    "model": outcome.model,
                    "dimensions": outcome.dimensions,
                    "chunks": outcome.chunks_count,
                    "profile_version": profile_version,
                }),
            )
            .await
        {
            return Err(self.build_error(
                workflow,
                PipelineStep::Processing,
                completed,
                Some(e.kind().to_string()),
                e.to_string(),
            ));
        }

        debug!(unit_id, source_id, chunks = outcome.chunks_count, "processed source");
        Ok(outcome)
    }

    fn start_audit(
        &self,
        resource_id: Option<&str>,
        source_id: &str,
    ) -> Option<ContentManifestEntry> {
        resource_id.map(|rid| ContentManifestEntry::started(rid, source_id))
    }

    fn build_error(
        &self,
        workflow: Workflow,
        step: PipelineStep,
        completed: &[PipelineStep],
        original_code: Option<String>,
        original_message: String,
    ) -> PipelineError {
        let code = format!("{}_{}_FAILED", workflow.code_prefix(), step.code_fragment());
        warn!(%code, completed = ?completed, "pipeline step failed");
        PipelineError {
            step,
            code,
            message: format!("{step} failed: {original_message}"),
            completed_steps: completed.to_vec(),
            original_code,
            original_message: Some(original_message),
        }
    }

    /// Build the step error and persist a failed-run manifest,
    /// best-effort.
    async fn step_failed(
        &self,
        workflow: Workflow,
        step: PipelineStep,
        completed: &[PipelineStep],
        original_code: Option<String>,
        original_message: String,
        audit: Option<ContentManifestEntry>,
    ) -> PipelineError {
        let error = self.build_error(workflow, step, completed, original_code, original_message);
        self.finish_failed(audit, error).await
    }

    async fn domain_step_failed(
        &self,
        workflow: Workflow,
        step: PipelineStep,
        completed: &[PipelineStep],
        err: KnowledgeError,
        audit: Option<ContentManifestEntry>,
    ) -> PipelineError {
        self.step_failed(
            workflow,
            step,
            completed,
            Some(err.kind().to_string()),
            err.to_string(),
            audit,
        )
        .await
    }

    /// Write the failed-run manifest (if auditing) and return the error
    /// unchanged — the manifest outcome never alters the result.
    async fn finish_failed(
        &self,
        audit: Option<ContentManifestEntry>,
        error: PipelineError,
    ) -> PipelineError {
        if let Some(entry) = audit {
            let entry = entry.failed(
                error.step.to_string(),
                error.completed_steps.iter().map(|s| s.to_string()).collect(),
            );
            self.write_manifest(entry).await;
        }
        error
    }

    /// Write the completed-run manifest, best-effort, returning its id
    /// when the write succeeded.
    async fn finish_complete(
        &self,
        audit: Option<ContentManifestEntry>,
        completed: &[PipelineStep],
        processed: &ProcessOutcome,
    ) -> Option<String> {
        let mut entry = audit?;
        entry.projection_id = Some(processed.projection_id.clone());
        entry.chunks_count = Some(processed.chunks_count);
        entry.embedding_dimensions = Some(processed.dimensions);
        entry.embedding_model = Some(processed.model.clone());
        let entry = entry.complete(completed.iter().map(|s| s.to_string()).collect());
        self.write_manifest(entry).await
    }

    async fn write_manifest(&self, entry: ContentManifestEntry) -> Option<String> {
        let id = entry.id.clone();
        match self.manifests.save(&entry).await {
            Ok(()) => Some(id),
            Err(e) => {
                warn!(error = %e, "manifest write failed; pipeline result unaffected");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_labels() {
        assert_eq!(PipelineStep::Ingestion.to_string(), "ingestion");
        assert_eq!(PipelineStep::Cataloging.to_string(), "cataloging");
        assert_eq!(PipelineStep::AddSource.to_string(), "add_source");
        assert_eq!(PipelineStep::Processing.to_string(), "processing");
    }

    #[test]
    fn test_error_codes_are_namespaced_by_workflow() {
        assert_eq!(Workflow::Full.code_prefix(), "PIPELINE");
        assert_eq!(Workflow::Management.code_prefix(), "MANAGEMENT");
        assert_eq!(PipelineStep::Processing.code_fragment(), "PROCESSING");
    }
}
