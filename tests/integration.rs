//! End-to-end pipeline scenarios against in-memory stores and stub
//! collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use semvault::collaborators::{
    IngestOutcome, IngestRequest, IngestionService, ProcessOutcome, ProcessRequest,
    ProcessingService,
};
use semvault::error::KnowledgeError;
use semvault::manifest::{ContentManifestEntry, ManifestStatus};
use semvault::models::{content_hash, UnitSource};
use semvault::pipeline::{
    ExecutePipelineInput, IngestAndAddSourceInput, ManifestQuery, PipelineOrchestrator,
    PipelineStep,
};
use semvault::service::KnowledgeService;
use semvault::store::memory::{
    MemoryEventLog, MemoryLineageStore, MemoryManifestStore, MemoryUnitStore,
};
use semvault::store::ManifestRepository;

/// Extracts `"extracted from <uri>"`; fails for `fail:` URIs.
struct StubIngestion;

#[async_trait]
impl IngestionService for StubIngestion {
    async fn ingest_and_extract(&self, request: IngestRequest) -> Result<IngestOutcome> {
        if request.uri.starts_with("fail:") {
            bail!("extractor could not open '{}'", request.uri);
        }
        let text = format!("extracted from {}", request.uri);
        Ok(IngestOutcome {
            content_hash: content_hash(&text),
            extracted_text: text,
            content_type: request.source_type,
        })
    }
}

/// Returns fixed metrics; failure is toggled per-instance.
struct StubProcessing {
    fail: AtomicBool,
}

impl StubProcessing {
    fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessingService for StubProcessing {
    async fn process_content(&self, request: ProcessRequest) -> Result<ProcessOutcome> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("embedding provider unavailable");
        }
        Ok(ProcessOutcome {
            projection_id: request.projection_id,
            chunks_count: 3,
            dimensions: 384,
            model: "all-minilm-l6-v2".to_string(),
        })
    }
}

/// Manifest store whose writes always fail; reads are empty.
struct BrokenManifestStore;

#[async_trait]
impl ManifestRepository for BrokenManifestStore {
    async fn save(&self, _entry: &ContentManifestEntry) -> Result<()> {
        bail!("manifest store unavailable")
    }
    async fn find_by_id(&self, _id: &str) -> Result<Option<ContentManifestEntry>> {
        Ok(None)
    }
    async fn find_by_resource_id(&self, _resource_id: &str) -> Result<Vec<ContentManifestEntry>> {
        Ok(Vec::new())
    }
    async fn find_by_source_id(&self, _source_id: &str) -> Result<Vec<ContentManifestEntry>> {
        Ok(Vec::new())
    }
    async fn find_by_unit_id(&self, _unit_id: &str) -> Result<Vec<ContentManifestEntry>> {
        Ok(Vec::new())
    }
    async fn find_all(&self) -> Result<Vec<ContentManifestEntry>> {
        Ok(Vec::new())
    }
}

struct Harness {
    orchestrator: PipelineOrchestrator,
    knowledge: Arc<KnowledgeService>,
    manifests: Arc<MemoryManifestStore>,
    processing: Arc<StubProcessing>,
}

fn harness() -> Harness {
    let units = Arc::new(MemoryUnitStore::new());
    let lineages = Arc::new(MemoryLineageStore::new());
    let events = Arc::new(MemoryEventLog::new());
    let manifests = Arc::new(MemoryManifestStore::new());
    let processing = Arc::new(StubProcessing::new());
    let knowledge = Arc::new(KnowledgeService::new(units, lineages, events));
    let orchestrator = PipelineOrchestrator::new(
        Arc::new(StubIngestion),
        processing.clone(),
        knowledge.clone(),
        manifests.clone(),
    );
    Harness {
        orchestrator,
        knowledge,
        manifests,
        processing,
    }
}

fn pipeline_input(name: &str) -> ExecutePipelineInput {
    ExecutePipelineInput {
        resource_id: Some(format!("res-{name}")),
        source_id: Some(format!("src-{name}")),
        source_name: name.to_string(),
        uri: format!("file:///{name}.txt"),
        source_type: "text".to_string(),
        extraction_job_id: Some(format!("job-{name}")),
        unit_id: Some(format!("unit-{name}")),
        unit_name: None,
        tags: vec!["docs".to_string()],
        processing_profile_id: "profile-default".to_string(),
        processing_profile_version: 1,
    }
}

#[tokio::test]
async fn test_full_pipeline_success() {
    let h = harness();
    let success = h.orchestrator.execute(pipeline_input("alpha")).await.unwrap();

    assert_eq!(success.unit_id, "unit-alpha");
    assert_eq!(success.version, 1);
    assert_eq!(success.chunks_count, 3);
    assert_eq!(success.embedding_dimensions, 384);
    assert_eq!(
        success.completed_steps,
        vec![
            PipelineStep::Ingestion,
            PipelineStep::Cataloging,
            PipelineStep::Processing
        ]
    );

    // unit was cataloged with one version and the projection recorded
    let unit = h.knowledge.get_unit("unit-alpha").await.unwrap();
    assert_eq!(unit.versions().len(), 1);
    let snapshot = unit.current_version().unwrap().snapshot("src-alpha").unwrap();
    assert_eq!(snapshot.projection_ids, vec![success.projection_id.clone()]);

    // lineage records the embedding transformation
    let lineage = h.knowledge.get_lineage_for_unit("unit-alpha").await.unwrap();
    assert_eq!(lineage.transformations().len(), 1);
    assert_eq!(lineage.transformations()[0].output_version, 1);

    // manifest is complete with metrics
    let manifest_id = success.manifest_id.expect("manifest id");
    let manifests = h
        .orchestrator
        .get_manifest(ManifestQuery {
            manifest_id: Some(manifest_id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(manifests.len(), 1);
    let m = &manifests[0];
    assert_eq!(m.status, ManifestStatus::Complete);
    assert_eq!(m.completed_steps, vec!["ingestion", "cataloging", "processing"]);
    assert_eq!(m.chunks_count, Some(3));
    assert_eq!(m.embedding_model.as_deref(), Some("all-minilm-l6-v2"));
    assert!(m.content_hash.is_some());
    assert!(m.extracted_length.unwrap() > 0);
}

#[tokio::test]
async fn test_processing_failure_reports_completed_steps() {
    let h = harness();
    h.processing.set_failing(true);
    let err = h
        .orchestrator
        .execute(pipeline_input("beta"))
        .await
        .unwrap_err();

    assert_eq!(err.step, PipelineStep::Processing);
    assert_eq!(err.code, "PIPELINE_PROCESSING_FAILED");
    assert_eq!(
        err.completed_steps,
        vec![PipelineStep::Ingestion, PipelineStep::Cataloging]
    );
    assert!(err
        .original_message
        .as_deref()
        .unwrap()
        .contains("embedding provider unavailable"));

    // the unit was persisted at cataloging; the partial state is
    // recoverable by re-running processing
    let unit = h.knowledge.get_unit("unit-beta").await.unwrap();
    assert_eq!(unit.versions().len(), 1);
    assert!(unit
        .current_version()
        .unwrap()
        .snapshot("src-beta")
        .unwrap()
        .projection_ids
        .is_empty());

    // manifest shows the failed run
    let manifests = h
        .orchestrator
        .get_manifest(ManifestQuery {
            resource_id: Some("res-beta".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0].status, ManifestStatus::Failed);
    assert_eq!(manifests[0].failed_step.as_deref(), Some("processing"));
    assert_eq!(manifests[0].completed_steps, vec!["ingestion", "cataloging"]);
}

#[tokio::test]
async fn test_ingestion_failure_has_no_completed_steps() {
    let h = harness();
    let mut input = pipeline_input("gamma");
    input.uri = "fail://gamma".to_string();
    let err = h.orchestrator.execute(input).await.unwrap_err();

    assert_eq!(err.step, PipelineStep::Ingestion);
    assert_eq!(err.code, "PIPELINE_INGESTION_FAILED");
    assert!(err.completed_steps.is_empty());

    // nothing was cataloged
    assert!(matches!(
        h.knowledge.get_unit("unit-gamma").await.unwrap_err(),
        KnowledgeError::NotFound(_)
    ));

    let manifests = h
        .orchestrator
        .get_manifest(ManifestQuery {
            resource_id: Some("res-gamma".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(manifests[0].status, ManifestStatus::Failed);
    assert_eq!(manifests[0].failed_step.as_deref(), Some("ingestion"));
    assert!(manifests[0].completed_steps.is_empty());
}

#[tokio::test]
async fn test_manifest_opt_in_requires_resource_id() {
    let h = harness();
    let mut input = pipeline_input("delta");
    input.resource_id = None;
    let success = h.orchestrator.execute(input).await.unwrap();

    assert!(success.manifest_id.is_none());
    let all = h
        .orchestrator
        .get_manifest(ManifestQuery::default())
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_manifest_write_failure_never_fails_the_pipeline() {
    let units = Arc::new(MemoryUnitStore::new());
    let lineages = Arc::new(MemoryLineageStore::new());
    let events = Arc::new(MemoryEventLog::new());
    let knowledge = Arc::new(KnowledgeService::new(units, lineages, events));
    let orchestrator = PipelineOrchestrator::new(
        Arc::new(StubIngestion),
        Arc::new(StubProcessing::new()),
        knowledge,
        Arc::new(BrokenManifestStore),
    );

    let success = orchestrator.execute(pipeline_input("epsilon")).await.unwrap();
    assert!(success.manifest_id.is_none());
    assert_eq!(success.completed_steps.len(), 3);
}

#[tokio::test]
async fn test_incremental_pipeline_attaches_to_existing_unit() {
    let h = harness();
    h.orchestrator.execute(pipeline_input("zeta")).await.unwrap();

    let success = h
        .orchestrator
        .ingest_and_add_source(IngestAndAddSourceInput {
            unit_id: "unit-zeta".to_string(),
            resource_id: Some("res-zeta-2".to_string()),
            source_id: Some("src-zeta-2".to_string()),
            source_name: "zeta appendix".to_string(),
            uri: "file:///zeta-appendix.txt".to_string(),
            source_type: "text".to_string(),
            extraction_job_id: None,
            processing_profile_id: "profile-default".to_string(),
            processing_profile_version: 1,
        })
        .await
        .unwrap();

    assert_eq!(success.version, 2);
    assert_eq!(
        success.completed_steps,
        vec![
            PipelineStep::Ingestion,
            PipelineStep::AddSource,
            PipelineStep::Processing
        ]
    );

    let unit = h.knowledge.get_unit("unit-zeta").await.unwrap();
    assert_eq!(unit.active_source_ids(), vec!["src-zeta", "src-zeta-2"]);
    // version 1 is untouched
    assert_eq!(unit.version(1).unwrap().active_source_ids(), vec!["src-zeta"]);
}

#[tokio::test]
async fn test_incremental_pipeline_missing_unit_fails_at_add_source() {
    let h = harness();
    let err = h
        .orchestrator
        .ingest_and_add_source(IngestAndAddSourceInput {
            unit_id: "ghost".to_string(),
            resource_id: None,
            source_id: None,
            source_name: "orphan".to_string(),
            uri: "file:///orphan.txt".to_string(),
            source_type: "text".to_string(),
            extraction_job_id: None,
            processing_profile_id: "profile-default".to_string(),
            processing_profile_version: 1,
        })
        .await
        .unwrap_err();

    assert_eq!(err.step, PipelineStep::AddSource);
    assert_eq!(err.code, "MANAGEMENT_ADD_SOURCE_FAILED");
    assert_eq!(err.completed_steps, vec![PipelineStep::Ingestion]);
    assert_eq!(err.original_code.as_deref(), Some("not_found"));
}

#[tokio::test]
async fn test_process_unit_recovers_partial_run() {
    let h = harness();
    h.processing.set_failing(true);
    h.orchestrator
        .execute(pipeline_input("eta"))
        .await
        .unwrap_err();

    h.processing.set_failing(false);
    let success = h.orchestrator.process_unit("unit-eta").await.unwrap();
    assert_eq!(success.version, 1);
    assert_eq!(success.projection_ids.len(), 1);

    let unit = h.knowledge.get_unit("unit-eta").await.unwrap();
    let snapshot = unit.current_version().unwrap().snapshot("src-eta").unwrap();
    assert_eq!(snapshot.projection_ids, success.projection_ids);
}

#[tokio::test]
async fn test_batch_is_all_settled() {
    let h = harness();
    let mut bad = pipeline_input("two");
    bad.uri = "fail://two".to_string();
    let results = h
        .orchestrator
        .execute_batch(vec![pipeline_input("one"), bad, pipeline_input("three")])
        .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok());
    assert_eq!(results[1].as_ref().unwrap_err().step, PipelineStep::Ingestion);

    // siblings committed despite the failure
    assert!(h.knowledge.get_unit("unit-one").await.is_ok());
    assert!(h.knowledge.get_unit("unit-three").await.is_ok());
}

#[tokio::test]
async fn test_manifest_lookup_priority() {
    let h = harness();
    let a = h.orchestrator.execute(pipeline_input("m1")).await.unwrap();
    h.orchestrator.execute(pipeline_input("m2")).await.unwrap();

    // manifest id wins over other keys
    let by_id = h
        .orchestrator
        .get_manifest(ManifestQuery {
            manifest_id: a.manifest_id.clone(),
            resource_id: Some("res-m2".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id[0].resource_id, "res-m1");

    let by_source = h
        .orchestrator
        .get_manifest(ManifestQuery {
            source_id: Some("src-m2".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_source.len(), 1);

    let by_unit = h
        .orchestrator
        .get_manifest(ManifestQuery {
            semantic_unit_id: Some("unit-m1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_unit.len(), 1);

    let all = h
        .orchestrator
        .get_manifest(ManifestQuery::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let missing = h
        .orchestrator
        .get_manifest(ManifestQuery {
            manifest_id: Some("ghost".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(missing, KnowledgeError::NotFound(_)));
}

#[tokio::test]
async fn test_versioning_scenario_end_to_end() {
    // attach A, attach B, rollback to 1, reprocess: version 3 is built
    // from version 1's active sources with projections reset
    let h = harness();
    h.knowledge
        .create_unit("u", "Scenario", None, vec![])
        .await
        .unwrap();
    h.knowledge
        .attach_source("u", UnitSource::new("a", "A", "text", "body a"), "profile-p", 1)
        .await
        .unwrap();
    h.knowledge.record_projection("u", "a", "proj-a").await.unwrap();
    h.knowledge
        .attach_source("u", UnitSource::new("b", "B", "text", "body b"), "profile-p", 1)
        .await
        .unwrap();
    h.knowledge.rollback("u", 1).await.unwrap();
    let v3 = h
        .knowledge
        .reprocess("u", "profile-q", 1, "upgrade")
        .await
        .unwrap();

    assert_eq!(v3.version, 3);
    assert_eq!(v3.active_source_ids(), vec!["a"]);
    assert!(v3.snapshot("a").unwrap().projection_ids.is_empty());

    let unit = h.knowledge.get_unit("u").await.unwrap();
    assert_eq!(unit.versions().len(), 3);
    assert_eq!(unit.source_pool().len(), 2);
    // version 1 still holds the projection recorded before rollback
    assert_eq!(
        unit.version(1).unwrap().snapshot("a").unwrap().projection_ids,
        vec!["proj-a"]
    );

    // granular operations bypass the orchestrator, so no manifests
    assert!(h.manifests.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_unit_id_fails_cataloging() {
    let h = harness();
    h.orchestrator.execute(pipeline_input("dup")).await.unwrap();

    let mut again = pipeline_input("dup");
    again.source_id = Some("src-dup-2".to_string());
    again.resource_id = Some("res-dup-2".to_string());
    let err = h.orchestrator.execute(again).await.unwrap_err();

    assert_eq!(err.step, PipelineStep::Cataloging);
    assert_eq!(err.code, "PIPELINE_CATALOGING_FAILED");
    assert_eq!(err.completed_steps, vec![PipelineStep::Ingestion]);
    assert_eq!(err.original_code.as_deref(), Some("already_exists"));
}
