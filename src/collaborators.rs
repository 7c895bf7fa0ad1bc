//! Collaborator seams the pipeline drives.
//!
//! Concrete text-extraction adapters (PDF/HTML/plain text) and
//! chunking/embedding algorithm implementations live outside this
//! crate; the orchestrator only sees these traits. Retries, if desired,
//! belong to the implementations — a failed call is terminal for the
//! pipeline run that made it.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request to ingest one raw resource and extract its text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub source_id: String,
    pub source_name: String,
    /// Location of the raw content (file path, URL, blob key).
    pub uri: String,
    /// Content type label, e.g. `"pdf"`, `"html"`, `"text"`.
    pub source_type: String,
    pub extraction_job_id: Option<String>,
}

/// Extraction result for one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub extracted_text: String,
    /// SHA-256 hex digest of the extracted text.
    pub content_hash: String,
    pub content_type: String,
}

/// Ingestion collaborator: fetch a raw resource and extract its text.
#[async_trait]
pub trait IngestionService: Send + Sync {
    async fn ingest_and_extract(&self, request: IngestRequest) -> Result<IngestOutcome>;
}

/// Request to chunk and embed one source's content under a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// Projection id allocated by the caller for this batch.
    pub projection_id: String,
    pub semantic_unit_id: String,
    pub semantic_unit_version: u32,
    pub content: String,
    pub content_type: String,
    pub processing_profile_id: String,
    pub processing_profile_version: u32,
}

/// Chunking/embedding result for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub projection_id: String,
    pub chunks_count: u32,
    /// Embedding vector dimensionality, e.g. `384` or `1536`.
    pub dimensions: u32,
    /// Model identifier, e.g. `"text-embedding-3-small"`.
    pub model: String,
}

/// Processing collaborator: chunk and embed content, returning batch
/// metrics.
#[async_trait]
pub trait ProcessingService: Send + Sync {
    async fn process_content(&self, request: ProcessRequest) -> Result<ProcessOutcome>;
}
