//! # Semvault
//!
//! Versioned semantic-unit catalog and ingestion pipeline core for
//! knowledge platforms.
//!
//! Semvault models ingested documents as versioned "semantic units":
//! each unit owns an append-only source pool, an immutable numbered
//! version chain with a movable current pointer (non-destructive
//! rollback), and profile-driven reprocessing that invalidates stale
//! embeddings. A saga-style orchestrator drives ingestion, cataloging,
//! and processing end-to-end and reports, for any partial failure,
//! exactly which steps already committed side effects.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌────────────┐
//! │ Ingestion  │──▶│   Orchestrator    │──▶│ Processing │
//! │ (extract)  │   │  step tracking   │   │ chunk+embed│
//! └────────────┘   └───────┬──────────┘   └────────────┘
//!                          │
//!          ┌───────────────┼───────────────┐
//!          ▼               ▼               ▼
//!    ┌──────────┐    ┌──────────┐    ┌──────────┐
//!    │ Semantic │    │ Lineage  │    │ Manifest │
//!    │  Units   │    │  graph   │    │  (audit) │
//!    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! Concrete persistence backends, text extractors, and embedding
//! providers live outside this crate, behind the traits in [`store`]
//! and [`collaborators`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Sources, snapshots, version records |
//! | [`state`] | Unit lifecycle state machine |
//! | [`unit`] | `SemanticUnit` aggregate root |
//! | [`lineage`] | Transformation log + trace graph |
//! | [`manifest`] | Pipeline run audit records |
//! | [`events`] | Domain events + publisher trait |
//! | [`error`] | Error taxonomy |
//! | [`store`] | Repository traits + in-memory backends |
//! | [`collaborators`] | Ingestion/processing seams |
//! | [`service`] | Granular catalog operations |
//! | [`pipeline`] | Multi-step orchestrator |

pub mod collaborators;
pub mod error;
pub mod events;
pub mod lineage;
pub mod manifest;
pub mod models;
pub mod pipeline;
pub mod service;
pub mod state;
pub mod store;
pub mod unit;

pub use error::{KnowledgeError, Result};
pub use pipeline::{PipelineError, PipelineOrchestrator};
pub use service::KnowledgeService;
pub use state::UnitState;
pub use unit::SemanticUnit;
