//! The `KnowledgeLineage` aggregate: transformation log and trace graph.
//!
//! One lineage aggregate exists per unit, created lazily on first use.
//! The transformation log is a narrative audit trail, not a second
//! source of truth — version numbers passed in are not validated
//! against the owning unit's chain; callers pass numbers consistent
//! with the unit they just mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{KnowledgeError, Result};

/// Kind of content-derivation step recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformationType {
    Extraction,
    Chunking,
    Embedding,
    Enrichment,
    Merge,
    Split,
}

/// Immutable record of one content-derivation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub transformation_type: TransformationType,
    pub strategy_used: String,
    /// Absent for steps that create the first version.
    pub input_version: Option<u32>,
    pub output_version: u32,
    pub occurred_at: DateTime<Utc>,
    /// Free-form step parameters (model name, chunk size, ...).
    pub parameters: Value,
}

/// Directed edge between two units with a relationship label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub from_unit_id: String,
    pub to_unit_id: String,
    /// e.g. `"derived-from"`, `"summarizes"`.
    pub relationship: String,
    pub created_at: DateTime<Utc>,
}

impl Trace {
    /// Identity triple used for deduplication.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.from_unit_id, &self.to_unit_id, &self.relationship)
    }
}

/// Append-only derivation record for one unit: how its content came to
/// be, and how it relates to other units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeLineage {
    semantic_unit_id: String,
    transformations: Vec<Transformation>,
    traces: Vec<Trace>,
}

impl KnowledgeLineage {
    pub fn new(semantic_unit_id: impl Into<String>) -> Self {
        Self {
            semantic_unit_id: semantic_unit_id.into(),
            transformations: Vec::new(),
            traces: Vec::new(),
        }
    }

    pub fn semantic_unit_id(&self) -> &str {
        &self.semantic_unit_id
    }

    pub fn transformations(&self) -> &[Transformation] {
        &self.transformations
    }

    /// Outbound trace edges of this unit.
    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    /// Append one transformation to the log.
    pub fn register_transformation(
        &mut self,
        transformation_type: TransformationType,
        strategy_used: &str,
        input_version: Option<u32>,
        output_version: u32,
        parameters: Value,
    ) -> Result<&Transformation> {
        if strategy_used.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "strategy_used must not be empty".into(),
            ));
        }
        self.transformations.push(Transformation {
            transformation_type,
            strategy_used: strategy_used.to_string(),
            input_version,
            output_version,
            occurred_at: Utc::now(),
            parameters,
        });
        Ok(self.transformations.last().unwrap())
    }

    /// Add an outbound trace edge from this unit.
    ///
    /// Rejects self-links and exact duplicates of an existing
    /// `(from, to, relationship)` triple.
    pub fn add_trace(&mut self, to_unit_id: &str, relationship: &str) -> Result<&Trace> {
        if relationship.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "trace relationship must not be empty".into(),
            ));
        }
        if to_unit_id == self.semantic_unit_id {
            return Err(KnowledgeError::Validation(format!(
                "unit '{}' may not trace to itself",
                self.semantic_unit_id
            )));
        }
        let duplicate = self
            .traces
            .iter()
            .any(|t| t.to_unit_id == to_unit_id && t.relationship == relationship);
        if duplicate {
            return Err(KnowledgeError::AlreadyExists(format!(
                "trace '{}' -> '{}' ({relationship}) already exists",
                self.semantic_unit_id, to_unit_id
            )));
        }
        self.traces.push(Trace {
            from_unit_id: self.semantic_unit_id.clone(),
            to_unit_id: to_unit_id.to_string(),
            relationship: relationship.to_string(),
            created_at: Utc::now(),
        });
        Ok(self.traces.last().unwrap())
    }

    /// Whether any outbound trace points at `unit_id`.
    pub fn traces_to(&self, unit_id: &str) -> bool {
        self.traces.iter().any(|t| t.to_unit_id == unit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_transformation_appends_in_order() {
        let mut lineage = KnowledgeLineage::new("u1");
        lineage
            .register_transformation(TransformationType::Extraction, "pdf-text", None, 1, json!({}))
            .unwrap();
        lineage
            .register_transformation(
                TransformationType::Embedding,
                "minilm-l6",
                Some(1),
                1,
                json!({ "dimensions": 384 }),
            )
            .unwrap();
        assert_eq!(lineage.transformations().len(), 2);
        assert_eq!(
            lineage.transformations()[0].transformation_type,
            TransformationType::Extraction
        );
        assert_eq!(lineage.transformations()[1].strategy_used, "minilm-l6");
    }

    #[test]
    fn test_register_transformation_rejects_empty_strategy() {
        let mut lineage = KnowledgeLineage::new("u1");
        let err = lineage
            .register_transformation(TransformationType::Chunking, "  ", None, 1, json!({}))
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Validation(_)));
    }

    #[test]
    fn test_add_trace_rejects_self_link() {
        let mut lineage = KnowledgeLineage::new("u1");
        let err = lineage.add_trace("u1", "derived-from").unwrap_err();
        assert!(matches!(err, KnowledgeError::Validation(_)));
    }

    #[test]
    fn test_add_trace_rejects_duplicate_triple() {
        let mut lineage = KnowledgeLineage::new("u1");
        lineage.add_trace("u2", "derived-from").unwrap();
        let err = lineage.add_trace("u2", "derived-from").unwrap_err();
        assert!(matches!(err, KnowledgeError::AlreadyExists(_)));
        assert_eq!(lineage.traces().len(), 1);
        // same target under a different relationship is fine
        lineage.add_trace("u2", "summarizes").unwrap();
        assert_eq!(lineage.traces().len(), 2);
    }

    #[test]
    fn test_traces_to() {
        let mut lineage = KnowledgeLineage::new("u1");
        lineage.add_trace("u2", "derived-from").unwrap();
        assert!(lineage.traces_to("u2"));
        assert!(!lineage.traces_to("u3"));
    }
}
