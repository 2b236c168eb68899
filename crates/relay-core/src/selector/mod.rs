//! Workflow selector — turns a classifier verdict into a runnable workflow.
//!
//! ```text
//! request ──► Classifier ──► {workflow_type, confidence}
//!                                   │
//!                 known type? ──no──┤──► NoMatch(UnknownWorkflow)
//!                                   │
//!        confidence >= min? ──no────┤──► NoMatch(BelowThreshold)
//!                                   │
//!                                   ▼
//!                       Selection{workflow, confidence}
//! ```
//!
//! Classifier failures never escape: they become `NoMatch` as well, and the
//! fallback manager takes over.

pub mod classifier;
pub mod http;
pub mod keyword;

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::WorkflowDefinition;

pub use classifier::{Classification, Classifier};
pub use http::HttpClassifier;
pub use keyword::KeywordClassifier;

/// A workflow the pipeline should run.
#[derive(Debug, Clone)]
pub struct Selection {
    pub workflow: Arc<WorkflowDefinition>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchReason {
    /// The classifier named a type that is not configured
    UnknownWorkflow,
    /// Known type, confidence under the workflow's `min_confidence`
    BelowThreshold,
    /// The classifier call itself failed
    ClassifierUnavailable,
    /// Confidence was NaN or outside [0, 1]
    InvalidConfidence,
}

impl NoMatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoMatchReason::UnknownWorkflow => "unknown_workflow",
            NoMatchReason::BelowThreshold => "below_threshold",
            NoMatchReason::ClassifierUnavailable => "classifier_unavailable",
            NoMatchReason::InvalidConfidence => "invalid_confidence",
        }
    }
}

/// No suitable workflow. Carries what the classifier said, if anything, and
/// the matched definition when only the threshold failed.
#[derive(Debug, Clone)]
pub struct NoMatch {
    pub reason: NoMatchReason,
    pub classification: Option<Classification>,
    pub workflow: Option<Arc<WorkflowDefinition>>,
}

pub struct WorkflowSelector {
    workflows: HashMap<String, Arc<WorkflowDefinition>>,
    classifier: Arc<dyn Classifier>,
}

impl WorkflowSelector {
    pub fn new(workflows: &[WorkflowDefinition], classifier: Arc<dyn Classifier>) -> Self {
        let workflows = workflows
            .iter()
            .map(|wf| (wf.workflow_type.clone(), Arc::new(wf.clone())))
            .collect();
        Self {
            workflows,
            classifier,
        }
    }

    pub fn workflow(&self, workflow_type: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(workflow_type).cloned()
    }

    pub async fn select(
        &self,
        request_text: &str,
        context: &serde_json::Value,
    ) -> Result<Selection, NoMatch> {
        let classification = match self.classifier.classify(request_text, context).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("[Selector] Classifier failed: {}", e);
                return Err(NoMatch {
                    reason: NoMatchReason::ClassifierUnavailable,
                    classification: None,
                    workflow: None,
                });
            }
        };

        self.evaluate(classification)
    }

    /// Apply type and threshold checks to a classifier verdict.
    pub fn evaluate(&self, classification: Classification) -> Result<Selection, NoMatch> {
        if !classification.confidence.is_finite()
            || !(0.0..=1.0).contains(&classification.confidence)
        {
            tracing::warn!(
                "[Selector] Classifier returned invalid confidence {} for {}",
                classification.confidence,
                classification.workflow_type
            );
            return Err(NoMatch {
                reason: NoMatchReason::InvalidConfidence,
                classification: Some(classification),
                workflow: None,
            });
        }

        let Some(workflow) = self.workflow(&classification.workflow_type) else {
            tracing::info!(
                "[Selector] No workflow named '{}' ({:.2})",
                classification.workflow_type,
                classification.confidence
            );
            return Err(NoMatch {
                reason: NoMatchReason::UnknownWorkflow,
                classification: Some(classification),
                workflow: None,
            });
        };

        if !workflow.accepts(classification.confidence) {
            tracing::info!(
                "[Selector] {} confidence {:.2} below threshold {:.2}",
                workflow.workflow_type,
                classification.confidence,
                workflow.min_confidence
            );
            return Err(NoMatch {
                reason: NoMatchReason::BelowThreshold,
                classification: Some(classification),
                workflow: Some(workflow),
            });
        }

        tracing::info!(
            "[Selector] Selected {} ({:.2})",
            workflow.workflow_type,
            classification.confidence
        );
        Ok(Selection {
            workflow,
            confidence: classification.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;
    use crate::models::{EngineRole, WorkflowStep};
    use async_trait::async_trait;

    struct Fixed(Result<Classification, ClassifierError>);

    #[async_trait]
    impl Classifier for Fixed {
        async fn classify(
            &self,
            _request_text: &str,
            _context: &serde_json::Value,
        ) -> Result<Classification, ClassifierError> {
            self.0.clone()
        }
    }

    fn selector(result: Result<Classification, ClassifierError>) -> WorkflowSelector {
        let release = WorkflowDefinition::new(
            "release",
            vec![
                WorkflowStep::new(EngineRole::Testing),
                WorkflowStep::new(EngineRole::Release),
            ],
        )
        .with_min_confidence(0.8);
        WorkflowSelector::new(&[release], Arc::new(Fixed(result)))
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let below = selector(Ok(Classification::new("release", 0.79)))
            .select("ship it", &serde_json::Value::Null)
            .await
            .unwrap_err();
        assert_eq!(below.reason, NoMatchReason::BelowThreshold);
        assert!(below.workflow.is_some());

        let at = selector(Ok(Classification::new("release", 0.80)))
            .select("ship it", &serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(at.workflow.workflow_type, "release");
        assert!((at.confidence - 0.80).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_type_is_no_match() {
        let err = selector(Ok(Classification::new("poetry", 0.99)))
            .select("write a sonnet", &serde_json::Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.reason, NoMatchReason::UnknownWorkflow);
        assert!(err.workflow.is_none());
        assert_eq!(err.classification.unwrap().workflow_type, "poetry");
    }

    #[tokio::test]
    async fn test_classifier_failure_is_no_match() {
        let err = selector(Err(ClassifierError::Request("connection refused".into())))
            .select("ship it", &serde_json::Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.reason, NoMatchReason::ClassifierUnavailable);
    }

    #[tokio::test]
    async fn test_nan_confidence_is_no_match() {
        let err = selector(Ok(Classification::new("release", f64::NAN)))
            .select("ship it", &serde_json::Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.reason, NoMatchReason::InvalidConfidence);
    }
}
