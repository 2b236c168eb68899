//! Offline keyword classifier.
//!
//! Counts how many of a workflow's keywords occur in the request (case
//! insensitive) and turns the best count into a confidence:
//!
//! ```text
//! hits = 0  →  "unknown", 0.0
//! hits = n  →  min(0.5 + 0.15 * n, 0.95)
//! ```
//!
//! Ties go to the workflow declared first.

use async_trait::async_trait;

use super::classifier::{Classification, Classifier};
use crate::error::ClassifierError;
use crate::models::WorkflowDefinition;

const BASE_CONFIDENCE: f64 = 0.5;
const PER_HIT: f64 = 0.15;
const MAX_CONFIDENCE: f64 = 0.95;

pub struct KeywordClassifier {
    table: Vec<(String, Vec<String>)>,
}

impl KeywordClassifier {
    pub fn new(workflows: &[WorkflowDefinition]) -> Self {
        let table = workflows
            .iter()
            .map(|wf| {
                let keywords = wf.keywords.iter().map(|k| k.to_lowercase()).collect();
                (wf.workflow_type.clone(), keywords)
            })
            .collect();
        Self { table }
    }

    fn score(&self, text: &str) -> Classification {
        let text = text.to_lowercase();
        let mut best: Option<(&str, usize)> = None;
        for (workflow_type, keywords) in &self.table {
            let hits = keywords
                .iter()
                .filter(|k| !k.is_empty() && text.contains(k.as_str()))
                .count();
            if hits > 0 && best.map(|(_, b)| hits > b).unwrap_or(true) {
                best = Some((workflow_type, hits));
            }
        }

        match best {
            Some((workflow_type, hits)) => Classification::new(
                workflow_type,
                (BASE_CONFIDENCE + PER_HIT * hits as f64).min(MAX_CONFIDENCE),
            ),
            None => Classification::new("unknown", 0.0),
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(
        &self,
        request_text: &str,
        _context: &serde_json::Value,
    ) -> Result<Classification, ClassifierError> {
        let classification = self.score(request_text);
        tracing::debug!(
            "[KeywordClassifier] {} ({:.2})",
            classification.workflow_type,
            classification.confidence
        );
        Ok(classification)
    }
}
