use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;

/// What a classifier thinks a request is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(alias = "type")]
    pub workflow_type: String,
    pub confidence: f64,
}

impl Classification {
    pub fn new(workflow_type: impl Into<String>, confidence: f64) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            confidence,
        }
    }
}

/// Maps free-form request text to a workflow type.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        request_text: &str,
        context: &serde_json::Value,
    ) -> Result<Classification, ClassifierError>;
}
