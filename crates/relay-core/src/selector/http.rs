//! Remote classifier.
//!
//! POST {url}
//!   body:  {"request_text": "...", "context": {...}}
//!   reply: {"workflow_type": "...", "confidence": 0.0..1.0}

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::classifier::{Classification, Classifier};
use crate::engine::http::build_client;
use crate::error::ClassifierError;

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    request_text: &'a str,
    context: &'a serde_json::Value,
}

pub struct HttpClassifier {
    url: String,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let url = url.into();
        let client = build_client(reqwest::Client::builder().timeout(timeout), &url);
        Self { url, client }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(
        &self,
        request_text: &str,
        context: &serde_json::Value,
    ) -> Result<Classification, ClassifierError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest {
                request_text,
                context,
            })
            .send()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Request(format!(
                "classifier returned {}",
                status
            )));
        }

        response
            .json::<Classification>()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))
    }
}
