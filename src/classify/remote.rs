//! Remote toxicity service client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Classification, ClassificationSource, ClassificationSummary, ClassifyError};

/// Response envelope; the service may wrap the payload in `result`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ToxicityResponse {
    Wrapped { result: ClassificationSummary },
    Bare(ClassificationSummary),
    Error { error: String },
}

/// Classification fetched from an HTTP toxicity endpoint.
pub struct RemoteClassifier {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl RemoteClassifier {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Decode a response body into a classification.
fn decode(body: &str) -> Result<Classification, ClassifyError> {
    let response: ToxicityResponse =
        serde_json::from_str(body).map_err(|e| ClassifyError::Parse(e.to_string()))?;

    let summary = match response {
        ToxicityResponse::Wrapped { result } => result,
        ToxicityResponse::Bare(summary) => summary,
        ToxicityResponse::Error { error } => return Err(ClassifyError::Remote(error)),
    };

    let classification = Classification::from(summary);
    if classification.is_empty() {
        return Err(ClassifyError::Empty);
    }
    Ok(classification)
}

#[async_trait]
impl ClassificationSource for RemoteClassifier {
    fn name(&self) -> &str {
        "remote"
    }

    async fn load(&self) -> Result<Classification, ClassifyError> {
        let mut request = self.client.get(&self.endpoint);
        if let Some(ref key) = self.api_key {
            request = request.header("x-api-key", key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ClassifyError::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ClassifyError::Http(e.to_string()))?;

        if !status.is_success() {
            // The service reports failures as {"error": ...} with a non-2xx status.
            return match decode(&body) {
                Err(ClassifyError::Remote(msg)) => Err(ClassifyError::Remote(msg)),
                _ => Err(ClassifyError::Http(format!("HTTP {}: {}", status, body))),
            };
        }

        let classification = decode(&body)?;
        tracing::debug!(
            "Fetched {} clause keys from {}",
            classification.len(),
            self.endpoint
        );
        Ok(classification)
    }
}
