//! Remote inference runtime: scores text on a model server over HTTP.
//!
//! Request: `POST {endpoint}/models/{model}/classify` with `{"text": "..."}`.
//! Response: `{"scores": [f32, ...]}` (`logits` is accepted as an alias).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{InferenceRuntime, ModelHandle};
use crate::error::InferenceError;

/// Maximum response body echoed into error messages.
const ERROR_BODY_MAX_LEN: usize = 200;

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(alias = "logits")]
    scores: Vec<f32>,
}

/// HTTP client for a sequence-classification model server.
pub struct RemoteRuntime {
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl RemoteRuntime {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Unavailable {
                model: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    fn classify_url(&self, model: &ModelHandle) -> String {
        format!("{}/models/{}/classify", self.endpoint, model)
    }
}

#[async_trait]
impl InferenceRuntime for RemoteRuntime {
    fn name(&self) -> &str {
        "remote"
    }

    async fn scores(&self, model: &ModelHandle, text: &str) -> Result<Vec<f32>, InferenceError> {
        let resp = self
            .client
            .post(self.classify_url(model))
            .json(&ClassifyRequest { text })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        model: model.to_string(),
                        timeout: self.timeout,
                    }
                } else {
                    InferenceError::Unavailable {
                        model: model.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(ERROR_BODY_MAX_LEN)
                .collect();
            return Err(InferenceError::Unavailable {
                model: model.to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: ClassifyResponse =
            resp.json().await.map_err(|e| InferenceError::InvalidResponse {
                model: model.to_string(),
                reason: e.to_string(),
            })?;

        Ok(parsed.scores)
    }
}
