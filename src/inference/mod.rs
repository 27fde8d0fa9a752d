//! Inference runtime integration.
//!
//! Supports:
//! - **Remote**: a model server reached over HTTP (default)
//! - **Local**: DistilBERT sequence classifiers run in-process via Candle
//!   (cargo feature `local-models`)
//!
//! Runtimes are built once at startup and shared read-only by every request.

#[cfg(feature = "local-models")]
pub mod local;
pub mod remote;

pub use remote::RemoteRuntime;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::InferenceError;

/// Opaque reference to a provisioned model: a model-server name for the
/// remote runtime, a model directory for the local one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelHandle(String);

impl ModelHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A runtime that scores text with a sequence-classification model.
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    /// Runtime name for logging.
    fn name(&self) -> &str;

    /// Run the model on `text` and return one raw score per output class.
    async fn scores(&self, model: &ModelHandle, text: &str) -> Result<Vec<f32>, InferenceError>;
}

/// Supported inference backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceBackend {
    Remote,
    Local,
}

impl std::str::FromStr for InferenceBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown inference backend {other:?} (expected remote or local)")),
        }
    }
}

/// Configuration for creating an inference runtime.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub backend: InferenceBackend,
    /// Base URL of the model server (remote backend).
    pub endpoint: String,
    pub timeout: Duration,
}

/// Create the runtime and load every model it will be asked to run.
pub fn create_runtime(
    config: &InferenceConfig,
    models: &[&ModelHandle],
) -> Result<Arc<dyn InferenceRuntime>, InferenceError> {
    match config.backend {
        InferenceBackend::Remote => {
            tracing::info!(endpoint = %config.endpoint, "Using remote inference runtime");
            Ok(Arc::new(RemoteRuntime::new(&config.endpoint, config.timeout)?))
        }
        InferenceBackend::Local => create_local_runtime(models),
    }
}

#[cfg(feature = "local-models")]
fn create_local_runtime(
    models: &[&ModelHandle],
) -> Result<Arc<dyn InferenceRuntime>, InferenceError> {
    let runtime = local::LocalRuntime::load(models)?;
    tracing::info!(models = models.len(), "Using local Candle inference runtime");
    Ok(Arc::new(runtime))
}

#[cfg(not(feature = "local-models"))]
fn create_local_runtime(
    models: &[&ModelHandle],
) -> Result<Arc<dyn InferenceRuntime>, InferenceError> {
    let model = models
        .first()
        .map(|m| m.to_string())
        .unwrap_or_default();
    Err(InferenceError::LoadFailed {
        model,
        reason: "built without the `local-models` feature".into(),
    })
}
