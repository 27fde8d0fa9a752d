//! Error types for mail triage.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail provider error: {0}")]
    Mail(#[from] MailError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid routing table in {key}: {source}")]
    Routing {
        key: String,
        #[source]
        source: RoutingError,
    },
}

/// Mail provider failures (the transport fault class).
///
/// `AuthFailed` is the auth sub-class: the provider rejected the bearer
/// credential. It is never folded into a success path.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Authentication rejected by {provider} (HTTP {status})")]
    AuthFailed { provider: String, status: u16 },

    #[error("{provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("{provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl MailError {
    /// Whether the provider rejected the credential.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthFailed { .. })
    }
}

/// Markup-to-text conversion failure (the parse fault class).
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Malformed markup at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("HTML conversion failed: {0}")]
    Conversion(String),

    #[error("HTML converter panicked")]
    Panicked,
}

/// Inference runtime failures: the model did not run.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Inference runtime unavailable for model {model}: {reason}")]
    Unavailable { model: String, reason: String },

    #[error("Inference for model {model} timed out after {timeout:?}")]
    Timeout { model: String, timeout: Duration },

    #[error("Invalid response for model {model}: {reason}")]
    InvalidResponse { model: String, reason: String },

    #[error("Model {model} not loaded")]
    ModelNotLoaded { model: String },

    #[error("Failed to load model {model}: {reason}")]
    LoadFailed { model: String, reason: String },
}

/// Classification failures.
///
/// `LabelMapping` means the model ran but produced a class index the label
/// table has no entry for; `Inference` means the model did not run at all.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error(
        "{classifier} model produced class index {index} outside its label table (size {table_len})"
    )]
    LabelMapping {
        classifier: String,
        index: usize,
        table_len: usize,
    },

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ClassifierError {
    /// Log field value distinguishing the two fault classes.
    pub fn fault(&self) -> &'static str {
        match self {
            Self::LabelMapping { .. } => "label_mapping",
            Self::Inference(_) => "inference",
        }
    }
}

/// Routing table construction errors.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("Duplicate routing rule for category {category}")]
    DuplicateRule { category: String },

    #[error("Unknown category label in routing rule: {label:?}")]
    UnknownLabel { label: String },

    #[error("Malformed routing rule {rule:?}: {reason}")]
    MalformedRule { rule: String, reason: String },
}
