//! Configuration types.
//!
//! Everything is read from the environment at startup: credentials, the
//! mailbox, model handles, label tables and routing rules. Nothing here is
//! a request parameter.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::inference::{InferenceBackend, InferenceConfig, ModelHandle};
use crate::mail::GraphConfig;
use crate::mail::graph::DEFAULT_GRAPH_BASE_URL;
use crate::pipeline::labels::{Category, LabelTable, Sentiment};
use crate::pipeline::processor::DEFAULT_FORWARD_COMMENT;
use crate::pipeline::rules::RoutingTable;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INFERENCE_URL: &str = "http://127.0.0.1:8501";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Port the trigger endpoint listens on.
    pub port: u16,
    pub graph: GraphConfig,
    pub inference: InferenceConfig,
    pub category_model: ModelHandle,
    pub sentiment_model: ModelHandle,
    pub category_labels: LabelTable<Category>,
    pub sentiment_labels: LabelTable<Sentiment>,
    pub routes: RoutingTable,
    pub forward_comment: String,
}

impl TriageConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key → value source.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(get);

        let access_token = env.required("MAIL_ACCESS_TOKEN")?;
        let mailbox_id = env.required("MAILBOX_ID")?;

        let graph = GraphConfig {
            base_url: env
                .optional("MAIL_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
            mailbox_id,
            access_token: SecretString::from(access_token),
            timeout: Duration::from_secs(
                env.parse_or("MAIL_REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            ),
            max_pages: env.parse_or("MAIL_MAX_PAGES", 1usize)?.max(1),
        };

        let inference = InferenceConfig {
            backend: env.parse_or("INFERENCE_BACKEND", InferenceBackend::Remote)?,
            endpoint: env
                .optional("INFERENCE_URL")
                .unwrap_or_else(|| DEFAULT_INFERENCE_URL.to_string()),
            timeout: Duration::from_secs(
                env.parse_or("INFERENCE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            ),
        };

        let category_labels = match env.optional("CATEGORY_LABELS") {
            Some(list) => LabelTable::parse(&list)?,
            None => LabelTable::reference(),
        };
        let sentiment_labels = match env.optional("SENTIMENT_LABELS") {
            Some(list) => LabelTable::parse(&list)?,
            None => LabelTable::reference(),
        };

        let routes = match env.optional("TRIAGE_ROUTES") {
            Some(raw) => RoutingTable::parse(&raw).map_err(|source| ConfigError::Routing {
                key: "TRIAGE_ROUTES".into(),
                source,
            })?,
            None => {
                tracing::warn!("TRIAGE_ROUTES not set; no message will be forwarded");
                RoutingTable::empty()
            }
        };

        Ok(Self {
            port: env.parse_or("TRIAGE_PORT", DEFAULT_PORT)?,
            graph,
            inference,
            category_model: ModelHandle::new(
                env.optional("CATEGORY_MODEL")
                    .unwrap_or_else(|| "category".to_string()),
            ),
            sentiment_model: ModelHandle::new(
                env.optional("SENTIMENT_MODEL")
                    .unwrap_or_else(|| "sentiment".to_string()),
            ),
            category_labels,
            sentiment_labels,
            routes,
            forward_comment: env
                .optional("TRIAGE_FORWARD_COMMENT")
                .unwrap_or_else(|| DEFAULT_FORWARD_COMMENT.to_string()),
        })
    }
}

/// Lookup wrapper treating blank values as unset.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    fn config(vars: &[(&str, &str)]) -> Result<TriageConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TriageConfig::from_lookup(|key| map.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("MAIL_ACCESS_TOKEN", "tok-123"), ("MAILBOX_ID", "box-1")];

    #[test]
    fn defaults() {
        let cfg = config(&REQUIRED).unwrap();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.graph.base_url, "https://graph.microsoft.com/v1.0");
        assert_eq!(cfg.graph.mailbox_id, "box-1");
        assert_eq!(cfg.graph.access_token.expose_secret(), "tok-123");
        assert_eq!(cfg.graph.timeout, Duration::from_secs(30));
        assert_eq!(cfg.graph.max_pages, 1);
        assert_eq!(cfg.inference.backend, InferenceBackend::Remote);
        assert_eq!(cfg.category_model, ModelHandle::new("category"));
        assert_eq!(cfg.sentiment_model, ModelHandle::new("sentiment"));
        assert_eq!(cfg.category_labels, LabelTable::reference());
        assert_eq!(cfg.sentiment_labels, LabelTable::reference());
        assert!(cfg.routes.is_empty());
        assert_eq!(cfg.forward_comment, "FYI");
    }

    #[test]
    fn token_and_mailbox_are_required() {
        assert!(matches!(
            config(&[("MAILBOX_ID", "box-1")]),
            Err(ConfigError::MissingEnvVar(ref k)) if k == "MAIL_ACCESS_TOKEN"
        ));
        assert!(matches!(
            config(&[("MAIL_ACCESS_TOKEN", "tok")]),
            Err(ConfigError::MissingEnvVar(ref k)) if k == "MAILBOX_ID"
        ));
    }

    #[test]
    fn blank_token_is_rejected() {
        let result = config(&[("MAIL_ACCESS_TOKEN", "   "), ("MAILBOX_ID", "box-1")]);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn debug_output_redacts_token() {
        let cfg = config(&REQUIRED).unwrap();
        assert!(!format!("{cfg:?}").contains("tok-123"));
    }

    #[test]
    fn overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("TRIAGE_PORT", "8080"),
            ("MAIL_API_BASE_URL", "http://localhost:9000"),
            ("MAIL_REQUEST_TIMEOUT_SECS", "5"),
            ("MAIL_MAX_PAGES", "0"),
            ("INFERENCE_BACKEND", "local"),
            ("CATEGORY_MODEL", "/models/category"),
            ("CATEGORY_LABELS", "Travel,Finance"),
            ("TRIAGE_ROUTES", "Finance=desk@corp.example|Desk"),
            ("TRIAGE_FORWARD_COMMENT", "Please review"),
        ]);
        let cfg = config(&vars).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.graph.base_url, "http://localhost:9000");
        assert_eq!(cfg.graph.timeout, Duration::from_secs(5));
        assert_eq!(cfg.graph.max_pages, 1);
        assert_eq!(cfg.inference.backend, InferenceBackend::Local);
        assert_eq!(cfg.category_model.as_str(), "/models/category");
        assert_eq!(cfg.category_labels.get(0), Some(Category::Travel));
        assert_eq!(cfg.routes.len(), 1);
        assert_eq!(cfg.forward_comment, "Please review");
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("TRIAGE_PORT", "eighty"));
        assert!(matches!(
            config(&vars),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "TRIAGE_PORT"
        ));
    }

    #[test]
    fn misspelled_route_label_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("TRIAGE_ROUTES", "Pharmaceuticals=desk@corp.example|Desk"));
        assert!(matches!(config(&vars), Err(ConfigError::Routing { .. })));
    }

    #[test]
    fn duplicate_route_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push((
            "TRIAGE_ROUTES",
            "Energy=ops@corp.example|Ops;Energy=desk@corp.example|Desk",
        ));
        assert!(matches!(config(&vars), Err(ConfigError::Routing { .. })));
    }

    #[test]
    fn unknown_label_list_entry_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SENTIMENT_LABELS", "enquiry,angry"));
        assert!(matches!(config(&vars), Err(ConfigError::InvalidValue { .. })));
    }
}
