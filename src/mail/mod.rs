//! Mail provider integration: the system of record for messages.
//!
//! The pipeline only sees the `MailProvider` trait: list the mailbox,
//! write a category back, forward a message. `GraphMailClient` implements
//! it against the Microsoft Graph REST API.

pub mod graph;

pub use graph::{GraphConfig, GraphMailClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MailError;

/// A message as listed by the provider. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<RawBody>,
}

/// Message body with its declared content type (`html` or `text`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawBody {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "contentType")]
    pub content_type: Option<String>,
}

/// Fields written back to a message after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageUpdate {
    pub subject: String,
    pub categories: Vec<String>,
}

/// Forwarding target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub address: String,
    pub name: String,
}

impl Recipient {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }
}

/// A forward of an existing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    pub comment: String,
    pub to: Vec<Recipient>,
}

/// Mail provider: pure I/O against one configured mailbox.
///
/// Each call is attempted exactly once; callers decide what a failure means.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// List messages in the mailbox, in provider order.
    async fn list_messages(&self) -> Result<Vec<RawMessage>, MailError>;

    /// Update a message's subject and categories.
    async fn update_message(&self, id: &str, update: &MessageUpdate) -> Result<(), MailError>;

    /// Forward a message.
    async fn forward_message(&self, id: &str, forward: &ForwardRequest) -> Result<(), MailError>;
}
