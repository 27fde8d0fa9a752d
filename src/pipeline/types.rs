//! Shared types for the triage pipeline.

use serde::Serialize;

use crate::mail::RawMessage;
use crate::pipeline::labels::{Category, Sentiment, label_or_empty};
use crate::pipeline::normalize::{is_markup_content_type, normalize};

/// A fetched message, annotated in place by the predict pass.
///
/// Serialized for the trigger response as
/// `{"id", "body", "subject", "category", "sentiment"}`, with unset labels
/// rendered as `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: String,
    /// Normalized plain-text body.
    pub body: String,
    pub subject: String,
    #[serde(serialize_with = "label_or_empty")]
    pub category: Option<Category>,
    #[serde(serialize_with = "label_or_empty")]
    pub sentiment: Option<Sentiment>,
}

impl Message {
    /// Build an unclassified message from provider data.
    pub fn from_raw(raw: RawMessage) -> Self {
        let body = raw
            .body
            .map(|b| {
                let is_markup = b
                    .content_type
                    .as_deref()
                    .is_some_and(is_markup_content_type);
                normalize(b.content.as_deref().unwrap_or_default(), is_markup)
            })
            .unwrap_or_default();

        Self {
            id: raw.id.unwrap_or_default(),
            body,
            subject: raw.subject.unwrap_or_default(),
            category: None,
            sentiment: None,
        }
    }

    /// Both labels populated.
    pub fn is_classified(&self) -> bool {
        self.category.is_some() && self.sentiment.is_some()
    }
}
