//! Microsoft Graph mail client.
//!
//! - list: `GET  {base}/users/{mailbox}/messages?$select=id,subject,body`
//! - update: `PATCH {base}/users/{mailbox}/messages/{id}`
//! - forward: `POST {base}/users/{mailbox}/messages/{id}/forward`
//!
//! Every call carries the same configured bearer credential.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ForwardRequest, MailProvider, MessageUpdate, RawMessage, Recipient};
use crate::error::MailError;

const PROVIDER: &str = "graph";

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

const MESSAGE_SELECT_FIELDS: &str = "id,subject,body";

/// Maximum response body echoed into error messages.
const ERROR_BODY_MAX_LEN: usize = 200;

/// Graph client configuration.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub base_url: String,
    pub mailbox_id: String,
    pub access_token: SecretString,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Pages of `@odata.nextLink` followed when listing (at least 1).
    pub max_pages: usize,
}

#[derive(Debug, Deserialize)]
struct GraphMessagePage {
    #[serde(default)]
    value: Option<Vec<RawMessage>>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphForwardBody<'a> {
    comment: &'a str,
    to_recipients: Vec<GraphRecipient<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient<'a> {
    email_address: &'a Recipient,
}

/// Mail provider backed by the Graph REST API.
pub struct GraphMailClient {
    config: GraphConfig,
    base: Url,
    client: reqwest::Client,
}

impl GraphMailClient {
    pub fn new(config: GraphConfig) -> Result<Self, MailError> {
        let base = Url::parse(&config.base_url).map_err(|e| MailError::RequestFailed {
            provider: PROVIDER.into(),
            reason: format!("invalid base URL {:?}: {e}", config.base_url),
        })?;
        if base.cannot_be_a_base() {
            return Err(MailError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("base URL {:?} cannot carry a path", config.base_url),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MailError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            config,
            base,
            client,
        })
    }

    /// `{base}/users/{mailbox}/messages[/extra...]`, each segment escaped.
    fn messages_url(&self, extra: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["users", self.config.mailbox_id.as_str(), "messages"])
                .extend(extra);
        }
        url
    }

    fn list_url(&self) -> Url {
        let mut url = self.messages_url(&[]);
        url.query_pairs_mut()
            .append_pair("$select", MESSAGE_SELECT_FIELDS);
        url
    }

    /// Validate an `@odata.nextLink`. The bearer token is only ever sent to
    /// the configured origin.
    fn next_page_url(&self, link: &str) -> Result<Url, MailError> {
        let url = Url::parse(link).map_err(|e| MailError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: format!("invalid nextLink: {e}"),
        })?;
        if url.origin() != self.base.origin() {
            return Err(MailError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: format!(
                    "nextLink origin {} differs from {}",
                    url.origin().ascii_serialization(),
                    self.base.origin().ascii_serialization()
                ),
            });
        }
        Ok(url)
    }

    /// Attach the credential, send, and classify the HTTP outcome.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, MailError> {
        let resp = request
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MailError::Timeout {
                        provider: PROVIDER.into(),
                        timeout: self.config.timeout,
                    }
                } else {
                    MailError::RequestFailed {
                        provider: PROVIDER.into(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MailError::AuthFailed {
                provider: PROVIDER.into(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(ERROR_BODY_MAX_LEN)
                .collect();
            return Err(MailError::Status {
                provider: PROVIDER.into(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl MailProvider for GraphMailClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn list_messages(&self) -> Result<Vec<RawMessage>, MailError> {
        let mut messages = Vec::new();
        let mut next = Some(self.list_url());
        let mut pages = 0;
        let max_pages = self.config.max_pages.max(1);

        while let Some(url) = next.take() {
            let resp = self.send(self.client.get(url)).await?;
            let page: GraphMessagePage =
                resp.json().await.map_err(|e| MailError::InvalidResponse {
                    provider: PROVIDER.into(),
                    reason: e.to_string(),
                })?;
            pages += 1;

            let value = page.value.ok_or_else(|| MailError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: "message list has no `value` array".into(),
            })?;
            messages.extend(value);

            next = match page.next_link {
                Some(link) if pages < max_pages => Some(self.next_page_url(&link)?),
                Some(_) => {
                    debug!(pages, "Page limit reached, not following nextLink");
                    None
                }
                None => None,
            };
        }

        info!(count = messages.len(), pages, "Fetched messages");
        Ok(messages)
    }

    async fn update_message(&self, id: &str, update: &MessageUpdate) -> Result<(), MailError> {
        let resp = self
            .send(self.client.patch(self.messages_url(&[id])).json(update))
            .await?;
        info!(id, status = resp.status().as_u16(), "Updated message categories");
        Ok(())
    }

    async fn forward_message(&self, id: &str, forward: &ForwardRequest) -> Result<(), MailError> {
        let body = GraphForwardBody {
            comment: &forward.comment,
            to_recipients: forward
                .to
                .iter()
                .map(|r| GraphRecipient { email_address: r })
                .collect(),
        };
        let resp = self
            .send(self.client.post(self.messages_url(&[id, "forward"])).json(&body))
            .await?;
        info!(id, status = resp.status().as_u16(), "Forwarded message");
        Ok(())
    }
}
