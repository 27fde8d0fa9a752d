//! Triage processor: fetches the mailbox, classifies each message, writes
//! the category back and forwards by category.
//!
//! Flow:
//! 1. `fetch()`: list the mailbox, normalize each body into a `Message`
//! 2. `predict()`: per message: classify category + sentiment, update the
//!    message's categories, route, forward
//!
//! Messages are handled one at a time in provider order. A failed call on one
//! message is logged and never stops the rest of the batch.

use std::sync::Arc;

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::mail::{ForwardRequest, MailProvider, MessageUpdate, RawMessage};
use crate::pipeline::classifier::{CategoryClassifier, SentimentClassifier};
use crate::pipeline::labels::Category;
use crate::pipeline::rules::RoutingTable;
use crate::pipeline::types::Message;

/// Default comment attached to forwarded messages.
pub const DEFAULT_FORWARD_COMMENT: &str = "FYI";

/// What happened to one message during the predict pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageOutcome {
    pub updated: bool,
    pub forwarded: bool,
    pub failed_calls: usize,
}

/// Batch-level counters, logged at the end of each run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub classified: usize,
    pub updated: usize,
    pub forwarded: usize,
    pub failed_calls: usize,
}

impl BatchSummary {
    fn record(&mut self, message: &Message, outcome: MessageOutcome) {
        self.total += 1;
        if message.is_classified() {
            self.classified += 1;
        }
        if outcome.updated {
            self.updated += 1;
        }
        if outcome.forwarded {
            self.forwarded += 1;
        }
        self.failed_calls += outcome.failed_calls;
    }
}

/// Runs the fetch → classify → update → forward sequence.
///
/// Holds only read-only state (provider client, classifiers, routing table),
/// so one instance serves every request.
pub struct TriageProcessor {
    mail: Arc<dyn MailProvider>,
    category: CategoryClassifier,
    sentiment: SentimentClassifier,
    routes: RoutingTable,
    forward_comment: String,
}

impl TriageProcessor {
    pub fn new(
        mail: Arc<dyn MailProvider>,
        category: CategoryClassifier,
        sentiment: SentimentClassifier,
        routes: RoutingTable,
    ) -> Self {
        Self {
            mail,
            category,
            sentiment,
            routes,
            forward_comment: DEFAULT_FORWARD_COMMENT.to_string(),
        }
    }

    pub fn with_forward_comment(mut self, comment: impl Into<String>) -> Self {
        self.forward_comment = comment.into();
        self
    }

    /// Full pipeline for one trigger: fetch, then predict.
    pub async fn run(&self) -> Vec<Message> {
        let run_id = Uuid::new_v4();
        async {
            let messages = self.fetch().await;
            self.predict(messages).await
        }
        .instrument(info_span!("triage_run", %run_id))
        .await
    }

    /// List the mailbox and build unclassified messages.
    ///
    /// A failed fetch yields an empty batch.
    pub async fn fetch(&self) -> Vec<Message> {
        match self.mail.list_messages().await {
            Ok(raw) => Self::prepare(raw),
            Err(e) => {
                error!(
                    fault = "transport",
                    auth = e.is_auth(),
                    provider = self.mail.name(),
                    error = %e,
                    "Failed to fetch messages"
                );
                Vec::new()
            }
        }
    }

    /// Normalize provider messages, preserving provider order.
    pub fn prepare(raw: Vec<RawMessage>) -> Vec<Message> {
        let messages: Vec<Message> = raw.into_iter().map(Message::from_raw).collect();
        info!(count = messages.len(), "Prepared messages");
        messages
    }

    /// Classify, update and route every message.
    pub async fn predict(&self, mut messages: Vec<Message>) -> Vec<Message> {
        let mut summary = BatchSummary::default();
        for message in &mut messages {
            let outcome = self.process(message).await;
            summary.record(message, outcome);
        }
        info!(
            total = summary.total,
            classified = summary.classified,
            updated = summary.updated,
            forwarded = summary.forwarded,
            failed_calls = summary.failed_calls,
            "Batch processing complete"
        );
        messages
    }

    /// Handle one message. Each step's failure is contained to that step.
    pub async fn process(&self, message: &mut Message) -> MessageOutcome {
        let mut outcome = MessageOutcome::default();

        // The two classifiers run independently; one failing leaves only its
        // own field empty.
        match self.category.classify(&message.body).await {
            Ok(category) => message.category = Some(category),
            Err(e) => {
                error!(id = %message.id, fault = e.fault(), error = %e, "Category classification failed");
            }
        }
        match self.sentiment.classify(&message.body).await {
            Ok(sentiment) => message.sentiment = Some(sentiment),
            Err(e) => {
                error!(id = %message.id, fault = e.fault(), error = %e, "Sentiment classification failed");
            }
        }

        let Some(category) = message.category else {
            warn!(id = %message.id, "No category; skipping update and forward");
            return outcome;
        };

        if self.update(message, category).await {
            outcome.updated = true;
        } else {
            outcome.failed_calls += 1;
        }

        match self.routes.route(category) {
            Some(recipient) => {
                let forward = ForwardRequest {
                    comment: self.forward_comment.clone(),
                    to: vec![recipient.clone()],
                };
                match self.mail.forward_message(&message.id, &forward).await {
                    Ok(()) => {
                        info!(id = %message.id, category = %category, to = %recipient.address, "Forwarded message");
                        outcome.forwarded = true;
                    }
                    Err(e) => {
                        error!(
                            id = %message.id,
                            fault = "transport",
                            auth = e.is_auth(),
                            error = %e,
                            "Failed to forward message"
                        );
                        outcome.failed_calls += 1;
                    }
                }
            }
            None => {
                debug!(id = %message.id, category = %category, "No forwarding rule for category");
            }
        }

        outcome
    }

    async fn update(&self, message: &Message, category: Category) -> bool {
        let update = MessageUpdate {
            subject: message.subject.clone(),
            categories: vec![category.to_string()],
        };
        match self.mail.update_message(&message.id, &update).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    id = %message.id,
                    fault = "transport",
                    auth = e.is_auth(),
                    error = %e,
                    "Failed to update message category"
                );
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::MailError;
    use crate::inference::{InferenceRuntime, ModelHandle};
    use crate::mail::{RawBody, Recipient};
    use crate::pipeline::classifier::Classifier;
    use crate::pipeline::classifier::tests::FixedRuntime;
    use crate::pipeline::labels::{LabelTable, Sentiment};
    use crate::pipeline::normalize::tests::LogCapture;

    /// Recorded provider call.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Update(String, MessageUpdate),
        Forward(String, ForwardRequest),
    }

    /// In-memory provider with injectable per-message failures.
    #[derive(Default)]
    pub(crate) struct MockMail {
        pub(crate) inbox: Vec<RawMessage>,
        pub(crate) fail_list: bool,
        pub(crate) fail_update: HashSet<String>,
        pub(crate) fail_forward: HashSet<String>,
        pub(crate) calls: Mutex<Vec<Call>>,
    }

    impl MockMail {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn transport_error() -> MailError {
            MailError::Status {
                provider: "mock".into(),
                status: 503,
                body: "unavailable".into(),
            }
        }
    }

    #[async_trait]
    impl MailProvider for MockMail {
        fn name(&self) -> &str {
            "mock"
        }

        async fn list_messages(&self) -> Result<Vec<RawMessage>, MailError> {
            if self.fail_list {
                return Err(MailError::AuthFailed {
                    provider: "mock".into(),
                    status: 401,
                });
            }
            Ok(self.inbox.clone())
        }

        async fn update_message(&self, id: &str, update: &MessageUpdate) -> Result<(), MailError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Update(id.into(), update.clone()));
            if self.fail_update.contains(id) {
                return Err(Self::transport_error());
            }
            Ok(())
        }

        async fn forward_message(&self, id: &str, forward: &ForwardRequest) -> Result<(), MailError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Forward(id.into(), forward.clone()));
            if self.fail_forward.contains(id) {
                return Err(Self::transport_error());
            }
            Ok(())
        }
    }

    /// Runtime that picks the class from keywords in the text.
    struct KeywordRuntime {
        category: HashMap<&'static str, usize>,
        sentiment_fails: bool,
    }

    impl KeywordRuntime {
        fn new() -> Self {
            Self {
                category: HashMap::from([
                    ("revenue", 0),
                    ("pipeline", 1),
                    ("server", 2),
                    ("drug", 3),
                    ("flight", 4),
                    ("mystery", 9),
                ]),
                sentiment_fails: false,
            }
        }

        fn one_hot(index: usize, len: usize) -> Vec<f32> {
            let mut scores = vec![0.0; len.max(index + 1)];
            scores[index] = 1.0;
            scores
        }
    }

    #[async_trait]
    impl InferenceRuntime for KeywordRuntime {
        fn name(&self) -> &str {
            "keyword"
        }

        async fn scores(
            &self,
            model: &ModelHandle,
            text: &str,
        ) -> Result<Vec<f32>, crate::error::InferenceError> {
            match model.as_str() {
                "category" => {
                    let index = self
                        .category
                        .iter()
                        .find(|(word, _)| text.contains(*word))
                        .map(|(_, i)| *i)
                        .unwrap_or(2);
                    Ok(Self::one_hot(index, 5))
                }
                _ if self.sentiment_fails => Err(crate::error::InferenceError::Unavailable {
                    model: model.to_string(),
                    reason: "down".into(),
                }),
                _ => Ok(Self::one_hot(0, 5)),
            }
        }
    }

    fn raw(id: &str, subject: &str, html: &str) -> RawMessage {
        RawMessage {
            id: Some(id.into()),
            subject: Some(subject.into()),
            body: Some(RawBody {
                content: Some(html.into()),
                content_type: Some("html".into()),
            }),
        }
    }

    fn desk_a() -> Recipient {
        Recipient::new("finance-desk@corp.example", "Finance Desk")
    }

    fn desk_b() -> Recipient {
        Recipient::new("operations@corp.example", "Operations")
    }

    fn routes() -> RoutingTable {
        RoutingTable::builder()
            .forward(Category::Finance, desk_a())
            .and_then(|b| b.forward(Category::Travel, desk_b()))
            .and_then(|b| b.forward(Category::Energy, desk_b()))
            .unwrap()
            .build()
    }

    fn processor_with(mail: Arc<MockMail>, runtime: Arc<dyn InferenceRuntime>) -> TriageProcessor {
        TriageProcessor::new(
            mail,
            Classifier::new(
                ModelHandle::new("category"),
                LabelTable::reference(),
                runtime.clone(),
            ),
            Classifier::new(ModelHandle::new("sentiment"), LabelTable::reference(), runtime),
            routes(),
        )
    }

    fn processor(mail: Arc<MockMail>) -> TriageProcessor {
        processor_with(mail, Arc::new(KeywordRuntime::new()))
    }

    #[tokio::test]
    async fn finance_message_is_updated_and_forwarded() {
        let mail = Arc::new(MockMail {
            inbox: vec![raw("1", "Q3 Earnings", "<p>Revenue up 10%</p>")],
            ..Default::default()
        });
        let out = processor(mail.clone()).run().await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].body, "revenue up 10%");
        assert_eq!(out[0].category, Some(Category::Finance));
        assert_eq!(out[0].sentiment, Some(Sentiment::Enquiry));

        assert_eq!(
            mail.calls(),
            vec![
                Call::Update(
                    "1".into(),
                    MessageUpdate {
                        subject: "Q3 Earnings".into(),
                        categories: vec!["Finance".into()],
                    }
                ),
                Call::Forward(
                    "1".into(),
                    ForwardRequest {
                        comment: "FYI".into(),
                        to: vec![desk_a()],
                    }
                ),
            ]
        );
    }

    #[tokio::test]
    async fn technology_message_is_updated_but_not_forwarded() {
        let mail = Arc::new(MockMail {
            inbox: vec![raw("7", "Outage", "<p>The server is down</p>")],
            ..Default::default()
        });
        let out = processor(mail.clone()).run().await;

        assert_eq!(out[0].category, Some(Category::Technology));
        let calls = mail.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::Update(id, u) if id == "7" && u.categories == ["Technology"]));
    }

    #[tokio::test]
    async fn energy_forwards_to_single_recipient() {
        let mail = Arc::new(MockMail {
            inbox: vec![raw("e", "Gas", "<p>New pipeline capacity</p>")],
            ..Default::default()
        });
        processor(mail.clone()).run().await;

        let forwards: Vec<_> = mail
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Forward(_, f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(forwards.len(), 1);
        assert_eq!(forwards[0].to, vec![desk_b()]);
    }

    #[tokio::test]
    async fn broken_markup_still_classifies() {
        let mail = Arc::new(MockMail {
            inbox: vec![raw("2", "???", "<broken<<html")],
            ..Default::default()
        });
        let out = processor(mail).run().await;
        assert_eq!(out[0].body, "");
        assert!(out[0].is_classified());
    }

    #[tokio::test]
    async fn update_failure_does_not_stop_forward_or_next_message() {
        let mail = Arc::new(MockMail {
            inbox: vec![
                raw("1", "Q3", "<p>revenue</p>"),
                raw("2", "Trip", "<p>flight booked</p>"),
            ],
            fail_update: HashSet::from(["1".to_string()]),
            fail_forward: HashSet::from(["1".to_string()]),
            ..Default::default()
        });
        let out = processor(mail.clone()).run().await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[1].category, Some(Category::Travel));
        let calls = mail.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(&calls[1], Call::Forward(id, _) if id == "1"));
        assert!(matches!(&calls[2], Call::Update(id, _) if id == "2"));
        assert!(matches!(&calls[3], Call::Forward(id, f) if id == "2" && f.to == vec![desk_b()]));
    }

    #[tokio::test]
    async fn process_reports_outcome() {
        let mail = Arc::new(MockMail {
            fail_forward: HashSet::from(["1".to_string()]),
            ..Default::default()
        });
        let processor = processor(mail);
        let mut message = Message::from_raw(raw("1", "Q3", "<p>revenue</p>"));
        let outcome = processor.process(&mut message).await;
        assert_eq!(
            outcome,
            MessageOutcome {
                updated: true,
                forwarded: false,
                failed_calls: 1,
            }
        );
    }

    #[tokio::test]
    async fn fetch_failure_yields_empty_batch() {
        let mail = Arc::new(MockMail {
            inbox: vec![raw("1", "Q3", "<p>revenue</p>")],
            fail_list: true,
            ..Default::default()
        });
        let out = processor(mail.clone()).run().await;
        assert!(out.is_empty());
        assert!(mail.calls().is_empty());
    }

    #[tokio::test]
    async fn label_mapping_fault_skips_update_and_keeps_sentiment() {
        let mail = Arc::new(MockMail {
            inbox: vec![raw("m", "?", "<p>mystery</p>"), raw("n", "Q3", "<p>revenue</p>")],
            ..Default::default()
        });
        let out = processor(mail.clone()).run().await;

        assert_eq!(out[0].category, None);
        assert_eq!(out[0].sentiment, Some(Sentiment::Enquiry));
        assert_eq!(out[1].category, Some(Category::Finance));
        assert!(mail
            .calls()
            .iter()
            .all(|c| !matches!(c, Call::Update(id, _) | Call::Forward(id, _) if id == "m")));
    }

    #[tokio::test]
    async fn label_mapping_fault_is_logged_distinctly() {
        let logs = LogCapture::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber());

        let processor = processor(Arc::new(MockMail::default()));
        let mut message = Message::from_raw(raw("m", "?", "<p>mystery</p>"));
        processor.process(&mut message).await;

        assert_eq!(logs.count(r#"fault="label_mapping""#), 1, "{:?}", logs.lines());
        assert_eq!(logs.count(r#"fault="inference""#), 0, "{:?}", logs.lines());
    }

    #[tokio::test]
    async fn runtime_failure_is_logged_as_inference_fault() {
        let logs = LogCapture::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber());

        let runtime = FixedRuntime::new()
            .failing("category", "connection refused")
            .with_scores("sentiment", vec![1.0]);
        let processor = processor_with(Arc::new(MockMail::default()), Arc::new(runtime));
        let mut message = Message::from_raw(raw("1", "Q3", "<p>revenue</p>"));
        processor.process(&mut message).await;

        assert_eq!(logs.count(r#"fault="inference""#), 1, "{:?}", logs.lines());
        assert_eq!(logs.count(r#"fault="label_mapping""#), 0);
    }

    #[tokio::test]
    async fn sentiment_failure_does_not_block_category() {
        let mail = Arc::new(MockMail {
            inbox: vec![raw("1", "Q3", "<p>revenue</p>")],
            ..Default::default()
        });
        let runtime = KeywordRuntime {
            sentiment_fails: true,
            ..KeywordRuntime::new()
        };
        let out = processor_with(mail.clone(), Arc::new(runtime)).run().await;

        assert_eq!(out[0].category, Some(Category::Finance));
        assert_eq!(out[0].sentiment, None);
        assert_eq!(mail.calls().len(), 2);
    }

    #[tokio::test]
    async fn category_runtime_down_leaves_message_unclassified() {
        let mail = Arc::new(MockMail {
            inbox: vec![raw("1", "Q3", "<p>revenue</p>")],
            ..Default::default()
        });
        let runtime = FixedRuntime::new()
            .failing("category", "connection refused")
            .with_scores("sentiment", vec![0.0, 0.0, 0.0, 0.0, 1.0]);
        let out = processor_with(mail.clone(), Arc::new(runtime)).run().await;

        assert_eq!(out[0].category, None);
        assert_eq!(out[0].sentiment, Some(Sentiment::Emergency));
        assert!(mail.calls().is_empty());
    }

    #[tokio::test]
    async fn custom_forward_comment() {
        let mail = Arc::new(MockMail {
            inbox: vec![raw("1", "Q3", "<p>revenue</p>")],
            ..Default::default()
        });
        processor(mail.clone())
            .with_forward_comment("Auto-triaged")
            .run()
            .await;
        assert!(mail
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Forward(_, f) if f.comment == "Auto-triaged")));
    }

    #[test]
    fn prepare_preserves_provider_order() {
        let out = TriageProcessor::prepare(vec![
            raw("b", "", "<p>two</p>"),
            raw("a", "", "<p>one</p>"),
        ]);
        let ids: Vec<_> = out.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }
}
