//! Email triage pipeline.
//!
//! Every fetched message flows through:
//! 1. `normalize`: markup → lower-cased plain text
//! 2. `Classifier`: category and sentiment, each from its own model
//! 3. `MailProvider::update_message`: category written back
//! 4. `RoutingTable::route`: at most one forward per message

pub mod classifier;
pub mod labels;
pub mod normalize;
pub mod processor;
pub mod rules;
pub mod types;

pub use classifier::{CategoryClassifier, Classifier, SentimentClassifier};
pub use labels::{Category, LabelTable, Sentiment};
pub use processor::TriageProcessor;
pub use rules::RoutingTable;
pub use types::Message;
