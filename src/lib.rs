//! Mail triage: classify inbox messages by category and sentiment, write
//! the category back to the mailbox and forward by category.

pub mod config;
pub mod error;
pub mod inference;
pub mod mail;
pub mod pipeline;
pub mod server;
