//! Workflow binding that posts messages to Slack and waits for threaded replies.

pub mod chat_adapter;
pub mod config;
pub mod error;
pub mod models;
pub mod resolver;
pub mod slack;
pub mod workflow;
