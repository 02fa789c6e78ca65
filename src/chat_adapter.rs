use crate::models::{ReplyResult, SendResult};
use async_trait::async_trait;

/// Trait for chat platform adapters driven by workflow invocations
///
/// Implementations never fail with a Rust error: every failure comes back
/// as the error variant of the returned result so the workflow engine can
/// pass it through untouched.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// Post a message and return the platform's message identifier
    ///
    /// # Arguments
    /// * `channel` - The channel requested by the caller
    /// * `message` - The message text
    async fn send(&self, channel: &str, message: &str) -> SendResult;

    /// Wait for a reply in the thread started by a previous `send`
    ///
    /// # Arguments
    /// * `thread_id` - The identifier returned by `send`
    async fn receive(&self, thread_id: &str) -> ReplyResult;
}
