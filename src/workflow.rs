//! Workflow-engine surface.
//!
//! The binding exposes one event, [`SendSlackMessage`], and one workflow that
//! awaits the adapter's `send` with the event's fields. The daemon also
//! accepts reply-wait and configuration invocations through the same
//! envelope.

use crate::chat_adapter::ChatAdapter;
use crate::config::SlackConfig;
use crate::error::Result;
use crate::models::SendResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Event carrying a message for Slack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendSlackMessage {
    pub channel: String,
    pub message: String,
}

/// The send workflow: returns whatever the adapter's `send` returns
pub async fn send_slack_message(adapter: &dyn ChatAdapter, event: &SendSlackMessage) -> SendResult {
    adapter.send(&event.channel, &event.message).await
}

/// One invocation from the hosting engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event")]
pub enum Invocation {
    SendSlackMessage(SendSlackMessage),
    #[serde(rename_all = "camelCase")]
    AwaitSlackReply { thread_id: String },
    ConfigureSlack { key: String, value: String },
}

/// Answer to one invocation
#[derive(Debug, Clone, Serialize)]
pub struct InvocationOutcome {
    pub id: Uuid,
    pub result: Value,
}

/// Runs invocations against an adapter and the local configuration
pub struct WorkflowBinding<A: ChatAdapter> {
    adapter: A,
    config: Arc<SlackConfig>,
}

impl<A: ChatAdapter> WorkflowBinding<A> {
    pub fn new(adapter: A, config: Arc<SlackConfig>) -> Self {
        Self { adapter, config }
    }

    pub async fn dispatch(&self, invocation: Invocation) -> InvocationOutcome {
        let id = Uuid::new_v4();

        let result = match invocation {
            Invocation::SendSlackMessage(event) => {
                tracing::info!(invocation = %id, "SendSlackMessage");
                to_value(send_slack_message(&self.adapter, &event).await)
            }
            Invocation::AwaitSlackReply { thread_id } => {
                tracing::info!(invocation = %id, thread_ts = %thread_id, "AwaitSlackReply");
                to_value(self.adapter.receive(&thread_id).await)
            }
            Invocation::ConfigureSlack { key, value } => {
                tracing::info!(invocation = %id, "ConfigureSlack '{}'", key);
                self.config.set(&key, &value);
                Value::Bool(true)
            }
        };

        InvocationOutcome { id, result }
    }

    /// Parse and run one JSON line; malformed input yields an error descriptor
    pub async fn dispatch_line(&self, line: &str) -> InvocationOutcome {
        match serde_json::from_str::<Invocation>(line) {
            Ok(invocation) => self.dispatch(invocation).await,
            Err(e) => {
                tracing::warn!("Rejected malformed invocation: {}", e);
                InvocationOutcome {
                    id: Uuid::new_v4(),
                    result: serde_json::json!({ "error": format!("Invalid invocation: {}", e) }),
                }
            }
        }
    }
}

/// Serve JSON-line invocations from `input`, one result line per invocation
///
/// Each invocation runs on its own task, so a pending reply wait does not hold
/// back later sends; results are written in completion order and carry the
/// invocation id. On end of input the remaining invocations are drained. When
/// `shutdown` resolves, serving stops at once and pending invocations are
/// abandoned.
pub async fn serve<A, R, W, S>(
    binding: Arc<WorkflowBinding<A>>,
    input: R,
    output: &mut W,
    shutdown: S,
) -> Result<()>
where
    A: ChatAdapter + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<InvocationOutcome>();
    let mut tx = Some(tx);
    let mut lines = input.lines();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line(), if tx.is_some() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Some(tx) = &tx {
                        let binding = binding.clone();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let outcome = binding.dispatch_line(&line).await;
                            let _ = tx.send(outcome);
                        });
                    }
                }
                None => {
                    tracing::info!("Input closed, draining pending invocations");
                    tx = None;
                }
            },
            outcome = rx.recv() => match outcome {
                Some(outcome) => {
                    let mut encoded = serde_json::to_vec(&outcome)?;
                    encoded.push(b'\n');
                    output.write_all(&encoded).await?;
                    output.flush().await?;
                }
                None => break,
            },
            _ = &mut shutdown => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    Ok(())
}

fn to_value<T: Serialize>(result: T) -> Value {
    serde_json::to_value(result)
        .unwrap_or_else(|e| serde_json::json!({ "error": format!("Unserializable result: {}", e) }))
}
