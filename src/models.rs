use serde::{Deserialize, Serialize, Serializer};

/// Literal returned by a reply poll when the thread holds no reply yet
pub const NO_RESPONSE: &str = "no response";

/// Failure value returned across the adapter boundary, serialized as `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub error: String,
}

impl ErrorDescriptor {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Outcome of posting a message
///
/// Serialized untagged: the bare timestamp token on success, the error
/// descriptor object on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendResult {
    /// Timestamp token Slack assigned to the posted message
    Posted(String),
    Failed(ErrorDescriptor),
}

impl SendResult {
    pub fn failed(error: impl Into<String>) -> Self {
        SendResult::Failed(ErrorDescriptor::new(error))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SendResult::Failed(_))
    }

    /// The timestamp token, if the post succeeded
    pub fn ts(&self) -> Option<&str> {
        match self {
            SendResult::Posted(ts) => Some(ts),
            SendResult::Failed(_) => None,
        }
    }
}

/// Outcome of polling a thread for a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyResult {
    /// Text of the most recent message in the thread
    Reply(String),
    /// Fewer than two messages in the thread
    NoResponse,
    Failed(ErrorDescriptor),
}

impl ReplyResult {
    pub fn failed(error: impl Into<String>) -> Self {
        ReplyResult::Failed(ErrorDescriptor::new(error))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ReplyResult::Failed(_))
    }
}

impl Serialize for ReplyResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ReplyResult::Reply(text) => serializer.serialize_str(text),
            ReplyResult::NoResponse => serializer.serialize_str(NO_RESPONSE),
            ReplyResult::Failed(descriptor) => descriptor.serialize(serializer),
        }
    }
}

/// Body of `chat.postMessage`
#[derive(Debug, Clone, Serialize)]
pub struct PostMessageRequest {
    pub channel: String,
    pub text: String,
}

/// Subset of the `chat.postMessage` response we read
#[derive(Debug, Clone, Deserialize)]
pub struct PostMessageResponse {
    #[serde(default)]
    pub ok: bool,
    pub ts: Option<String>,
    pub error: Option<String>,
}

/// Subset of the `conversations.replies` response we read
#[derive(Debug, Clone, Deserialize)]
pub struct RepliesResponse {
    #[serde(default)]
    pub messages: Vec<SlackMessage>,
}

/// A message in a thread; the first entry is the thread's parent
#[derive(Debug, Clone, Deserialize)]
pub struct SlackMessage {
    #[serde(default)]
    pub text: String,
}
