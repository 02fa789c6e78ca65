//! Slack Web API adapter.
//!
//! Posts messages with `chat.postMessage` and reads thread replies with
//! `conversations.replies`. Channel and token come from the
//! [`SettingResolver`]; neither is ever taken from the caller.

use crate::chat_adapter::ChatAdapter;
use crate::error::Result;
use crate::models::{
    ErrorDescriptor, PostMessageRequest, PostMessageResponse, RepliesResponse, ReplyResult,
    SendResult,
};
use crate::resolver::SettingResolver;
use async_trait::async_trait;
use hyper::ext::ReasonPhrase;
use reqwest::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use std::error::Error as StdError;
use std::time::Duration;

/// Fixed pause before a thread is polled for replies
pub const REPLY_WAIT: Duration = Duration::from_secs(10);

pub const SEND_CHANNEL_NOT_CONFIGURED: &str = "Slack channel not configured";
pub const RECEIVE_CHANNEL_NOT_CONFIGURED: &str = "Channel not configured";
pub const NO_RESPONSE_ERROR: &str = "No response received from Slack API";

/// Slack implementation of [`ChatAdapter`]
pub struct SlackAdapter {
    client: Client,
    base_url: String,
    settings: SettingResolver,
    reply_wait: Duration,
}

impl SlackAdapter {
    pub fn new(base_url: impl Into<String>, settings: SettingResolver) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("slack-workflow-binding/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            settings,
            reply_wait: REPLY_WAIT,
        })
    }

    #[cfg(test)]
    fn with_reply_wait(mut self, reply_wait: Duration) -> Self {
        self.reply_wait = reply_wait;
        self
    }

    /// Headers shared by every Slack call
    ///
    /// A missing token is logged but does not block the request.
    pub async fn build_headers(&self) -> Vec<(HeaderName, String)> {
        let mut headers = vec![(CONTENT_TYPE, "application/json".to_string())];

        match self.settings.api_key().await {
            Some(api_key) => headers.push((AUTHORIZATION, format!("Bearer {}", api_key))),
            None => tracing::error!("Slack API key not configured, sending unauthenticated request"),
        }

        headers
    }

    async fn with_headers(&self, mut request: RequestBuilder) -> RequestBuilder {
        for (name, value) in self.build_headers().await {
            request = request.header(name, value);
        }
        request
    }

    /// Send a request and turn transport and HTTP failures into descriptors
    async fn dispatch(&self, request: RequestBuilder) -> std::result::Result<Response, ErrorDescriptor> {
        let response = request.send().await.map_err(|e| {
            let error = describe_request_error(&e);
            tracing::error!("Slack request failed: {}", error);
            ErrorDescriptor::new(error)
        })?;

        let status = response.status();
        if !status.is_success() {
            let error = format!("HTTP error! status: {} {}", status.as_u16(), status_text(&response))
                .trim_end()
                .to_string();
            tracing::error!("Slack API responded with failure: {}", error);
            return Err(ErrorDescriptor::new(error));
        }

        Ok(response)
    }

    /// Post `message` to the configured channel
    ///
    /// The caller's `channel` is ignored: one integration targets the one
    /// channel in its configuration.
    pub async fn send_message(&self, _channel: &str, message: &str) -> SendResult {
        let Some(channel) = self.settings.channel().await else {
            tracing::error!("{}", SEND_CHANNEL_NOT_CONFIGURED);
            return SendResult::failed(SEND_CHANNEL_NOT_CONFIGURED);
        };

        let body = PostMessageRequest {
            channel,
            text: message.to_string(),
        };

        tracing::debug!(channel = %body.channel, "Posting message to Slack");

        let request = self
            .with_headers(self.client.post(format!("{}/chat.postMessage", self.base_url)))
            .await
            .json(&body);

        let response = match self.dispatch(request).await {
            Ok(response) => response,
            Err(descriptor) => return SendResult::Failed(descriptor),
        };

        match response.json::<PostMessageResponse>().await {
            Ok(PostMessageResponse { ts: Some(ts), .. }) => {
                tracing::info!(ts = %ts, "Message posted to Slack");
                SendResult::Posted(ts)
            }
            Ok(PostMessageResponse { ok, error, .. }) => {
                let error = error.unwrap_or_else(|| "missing ts".to_string());
                tracing::error!(ok, "Slack API error: {}", error);
                SendResult::failed(format!("Slack API error: {}", error))
            }
            Err(e) => {
                tracing::error!("Invalid response from Slack API: {}", e);
                SendResult::failed(format!("Invalid response from Slack API: {}", e))
            }
        }
    }

    /// Pause for [`REPLY_WAIT`], then poll the thread once
    ///
    /// The pause is not interrupted when a reply arrives early.
    pub async fn wait_for_reply(&self, thread_id: &str) -> ReplyResult {
        let Some(channel) = self.settings.channel().await else {
            return ReplyResult::failed(RECEIVE_CHANNEL_NOT_CONFIGURED);
        };

        tracing::debug!(thread_ts = %thread_id, "Waiting {:?} for a reply", self.reply_wait);
        tokio::time::sleep(self.reply_wait).await;

        let request = self
            .with_headers(
                self.client
                    .get(format!("{}/conversations.replies", self.base_url)),
            )
            .await
            .query(&[("ts", thread_id), ("channel", channel.as_str())]);

        let response = match self.dispatch(request).await {
            Ok(response) => response,
            Err(descriptor) => return ReplyResult::Failed(descriptor),
        };

        match response.json::<RepliesResponse>().await {
            Ok(mut replies) if replies.messages.len() >= 2 => match replies.messages.pop() {
                Some(latest) => ReplyResult::Reply(latest.text),
                None => ReplyResult::NoResponse,
            },
            Ok(_) => ReplyResult::NoResponse,
            Err(e) => {
                tracing::error!("Invalid response from Slack API: {}", e);
                ReplyResult::failed(format!("Invalid response from Slack API: {}", e))
            }
        }
    }
}

#[async_trait]
impl ChatAdapter for SlackAdapter {
    async fn send(&self, channel: &str, message: &str) -> SendResult {
        self.send_message(channel, message).await
    }

    async fn receive(&self, thread_id: &str) -> ReplyResult {
        self.wait_for_reply(thread_id).await
    }
}

/// Reason phrase as sent by the server, or the canonical one for the status
///
/// hyper only records the phrase when it differs from the canonical text.
fn status_text(response: &Response) -> String {
    response
        .extensions()
        .get::<ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .unwrap_or_else(|| {
            response
                .status()
                .canonical_reason()
                .unwrap_or_default()
                .to_string()
        })
}

/// Classify a reqwest failure that produced no HTTP response
///
/// Builder failures mean the request never left; their own text is kept.
/// Everything else means it was sent without an answer.
fn describe_request_error(e: &reqwest::Error) -> String {
    if !e.is_builder() {
        return NO_RESPONSE_ERROR.to_string();
    }

    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SlackConfig, API_KEY, CHANNEL};
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Log sink for asserting on emitted diagnostics
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn resolver(pairs: &[(&str, &str)]) -> SettingResolver {
        let config = SlackConfig::in_memory();
        for (key, value) in pairs {
            config.set(key, value);
        }
        SettingResolver::chain(None, Arc::new(config))
    }

    fn adapter(base_url: &str, pairs: &[(&str, &str)]) -> SlackAdapter {
        SlackAdapter::new(base_url, resolver(pairs))
            .unwrap()
            .with_reply_wait(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_send_posts_to_configured_channel() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("Authorization", "Bearer xoxb-test"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(json!({ "channel": "C-CONF", "text": "deploy done" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "ts": "123.45" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let slack = adapter(&server.uri(), &[(API_KEY, "xoxb-test"), (CHANNEL, "C-CONF")]);

        // The caller's channel is ignored in favour of configuration
        let result = slack.send("C-IGNORED", "deploy done").await;
        assert_eq!(result, SendResult::Posted("123.45".to_string()));
    }

    #[tokio::test]
    async fn test_send_without_api_key_omits_authorization() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ts": "1.2" })))
            .expect(1)
            .mount(&server)
            .await;

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let slack = adapter(&server.uri(), &[(CHANNEL, "C-CONF")]);
        assert_eq!(slack.send("", "hi").await.ts(), Some("1.2"));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));

        let logged = logs.contents();
        assert!(logged
            .lines()
            .any(|line| line.contains("ERROR") && line.contains("Slack API key not configured")));
    }

    #[tokio::test]
    async fn test_send_without_channel_makes_no_call() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let slack = adapter(&server.uri(), &[(API_KEY, "xoxb-test"), (CHANNEL, "")]);
        let result = slack.send("C-CALLER", "hello").await;

        assert_eq!(result, SendResult::failed("Slack channel not configured"));
    }

    #[tokio::test]
    async fn test_send_reports_http_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let slack = adapter(&server.uri(), &[(CHANNEL, "C-CONF")]);
        let result = slack.send("", "hello").await;

        assert_eq!(
            result,
            SendResult::failed("HTTP error! status: 429 Too Many Requests")
        );
    }

    /// Answers one request with a raw HTTP/1.1 status line
    async fn serve_status_line(status_line: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&received).to_lowercase();
                if let Some(end) = text.find("\r\n\r\n") {
                    let body_len = text
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|len| len.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if received.len() >= end + 4 + body_len {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                status_line
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_send_reports_reason_phrase_sent_by_server() {
        let base_url = serve_status_line("503 Slack Is Down").await;

        let slack = adapter(&base_url, &[(CHANNEL, "C-CONF")]);
        let result = slack.send("", "hello").await;

        assert_eq!(
            result,
            SendResult::failed("HTTP error! status: 503 Slack Is Down")
        );
    }

    #[tokio::test]
    async fn test_receive_reports_reason_phrase_sent_by_server() {
        let base_url = serve_status_line("502 Upstream Gone").await;

        let slack = adapter(&base_url, &[(CHANNEL, "C-CONF")]);

        assert_eq!(
            slack.receive("T1").await,
            ReplyResult::failed("HTTP error! status: 502 Upstream Gone")
        );
    }

    #[tokio::test]
    async fn test_send_reports_slack_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "channel_not_found" })),
            )
            .mount(&server)
            .await;

        let slack = adapter(&server.uri(), &[(CHANNEL, "C-GONE")]);
        let result = slack.send("", "hello").await;

        assert_eq!(result, SendResult::failed("Slack API error: channel_not_found"));
    }

    #[tokio::test]
    async fn test_send_without_listener_reports_no_response() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let slack = adapter(&format!("http://{}", addr), &[(CHANNEL, "C-CONF")]);
        let result = slack.send("", "hello").await;

        assert_eq!(result, SendResult::failed(NO_RESPONSE_ERROR));
    }

    #[tokio::test]
    async fn test_send_with_unbuildable_request_keeps_error_text() {
        let slack = adapter("not a url", &[(CHANNEL, "C-CONF")]);

        match slack.send("", "hello").await {
            SendResult::Failed(descriptor) => {
                assert!(descriptor.error.starts_with("builder error"));
                assert_ne!(descriptor.error, NO_RESPONSE_ERROR);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receive_single_message_is_no_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/conversations.replies"))
            .and(query_param("ts", "T1"))
            .and(query_param("channel", "C-CONF"))
            .and(header("Authorization", "Bearer xoxb-test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "messages": [{ "text": "a" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let slack = adapter(&server.uri(), &[(API_KEY, "xoxb-test"), (CHANNEL, "C-CONF")]);
        assert_eq!(slack.receive("T1").await, ReplyResult::NoResponse);
    }

    #[tokio::test]
    async fn test_receive_missing_messages_is_no_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/conversations.replies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let slack = adapter(&server.uri(), &[(CHANNEL, "C-CONF")]);
        assert_eq!(slack.receive("T1").await, ReplyResult::NoResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_returns_latest_reply_after_fixed_wait() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/conversations.replies"))
            .and(query_param("ts", "T1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "text": "a" }, { "text": "b" }, { "text": "c" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let slack = SlackAdapter::new(server.uri(), resolver(&[(CHANNEL, "C-CONF")])).unwrap();

        let started = tokio::time::Instant::now();
        let result = slack.receive("T1").await;

        assert_eq!(result, ReplyResult::Reply("c".to_string()));
        assert!(started.elapsed() >= REPLY_WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_without_channel_returns_immediately() {
        let slack = SlackAdapter::new("http://127.0.0.1:9", resolver(&[])).unwrap();

        let started = tokio::time::Instant::now();
        let result = slack.receive("T1").await;

        assert_eq!(result, ReplyResult::failed("Channel not configured"));
        assert!(started.elapsed() < REPLY_WAIT);
    }

    #[tokio::test]
    async fn test_receive_passes_request_errors_through() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/conversations.replies"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let slack = adapter(&server.uri(), &[(CHANNEL, "C-CONF")]);
        assert_eq!(
            slack.receive("T1").await,
            ReplyResult::failed("HTTP error! status: 500 Internal Server Error")
        );
    }

    #[tokio::test]
    async fn test_build_headers() {
        let with_key = adapter("http://localhost", &[(API_KEY, "xoxb-test")]);
        let headers = with_key.build_headers().await;
        assert!(headers.contains(&(CONTENT_TYPE, "application/json".to_string())));
        assert!(headers.contains(&(AUTHORIZATION, "Bearer xoxb-test".to_string())));

        let without_key = adapter("http://localhost", &[]);
        let headers = without_key.build_headers().await;
        assert_eq!(headers, vec![(CONTENT_TYPE, "application/json".to_string())]);
    }
}
