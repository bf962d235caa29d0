use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

use super::http_adapter::HTTP_PROVIDER_ID;
use super::model::{DEFAULT_CHAT_PATH, DEFAULT_MODEL, DEFAULT_WIDGET_PATH, ReplyMode};

/// Chat speaker role as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Identifier for one outstanding reply request.
///
/// Events carry it so a consumer can drop anything that does not belong to the
/// request it is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub base_url: String,
    pub chat_path: String,
    pub widget_path: String,
    pub model: String,
    pub mode: ReplyMode,
    pub request_timeout: Option<Duration>,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, mode: ReplyMode) -> Self {
        let model = model.into().trim().to_string();
        Self {
            provider_id: HTTP_PROVIDER_ID.to_string(),
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            widget_path: DEFAULT_WIDGET_PATH.to_string(),
            model: if model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                model
            },
            mode,
            request_timeout: None,
        }
    }

    pub fn with_chat_path(mut self, path: impl Into<String>) -> Self {
        self.chat_path = normalize_path(path.into(), DEFAULT_CHAT_PATH);
        self
    }

    pub fn with_widget_path(mut self, path: impl Into<String>) -> Self {
        self.widget_path = normalize_path(path.into(), DEFAULT_WIDGET_PATH);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Path the configured mode posts to.
    pub fn endpoint_path(&self) -> &str {
        match self.mode {
            ReplyMode::Buffered | ReplyMode::Streamed => &self.chat_path,
            ReplyMode::Widget => &self.widget_path,
        }
    }
}

fn normalize_path(path: String, fallback: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

impl ProviderMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Full conversation for one reply: system preamble, prior turns, new user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub id: RequestId,
    pub messages: Vec<ProviderMessage>,
}

impl ChatRequest {
    pub fn new(id: RequestId, messages: Vec<ProviderMessage>) -> Self {
        Self { id, messages }
    }
}

/// Request body. Widget mode omits `model` and `stream`.
#[derive(Debug, Serialize)]
pub(crate) struct ChatBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    pub messages: &'a [ProviderMessage],
}

impl<'a> ChatBody<'a> {
    pub(crate) fn for_mode(
        mode: ReplyMode,
        model: &'a str,
        messages: &'a [ProviderMessage],
    ) -> Self {
        match mode {
            ReplyMode::Buffered => Self {
                model: Some(model),
                stream: Some(false),
                messages,
            },
            ReplyMode::Streamed => Self {
                model: Some(model),
                stream: Some(true),
                messages,
            },
            ReplyMode::Widget => Self {
                model: None,
                stream: None,
                messages,
            },
        }
    }
}

pub type ProviderWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("invalid chat endpoint '{endpoint}': {source}"))]
    InvalidEndpoint {
        stage: &'static str,
        endpoint: String,
        source: url::ParseError,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request timed out on `{stage}`"))]
    Timeout {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("HTTP {status}: {detail}"))]
    Status {
        stage: &'static str,
        status: u16,
        detail: String,
    },
    #[snafu(display("HTTP {status}: response has no body"))]
    MissingBody { stage: &'static str, status: u16 },
    #[snafu(display("Empty reply from server"))]
    NoReplyExtracted { stage: &'static str },
    #[snafu(display("reply request {request_id} has no messages"))]
    EmptyMessageSet {
        stage: &'static str,
        request_id: RequestId,
    },
    #[snafu(display("reply stream for {request_id} closed before a terminal event"))]
    StreamClosed {
        stage: &'static str,
        request_id: RequestId,
    },
}

impl ProviderError {
    /// Whether the failure happened after a successful transport call.
    pub fn is_normalization_failure(&self) -> bool {
        matches!(self, Self::NoReplyExtracted { .. })
    }

    pub(crate) fn from_reqwest(stage: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { stage, source }
        } else {
            Self::HttpClient { stage, source }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network error, timeout, non-2xx status or a broken stream.
    Transport,
    /// The call succeeded but no reply text could be extracted.
    NoReply,
}

/// Failure as carried on the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ReplyFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transport,
            message: message.into(),
        }
    }
}

impl From<&ProviderError> for ReplyFailure {
    fn from(error: &ProviderError) -> Self {
        let kind = if error.is_normalization_failure() {
            FailureKind::NoReply
        } else {
            FailureKind::Transport
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

/// Reply payload in chat-domain terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEventPayload {
    /// Decoded text appended verbatim to the running reply.
    Delta(String),
    /// Whole reply from a buffered request.
    Reply(String),
    Done,
    Error(ReplyFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEvent {
    pub request_id: RequestId,
    pub payload: ReplyEventPayload,
}

impl ReplyEvent {
    pub fn new(request_id: RequestId, payload: ReplyEventPayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            ReplyEventPayload::Done | ReplyEventPayload::Error(_)
        )
    }
}

pub struct ProviderEventStream {
    request_id: RequestId,
    events: mpsc::UnboundedReceiver<ReplyEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// Event stream plus the worker future that feeds it.
///
/// The worker performs all network IO; the caller decides where it runs.
pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
    pub worker: ProviderWorker,
}

impl ProviderEventStream {
    pub(crate) fn new(
        request_id: RequestId,
        events: mpsc::UnboundedReceiver<ReplyEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            request_id,
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub async fn recv(&mut self) -> Option<ReplyEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ReplyEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for ProviderEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;
    fn model(&self) -> &str;
    fn mode(&self) -> ReplyMode;
    fn open_reply(&self, request: ChatRequest) -> ProviderResult<ProviderStreamHandle>;
}

/// Builds the channel pair shared by a worker and its event stream.
///
/// Public so alternative providers (and test doubles) can feed the same stream type.
pub fn make_event_stream(
    request_id: RequestId,
) -> (
    mpsc::UnboundedSender<ReplyEvent>,
    ProviderEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        ProviderEventStream::new(request_id, event_rx, cancel_tx),
        cancel_rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_body_carries_model_and_stream_flag() {
        let messages = vec![ProviderMessage::new(Role::User, "price?")];
        let body = ChatBody::for_mode(ReplyMode::Buffered, "grok-2-1212", &messages);
        let json = serde_json::to_value(&body).unwrap_or_default();

        assert_eq!(
            json,
            serde_json::json!({
                "model": "grok-2-1212",
                "stream": false,
                "messages": [{"role": "user", "content": "price?"}],
            })
        );
    }

    #[test]
    fn widget_body_only_carries_messages() {
        let messages = vec![ProviderMessage::new(Role::System, "be nice")];
        let body = ChatBody::for_mode(ReplyMode::Widget, "ignored", &messages);
        let json = serde_json::to_value(&body).unwrap_or_default();

        assert_eq!(
            json,
            serde_json::json!({"messages": [{"role": "system", "content": "be nice"}]})
        );
    }

    #[test]
    fn config_normalizes_paths_and_blank_model() {
        let config = ProviderConfig::new(" http://localhost:8787/ ", "  ", ReplyMode::Widget)
            .with_chat_path("chat")
            .with_widget_path("");

        assert_eq!(config.base_url, "http://localhost:8787");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.chat_path, "/chat");
        assert_eq!(config.widget_path, DEFAULT_WIDGET_PATH);
        assert_eq!(config.endpoint_path(), DEFAULT_WIDGET_PATH);
    }

    #[test]
    fn status_error_display_keeps_code_and_detail() {
        let error = ProviderError::Status {
            stage: "test",
            status: 500,
            detail: "server error".to_string(),
        };
        assert_eq!(error.to_string(), "HTTP 500: server error");
        assert!(!error.is_normalization_failure());
        assert!(
            ProviderError::NoReplyExtracted { stage: "test" }.is_normalization_failure()
        );
    }

    #[tokio::test]
    async fn dropping_the_stream_signals_cancellation() {
        let (_event_tx, stream, cancel_rx) = make_event_stream(RequestId::new(7));
        assert_eq!(stream.request_id(), RequestId::new(7));
        drop(stream);
        assert!(cancel_rx.await.is_ok());
    }
}
