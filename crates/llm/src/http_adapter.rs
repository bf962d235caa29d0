use futures::StreamExt;
use reqwest::{StatusCode, Url};
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::decode::Utf8ChunkDecoder;
use super::model::ReplyMode;
use super::normalize::{excerpt, extract_reply, extract_reply_value, upstream_error_message};
use super::provider::{
    ChatBody, ChatRequest, EmptyMessageSetSnafu, HttpClientSnafu, InvalidEndpointSnafu,
    LlmProvider, MissingBodySnafu, NoReplyExtractedSnafu, ProviderConfig, ProviderError,
    ProviderResult, ProviderStreamHandle, ProviderWorker, ReplyEvent, ReplyEventPayload,
    ReplyFailure, make_event_stream,
};

pub const HTTP_PROVIDER_ID: &str = "caya-http";

/// Upper bound on the response excerpt carried by a status error.
pub const STATUS_BODY_EXCERPT_CHARS: usize = 180;

/// How a worker run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerOutcome {
    Completed,
    Cancelled,
}

/// Everything a worker needs, cloned out of the provider so it can run as `'static`.
#[derive(Debug, Clone)]
struct Transport {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    mode: ReplyMode,
}

impl Transport {
    async fn post(
        &self,
        request: &ChatRequest,
        stage: &'static str,
    ) -> ProviderResult<reqwest::Response> {
        let body = ChatBody::for_mode(self.mode, &self.model, &request.messages);
        tracing::debug!(
            request_id = %request.id,
            endpoint = %self.endpoint,
            mode = %self.mode,
            message_count = request.messages.len(),
            "posting chat request"
        );

        self.client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::from_reqwest(stage, source))
    }

    async fn fetch_buffered(&self, request: &ChatRequest) -> ProviderResult<String> {
        let response = self.post(request, "buffered-send").await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ProviderError::from_reqwest("buffered-read-body", source))?;

        if !status.is_success() {
            return Err(status_error("buffered-http-status", status, &body));
        }

        if let Some(reply) = extract_reply(&body) {
            return Ok(reply);
        }

        // The body is sometimes JSON wrapped in a JSON string; give it one explicit reparse.
        let reparsed = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| extract_reply_value(&value));

        match reparsed {
            Some(reply) => Ok(reply),
            None => {
                tracing::warn!(
                    request_id = %request.id,
                    body_len = body.len(),
                    "no reply could be extracted from a successful response"
                );
                NoReplyExtractedSnafu {
                    stage: "buffered-normalize",
                }
                .fail()
            }
        }
    }

    async fn fetch_streamed(
        &self,
        request: &ChatRequest,
        event_tx: &mpsc::UnboundedSender<ReplyEvent>,
        cancel_rx: &mut oneshot::Receiver<()>,
    ) -> ProviderResult<WorkerOutcome> {
        let response = tokio::select! {
            _ = &mut *cancel_rx => return Ok(WorkerOutcome::Cancelled),
            response = self.post(request, "streamed-send") => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("streamed-http-status", status, &body));
        }

        ensure!(
            status != StatusCode::NO_CONTENT && response.content_length() != Some(0),
            MissingBodySnafu {
                stage: "streamed-open-body",
                status: status.as_u16(),
            }
        );

        let mut chunks = response.bytes_stream();
        let mut decoder = Utf8ChunkDecoder::new();
        let mut chunk_count = 0usize;

        loop {
            tokio::select! {
                _ = &mut *cancel_rx => {
                    tracing::debug!(
                        request_id = %request.id,
                        chunk_count,
                        "reply stream cancelled"
                    );
                    return Ok(WorkerOutcome::Cancelled);
                }
                next_chunk = chunks.next() => {
                    match next_chunk {
                        Some(Ok(bytes)) => {
                            chunk_count += 1;
                            let text = decoder.decode(&bytes);
                            if !text.is_empty()
                                && !send_event(event_tx, request, ReplyEventPayload::Delta(text))
                            {
                                return Ok(WorkerOutcome::Cancelled);
                            }
                        }
                        Some(Err(source)) => {
                            return Err(ProviderError::from_reqwest("streamed-read-chunk", source));
                        }
                        None => break,
                    }
                }
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() && !send_event(event_tx, request, ReplyEventPayload::Delta(tail)) {
            return Ok(WorkerOutcome::Cancelled);
        }

        tracing::debug!(request_id = %request.id, chunk_count, "reply stream finished");
        Ok(WorkerOutcome::Completed)
    }
}

fn send_event(
    event_tx: &mpsc::UnboundedSender<ReplyEvent>,
    request: &ChatRequest,
    payload: ReplyEventPayload,
) -> bool {
    event_tx.send(ReplyEvent::new(request.id, payload)).is_ok()
}

fn status_error(stage: &'static str, status: StatusCode, body: &str) -> ProviderError {
    let detail = upstream_error_message(body).unwrap_or_else(|| body.to_string());
    ProviderError::Status {
        stage,
        status: status.as_u16(),
        detail: excerpt(&detail, STATUS_BODY_EXCERPT_CHARS),
    }
}

/// Completion client for the site's own chat endpoints.
pub struct HttpChatProvider {
    config: ProviderConfig,
    transport: Transport,
}

impl HttpChatProvider {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let endpoint_raw = format!("{}{}", config.base_url, config.endpoint_path());
        let endpoint = Url::parse(&endpoint_raw).context(InvalidEndpointSnafu {
            stage: "http-provider-new",
            endpoint: endpoint_raw.clone(),
        })?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })?;

        Ok(Self {
            transport: Transport {
                client,
                endpoint,
                model: config.model.clone(),
                mode: config.mode,
            },
            config,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Url {
        &self.transport.endpoint
    }

    /// One buffered round trip, regardless of the configured mode's streaming.
    pub async fn complete(&self, request: &ChatRequest) -> ProviderResult<String> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "complete",
                request_id: request.id,
            }
        );
        self.transport.fetch_buffered(request).await
    }

    async fn run_reply_worker(
        transport: Transport,
        request: ChatRequest,
        event_tx: mpsc::UnboundedSender<ReplyEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let outcome = match transport.mode {
            ReplyMode::Buffered => {
                tokio::select! {
                    _ = &mut cancel_rx => Ok(WorkerOutcome::Cancelled),
                    result = transport.fetch_buffered(&request) => result.map(|reply| {
                        if send_event(&event_tx, &request, ReplyEventPayload::Reply(reply)) {
                            WorkerOutcome::Completed
                        } else {
                            WorkerOutcome::Cancelled
                        }
                    }),
                }
            }
            ReplyMode::Streamed | ReplyMode::Widget => {
                transport
                    .fetch_streamed(&request, &event_tx, &mut cancel_rx)
                    .await
            }
        };

        match outcome {
            Ok(WorkerOutcome::Completed) => {
                let _ = send_event(&event_tx, &request, ReplyEventPayload::Done);
            }
            Ok(WorkerOutcome::Cancelled) => {
                tracing::debug!(request_id = %request.id, "reply worker stopped early");
            }
            Err(error) => {
                tracing::warn!(
                    request_id = %request.id,
                    endpoint = %transport.endpoint,
                    error = %error,
                    "reply request failed"
                );
                let failure = ReplyFailure::from(&error);
                let _ = send_event(&event_tx, &request, ReplyEventPayload::Error(failure));
            }
        }
    }
}

impl LlmProvider for HttpChatProvider {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn mode(&self) -> ReplyMode {
        self.config.mode
    }

    fn open_reply(&self, request: ChatRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "open-reply",
                request_id: request.id,
            }
        );

        let (event_tx, stream, cancel_rx) = make_event_stream(request.id);
        let worker: ProviderWorker = Box::pin(Self::run_reply_worker(
            self.transport.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }
}
