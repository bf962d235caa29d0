//! Completion client for the Caya chat endpoints.
//!
//! Requests go out as one JSON POST; replies come back either as one body (normalized
//! across the shapes the upstream provider has used) or as a raw text stream.
use std::sync::Arc;

mod decode;
mod http_adapter;
mod model;
mod normalize;
mod provider;

pub use decode::Utf8ChunkDecoder;
pub use http_adapter::{HTTP_PROVIDER_ID, HttpChatProvider, STATUS_BODY_EXCERPT_CHARS};
pub use model::{DEFAULT_CHAT_PATH, DEFAULT_MODEL, DEFAULT_WIDGET_PATH, ReplyMode};
pub use normalize::{excerpt, extract_reply, extract_reply_value, upstream_error_message};
pub use provider::{
    ChatRequest, FailureKind, LlmProvider, ProviderConfig, ProviderError,
    ProviderEventStream, ProviderMessage, ProviderResult, ProviderStreamHandle, ProviderWorker,
    ReplyEvent, ReplyEventPayload, ReplyFailure, RequestId, Role, make_event_stream,
};

pub fn create_provider(config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    tracing::debug!(
        provider_id = %config.provider_id,
        base_url = %config.base_url,
        mode = %config.mode,
        model = %config.model,
        "creating chat provider"
    );
    Ok(Arc::new(HttpChatProvider::new(config)?))
}
