//! Completion pipeline: payload assembly, bounded retries with exponential
//! backoff, failure classification and persona-consistent fallbacks.

mod error;
mod fallback;
mod gateway;
mod payload;

pub use error::{CompletionError, FailureKind};
pub use fallback::FallbackTable;
pub use gateway::{CompletionBackend, CompletionGateway, EndpointCheck, EndpointHealth, GatewayConfig};
pub use payload::{
    assemble_messages, ChatCompletionRequest, ContentPart, ImageUrl, MessageContent, RequestMessage,
};
