//! tandem-llm: the generative-backend contract and its implementations.
//!
//! The engine treats text generation as a pluggable request/response
//! function: an ordered list of role-tagged messages plus tool schemas in,
//! generated text plus zero or more structured tool invocations out. The
//! shipped implementation speaks the OpenAI-compatible
//! `/v1/chat/completions` protocol, which covers OpenAI itself as well as
//! local backends like Ollama and vLLM.

pub mod openai;
pub mod translate;
pub mod types;

pub use openai::OpenAiBackend;
pub use translate::Translator;
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, ChatRole, ToolDefinition, ToolInvocation,
};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("authentication failed")]
    Auth,
    #[error("rate limited")]
    RateLimited,
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// The pluggable text-generation seam.
///
/// Implementations must not retry internally; retry policy belongs to the
/// caller (the chat path degrades to a fallback string, the dispatch loop
/// leaves the action active for the next tick).
#[async_trait::async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}
