//! Tool-call turn runner.
//!
//! One "turn" may take several generation rounds: the model answers with
//! tool invocations, the dispatcher executes them in order, and their
//! results are fed back until a response arrives with no further calls.

use tracing::{debug, warn};

use tandem_llm::{ChatMessage, ChatRequest, GenerativeBackend, LlmError};
use tandem_tools::{Dispatcher, ToolCall};
use tandem_types::User;

/// Drive one tool-enabled turn to a final text reply.
///
/// `max_rounds` bounds a runaway model; once exhausted, a last request is
/// made without tool schemas so the turn always ends in text.
pub async fn run_turn(
    backend: &dyn GenerativeBackend,
    dispatcher: &Dispatcher,
    owner: &User,
    mut messages: Vec<ChatMessage>,
    max_rounds: usize,
) -> Result<String, LlmError> {
    let tools = ToolCall::schemas();

    for round in 0..max_rounds {
        let response = backend
            .complete(ChatRequest::with_tools(messages.clone(), tools.clone()))
            .await?;

        if response.tool_calls.is_empty() {
            return Ok(response.content);
        }

        debug!(round, calls = response.tool_calls.len(), "Executing requested tool calls");
        messages.push(ChatMessage::assistant_with_calls(
            response.content,
            response.tool_calls.clone(),
        ));
        for call in &response.tool_calls {
            let result = dispatcher.dispatch(owner, call).await;
            messages.push(ChatMessage::tool_result(call.id.clone(), result));
        }
    }

    warn!(max_rounds, "Tool round limit reached, requesting a final reply");
    let response = backend.complete(ChatRequest::new(messages)).await?;
    Ok(response.content)
}
