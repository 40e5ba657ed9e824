//! tandem-tools: the tool protocol between the generative backend and the
//! engine's state.
//!
//! The model can request three side effects while producing a reply:
//! rewriting a user's summary, scheduling a future action, and cancelling
//! one. The supported set is a closed enum matched exhaustively — an
//! unknown name is data (reported back to the model), never a dispatch
//! path. Every invocation produces a result string for the model; no
//! handler failure escapes a call.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use tandem_llm::{ToolDefinition, ToolInvocation, Translator};
use tandem_store::Store;
use tandem_types::{DeliveryGateway, User};

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    /// Replace the stored free-text summary for a user.
    OverwriteSummary { user_id: i64, new_summary: String },
    /// Enqueue a future action; `trigger_time` is still the raw string the
    /// model sent — parsing it can fail per-call.
    AddScheduledAction {
        user_id: i64,
        description: String,
        trigger_time: String,
    },
    /// Cancel a scheduled action by id.
    DeleteScheduledAction { action_id: i64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("unknown function: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    BadArguments(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct OverwriteSummaryArgs {
    user_id: i64,
    new_summary: String,
}

#[derive(Deserialize)]
struct AddScheduledActionArgs {
    user_id: i64,
    description: String,
    trigger_time: String,
}

#[derive(Deserialize)]
struct DeleteScheduledActionArgs {
    action_id: i64,
}

impl ToolCall {
    /// Map a wire invocation (name + raw JSON arguments) onto a variant.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolCallError> {
        match name {
            "overwrite_summary" => {
                let args: OverwriteSummaryArgs = serde_json::from_str(arguments)?;
                Ok(Self::OverwriteSummary {
                    user_id: args.user_id,
                    new_summary: args.new_summary,
                })
            }
            "add_scheduled_action" => {
                let args: AddScheduledActionArgs = serde_json::from_str(arguments)?;
                Ok(Self::AddScheduledAction {
                    user_id: args.user_id,
                    description: args.description,
                    trigger_time: args.trigger_time,
                })
            }
            "delete_scheduled_action" => {
                let args: DeleteScheduledActionArgs = serde_json::from_str(arguments)?;
                Ok(Self::DeleteScheduledAction {
                    action_id: args.action_id,
                })
            }
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }

    /// The tool schemas advertised with every generation request.
    pub fn schemas() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "overwrite_summary".into(),
                description: "Overwrite the user's summary with new information.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {
                            "type": "integer",
                            "description": "The ID of the user."
                        },
                        "new_summary": {
                            "type": "string",
                            "description": "The new summary of the user."
                        }
                    },
                    "required": ["user_id", "new_summary"]
                }),
            },
            ToolDefinition {
                name: "add_scheduled_action".into(),
                description: "Schedule an action in the future. Use this tool whenever you plan to do something in the future.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "user_id": {
                            "type": "integer",
                            "description": "The ID of the user."
                        },
                        "description": {
                            "type": "string",
                            "description": "Description of the action, including recurrence."
                        },
                        "trigger_time": {
                            "type": "string",
                            "description": "The trigger time in ISO 8601 format."
                        }
                    },
                    "required": ["user_id", "description", "trigger_time"]
                }),
            },
            ToolDefinition {
                name: "delete_scheduled_action".into(),
                description: "Delete an existing scheduled action.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "action_id": {
                            "type": "integer",
                            "description": "The ID of the action to delete."
                        }
                    },
                    "required": ["action_id"]
                }),
            },
        ]
    }
}

/// Parse a model-provided trigger time. Accepts RFC 3339 and the common
/// timezone-less ISO 8601 shapes models tend to emit; naive times are read
/// as UTC.
pub fn parse_trigger_time(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(t.and_utc());
        }
    }
    anyhow::bail!("'{raw}' is not an ISO 8601 timestamp")
}

/// Executes tool invocations against the store and the delivery gateway.
///
/// Calls run sequentially in request order; confirmation notifications must
/// reach the user in the order the model asked for them.
pub struct Dispatcher {
    store: Store,
    delivery: Arc<dyn DeliveryGateway>,
    translator: Arc<Translator>,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        delivery: Arc<dyn DeliveryGateway>,
        translator: Arc<Translator>,
    ) -> Self {
        Self {
            store,
            delivery,
            translator,
        }
    }

    /// Execute one invocation on behalf of `owner` (the user whose turn or
    /// fired action this is). Always returns a result string for the model.
    pub async fn dispatch(&self, owner: &User, invocation: &ToolInvocation) -> String {
        let call = match ToolCall::parse(&invocation.name, &invocation.arguments) {
            Ok(call) => call,
            Err(ToolCallError::UnknownTool(name)) => {
                warn!(function = %name, "Unknown function call");
                return format!("Unknown function call: {name}");
            }
            Err(e) => {
                warn!(function = %invocation.name, error = %e, "Malformed tool arguments");
                return format!("Invalid arguments for {}: {e}", invocation.name);
            }
        };

        match self.execute(owner, call).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(function = %invocation.name, error = %e, "Error executing tool");
                format!("Error executing tool {}: {e:#}", invocation.name)
            }
        }
    }

    async fn execute(&self, owner: &User, call: ToolCall) -> anyhow::Result<String> {
        match call {
            ToolCall::OverwriteSummary {
                user_id,
                new_summary,
            } => {
                if self.store.overwrite_summary(user_id, &new_summary).await? {
                    info!(user_id, "User summary updated");
                    Ok("Summary updated successfully".into())
                } else {
                    warn!(user_id, "Failed to update summary for unknown user");
                    Ok("Failed to update summary".into())
                }
            }
            ToolCall::AddScheduledAction {
                user_id,
                description,
                trigger_time,
            } => {
                let trigger_time = parse_trigger_time(&trigger_time)?;
                let action_id = self
                    .store
                    .create_action(user_id, &description, trigger_time)
                    .await?;
                info!(action_id, user_id, %trigger_time, "Scheduled action added");
                self.notify(owner, &format!("Scheduled action {action_id} added!"))
                    .await?;
                Ok(format!("Scheduled action {action_id} added"))
            }
            ToolCall::DeleteScheduledAction { action_id } => {
                let removed = self.store.delete_action(action_id).await?;
                info!(action_id, removed, "Scheduled action deleted");
                self.notify(owner, &format!("Scheduled action {action_id} deleted!"))
                    .await?;
                Ok(format!("Scheduled action {action_id} deleted"))
            }
        }
    }

    async fn notify(&self, owner: &User, text: &str) -> anyhow::Result<()> {
        let translated = self.translator.translate(text, owner.reply_language()).await;
        self.delivery
            .deliver(&owner.chat_id, &translated)
            .await
            .context("confirmation delivery failed")
    }
}
