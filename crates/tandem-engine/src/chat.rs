//! Live chat turn handling.
//!
//! The chat transport (whatever platform the bot fronts) hands inbound
//! text to `handle_chat_turn` and sends the returned reply back out.
//! Registration, couple linking and rate limiting all live on the
//! transport side of this boundary.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::{Engine, context, turn};

/// Shown when generation fails on a user-initiated turn. Fired actions
/// never fall back to this — they retry instead.
const FALLBACK_REPLY: &str = "Sorry, something went wrong while processing your request.";

/// Result of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// Reply text, already translated to the user's language.
    Reply(String),
    /// No registered user for this chat; the transport should prompt the
    /// sender to register first.
    UnknownUser,
}

impl Engine {
    pub async fn handle_chat_turn(
        &self,
        chat_id: &str,
        text: &str,
    ) -> anyhow::Result<ChatOutcome> {
        let now = Utc::now();

        let Some(user) = self.store.get_user_by_chat_id(chat_id).await? else {
            warn!(chat_id, "Message from unregistered chat");
            return Ok(ChatOutcome::UnknownUser);
        };

        info!(user_id = user.id, "Handling user message");

        let history_count = self.store.conversation_count(user.id).await?;
        let actions = self.store.active_actions_for(user.id).await?;
        let messages = context::chat_turn_messages(now, &user, history_count, &actions, text);

        let reply = turn::run_turn(
            self.backend.as_ref(),
            &self.dispatcher,
            &user,
            messages,
            self.options.max_tool_rounds,
        )
        .await;

        self.store.append_conversation(user.id, text, now).await?;

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                error!(user_id = user.id, error = %e, "Generation failed, sending fallback");
                FALLBACK_REPLY.to_string()
            }
        };

        let translated = self.translator.translate(&reply, user.reply_language()).await;
        Ok(ChatOutcome::Reply(translated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testutil::{Harness, tool_call};

    #[tokio::test]
    async fn test_unknown_chat_id() {
        let h = Harness::new().await;
        let outcome = h.engine.handle_chat_turn("tg:stranger", "hello").await.unwrap();
        assert_eq!(outcome, ChatOutcome::UnknownUser);
        assert!(h.delivery.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_reply_and_conversation_logging() {
        let h = Harness::new().await;
        h.backend.push_text("Nice to meet you!");

        let outcome = h
            .engine
            .handle_chat_turn("tg:42", "Hi, I'm Alice")
            .await
            .unwrap();
        assert_eq!(outcome, ChatOutcome::Reply("Nice to meet you!".into()));

        // Only the inbound message lands in the log
        assert_eq!(h.store.conversation_count(h.user.id).await.unwrap(), 1);
        let recent = h.store.recent_conversations(h.user.id, 5).await.unwrap();
        assert_eq!(recent[0].message, "Hi, I'm Alice");
    }

    #[tokio::test]
    async fn test_first_contact_includes_onboarding_context() {
        let h = Harness::new().await;
        h.backend.push_text("Welcome!");
        h.engine.handle_chat_turn("tg:42", "hello").await.unwrap();

        let requests = h.backend.requests().await;
        let seen = requests[0]
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(seen.contains("first interaction"));
        // Tool schemas ride along on every chat request
        assert_eq!(requests[0].tools.len(), 3);
    }

    #[tokio::test]
    async fn test_active_actions_are_listed_in_context() {
        let h = Harness::new().await;
        let id = h
            .store
            .create_action(h.user.id, "Ask how the trip went", Utc::now())
            .await
            .unwrap();
        h.backend.push_text("Noted.");
        h.engine.handle_chat_turn("tg:42", "what's coming up?").await.unwrap();

        let requests = h.backend.requests().await;
        let seen = requests[0]
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(seen.contains(&format!("[id {id}] Ask how the trip went")));
    }

    #[tokio::test]
    async fn test_backend_failure_degrades_to_fallback() {
        let h = Harness::new().await;
        h.backend.push_error();

        let outcome = h.engine.handle_chat_turn("tg:42", "hello").await.unwrap();
        assert_eq!(outcome, ChatOutcome::Reply(FALLBACK_REPLY.into()));
        // The inbound message is still logged
        assert_eq!(h.store.conversation_count(h.user.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tool_call_round_trip_updates_summary() {
        let h = Harness::new().await;
        h.backend.push_calls(vec![tool_call(
            "call_1",
            "overwrite_summary",
            json!({"user_id": h.user.id, "new_summary": "Alice, likes hiking"}),
        )]);
        h.backend.push_text("Got it, I'll remember that.");

        let outcome = h
            .engine
            .handle_chat_turn("tg:42", "I love hiking")
            .await
            .unwrap();
        assert_eq!(outcome, ChatOutcome::Reply("Got it, I'll remember that.".into()));

        let user = h.store.get_user(h.user.id).await.unwrap().unwrap();
        assert_eq!(user.summary.as_deref(), Some("Alice, likes hiking"));

        // The follow-up request carried the tool result back to the model
        let requests = h.backend.requests().await;
        assert_eq!(requests.len(), 2);
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(last.content, "Summary updated successfully");
    }
}
