//! tandem-types: shared domain types for the tandem assistant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── Users ────────────────────

/// A registered end user of the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Store-generated identifier.
    pub id: i64,
    /// Opaque transport identifier the delivery gateway routes on.
    pub chat_id: String,
    /// Display name.
    pub name: String,
    /// Free-text running summary maintained by the assistant. Overwritten
    /// whole by the `overwrite_summary` tool, never edited in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Preferred reply language code (e.g. "de"). `None` means English.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl User {
    /// The language replies should be written in.
    pub fn reply_language(&self) -> &str {
        self.language.as_deref().unwrap_or("en")
    }
}

// ──────────────────── Conversations ────────────────────

/// One entry in a user's append-only conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub owner_id: i64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// ──────────────────── Scheduled actions ────────────────────

/// A persisted future task for one user, fired by the dispatch loop.
///
/// Recurrence is not structured data: a repeating task is a chain of
/// independently created rows, the next one enqueued by the assistant
/// itself when the previous one fires. At most one future occurrence
/// exists per chain at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledAction {
    /// Store-generated identifier.
    pub id: i64,
    /// The user this action is for.
    pub owner_id: i64,
    /// Natural-language description of the intended action, possibly
    /// including a recurrence rule ("remind every Friday").
    pub description: String,
    /// Absolute UTC time at which the action becomes due.
    pub trigger_time: DateTime<Utc>,
    /// True from creation until the action fires or is cancelled.
    pub is_active: bool,
}

impl ScheduledAction {
    /// Whether this action is eligible to fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.trigger_time <= now
    }
}

// ──────────────────── Delivery ────────────────────

/// Outbound text delivery seam.
///
/// The engine never talks to a messaging platform directly; everything it
/// sends goes through this trait. Failures must be surfaced, not swallowed:
/// the dispatch loop treats a failed delivery as a failed fire and retries
/// the action on the next poll.
#[async_trait::async_trait]
pub trait DeliveryGateway: Send + Sync {
    async fn deliver(&self, chat_id: &str, text: &str) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_user_serde() {
        let user = User {
            id: 1,
            chat_id: "tg:42".into(),
            name: "Alice".into(),
            summary: None,
            language: Some("de".into()),
        };
        let json = serde_json::to_string(&user).unwrap();
        // Absent summary is omitted entirely
        assert!(!json.contains("summary"));
        let parsed: User = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.chat_id, "tg:42");
        assert_eq!(parsed.reply_language(), "de");
    }

    #[test]
    fn test_reply_language_defaults_to_english() {
        let user = User {
            id: 1,
            chat_id: "tg:42".into(),
            name: "Alice".into(),
            summary: None,
            language: None,
        };
        assert_eq!(user.reply_language(), "en");
    }

    #[test]
    fn test_scheduled_action_serde() {
        let action = ScheduledAction {
            id: 7,
            owner_id: 42,
            description: "Ask how the trip went".into(),
            trigger_time: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            is_active: true,
        };
        let json = serde_json::to_string(&action).unwrap();
        let parsed: ScheduledAction = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, 7);
        assert_eq!(parsed.trigger_time, action.trigger_time);
        assert!(parsed.is_active);
    }

    #[test]
    fn test_is_due() {
        let trigger = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let mut action = ScheduledAction {
            id: 7,
            owner_id: 42,
            description: "Ask how the trip went".into(),
            trigger_time: trigger,
            is_active: true,
        };

        let before = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 10, 1, 0).unwrap();
        assert!(!action.is_due(before));
        assert!(action.is_due(trigger));
        assert!(action.is_due(after));

        action.is_active = false;
        assert!(!action.is_due(after));
    }
}
