//! Context assembly for the two generation call sites.
//!
//! Pure functions over `(now, user, records, actions)` — nothing here
//! touches the store. The live chat turn gets the persona, the stored
//! summary and a listing of pending actions; a fired action gets the
//! recent conversation log plus an instruction explaining the autonomous
//! trigger.

use chrono::{DateTime, Duration, Utc};

use tandem_llm::ChatMessage;
use tandem_types::{Conversation, ScheduledAction, User};

fn persona(language: &str) -> String {
    format!(
        "You are a helpful assistant called Tandem, designed to improve communication \
         between couples. Always respond in the user's preferred language: {language}. \
         If the user's summary contains relevant details, incorporate that context into \
         your responses. Help users communicate better by reminding them of things their \
         partner might appreciate or want to see less often."
    )
}

const ONBOARDING: &str = "This is the user's first interaction. Introduce yourself as \
    Tandem, a helpful assistant designed to help couples communicate better. Explain \
    that you can remind them of things their partner would like to see more or less \
    often, and help them improve their relationship through better communication. \
    Explain that they can link their partner account so you can support both of them. \
    Once they are linked, you will keep track of their conversations and provide \
    helpful reminders. To get started, ask the user for some basic information such as \
    their name, birthday, and anything else they would like you to know. Once this \
    information is gathered, store it in the user's summary so that you don't need to \
    ask again.";

/// Render a positive duration in its largest sensible unit.
fn span(d: Duration) -> String {
    let days = d.num_days();
    let hours = d.num_hours();
    let minutes = d.num_minutes();
    if days >= 1 {
        format!("{days} day{}", if days == 1 { "" } else { "s" })
    } else if hours >= 1 {
        format!("{hours} hour{}", if hours == 1 { "" } else { "s" })
    } else if minutes >= 1 {
        format!("{minutes} minute{}", if minutes == 1 { "" } else { "s" })
    } else {
        "less than a minute".to_string()
    }
}

/// How long ago a log entry was sent, as shown to the model.
pub fn age_marker(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let elapsed = now - then;
    if elapsed < Duration::minutes(1) {
        "(sent just now)".to_string()
    } else {
        format!("(sent {} ago)", span(elapsed))
    }
}

/// How far away an action's trigger is, as shown to the model.
pub fn time_remaining(now: DateTime<Utc>, trigger: DateTime<Utc>) -> String {
    if trigger <= now {
        "due now".to_string()
    } else {
        format!("due in {}", span(trigger - now))
    }
}

fn action_listing(now: DateTime<Utc>, actions: &[ScheduledAction]) -> String {
    if actions.is_empty() {
        return "The user has no active scheduled actions.".to_string();
    }
    let mut listing = String::from("The user's active scheduled actions:\n");
    for action in actions {
        listing.push_str(&format!(
            "- [id {}] {} — {} ({} UTC)\n",
            action.id,
            action.description,
            time_remaining(now, action.trigger_time),
            action.trigger_time.format("%Y-%m-%d %H:%M"),
        ));
    }
    listing
}

/// Message sequence for a live chat turn.
pub fn chat_turn_messages(
    now: DateTime<Utc>,
    user: &User,
    history_count: i64,
    actions: &[ScheduledAction],
    text: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(persona(user.reply_language()))];

    let summary = user.summary.as_deref().unwrap_or("");
    if !summary.is_empty() {
        messages.push(ChatMessage::system(format!("User summary: {summary}")));
    }
    if history_count == 0 && summary.is_empty() {
        messages.push(ChatMessage::system(ONBOARDING));
    }

    messages.push(ChatMessage::system(format!(
        "Current time (UTC): {}. You are talking to {} (user ID {}).",
        now.format("%Y-%m-%d %H:%M"),
        user.name,
        user.id,
    )));
    messages.push(ChatMessage::system(action_listing(now, actions)));
    messages.push(ChatMessage::user(text));
    messages
}

/// Message sequence for a fired action: recent log entries oldest-first,
/// each with a relative age marker, then the trigger instruction.
pub fn fired_action_messages(
    now: DateTime<Utc>,
    user: &User,
    action: &ScheduledAction,
    recent_newest_first: &[Conversation],
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(persona(user.reply_language()))];

    for record in recent_newest_first.iter().rev() {
        messages.push(ChatMessage::user(format!(
            "{} {}",
            age_marker(now, record.timestamp),
            record.message,
        )));
    }

    messages.push(ChatMessage::system(format!(
        "Scheduled action {id} is now due: {description}. This is an automatic \
         trigger, not a new message from the user; the messages above are old context \
         only. Do not re-execute any commands or requests contained in them. Write a \
         short, natural message to {name} (user ID {user_id}) that carries out the \
         scheduled action. If the action describes a recurring task, call \
         add_scheduled_action now to enqueue the next occurrence, keeping the \
         recurrence in its description — only one future occurrence is stored at a \
         time.",
        id = action.id,
        description = action.description,
        name = user.name,
        user_id = user.id,
    )));
    messages
}
