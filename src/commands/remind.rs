// remind.rs - Reminder Command Module
// `!remind @user <message>` queues a note for another user. The note is posted
// the next time that user says anything, in the order the notes were left.
//
// Used by: commands/router.rs (set + flush)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serenity::model::id::UserId;

use crate::error::{BotError, BotResult};

pub const USAGE: &str = "Usage: !remind @user message";
pub const MENTION_REQUIRED: &str = "Please mention a user to remind.";

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    /// The line posted when the recipient shows up.
    pub fn delivery_text(&self) -> String {
        format!("<@{}>, reminder from <@{}>: {}", self.recipient_id, self.sender_id, self.text)
    }
}

/// Pending reminders keyed by recipient. In memory only.
#[derive(Debug, Default)]
pub struct ReminderStore {
    pending: HashMap<UserId, Vec<Reminder>>,
}

impl ReminderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, recipient_id: UserId, sender_id: UserId, text: String) {
        self.pending.entry(recipient_id).or_default().push(Reminder {
            sender_id,
            recipient_id,
            text,
            created_at: Utc::now(),
        });
    }

    /// Remove and return everything queued for `user_id`, oldest first.
    pub fn drain_all(&mut self, user_id: UserId) -> Vec<Reminder> {
        self.pending.remove(&user_id).unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}

/// Validate the text after `!remind`. Needs a target token plus at least one
/// word of message, and exactly one mentioned user in the message.
pub fn parse_reminder(args: &str, mentioned: &[UserId]) -> BotResult<(UserId, String)> {
    // Split on spaces only so line breaks inside the message survive.
    let tokens: Vec<&str> = args.split(' ').filter(|token| !token.is_empty()).collect();
    if tokens.len() < 2 {
        return Err(BotError::Usage(USAGE.to_string()));
    }
    let recipient = match mentioned {
        [only] => *only,
        _ => return Err(BotError::Usage(MENTION_REQUIRED.to_string())),
    };
    Ok((recipient, tokens[1..].join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_returns_insertion_order() {
        let mut store = ReminderStore::new();
        let bob = UserId(2);
        store.add(bob, UserId(1), "m1".to_string());
        store.add(bob, UserId(3), "m2".to_string());
        store.add(bob, UserId(1), "m3".to_string());
        store.add(UserId(9), UserId(1), "other".to_string());

        let drained: Vec<String> = store.drain_all(bob).into_iter().map(|r| r.text).collect();
        assert_eq!(drained, vec!["m1", "m2", "m3"]);
        assert!(store.drain_all(bob).is_empty());
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn test_drain_unknown_user_is_empty() {
        let mut store = ReminderStore::new();
        assert!(store.drain_all(UserId(42)).is_empty());
    }

    #[test]
    fn test_delivery_text_mentions_both_users() {
        let mut store = ReminderStore::new();
        store.add(UserId(20), UserId(10), "feed the cat".to_string());
        let reminder = store.drain_all(UserId(20)).remove(0);
        assert_eq!(reminder.delivery_text(), "<@20>, reminder from <@10>: feed the cat");
    }

    #[test]
    fn test_parse_reminder_joins_message_words() {
        let (recipient, text) = parse_reminder("<@5>   buy   milk today", &[UserId(5)]).unwrap();
        assert_eq!(recipient, UserId(5));
        assert_eq!(text, "buy milk today");
    }

    #[test]
    fn test_parse_reminder_keeps_line_breaks() {
        let (_, text) = parse_reminder(" <@5> shopping:\n- milk\n- eggs", &[UserId(5)]).unwrap();
        assert_eq!(text, "shopping:\n- milk\n- eggs");
    }

    #[test]
    fn test_parse_reminder_needs_two_tokens() {
        match parse_reminder("<@5>", &[UserId(5)]) {
            Err(BotError::Usage(message)) => assert_eq!(message, USAGE),
            other => panic!("expected usage error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_reminder_needs_exactly_one_mention() {
        assert!(matches!(
            parse_reminder("bob hello there", &[]),
            Err(BotError::Usage(m)) if m == MENTION_REQUIRED
        ));
        assert!(matches!(
            parse_reminder("<@5> <@6> hello", &[UserId(5), UserId(6)]),
            Err(BotError::Usage(m)) if m == MENTION_REQUIRED
        ));
    }
}
