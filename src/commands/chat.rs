// chat.rs - Mention Chat Command Module
// Mentioning the bot with some text sends that text to the configured completion
// backend; the answer is posted back in paced chunks.
//
// Used by: commands/router.rs

use serenity::model::id::{ChannelId, UserId};

use crate::completion::{CompletionBackend, CompletionRequest};
use crate::delivery::{self, MessageSink};
use crate::error::{BotError, BotResult};

pub const HELP_REPLY: &str = "Yo, @ me with some text to get a response.";
pub const BLOCKED_REPLY: &str = "The prompt was blocked.";
pub const FAILURE_REPLY: &str = "There was an error generating the content.";

/// If `text` mentions `bot_id`, return it with the first mention token removed
/// and surrounding whitespace trimmed. Both `<@id>` and the nickname form
/// `<@!id>` count.
pub fn extract_prompt(text: &str, bot_id: UserId) -> Option<String> {
    let plain = format!("<@{}>", bot_id);
    let nickname = format!("<@!{}>", bot_id);

    let (position, token_len) = [plain, nickname]
        .iter()
        .filter_map(|token| text.find(token.as_str()).map(|pos| (pos, token.len())))
        .min_by_key(|(pos, _)| *pos)?;

    let mut prompt = String::with_capacity(text.len());
    prompt.push_str(&text[..position]);
    prompt.push_str(&text[position + token_len..]);
    Some(prompt.trim().to_string())
}

/// Ask the backend and deliver the answer. An empty answer is reported as
/// `EmptyGeneration` so the caller can tell it apart from a failed call.
pub async fn run(
    sink: &dyn MessageSink,
    channel: ChannelId,
    backend: &dyn CompletionBackend,
    request: &CompletionRequest,
) -> BotResult<usize> {
    if let Err(e) = sink.typing(channel).await {
        log::warn!("[CHAT] Failed to show typing indicator: {}", e);
    }

    let text = backend.complete(request).await?;
    if text.is_empty() {
        return Err(BotError::EmptyGeneration);
    }

    log::info!("[CHAT] {} returned {} characters", backend.name(), text.chars().count());
    delivery::deliver(sink, channel, &text).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prompt_strips_mention() {
        let bot = UserId(1234);
        assert_eq!(extract_prompt("<@1234> what is rust?", bot), Some("what is rust?".to_string()));
        assert_eq!(extract_prompt("hey <@1234>, hi", bot), Some("hey , hi".to_string()));
        assert_eq!(extract_prompt("<@!1234>   tell me a joke ", bot), Some("tell me a joke".to_string()));
    }

    #[test]
    fn test_extract_prompt_only_removes_first_mention() {
        let bot = UserId(1);
        assert_eq!(extract_prompt("<@1> say <@1>", bot), Some("say <@1>".to_string()));
    }

    #[test]
    fn test_extract_prompt_without_mention() {
        assert_eq!(extract_prompt("hello <@999>", UserId(1)), None);
        assert_eq!(extract_prompt("<@12>", UserId(1)), None);
    }

    #[test]
    fn test_bare_mention_gives_empty_prompt() {
        assert_eq!(extract_prompt("  <@77>  ", UserId(77)), Some(String::new()));
    }
}
