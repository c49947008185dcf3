// delivery.rs - Outbound Messages and Chunked Delivery
// Long AI responses are cut into fixed-size slices and posted one at a time
// with a pause between posts so the channel's rate limit is never hit.
//
// Used by: commands/router.rs (all replies), commands/chat.rs (long responses)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::ChannelId;

use crate::error::BotResult;

/// Maximum characters per outbound message.
pub const MAX_CHUNK_CHARS: usize = 1000;

/// Pause between two consecutive chunks of the same response.
pub const CHUNK_DELAY: Duration = Duration::from_millis(2000);

/// Where the bot's text goes. Discord in production, a recorder in tests.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, channel: ChannelId, text: &str) -> BotResult<()>;

    /// Show a typing indicator while a backend call is in flight.
    async fn typing(&self, _channel: ChannelId) -> BotResult<()> {
        Ok(())
    }
}

pub struct DiscordSink {
    http: Arc<Http>,
}

impl DiscordSink {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MessageSink for DiscordSink {
    async fn send(&self, channel: ChannelId, text: &str) -> BotResult<()> {
        channel.say(&self.http, text).await?;
        Ok(())
    }

    async fn typing(&self, channel: ChannelId) -> BotResult<()> {
        channel.broadcast_typing(&self.http).await?;
        Ok(())
    }
}

/// Split `text` into contiguous slices of at most `max_chars` characters.
/// No trimming and no word-boundary search: the slices concatenate back to `text`.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (index, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }

    chunks
}

/// Post `text` to `channel` in order, one chunk at a time, waiting
/// [`CHUNK_DELAY`] before each chunk after the first. Returns the number of
/// messages sent; empty text sends nothing.
pub async fn deliver(sink: &dyn MessageSink, channel: ChannelId, text: &str) -> BotResult<usize> {
    let chunks = split_into_chunks(text, MAX_CHUNK_CHARS);
    let total = chunks.len();

    for (index, chunk) in chunks.into_iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(CHUNK_DELAY).await;
        }
        sink.send(channel, chunk).await?;
        log::debug!("[DELIVERY] Sent part {}/{} ({} chars) to channel {}", index + 1, total, chunk.chars().count(), channel);
    }

    Ok(total)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Records every message instead of talking to Discord.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub sent: Mutex<Vec<(ChannelId, String, Instant)>>,
    }

    impl RecordingSink {
        pub(crate) fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, text, _)| text.clone()).collect()
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, channel: ChannelId, text: &str) -> BotResult<()> {
            self.sent.lock().unwrap().push((channel, text.to_string(), Instant::now()));
            Ok(())
        }
    }

    #[test]
    fn test_split_exact_boundaries() {
        let text = "a".repeat(2500);
        let chunks = split_into_chunks(&text, 1000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[1].len(), 1000);
        assert_eq!(chunks[2].len(), 500);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_empty_and_short() {
        assert!(split_into_chunks("", 1000).is_empty());
        assert_eq!(split_into_chunks("hello", 1000), vec!["hello"]);
        assert_eq!(split_into_chunks(&"x".repeat(1000), 1000).len(), 1);
    }

    #[test]
    fn test_split_keeps_whitespace_and_splits_mid_word() {
        let text = "  hello world  ";
        let chunks = split_into_chunks(text, 4);
        assert_eq!(chunks, vec!["  he", "llo ", "worl", "d  "]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let text = "é".repeat(1500);
        let chunks = split_into_chunks(&text, 1000);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 1000);
        assert_eq!(chunks[1].chars().count(), 500);
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliver_sends_in_order_with_delay() {
        let sink = RecordingSink::default();
        let channel = ChannelId(7);
        let text: String = (0..2300).map(|i| char::from(b'a' + (i % 26) as u8)).collect();

        let sent = deliver(&sink, channel, &text).await.unwrap();
        assert_eq!(sent, 3);

        let records = sink.sent.lock().unwrap();
        assert_eq!(records.len(), 3);
        let joined: String = records.iter().map(|(_, text, _)| text.as_str()).collect();
        assert_eq!(joined, text);
        assert!(records.iter().all(|(c, _, _)| *c == channel));
        assert!(records[1].2 - records[0].2 >= CHUNK_DELAY);
        assert!(records[2].2 - records[1].2 >= CHUNK_DELAY);
    }

    #[tokio::test]
    async fn test_deliver_empty_text_sends_nothing() {
        let sink = RecordingSink::default();
        assert_eq!(deliver(&sink, ChannelId(1), "").await.unwrap(), 0);
        assert!(sink.texts().is_empty());
    }
}
