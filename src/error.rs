// error.rs - Bot Error Taxonomy
// Every failure a single message-handling invocation can hit. The router turns
// each variant into a user-facing reply; nothing here escapes the event handler.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    /// Malformed command invocation; the payload is the reply shown to the user.
    #[error("{0}")]
    Usage(String),

    /// Cooldown has not expired yet.
    #[error("rate limited, {}s remaining", .remaining.as_secs())]
    RateLimited { remaining: Duration },

    /// The generation backend errored or returned a bad status.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The backend succeeded but produced no usable content (content filter).
    #[error("generation returned no content")]
    EmptyGeneration,

    /// An image was produced but the file host did not hand back a link.
    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("config error: {0}")]
    Config(String),

    #[error("discord error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_error_displays_reply_text() {
        let err = BotError::Usage("Usage: !generate <prompt>".to_string());
        assert_eq!(err.to_string(), "Usage: !generate <prompt>");
    }

    #[test]
    fn test_timeout_display_uses_seconds() {
        let err = BotError::Timeout(Duration::from_secs(60));
        assert_eq!(err.to_string(), "timed out after 60s");
    }
}
