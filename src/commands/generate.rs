// generate.rs - Image Generation Command Module
// `!generate <prompt>` asks the image backend for a picture and posts the hosted
// link. The backend call races a fixed timeout; on timeout the user is told so
// and the call is left to finish on its own in the background.
//
// Used by: commands/router.rs

use std::sync::Arc;
use std::time::Duration;

use serenity::model::id::ChannelId;

use crate::completion::image::{ImageBackend, ImageOutcome};
use crate::delivery::MessageSink;
use crate::error::{BotError, BotResult};

pub const USAGE: &str = "Usage: !generate <prompt>";
pub const NOT_CONFIGURED: &str = "image generation is not configured (GEMINI_API_KEY missing)";

/// Prompt text after `!generate`, trimmed. Empty is a usage error.
pub fn parse_prompt(args: &str) -> BotResult<String> {
    let prompt = args.trim();
    if prompt.is_empty() {
        return Err(BotError::Usage(USAGE.to_string()));
    }
    Ok(prompt.to_string())
}

/// Run the generation in its own task and wait at most `timeout` for it.
/// A timed-out task is detached, not aborted.
pub async fn generate_with_timeout(
    backend: Arc<dyn ImageBackend>,
    prompt: String,
    timeout: Duration,
) -> BotResult<ImageOutcome> {
    let task = tokio::spawn(async move { backend.generate_image(&prompt).await });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => Err(BotError::GenerationFailed(format!(
            "image task failed: {}",
            join_error
        ))),
        Err(_) => Err(BotError::Timeout(timeout)),
    }
}

pub async fn run(
    sink: &dyn MessageSink,
    channel: ChannelId,
    backend: Option<Arc<dyn ImageBackend>>,
    prompt: String,
    timeout: Duration,
) -> BotResult<()> {
    let backend = backend.ok_or_else(|| BotError::Config(NOT_CONFIGURED.to_string()))?;

    if let Err(e) = sink.typing(channel).await {
        log::warn!("[GENERATE] Failed to show typing indicator: {}", e);
    }

    let reply = match generate_with_timeout(backend, prompt, timeout).await? {
        ImageOutcome::Hosted(link) => link,
        ImageOutcome::NoImage(message) => message,
    };
    sink.send(channel, &reply).await
}

/// User-facing text for a failed `!generate`.
pub fn failure_reply(error: &BotError) -> String {
    match error {
        BotError::Timeout(after) => format!(
            "Image generation timed out after {} seconds. Please try again.",
            after.as_secs()
        ),
        BotError::UploadFailed(_) => {
            "The image was generated but uploading it failed. Please try again.".to_string()
        }
        other => format!("There was an error generating the image: {}", other),
    }
}
