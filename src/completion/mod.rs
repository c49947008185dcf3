// completion/mod.rs - Generation Backends
// Text completion and image generation behind uniform async traits. Every
// backend streams its answer as server-sent events; the helpers here turn a raw
// byte stream into `data:` payloads and a fragment stream into one final value.
//
// Used by: commands/chat.rs, commands/generate.rs, main.rs (backend selection)

pub mod gemini;
pub mod groq;
pub mod image;

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};

use serde::{Deserialize, Serialize};

use crate::config::ModelParameters;
use crate::error::{BotError, BotResult};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub user_prompt: String,
    pub params: ModelParameters,
}

impl CompletionRequest {
    /// Role-tagged prompt array: system instruction first, then the user's text.
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system".to_string(),
                content: self.system_instruction.clone(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: self.user_prompt.clone(),
            },
        ]
    }
}

/// Finite stream of text fragments produced by one generation call.
pub type FragmentStream = BoxStream<'static, BotResult<String>>;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Start the call and return its content fragments.
    async fn stream(&self, request: &CompletionRequest) -> BotResult<FragmentStream>;

    /// Run the call to completion. An empty string means the backend produced
    /// nothing (usually a content filter), which is not an error.
    async fn complete(&self, request: &CompletionRequest) -> BotResult<String> {
        let fragments = self.stream(request).await?;
        collect_fragments(fragments).await
    }
}

/// Consume a fragment stream to exhaustion, concatenating in order. The first
/// error aborts the collection; no partial text is returned.
pub async fn collect_fragments<S>(fragments: S) -> BotResult<String>
where
    S: Stream<Item = BotResult<String>>,
{
    fragments
        .try_fold(String::new(), |mut text, fragment| async move {
            text.push_str(&fragment);
            Ok(text)
        })
        .await
}

/// Splits a byte stream into lines and yields the payload of each `data:` line.
#[derive(Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.pending);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    line.strip_prefix("data:")
        .map(|payload| payload.trim_start().to_string())
        .filter(|payload| !payload.is_empty())
}

/// Turn an HTTP body stream into a stream of server-sent-event `data` payloads.
/// Lines may be split across network chunks; they are reassembled first.
pub fn sse_payloads<S, B, E>(body: S) -> BoxStream<'static, BotResult<String>>
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<BotError> + Send + 'static,
{
    let state = (body, SseLineBuffer::default(), VecDeque::new(), false);
    stream::unfold(state, |(mut body, mut buffer, mut ready, mut done)| async move {
        loop {
            if let Some(payload) = ready.pop_front() {
                return Some((Ok(payload), (body, buffer, ready, done)));
            }
            if done {
                return None;
            }
            match body.next().await {
                Some(Ok(bytes)) => ready.extend(buffer.push(bytes.as_ref())),
                Some(Err(e)) => {
                    done = true;
                    return Some((Err(e.into()), (body, buffer, ready, done)));
                }
                None => {
                    done = true;
                    ready.extend(buffer.finish());
                }
            }
        }
    })
    .boxed()
}

/// Map a non-success HTTP status to `GenerationFailed`, keeping the body for the log.
pub(crate) async fn check_status(response: reqwest::Response) -> BotResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BotError::GenerationFailed(format!(
        "API request failed: HTTP {} {}",
        status,
        body.chars().take(300).collect::<String>()
    )))
}
