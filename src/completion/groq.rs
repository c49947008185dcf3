// groq.rs - Groq (OpenAI-compatible) streaming chat completions
//
// POSTs to {base_url}/chat/completions with `stream: true` and reads the SSE
// body: one JSON chunk per `data:` line, terminated by `data: [DONE]`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{future, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::{check_status, sse_payloads, ChatMessage, CompletionBackend, CompletionRequest, FragmentStream};
use crate::error::{BotError, BotResult};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
    stop: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

/// In-stream failure event, e.g. a rate limit hit after the response started.
#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

pub struct GroqClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroqClient {
    pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Pigga-Bot/1.0")
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

/// Content of the first choice's delta, or nothing for role-only chunks.
/// Error events and unparseable chunks fail the whole call.
fn parse_delta(payload: &str) -> BotResult<Option<String>> {
    let chunk: ChatResponse = serde_json::from_str(payload).map_err(|e| {
        BotError::GenerationFailed(format!(
            "malformed stream chunk ({}): {}",
            e,
            payload.chars().take(200).collect::<String>()
        ))
    })?;
    if let Some(error) = chunk.error {
        return Err(BotError::GenerationFailed(
            error.message.unwrap_or_else(|| "unknown error event in stream".to_string()),
        ));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty()))
}

/// Map SSE payloads to content fragments, stopping at `[DONE]`.
fn delta_fragments(payloads: FragmentStream) -> FragmentStream {
    payloads
        .try_take_while(|payload| future::ready(Ok(payload.trim() != "[DONE]")))
        .try_filter_map(|payload| future::ready(parse_delta(&payload)))
        .boxed()
}

#[async_trait]
impl CompletionBackend for GroqClient {
    fn name(&self) -> &str {
        "groq"
    }

    async fn stream(&self, request: &CompletionRequest) -> BotResult<FragmentStream> {
        let body = ChatRequest {
            model: &self.model,
            messages: request.messages(),
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            max_tokens: request.params.max_tokens,
            stream: true,
            stop: request.params.stop.as_deref(),
        };

        log::info!("[GROQ] Requesting streamed completion from model '{}'", self.model);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(delta_fragments(sse_payloads(response.bytes_stream())))
    }
}
