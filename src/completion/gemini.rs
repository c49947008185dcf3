// gemini.rs - Google Gemini streaming backend
//
// Calls `models/{model}:streamGenerateContent?alt=sse`. Each SSE payload is a
// partial GenerateContentResponse whose parts carry either text or an inline
// base64 image. The same client serves text completion and image generation.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use futures_util::{future, stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::image::{ImageFragment, ImageFragmentStream, ImageSource};
use super::{check_status, sse_payloads, CompletionBackend, CompletionRequest, FragmentStream};
use crate::error::{BotError, BotResult};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn text_content(role: Option<&str>, text: &str) -> Content {
    Content {
        role: role.map(str::to_string),
        parts: vec![Part {
            text: Some(text.to_string()),
            inline_data: None,
        }],
    }
}

/// Parts of the first candidate. A payload without candidates (blocked prompt,
/// usage-only trailer) yields no parts; an unparseable payload is a failure.
fn parse_parts(payload: &str) -> BotResult<Vec<Part>> {
    let response: GenerateResponse = serde_json::from_str(payload)?;
    Ok(response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default())
}

fn text_fragments(payloads: FragmentStream) -> FragmentStream {
    payloads
        .and_then(|payload| future::ready(parse_parts(&payload)))
        .map_ok(|parts| {
            stream::iter(
                parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .filter(|text| !text.is_empty())
                    .map(Ok::<String, BotError>),
            )
        })
        .try_flatten()
        .boxed()
}

fn decode_part(part: Part) -> Option<BotResult<ImageFragment>> {
    if let Some(inline) = part.inline_data {
        let decoded = general_purpose::STANDARD
            .decode(inline.data.as_bytes())
            .map(|bytes| ImageFragment::Image {
                mime_type: inline.mime_type,
                bytes,
            })
            .map_err(|e| BotError::GenerationFailed(format!("invalid inline image data: {}", e)));
        return Some(decoded);
    }
    part.text
        .filter(|text| !text.is_empty())
        .map(|text| Ok(ImageFragment::Text(text)))
}

fn image_fragments(payloads: FragmentStream) -> ImageFragmentStream {
    payloads
        .and_then(|payload| future::ready(parse_parts(&payload)))
        .map_ok(|parts| stream::iter(parts.into_iter().filter_map(decode_part)))
        .try_flatten()
        .boxed()
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        base_url: String,
        text_model: String,
        image_model: String,
        timeout: Duration,
    ) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Pigga-Bot/1.0")
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            text_model,
            image_model,
        })
    }

    async fn stream_generate(&self, model: &str, body: &GenerateRequest) -> BotResult<FragmentStream> {
        let response = self
            .client
            .post(format!("{}/models/{}:streamGenerateContent", self.base_url, model))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(sse_payloads(response.bytes_stream()))
    }
}

#[async_trait]
impl ImageSource for GeminiClient {
    /// Stream text and inline images for an image prompt.
    async fn image_fragments(&self, prompt: &str) -> BotResult<ImageFragmentStream> {
        let body = GenerateRequest {
            contents: vec![text_content(Some("user"), prompt)],
            system_instruction: None,
            generation_config: GenerationConfig {
                response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
                ..Default::default()
            },
        };
        log::info!("[GEMINI] Requesting image generation from model '{}'", self.image_model);
        let payloads = self.stream_generate(&self.image_model, &body).await?;
        Ok(image_fragments(payloads))
    }
}

#[async_trait]
impl CompletionBackend for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn stream(&self, request: &CompletionRequest) -> BotResult<FragmentStream> {
        let system_instruction = if request.system_instruction.trim().is_empty() {
            None
        } else {
            Some(text_content(None, &request.system_instruction))
        };
        let body = GenerateRequest {
            contents: vec![text_content(Some("user"), &request.user_prompt)],
            system_instruction,
            generation_config: GenerationConfig {
                temperature: Some(request.params.temperature),
                top_p: Some(request.params.top_p),
                max_output_tokens: Some(request.params.max_tokens),
                stop_sequences: request.params.stop.clone(),
                response_modalities: None,
            },
        };
        log::info!("[GEMINI] Requesting streamed completion from model '{}'", self.text_model);
        let payloads = self.stream_generate(&self.text_model, &body).await?;
        Ok(text_fragments(payloads))
    }
}
