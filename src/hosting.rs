// hosting.rs - File Host Upload
// Generated images are posted to a public file host with a multipart upload;
// the link from the host's response is what the bot posts in the channel.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{BotError, BotResult};

/// Somewhere a generated image can be posted in exchange for a public link.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, mime_type: &str) -> BotResult<String>;
}

pub struct FileHost {
    client: reqwest::Client,
    endpoint: String,
}

impl FileHost {
    pub fn new(endpoint: String, timeout: Duration) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Pigga-Bot/1.0")
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ImageUploader for FileHost {
    /// Upload `bytes` as a single `file` form field and return the hosted link.
    async fn upload(&self, bytes: Vec<u8>, mime_type: &str) -> BotResult<String> {
        let file_name = format!("generated_{}.{}", Uuid::new_v4(), extension_for(mime_type));
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(mime_type)
            .map_err(|e| BotError::UploadFailed(format!("mime error: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BotError::UploadFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BotError::UploadFailed(e.to_string()))?;
        if !status.is_success() {
            return Err(BotError::UploadFailed(format!("HTTP {}: {}", status, body.trim())));
        }

        let link = extract_link(&body)
            .ok_or_else(|| BotError::UploadFailed("file host did not return a link".to_string()))?;
        log::info!("[UPLOAD] {} hosted at {}", file_name, link);
        Ok(link)
    }
}

/// File extension for an image MIME type, `png` when unknown.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.parse::<mime::Mime>() {
        Ok(parsed) if parsed.type_() == mime::IMAGE => match parsed.subtype().as_str() {
            "jpeg" | "jpg" => "jpg",
            "gif" => "gif",
            "webp" => "webp",
            _ => "png",
        },
        _ => "png",
    }
}

/// Pull the hosted URL out of an upload response. Accepts JSON bodies with
/// `data.url`, `data.link`, `url` or `link`, or a bare URL body.
pub fn extract_link(body: &str) -> Option<String> {
    let body = body.trim();
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            json.pointer("/data/url"),
            json.pointer("/data/link"),
            json.get("url"),
            json.get("link"),
        ];
        return candidates
            .into_iter()
            .flatten()
            .filter_map(|value| value.as_str())
            .find(|link| link.starts_with("http"))
            .map(str::to_string);
    }
    if (body.starts_with("https://") || body.starts_with("http://")) && !body.contains(char::is_whitespace) {
        return Some(body.to_string());
    }
    None
}
