// config.rs - Bot Configuration Loading
// Reads botconfig.txt (KEY=VALUE) from a list of fallback locations. Keys that
// are missing from the file fall back to the process environment so the bot can
// also be configured purely through env vars.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::time::Duration;

use crate::error::{BotError, BotResult};

const CONFIG_PATHS: [&str; 4] = [
    "botconfig.txt",
    "../botconfig.txt",
    "../../botconfig.txt",
    "src/botconfig.txt",
];

pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_GROQ_MODEL: &str = "llama3-groq-70b-8192-tool-use-preview";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_TEXT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_GEMINI_IMAGE_MODEL: &str = "gemini-2.0-flash-exp-image-generation";
pub const DEFAULT_UPLOAD_ENDPOINT: &str = "https://tmpfiles.org/api/v1/upload";
pub const DEFAULT_PRESENCE_TEXT: &str = "@ me with any message";
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful assistant in a Discord server.";

/// How long a user has to wait between two `!cookie` uses unless configured otherwise.
pub const DEFAULT_COOKIE_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionProvider {
    Groq,
    Gemini,
}

/// Sampling parameters sent with every text completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stop: Option<Vec<String>>,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            temperature: 0.54,
            top_p: 0.65,
            max_tokens: 1024,
            stop: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub system_instruction: String,
    pub provider: CompletionProvider,
    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub groq_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub params: ModelParameters,
    pub upload_endpoint: String,
    pub image_timeout: Duration,
    pub cookie_cooldown: Duration,
    pub fortunes_file: Option<String>,
    pub presence_text: String,
    pub http_timeout: Duration,
}

impl BotConfig {
    /// Load botconfig.txt (if any) and resolve every setting.
    pub fn load() -> BotResult<Self> {
        let file_values = match read_config_file() {
            Some((path, values)) => {
                println!("✅ Configuration loaded from {}", path);
                values
            }
            None => {
                log::warn!("No botconfig.txt found (., .., ../.., src/), using environment variables only");
                HashMap::new()
            }
        };

        Self::from_lookup(|key| {
            file_values
                .get(key)
                .cloned()
                .or_else(|| env::var(key).ok())
                .filter(|value| !value.is_empty())
        })
    }

    /// Build the config from any key lookup. Missing optional keys use the defaults.
    pub fn from_lookup<F>(lookup: F) -> BotResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN")
            .ok_or_else(|| BotError::Config("DISCORD_TOKEN is not set".to_string()))?;
        if discord_token == "YOUR_BOT_TOKEN_HERE" {
            return Err(BotError::Config(
                "DISCORD_TOKEN is set to the placeholder value".to_string(),
            ));
        }

        let provider = match lookup("COMPLETION_PROVIDER").as_deref() {
            None => CompletionProvider::Groq,
            Some(value) => match value.to_lowercase().as_str() {
                "groq" => CompletionProvider::Groq,
                "gemini" => CompletionProvider::Gemini,
                other => {
                    return Err(BotError::Config(format!(
                        "Unknown COMPLETION_PROVIDER '{}' (expected groq or gemini)",
                        other
                    )))
                }
            },
        };

        let groq_api_key = lookup("GROQ_API_KEY");
        let gemini_api_key = lookup("GEMINI_API_KEY");
        match provider {
            CompletionProvider::Groq if groq_api_key.is_none() => {
                return Err(BotError::Config(
                    "GROQ_API_KEY is required when COMPLETION_PROVIDER is groq".to_string(),
                ))
            }
            CompletionProvider::Gemini if gemini_api_key.is_none() => {
                return Err(BotError::Config(
                    "GEMINI_API_KEY is required when COMPLETION_PROVIDER is gemini".to_string(),
                ))
            }
            _ => {}
        }

        let defaults = ModelParameters::default();
        let params = ModelParameters {
            temperature: parse_or(&lookup, "TEMPERATURE", defaults.temperature)?,
            top_p: parse_or(&lookup, "TOP_P", defaults.top_p)?,
            max_tokens: parse_or(&lookup, "MAX_TOKENS", defaults.max_tokens)?,
            stop: defaults.stop,
        };

        Ok(Self {
            discord_token,
            system_instruction: lookup("SYSTEM_INSTRUCTION")
                .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            provider,
            groq_api_key,
            groq_base_url: lookup("GROQ_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string()),
            groq_model: lookup("GROQ_MODEL").unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
            gemini_api_key,
            gemini_base_url: lookup("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            gemini_text_model: lookup("GEMINI_TEXT_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_TEXT_MODEL.to_string()),
            gemini_image_model: lookup("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_IMAGE_MODEL.to_string()),
            params,
            upload_endpoint: lookup("UPLOAD_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_UPLOAD_ENDPOINT.to_string()),
            image_timeout: parse_secs_or(&lookup, "IMAGE_TIMEOUT_SECS", DEFAULT_IMAGE_TIMEOUT)?,
            cookie_cooldown: parse_secs_or(
                &lookup,
                "COOKIE_COOLDOWN_SECS",
                DEFAULT_COOKIE_COOLDOWN,
            )?,
            fortunes_file: lookup("FORTUNES_FILE"),
            presence_text: lookup("PRESENCE_TEXT")
                .unwrap_or_else(|| DEFAULT_PRESENCE_TEXT.to_string()),
            http_timeout: parse_secs_or(&lookup, "HTTP_TIMEOUT_SECS", Duration::from_secs(120))?,
        })
    }
}

fn read_config_file() -> Option<(&'static str, HashMap<String, String>)> {
    for config_path in CONFIG_PATHS {
        match fs::read_to_string(config_path) {
            Ok(content) => return Some((config_path, parse_config(&content))),
            Err(_) => continue,
        }
    }
    None
}

/// Parse KEY=VALUE lines, skipping blanks, `#` comments and lines without `=`.
pub fn parse_config(content: &str) -> HashMap<String, String> {
    // Remove BOM if present
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut config = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(equals_pos) = line.find('=') {
            let key = line[..equals_pos].trim().to_string();
            let value = line[equals_pos + 1..].trim().to_string();
            config.insert(key, value);
        }
    }

    config
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> BotResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| BotError::Config(format!("Invalid {} value '{}'", key, raw))),
    }
}

fn parse_secs_or<F>(lookup: &F, key: &str, default: Duration) -> BotResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_config_skips_comments_and_bom() {
        let content = "\u{feff}# comment\nDISCORD_TOKEN = abc\n\nnot a pair\nTOP_P=0.9\n";
        let parsed = parse_config(content);
        assert_eq!(parsed.get("DISCORD_TOKEN").map(String::as_str), Some("abc"));
        assert_eq!(parsed.get("TOP_P").map(String::as_str), Some("0.9"));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_default_sampling_parameters() {
        let config = BotConfig::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "token"),
            ("GROQ_API_KEY", "key"),
        ]))
        .unwrap();

        assert_eq!(config.provider, CompletionProvider::Groq);
        assert_eq!(config.params, ModelParameters::default());
        assert_eq!(config.params.max_tokens, 1024);
        assert_eq!(config.image_timeout, Duration::from_secs(60));
        assert_eq!(config.cookie_cooldown, DEFAULT_COOKIE_COOLDOWN);
        assert_eq!(config.groq_model, DEFAULT_GROQ_MODEL);
    }

    #[test]
    fn test_placeholder_token_rejected() {
        let result = BotConfig::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "YOUR_BOT_TOKEN_HERE"),
            ("GROQ_API_KEY", "key"),
        ]));
        assert!(matches!(result, Err(BotError::Config(_))));
    }

    #[test]
    fn test_provider_requires_its_api_key() {
        let result = BotConfig::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "token"),
            ("COMPLETION_PROVIDER", "gemini"),
            ("GROQ_API_KEY", "key"),
        ]));
        assert!(matches!(result, Err(BotError::Config(_))));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let result = BotConfig::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "token"),
            ("GROQ_API_KEY", "key"),
            ("COOKIE_COOLDOWN_SECS", "soon"),
        ]));
        match result {
            Err(BotError::Config(message)) => assert!(message.contains("COOKIE_COOLDOWN_SECS")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_cooldown_override() {
        let config = BotConfig::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "token"),
            ("GEMINI_API_KEY", "key"),
            ("COMPLETION_PROVIDER", "Gemini"),
            ("COOKIE_COOLDOWN_SECS", "90"),
        ]))
        .unwrap();
        assert_eq!(config.provider, CompletionProvider::Gemini);
        assert_eq!(config.cookie_cooldown, Duration::from_secs(90));
    }
}
