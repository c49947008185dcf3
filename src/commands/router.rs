// router.rs - Command Router
// Every inbound message lands here. Pending reminders for the author are
// flushed first, then the message is classified into exactly one command and
// handled. Failures end at this boundary: they are logged and turned into a
// reply, never propagated back into the event handler.
//
// Used by: main.rs (Handler::message, console status)

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, UserId};
use tokio::time::Instant;
use uuid::Uuid;

use super::cookie::{self, CooldownOutcome, CooldownTracker, Fortunes};
use super::remind::{self, ReminderStore};
use super::{chat, generate};
use crate::completion::image::ImageBackend;
use crate::completion::{CompletionBackend, CompletionRequest};
use crate::config::ModelParameters;
use crate::delivery::MessageSink;
use crate::error::{BotError, BotResult};

pub const REMIND_PREFIX: &str = "!remind";
pub const COOKIE_PREFIX: &str = "!cookie";
pub const GENERATE_PREFIX: &str = "!generate";

/// Platform-neutral view of an incoming chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub author_id: UserId,
    pub channel_id: ChannelId,
    pub text: String,
    pub mentioned_user_ids: Vec<UserId>,
    pub is_from_bot: bool,
}

impl From<&Message> for InboundMessage {
    fn from(msg: &Message) -> Self {
        let mut mentioned_user_ids: Vec<UserId> = Vec::new();
        for user in &msg.mentions {
            if !mentioned_user_ids.contains(&user.id) {
                mentioned_user_ids.push(user.id);
            }
        }
        Self {
            author_id: msg.author.id,
            channel_id: msg.channel_id,
            text: msg.content.clone(),
            mentioned_user_ids,
            is_from_bot: msg.author.bot,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Sent by a bot; nothing at all happens, not even a reminder flush.
    Ignore,
    SetReminder { recipient: UserId, text: String },
    Cookie,
    GenerateImage { prompt: String },
    Chat { prompt: String },
    /// Not addressed to the bot. Only the reminder flush runs.
    NoCommand,
}

impl Command {
    fn label(&self) -> &'static str {
        match self {
            Command::Ignore => "ignore",
            Command::SetReminder { .. } => "remind",
            Command::Cookie => "cookie",
            Command::GenerateImage { .. } => "generate",
            Command::Chat { .. } => "chat",
            Command::NoCommand => "none",
        }
    }
}

/// Text after `prefix` when `text` starts with it as a whole word.
fn strip_command<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

/// Decide what a message asks for. Pure: no store or network access.
/// Malformed invocations come back as `BotError::Usage` carrying the reply text.
pub fn classify(message: &InboundMessage, bot_id: UserId) -> BotResult<Command> {
    if message.is_from_bot || message.author_id == bot_id {
        return Ok(Command::Ignore);
    }

    let text = message.text.as_str();
    if let Some(args) = strip_command(text, REMIND_PREFIX) {
        let (recipient, text) = remind::parse_reminder(args, &message.mentioned_user_ids)?;
        return Ok(Command::SetReminder { recipient, text });
    }
    if strip_command(text, COOKIE_PREFIX).is_some() {
        return Ok(Command::Cookie);
    }
    if let Some(args) = strip_command(text, GENERATE_PREFIX) {
        let prompt = generate::parse_prompt(args)?;
        return Ok(Command::GenerateImage { prompt });
    }
    match chat::extract_prompt(text, bot_id) {
        Some(prompt) if prompt.is_empty() => Err(BotError::Usage(chat::HELP_REPLY.to_string())),
        Some(prompt) => Ok(Command::Chat { prompt }),
        None => Ok(Command::NoCommand),
    }
}

/// Settings the router needs from the bot configuration.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub system_instruction: String,
    pub params: ModelParameters,
    pub image_timeout: Duration,
    pub cookie_cooldown: Duration,
}

pub struct Dispatcher {
    completion: Arc<dyn CompletionBackend>,
    images: Option<Arc<dyn ImageBackend>>,
    fortunes: Fortunes,
    settings: DispatchSettings,
    reminders: Mutex<ReminderStore>,
    cookie_cooldowns: Mutex<CooldownTracker>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // State stays consistent even if a holder panicked: every update is a single call.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Dispatcher {
    pub fn new(
        completion: Arc<dyn CompletionBackend>,
        images: Option<Arc<dyn ImageBackend>>,
        fortunes: Fortunes,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            completion,
            images,
            fortunes,
            settings,
            reminders: Mutex::new(ReminderStore::new()),
            cookie_cooldowns: Mutex::new(CooldownTracker::new()),
        }
    }

    pub fn pending_reminders(&self) -> usize {
        lock(&self.reminders).pending_count()
    }

    pub fn tracked_cooldowns(&self) -> usize {
        lock(&self.cookie_cooldowns).tracked_users()
    }

    /// Handle one inbound message to completion. Never fails.
    pub async fn handle(&self, sink: &dyn MessageSink, bot_id: UserId, message: &InboundMessage) {
        let classified = classify(message, bot_id);
        if matches!(classified, Ok(Command::Ignore)) {
            return;
        }

        self.flush_reminders(sink, message).await;

        let command = match classified {
            Ok(Command::NoCommand) => return,
            Ok(command) => command,
            Err(usage) => {
                self.reply(sink, message.channel_id, &usage.to_string()).await;
                return;
            }
        };

        let invocation = Uuid::new_v4();
        let label = command.label();
        log::info!("[ROUTER] {} '{}' from user {} in channel {}", invocation, label, message.author_id, message.channel_id);

        let started = Instant::now();
        match self.execute(sink, message, command).await {
            Ok(()) => log::info!("[ROUTER] {} '{}' done in {:?}", invocation, label, started.elapsed()),
            Err(BotError::RateLimited { remaining }) => {
                log::info!("[ROUTER] {} '{}' on cooldown for user {} ({:?} left)", invocation, label, message.author_id, remaining);
                self.reply(sink, message.channel_id, &cookie::cooldown_reply(remaining)).await;
            }
            Err(e) => {
                log::error!("[ROUTER] {} '{}' failed for user {}: {}", invocation, label, message.author_id, e);
                if let Some(reply) = failure_reply(label, &e) {
                    self.reply(sink, message.channel_id, &reply).await;
                }
            }
        }
    }

    async fn flush_reminders(&self, sink: &dyn MessageSink, message: &InboundMessage) {
        let due = lock(&self.reminders).drain_all(message.author_id);
        for reminder in due {
            log::info!(
                "[REMIND] Delivering reminder from {} to {} (set {})",
                reminder.sender_id,
                reminder.recipient_id,
                reminder.created_at.to_rfc3339()
            );
            self.reply(sink, message.channel_id, &reminder.delivery_text()).await;
        }
    }

    async fn execute(&self, sink: &dyn MessageSink, message: &InboundMessage, command: Command) -> BotResult<()> {
        let channel = message.channel_id;
        match command {
            Command::SetReminder { recipient, text } => {
                lock(&self.reminders).add(recipient, message.author_id, text);
                sink.send(channel, &format!("Reminder set for <@{}>.", recipient)).await
            }
            Command::Cookie => {
                let outcome = lock(&self.cookie_cooldowns).try_use(
                    message.author_id,
                    self.settings.cookie_cooldown,
                    Instant::now(),
                );
                match outcome {
                    CooldownOutcome::Rejected { remaining } => Err(BotError::RateLimited { remaining }),
                    CooldownOutcome::Allowed => {
                        let reply = match self.fortunes.pick() {
                            Some(fortune) => cookie::fortune_reply(fortune),
                            None => cookie::EMPTY_JAR.to_string(),
                        };
                        sink.send(channel, &reply).await
                    }
                }
            }
            Command::GenerateImage { prompt } => {
                generate::run(sink, channel, self.images.clone(), prompt, self.settings.image_timeout).await
            }
            Command::Chat { prompt } => {
                let request = CompletionRequest {
                    system_instruction: self.settings.system_instruction.clone(),
                    user_prompt: prompt,
                    params: self.settings.params.clone(),
                };
                chat::run(sink, channel, self.completion.as_ref(), &request).await.map(|_| ())
            }
            Command::Ignore | Command::NoCommand => Ok(()),
        }
    }

    async fn reply(&self, sink: &dyn MessageSink, channel: ChannelId, text: &str) {
        if let Err(e) = sink.send(channel, text).await {
            log::error!("[ROUTER] Failed to send message to channel {}: {}", channel, e);
        }
    }
}

/// What the user sees when a command fails. Discord send failures get no reply:
/// the channel just rejected a message and whatever generation ran succeeded.
pub fn failure_reply(command: &str, error: &BotError) -> Option<String> {
    let reply = match error {
        BotError::Discord(_) => return None,
        BotError::Usage(text) => text.clone(),
        BotError::RateLimited { remaining } => cookie::cooldown_reply(*remaining),
        BotError::EmptyGeneration => chat::BLOCKED_REPLY.to_string(),
        _ if command == "generate" => generate::failure_reply(error),
        _ => chat::FAILURE_REPLY.to_string(),
    };
    Some(reply)
}
