mod commands;
mod completion;
mod config;
mod delivery;
mod error;
mod hosting;

use std::sync::Arc;

use serenity::{
    async_trait,
    client::{Client, Context, EventHandler},
    model::{channel::Message, gateway::{Activity, Ready}},
    prelude::GatewayIntents,
};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;

use crate::commands::cookie::Fortunes;
use crate::commands::router::{DispatchSettings, Dispatcher, InboundMessage};
use crate::completion::gemini::GeminiClient;
use crate::completion::groq::GroqClient;
use crate::completion::image::{HostedImageGenerator, ImageBackend};
use crate::completion::CompletionBackend;
use crate::config::{BotConfig, CompletionProvider};
use crate::delivery::DiscordSink;
use crate::error::{BotError, BotResult};
use crate::hosting::FileHost;

// Event handler implementation
struct Handler {
    dispatcher: Arc<Dispatcher>,
    presence_text: String,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        println!("✅ {} is online! 👍 (connected to {} guilds)", ready.user.tag(), ready.guilds.len());
        ctx.set_activity(Activity::listening(&self.presence_text)).await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let bot_id = ctx.cache.current_user_id();
        let inbound = InboundMessage::from(&msg);
        let sink = DiscordSink::new(ctx.http.clone());
        self.dispatcher.handle(&sink, bot_id, &inbound).await;
    }
}

// Operator console: lets whoever runs the bot stop it or peek at its state.
async fn handle_command_line(shutdown_tx: mpsc::Sender<String>, dispatcher: Arc<Dispatcher>) {
    use tokio::io::AsyncWriteExt;
    use tokio::time::{sleep, Duration};

    println!("📝 Command line interface active. Type 'help' for available commands.");

    // Let the connection banner print before the first prompt
    sleep(Duration::from_millis(1500)).await;

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin).lines();
    let mut stdout = io::stdout();

    if stdout.write_all(b"\n> ").await.is_err() || stdout.flush().await.is_err() {
        eprintln!("❌ Failed to write initial prompt");
        return;
    }

    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                let command = line.trim().to_lowercase();

                match command.as_str() {
                    "quit" | "q" | "exit" => {
                        println!("⏹️  Shutting down bot...");
                        if shutdown_tx.send("quit".to_string()).await.is_err() {
                            eprintln!("❌ Failed to send shutdown signal");
                        }
                        break;
                    }
                    "help" | "h" => {
                        println!("🤖 Available commands:");
                        println!("  quit, q, exit  - Stop the bot gracefully");
                        println!("  help, h        - Show this help message");
                        println!("  status         - Show pending reminders and cooldowns");
                    }
                    "status" => {
                        println!("🤖 Bot Status: Running");
                        println!("⏰ Pending reminders: {}", dispatcher.pending_reminders());
                        println!("🍪 Users on cookie cooldown record: {}", dispatcher.tracked_cooldowns());
                    }
                    "" => {}
                    _ => {
                        println!("❓ Unknown command: '{}'. Type 'help' for available commands.", command);
                    }
                }

                if stdout.write_all(b"> ").await.is_err() || stdout.flush().await.is_err() {
                    eprintln!("❌ Failed to write prompt");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("❌ Error reading command line: {}", e);
                break;
            }
        }
    }
}

fn build_dispatcher(config: &BotConfig) -> BotResult<Dispatcher> {
    let gemini = match &config.gemini_api_key {
        Some(key) => Some(Arc::new(GeminiClient::new(
            key.clone(),
            config.gemini_base_url.clone(),
            config.gemini_text_model.clone(),
            config.gemini_image_model.clone(),
            config.http_timeout,
        )?)),
        None => None,
    };

    let completion: Arc<dyn CompletionBackend> = match config.provider {
        CompletionProvider::Groq => {
            let key = config
                .groq_api_key
                .clone()
                .ok_or_else(|| BotError::Config("GROQ_API_KEY is not set".to_string()))?;
            Arc::new(GroqClient::new(
                key,
                config.groq_base_url.clone(),
                config.groq_model.clone(),
                config.http_timeout,
            )?)
        }
        CompletionProvider::Gemini => {
            let gemini = gemini
                .clone()
                .ok_or_else(|| BotError::Config("GEMINI_API_KEY is not set".to_string()))?;
            gemini as Arc<dyn CompletionBackend>
        }
    };

    let images: Option<Arc<dyn ImageBackend>> = match gemini {
        Some(gemini) => {
            let host = FileHost::new(config.upload_endpoint.clone(), config.http_timeout)?;
            Some(Arc::new(HostedImageGenerator::new(gemini, Arc::new(host))))
        }
        None => {
            log::warn!("GEMINI_API_KEY not set, !generate is disabled");
            None
        }
    };

    println!("💬 Chat backend: {}", completion.name());

    Ok(Dispatcher::new(
        completion,
        images,
        Fortunes::load(config.fortunes_file.as_deref()),
        DispatchSettings {
            system_instruction: config.system_instruction.clone(),
            params: config.params.clone(),
            image_timeout: config.image_timeout,
            cookie_cooldown: config.cookie_cooldown,
        },
    ))
}

#[tokio::main]
async fn main() {
    // Initialize logger - must be done before any logging calls
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = match BotConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ Failed to load configuration: {}", e);
            eprintln!("❌ Failed to load configuration: {}", e);
            eprintln!("Create a botconfig.txt file in the project root with at least DISCORD_TOKEN=... and GROQ_API_KEY=...");
            return;
        }
    };

    let dispatcher = match build_dispatcher(&config) {
        Ok(dispatcher) => Arc::new(dispatcher),
        Err(e) => {
            log::error!("❌ Failed to set up generation backends: {}", e);
            eprintln!("❌ Failed to set up generation backends: {}", e);
            return;
        }
    };

    // Configure bot intents
    let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;

    let handler = Handler {
        dispatcher: dispatcher.clone(),
        presence_text: config.presence_text.clone(),
    };

    let mut client = match Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
    {
        Ok(client) => client,
        Err(e) => {
            log::error!("❌ Error creating Discord client: {:?}", e);
            eprintln!("❌ Error creating Discord client: {:?}", e);
            eprintln!("Check DISCORD_TOKEN in botconfig.txt");
            return;
        }
    };

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<String>(1);
    let cmd_task = tokio::spawn(handle_command_line(shutdown_tx, dispatcher.clone()));

    println!("🚀 Bot is running...");
    println!("💡 Use 'quit' command to stop gracefully, or press Ctrl+C");
    tokio::select! {
        _ = signal::ctrl_c() => {
            println!("\n⏹️ Stopping bot gracefully...");
        }
        shutdown_signal = shutdown_rx.recv() => {
            if let Some(signal) = shutdown_signal {
                println!("📡 Received '{}' command, stopping bot gracefully...", signal);
            }
        }
        result = client.start() => {
            if let Err(why) = result {
                log::error!("❌ Client error: {:?}", why);
                eprintln!("❌ Client error: {:?}", why);
            }
        }
    }

    if dispatcher.pending_reminders() > 0 {
        log::warn!("Dropping {} undelivered reminders on shutdown", dispatcher.pending_reminders());
    }

    cmd_task.abort();
    println!("✅ Bot stopped");
}
