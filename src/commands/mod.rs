// commands/mod.rs - Command Module Registry
// One module per chat command plus the router that picks between them.

pub mod chat;           // Mention-triggered AI chat
pub mod cookie;         // Fortune cookie with per-user cooldown
pub mod generate;       // Image generation + upload
pub mod remind;         // Reminder queue delivered on the recipient's next message
pub mod router;         // Message classification and dispatch
