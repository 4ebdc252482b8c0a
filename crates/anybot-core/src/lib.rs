//! Core of the anybot Slack integration
//!
//! This crate owns everything that does not depend on the Slack wire format:
//! the expiring session cache, the Anypoint Platform client, the command
//! handlers and the dispatch loop that drives them.

pub mod chat;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod platform;
pub mod session;
pub mod types;

pub use chat::ChatSink;
pub use dispatch::Dispatcher;
pub use error::{BotError, MissingSession, Result};
pub use handlers::{HandlerContext, HandlerSettings};
pub use platform::{AnypointClient, PlatformApi, StatusAction};
pub use session::{SessionStore, SessionTtl, TtlCache, spawn_janitor};
pub use types::{
    AppMention, BusinessGroup, Credentials, InboundEvent, Interaction, LoginMode, MessageBody,
    OutgoingMessage, SlashCommand,
};
