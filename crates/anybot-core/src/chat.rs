//! Outbound side of the chat transport

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::types::{LoginMode, OutgoingMessage};

/// What handlers need from the chat platform. Implementations map failures
/// to [`crate::error::BotError::Transport`].
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn post(&self, msg: OutgoingMessage) -> Result<()>;

    /// Open the login form for `mode` in response to an interaction trigger
    async fn open_login_form(&self, trigger_id: &str, mode: LoginMode) -> Result<()>;

    /// Upload a local file to `channel`
    async fn upload_file(&self, channel: &str, path: &Path) -> Result<()>;

    /// Display name for a user id
    async fn user_name(&self, user_id: &str) -> Result<String>;
}
