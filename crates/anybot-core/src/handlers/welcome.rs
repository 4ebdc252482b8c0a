//! App mentions and the login prompt

use tracing::{info, warn};

use super::HandlerContext;
use crate::error::Result;
use crate::types::{AppMention, MessageBody, OutgoingMessage};

pub const WELCOME_TEXT: &str = "Welcome To Anypoint slack bot";

pub async fn handle_app_mention(ctx: &HandlerContext, mention: &AppMention) -> Result<()> {
    let name = match ctx.chat.user_name(&mention.user_id).await {
        Ok(name) => name,
        Err(e) => {
            warn!("Could not look up user {}: {}", mention.user_id, e);
            mention.user_id.clone()
        }
    };

    let greeting = if mention.text.to_lowercase().contains("hello") {
        WELCOME_TEXT.to_string()
    } else {
        format!("How can I help you {}?", name)
    };

    info!("Mentioned by {} in {}", name, mention.channel_id);
    prompt_login(ctx, greeting).await
}

/// Post the login buttons to the output channel
pub async fn prompt_login(ctx: &HandlerContext, greeting: String) -> Result<()> {
    ctx.post(OutgoingMessage {
        channel: ctx.settings.output_channel.clone(),
        body: MessageBody::LoginOptions { greeting },
    })
    .await
}
