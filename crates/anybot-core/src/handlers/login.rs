//! Login form, credential exchange and business group selection

use tracing::info;

use super::HandlerContext;
use crate::error::{BotError, Result};
use crate::types::{BusinessGroup, COLOR_OK, Credentials, LoginMode, MessageBody, OutgoingMessage};

/// A login button was pressed; open the matching form
pub async fn open_login_form(ctx: &HandlerContext, button_value: &str, trigger_id: &str) -> Result<()> {
    let mode: LoginMode = button_value.parse().map_err(BotError::Validation)?;
    info!("Opening {} login form", mode);
    ctx.chat.open_login_form(trigger_id, mode).await
}

/// Exchange credentials for a token and offer the business groups.
///
/// The token is cached only once both the login and the account lookup
/// succeeded. A new login drops the previous business group selection.
pub async fn handle_login(ctx: &HandlerContext, credentials: &Credentials) -> Result<()> {
    let token = ctx.platform.authenticate(credentials).await?;
    let account = ctx.platform.fetch_account_info(&token).await?;
    ctx.session.start_session(token);
    info!(
        "Logged in with {} credentials, {} business group(s) available",
        credentials.mode(),
        account.organizations.len()
    );

    if account.organizations.is_empty() {
        return ctx
            .notify(
                "Logged in",
                "You are logged in to the platform but are not a contributor to any business group",
            )
            .await;
    }

    ctx.post(OutgoingMessage {
        channel: ctx.settings.output_channel.clone(),
        body: MessageBody::BusinessGroupPicker {
            groups: account.organizations,
        },
    })
    .await
}

pub async fn handle_business_group_selected(ctx: &HandlerContext, name: &str, id: &str) -> Result<()> {
    ctx.session.select_business_group(BusinessGroup {
        id: id.to_string(),
        name: name.to_string(),
    });
    info!("Business group {} selected", name);

    ctx.post(
        OutgoingMessage::notice(
            ctx.settings.output_channel.clone(),
            "Business Group Information",
            format!("Business Group Name: {}\nBusiness Group Id: {}", name, id),
        )
        .with_color(COLOR_OK),
    )
    .await
}
