//! Slash commands

use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{HandlerContext, render};
use crate::error::{BotError, Result};
use crate::platform::StatusAction;
use crate::types::{COLOR_OK, OutgoingMessage, SlashCommand};

/// A parsed and validated slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetStatus {
        environment: String,
    },
    ChangeStatus {
        action: StatusAction,
        environment: String,
        app: String,
    },
    GetAssetInfo,
    ListEnvironments,
    DownloadAsset {
        asset: String,
    },
}

impl Command {
    /// Parse `command` with its argument `text`. Never touches the network.
    pub fn parse(command: &str, text: &str) -> Result<Command> {
        let args: Vec<&str> = text.split_whitespace().collect();
        match command {
            "/get-status" => match args.as_slice() {
                [environment] => Ok(Command::GetStatus {
                    environment: environment.to_string(),
                }),
                _ => Err(usage("/get-status <environment>")),
            },
            "/change-status" => match args.as_slice() {
                [action, environment, app] => Ok(Command::ChangeStatus {
                    action: action.parse()?,
                    environment: environment.to_string(),
                    app: app.to_string(),
                }),
                _ => Err(usage("/change-status <start|stop|restart> <environment> <application>")),
            },
            "/get-asset-info" => Ok(Command::GetAssetInfo),
            "/list-environments" => Ok(Command::ListEnvironments),
            "/download-asset" => match args.as_slice() {
                [asset] => Ok(Command::DownloadAsset {
                    asset: asset.to_string(),
                }),
                _ => Err(usage("/download-asset <asset>")),
            },
            other => Err(BotError::Validation(format!("Unknown command {}", other))),
        }
    }
}

fn usage(text: &str) -> BotError {
    BotError::Validation(format!("Usage: {}", text))
}

pub async fn handle_slash_command(ctx: &HandlerContext, slash: &SlashCommand) -> Result<()> {
    let command = Command::parse(&slash.command, &slash.text)?;
    let token = ctx.token()?;
    let org_id = ctx.business_group()?.id;
    debug!("Running {:?} for {}", command, slash.user_id);

    match command {
        Command::GetStatus { environment } => get_status(ctx, &token, &org_id, &environment).await,
        Command::ChangeStatus {
            action,
            environment,
            app,
        } => change_status(ctx, &token, &org_id, action, &environment, &app).await,
        Command::GetAssetInfo => asset_info(ctx, &token, &org_id).await,
        Command::ListEnvironments => list_environments(ctx, &token, &org_id).await,
        Command::DownloadAsset { asset } => download_asset(ctx, &token, &org_id, &asset).await,
    }
}

/// Environment id for `name`, listing `org_id`'s environments first when
/// none of them are cached
async fn resolve_environment(ctx: &HandlerContext, token: &str, org_id: &str, name: &str) -> Result<String> {
    let environments = match ctx.session.environments(org_id) {
        Some(map) => map,
        None => {
            debug!("No cached environments, listing them for {}", org_id);
            refresh_environments(ctx, token, org_id).await?;
            ctx.session.environments(org_id).unwrap_or_default()
        }
    };

    environments.get(name).cloned().ok_or_else(|| {
        BotError::Validation(format!(
            "Environment '{}' not found. Run /list-environments to refresh the list",
            name
        ))
    })
}

async fn refresh_environments(
    ctx: &HandlerContext,
    token: &str,
    org_id: &str,
) -> Result<Vec<crate::platform::EnvironmentRecord>> {
    let envs = ctx.platform.list_environments(token, org_id).await?;
    let mapping: HashMap<String, String> = envs
        .iter()
        .map(|env| (env.name.clone(), env.id.clone()))
        .collect();
    ctx.session.replace_environments(org_id, mapping);
    Ok(envs)
}

async fn get_status(ctx: &HandlerContext, token: &str, org_id: &str, environment: &str) -> Result<()> {
    let env_id = resolve_environment(ctx, token, org_id, environment).await?;
    let apps = ctx.platform.list_applications(token, org_id, &env_id).await?;
    info!("{} application(s) in {}", apps.len(), environment);
    ctx.notify(
        format!("App Details for {} environment", environment),
        render::applications(&apps),
    )
    .await
}

async fn change_status(
    ctx: &HandlerContext,
    token: &str,
    org_id: &str,
    action: StatusAction,
    environment: &str,
    app: &str,
) -> Result<()> {
    let env_id = resolve_environment(ctx, token, org_id, environment).await?;
    ctx.platform
        .set_application_status(token, org_id, &env_id, app, action)
        .await?;
    info!("Application {} in {} set to {}", app, environment, action);
    ctx.post(
        OutgoingMessage::notice(
            ctx.settings.output_channel.clone(),
            "Status has changed",
            format!("Status Of API {} has changed to {}", app, action),
        )
        .with_color(COLOR_OK),
    )
    .await
}

async fn asset_info(ctx: &HandlerContext, token: &str, org_id: &str) -> Result<()> {
    let org_id = ctx.settings.default_org_id.as_deref().unwrap_or(org_id);
    let assets = ctx.platform.list_assets(token, org_id).await?;
    ctx.notify("Asset Information", render::assets(&assets)).await
}

async fn list_environments(ctx: &HandlerContext, token: &str, org_id: &str) -> Result<()> {
    let envs = refresh_environments(ctx, token, org_id).await?;
    ctx.notify("List Of Environments", render::environments(&envs)).await
}

/// Download, upload, then delete the local copy whatever the upload outcome
async fn download_asset(ctx: &HandlerContext, token: &str, org_id: &str, asset: &str) -> Result<()> {
    let record = ctx.platform.fetch_asset_metadata(token, org_id, asset).await?;
    let file = record
        .primary_file()
        .ok_or_else(|| BotError::Decode(format!("asset {} has no downloadable files", asset)))?;
    let path = ctx
        .platform
        .download_asset_file(file, asset, &ctx.settings.download_dir)
        .await?;

    let uploaded = ctx
        .chat
        .upload_file(&ctx.settings.output_channel, &path)
        .await;
    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!("Could not remove downloaded asset {}: {}", path.display(), e);
    }
    uploaded?;

    info!("Uploaded asset {} to {}", asset, ctx.settings.output_channel);
    Ok(())
}
