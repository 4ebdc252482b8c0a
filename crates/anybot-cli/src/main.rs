//! anybot - Slack bot for Anypoint Platform

mod config;

use anybot_channels::{EventBus, SlackApiClient, SlackChannel};
use anybot_core::{
    AnypointClient, Dispatcher, HandlerContext, HandlerSettings, SessionStore, SessionTtl,
    spawn_janitor,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::BotConfig;

/// Slack bot that drives Anypoint Platform from slash commands
#[derive(Parser)]
#[command(name = "anybot")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Load and validate configuration, then exit
    #[arg(long)]
    check_config: bool,
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // a missing .env is normal
    let dotenv = dotenvy::dotenv();
    setup_logging(&args.log_level);
    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let config = match BotConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.check_config {
        info!("Configuration OK");
        return ExitCode::SUCCESS;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("anybot failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: BotConfig) -> Result<()> {
    let platform = AnypointClient::new(&config.platform.base_url, config.request_timeout())
        .context("Failed to create platform client")?;
    let slack = SlackApiClient::new(
        &config.slack.api_base,
        &config.slack.app_token,
        &config.slack.bot_token,
        config.request_timeout(),
    )?;

    tokio::fs::create_dir_all(&config.downloads.dir)
        .await
        .with_context(|| format!("Failed to create {}", config.downloads.dir.display()))?;

    let session = Arc::new(SessionStore::new(SessionTtl {
        token: config.token_ttl(),
        selection: config.selection_ttl(),
    }));
    let ctx = HandlerContext::new(
        Arc::new(platform),
        Arc::new(slack.clone()),
        session.clone(),
        HandlerSettings {
            output_channel: config.slack.output_channel.clone(),
            download_dir: config.downloads.dir.clone(),
            default_org_id: config.platform.default_org_id.clone(),
        },
    );

    let cancel = CancellationToken::new();
    let janitor = spawn_janitor(session, config.purge_interval(), cancel.child_token());

    let mut bus = EventBus::new(config.slack.event_buffer);
    bus.register(Box::new(SlackChannel::new(slack, config.reconnect_delay())));
    bus.start_all(&cancel).await?;
    info!("anybot running with {} event source(s)", bus.source_count());
    let rx = bus.into_receiver();

    let dispatcher = Dispatcher::new(ctx);
    let dispatch_cancel = cancel.clone();
    let mut dispatch = tokio::spawn(async move { dispatcher.run(rx, dispatch_cancel).await });

    let dispatch_done = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Received Ctrl+C, shutting down");
            false
        }
        result = &mut dispatch => {
            if let Err(e) = result {
                warn!("Dispatcher task ended abnormally: {}", e);
            }
            true
        }
    };
    cancel.cancel();

    if !dispatch_done {
        if let Err(e) = dispatch.await {
            warn!("Dispatcher task ended abnormally: {}", e);
        }
    }
    if let Err(e) = janitor.await {
        warn!("Session janitor ended abnormally: {}", e);
    }
    info!("anybot stopped");
    Ok(())
}
