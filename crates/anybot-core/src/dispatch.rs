//! Event dispatch loop
//!
//! Pulls one [`InboundEvent`] at a time and awaits its handler before taking
//! the next, so replies within a session keep their order. Handler errors end
//! here: they are logged and reported in chat, and the loop keeps going.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::BotError;
use crate::handlers::{HandlerContext, commands, login, welcome};
use crate::types::{COLOR_ERROR, InboundEvent, Interaction, OutgoingMessage};

pub const SESSION_EXPIRED_TEXT: &str = "Your session has expired. Please choose a login option";

pub struct Dispatcher {
    ctx: HandlerContext,
}

impl Dispatcher {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    /// Run until `cancel` fires or every sender is dropped
    pub async fn run(&self, mut rx: mpsc::Receiver<InboundEvent>, cancel: CancellationToken) {
        info!("Dispatcher started");
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Dispatcher shutting down");
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => {
                        info!("Event stream closed, dispatcher stopping");
                        break;
                    }
                },
            };
            self.dispatch(event).await;
        }
    }

    pub async fn dispatch(&self, event: InboundEvent) {
        let kind = event.kind().to_string();
        debug!("Dispatching {}", kind);

        let result = match event {
            InboundEvent::AppMention(mention) => welcome::handle_app_mention(&self.ctx, &mention).await,
            InboundEvent::SlashCommand(command) => {
                commands::handle_slash_command(&self.ctx, &command).await
            }
            InboundEvent::Interaction(interaction) => self.interaction(interaction).await,
            InboundEvent::Unsupported { kind } => {
                error!("Unsupported event type: {}", kind);
                return;
            }
        };

        match result {
            Ok(()) => debug!("Handled {}", kind),
            Err(err) => self.report(&kind, err).await,
        }
    }

    async fn interaction(&self, interaction: Interaction) -> crate::error::Result<()> {
        match interaction {
            Interaction::OptionSelected { label, value } => {
                login::handle_business_group_selected(&self.ctx, &label, &value).await
            }
            Interaction::ButtonPressed { value, trigger_id } => {
                login::open_login_form(&self.ctx, &value, &trigger_id).await
            }
            Interaction::LoginSubmitted { credentials } => {
                login::handle_login(&self.ctx, &credentials).await
            }
        }
    }

    async fn report(&self, kind: &str, err: BotError) {
        if err.is_session() {
            warn!("{} needs a login: {}", kind, err);
            if let Err(e) = welcome::prompt_login(&self.ctx, SESSION_EXPIRED_TEXT.to_string()).await {
                error!("Could not post login prompt: {}", e);
            }
            return;
        }

        error!("Handling {} failed: {}", kind, err);
        let notice = OutgoingMessage::notice(
            self.ctx.settings.output_channel.clone(),
            err.headline(),
            err.to_string(),
        )
        .with_color(COLOR_ERROR);
        if let Err(e) = self.ctx.chat.post(notice).await {
            error!("Could not report failure of {} to chat: {}", kind, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::*;
    use crate::session::SessionStore;
    use crate::types::{AppMention, Credentials, MessageBody, SlashCommand};
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn counting_dispatcher(chat: Arc<RecordingChat>, dir: &std::path::Path) -> (Dispatcher, HandlerContext) {
        let ctx = HandlerContext::new(
            Arc::new(CountingPlatform::default()),
            chat,
            Arc::new(SessionStore::default()),
            settings(dir),
        );
        (Dispatcher::new(ctx.clone()), ctx)
    }

    fn slash(command: &str, text: &str) -> InboundEvent {
        InboundEvent::SlashCommand(SlashCommand {
            command: command.into(),
            text: text.into(),
            user_id: "U1".into(),
            channel_id: "C1".into(),
        })
    }

    #[tokio::test]
    async fn test_missing_session_redirects_to_login_prompt() {
        let dir = tempdir().unwrap();
        let chat = Arc::new(RecordingChat::default());
        let (dispatcher, _) = counting_dispatcher(chat.clone(), dir.path());

        dispatcher.dispatch(slash("/get-status", "prod")).await;

        assert_eq!(
            chat.posts()[0].body,
            MessageBody::LoginOptions {
                greeting: SESSION_EXPIRED_TEXT.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_validation_error_is_reported_in_red() {
        let dir = tempdir().unwrap();
        let chat = Arc::new(RecordingChat::default());
        let (dispatcher, ctx) = counting_dispatcher(chat.clone(), dir.path());
        logged_in(&ctx);

        dispatcher.dispatch(slash("/change-status", "pause prod api")).await;

        match &chat.posts()[0].body {
            MessageBody::Notice { pretext, text, color } => {
                assert_eq!(pretext, "Invalid command");
                assert!(text.contains("Acceptable Status are Start, Stop, Restart"));
                assert_eq!(color.as_deref(), Some(COLOR_ERROR));
            }
            other => panic!("expected notice, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_events_are_ignored() {
        let dir = tempdir().unwrap();
        let chat = Arc::new(RecordingChat::default());
        let (dispatcher, _) = counting_dispatcher(chat.clone(), dir.path());

        dispatcher
            .dispatch(InboundEvent::Unsupported { kind: "shortcut".into() })
            .await;

        assert!(chat.posts().is_empty());
    }

    #[tokio::test]
    async fn test_bad_login_reports_invalid_credentials() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/accounts/api/v2/oauth2/token");
            then.status(401).body("invalid_client");
        });
        let dir = tempdir().unwrap();
        let chat = Arc::new(RecordingChat::default());
        let ctx = http_context(&server.base_url(), chat.clone(), dir.path());
        let dispatcher = Dispatcher::new(ctx.clone());

        dispatcher
            .dispatch(InboundEvent::Interaction(Interaction::LoginSubmitted {
                credentials: Credentials::ClientCredentials {
                    client_id: "cid".into(),
                    client_secret: "bad".into(),
                },
            }))
            .await;

        assert_eq!(ctx.session.access_token(), None);
        assert!(chat.post_texts()[0].starts_with("Invalid username/password"));
    }

    #[tokio::test]
    async fn test_run_processes_events_in_order_and_survives_failures() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/accounts/api/organizations/org-1/environments");
            then.status(502).body("bad gateway");
        });
        let dir = tempdir().unwrap();
        let chat = Arc::new(RecordingChat::default());
        let ctx = http_context(&server.base_url(), chat.clone(), dir.path());
        logged_in(&ctx);
        let dispatcher = Dispatcher::new(ctx);

        let (tx, rx) = mpsc::channel(8);
        tx.send(slash("/list-environments", "")).await.unwrap();
        tx.send(InboundEvent::Interaction(Interaction::OptionSelected {
            label: "Payments".into(),
            value: "org-2".into(),
        }))
        .await
        .unwrap();
        tx.send(InboundEvent::AppMention(AppMention {
            user_id: "U1".into(),
            channel_id: "C1".into(),
            text: "hello".into(),
        }))
        .await
        .unwrap();
        drop(tx);

        dispatcher.run(rx, CancellationToken::new()).await;

        let texts = chat.post_texts();
        assert_eq!(texts.len(), 3);
        assert!(texts[0].contains("502"));
        assert!(texts[1].contains("Business Group Name: Payments"));
        assert_eq!(texts[2], crate::handlers::welcome::WELCOME_TEXT);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let dir = tempdir().unwrap();
        let chat = Arc::new(RecordingChat::default());
        let (dispatcher, _) = counting_dispatcher(chat, dir.path());
        let (_tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(1), dispatcher.run(rx, cancel))
            .await
            .expect("dispatcher should stop once cancelled");
    }
}
