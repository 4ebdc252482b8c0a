//! Command and interaction handlers
//!
//! Each handler reads what it needs from the [`SessionStore`], calls the
//! platform, and posts the outcome through the [`ChatSink`]. Errors are
//! returned to the dispatcher, which decides how to report them.

pub mod commands;
pub mod login;
pub mod render;
pub mod welcome;

use std::path::PathBuf;
use std::sync::Arc;

use crate::chat::ChatSink;
use crate::error::{BotError, MissingSession, Result};
use crate::platform::PlatformApi;
use crate::session::SessionStore;
use crate::types::{BusinessGroup, OutgoingMessage};

/// Deployment-specific knobs the handlers need
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// Channel every notice and upload goes to
    pub output_channel: String,
    /// Where downloaded assets are written before upload
    pub download_dir: PathBuf,
    /// Organization whose exchange assets `/get-asset-info` lists; falls back
    /// to the selected business group
    pub default_org_id: Option<String>,
}

#[derive(Clone)]
pub struct HandlerContext {
    pub platform: Arc<dyn PlatformApi>,
    pub chat: Arc<dyn ChatSink>,
    pub session: Arc<SessionStore>,
    pub settings: Arc<HandlerSettings>,
}

impl HandlerContext {
    pub fn new(
        platform: Arc<dyn PlatformApi>,
        chat: Arc<dyn ChatSink>,
        session: Arc<SessionStore>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            platform,
            chat,
            session,
            settings: Arc::new(settings),
        }
    }

    pub(crate) fn token(&self) -> Result<String> {
        self.session
            .access_token()
            .ok_or(BotError::Session(MissingSession::AccessToken))
    }

    pub(crate) fn business_group(&self) -> Result<BusinessGroup> {
        self.session
            .business_group()
            .ok_or(BotError::Session(MissingSession::BusinessGroup))
    }

    /// Post a notice to the output channel
    pub(crate) async fn notify(&self, pretext: impl Into<String>, text: impl Into<String>) -> Result<()> {
        self.post(OutgoingMessage::notice(
            self.settings.output_channel.clone(),
            pretext,
            text,
        ))
        .await
    }

    pub(crate) async fn post(&self, msg: OutgoingMessage) -> Result<()> {
        self.chat.post(msg).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by handler and dispatcher tests

    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::platform::{
        AccountInfo, AnypointClient, ApplicationRecord, AssetFile, AssetRecord, EnvironmentRecord,
        StatusAction,
    };
    use crate::session::SessionTtl;
    use crate::types::{Credentials, LoginMode};

    pub const OUTPUT_CHANNEL: &str = "COUT";

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Upload {
        pub channel: String,
        pub path: PathBuf,
        pub existed: bool,
    }

    /// Chat sink that records everything it is asked to do
    #[derive(Default)]
    pub struct RecordingChat {
        pub posts: Mutex<Vec<OutgoingMessage>>,
        pub forms: Mutex<Vec<(String, LoginMode)>>,
        pub uploads: Mutex<Vec<Upload>>,
        pub fail_uploads: bool,
    }

    impl RecordingChat {
        pub fn failing_uploads() -> Self {
            Self {
                fail_uploads: true,
                ..Self::default()
            }
        }

        pub fn posts(&self) -> Vec<OutgoingMessage> {
            self.posts.lock().unwrap().clone()
        }

        pub fn post_texts(&self) -> Vec<String> {
            self.posts().iter().map(OutgoingMessage::plain_text).collect()
        }
    }

    #[async_trait]
    impl ChatSink for RecordingChat {
        async fn post(&self, msg: OutgoingMessage) -> Result<()> {
            self.posts.lock().unwrap().push(msg);
            Ok(())
        }

        async fn open_login_form(&self, trigger_id: &str, mode: LoginMode) -> Result<()> {
            self.forms.lock().unwrap().push((trigger_id.to_string(), mode));
            Ok(())
        }

        async fn upload_file(&self, channel: &str, path: &Path) -> Result<()> {
            self.uploads.lock().unwrap().push(Upload {
                channel: channel.to_string(),
                path: path.to_path_buf(),
                existed: path.exists(),
            });
            if self.fail_uploads {
                return Err(BotError::Transport("upload rejected".to_string()));
            }
            Ok(())
        }

        async fn user_name(&self, user_id: &str) -> Result<String> {
            Ok(format!("user-{}", user_id))
        }
    }

    /// Platform that counts calls and fails all of them
    #[derive(Default)]
    pub struct CountingPlatform {
        pub calls: AtomicUsize,
    }

    impl CountingPlatform {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit<T>(&self) -> Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BotError::Transport("unexpected platform call".to_string()))
        }
    }

    #[async_trait]
    impl PlatformApi for CountingPlatform {
        async fn authenticate(&self, _: &Credentials) -> Result<String> {
            self.hit()
        }
        async fn fetch_account_info(&self, _: &str) -> Result<AccountInfo> {
            self.hit()
        }
        async fn list_environments(&self, _: &str, _: &str) -> Result<Vec<EnvironmentRecord>> {
            self.hit()
        }
        async fn list_applications(&self, _: &str, _: &str, _: &str) -> Result<Vec<ApplicationRecord>> {
            self.hit()
        }
        async fn set_application_status(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
            _: StatusAction,
        ) -> Result<()> {
            self.hit()
        }
        async fn list_assets(&self, _: &str, _: &str) -> Result<Vec<AssetRecord>> {
            self.hit()
        }
        async fn fetch_asset_metadata(&self, _: &str, _: &str, _: &str) -> Result<AssetRecord> {
            self.hit()
        }
        async fn download_asset_file(&self, _: &AssetFile, _: &str, _: &Path) -> Result<PathBuf> {
            self.hit()
        }
    }

    pub fn settings(download_dir: &Path) -> HandlerSettings {
        HandlerSettings {
            output_channel: OUTPUT_CHANNEL.to_string(),
            download_dir: download_dir.to_path_buf(),
            default_org_id: None,
        }
    }

    /// Context wired to an HTTP platform at `base_url`
    pub fn http_context(base_url: &str, chat: Arc<RecordingChat>, download_dir: &Path) -> HandlerContext {
        let platform = AnypointClient::new(base_url, Duration::from_secs(5)).expect("client");
        HandlerContext::new(
            Arc::new(platform),
            chat,
            Arc::new(SessionStore::new(SessionTtl::default())),
            settings(download_dir),
        )
    }

    pub fn logged_in(ctx: &HandlerContext) {
        ctx.session.set_access_token("tok".to_string());
        ctx.session.select_business_group(BusinessGroup {
            id: "org-1".to_string(),
            name: "Ops".to_string(),
        });
    }
}
