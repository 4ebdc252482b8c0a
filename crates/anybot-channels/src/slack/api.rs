//! Slack Web API client used for posting, modals, user lookups and uploads

use anybot_core::chat::ChatSink;
use anybot_core::error::{BotError, truncate_for_error};
use anybot_core::types::{LoginMode, OutgoingMessage};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::blocks::{login_view, message_payload};

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Every Web API reply carries `ok` and, on failure, `error`
#[derive(Debug, Deserialize)]
struct SlackReply<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    data: T,
}

#[derive(Debug, Default, Deserialize)]
struct Empty {}

#[derive(Debug, Deserialize)]
struct OpenSocket {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    user: Option<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: Option<SlackProfile>,
}

#[derive(Debug, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    display_name: Option<String>,
}

impl SlackUser {
    fn preferred_name(self) -> String {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        non_empty(self.profile.and_then(|p| p.display_name))
            .or_else(|| non_empty(self.real_name))
            .unwrap_or(self.name)
    }
}

#[derive(Debug, Deserialize)]
struct UploadTicket {
    upload_url: Option<String>,
    file_id: Option<String>,
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
}

impl SlackApiClient {
    pub fn new(api_base: &str, app_token: &str, bot_token: &str, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("anybot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_token: app_token.trim().to_string(),
            bot_token: bot_token.trim().to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("slack api {method} request failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "slack api {method} failed with status {}: {}",
                status.as_u16(),
                truncate_for_error(&body, 800)
            );
        }
        let reply: SlackReply<T> = response
            .json()
            .await
            .with_context(|| format!("failed to decode slack {method}"))?;
        if !reply.ok {
            bail!(
                "slack {method} failed: {}",
                reply.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        Ok(reply.data)
    }

    /// Ask for a Socket Mode websocket URL. Uses the app-level token.
    pub async fn open_socket_connection(&self) -> Result<String> {
        let reply: OpenSocket = self
            .call(
                "apps.connections.open",
                self.http
                    .post(self.method_url("apps.connections.open"))
                    .bearer_auth(&self.app_token),
            )
            .await?;
        reply
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow!("slack apps.connections.open missing url"))
    }

    pub async fn post_message(&self, payload: &Value) -> Result<()> {
        let _: Empty = self
            .call(
                "chat.postMessage",
                self.http
                    .post(self.method_url("chat.postMessage"))
                    .bearer_auth(&self.bot_token)
                    .json(payload),
            )
            .await?;
        Ok(())
    }

    pub async fn open_view(&self, trigger_id: &str, view: &Value) -> Result<()> {
        let _: Empty = self
            .call(
                "views.open",
                self.http
                    .post(self.method_url("views.open"))
                    .bearer_auth(&self.bot_token)
                    .json(&json!({ "trigger_id": trigger_id, "view": view })),
            )
            .await?;
        Ok(())
    }

    pub async fn user_name(&self, user_id: &str) -> Result<String> {
        let reply: UserInfo = self
            .call(
                "users.info",
                self.http
                    .get(self.method_url("users.info"))
                    .bearer_auth(&self.bot_token)
                    .query(&[("user", user_id)]),
            )
            .await?;
        reply
            .user
            .map(SlackUser::preferred_name)
            .ok_or_else(|| anyhow!("slack users.info missing user"))
    }

    /// Share `bytes` as `filename` in `channel` via the external upload flow
    pub async fn upload_bytes(&self, channel: &str, filename: &str, bytes: Vec<u8>) -> Result<String> {
        if filename.trim().is_empty() {
            bail!("slack files upload requires non-empty filename");
        }
        if bytes.is_empty() {
            bail!("slack files upload requires non-empty payload");
        }
        let length = bytes.len().to_string();

        let ticket: UploadTicket = self
            .call(
                "files.getUploadURLExternal",
                self.http
                    .post(self.method_url("files.getUploadURLExternal"))
                    .bearer_auth(&self.bot_token)
                    .form(&[("filename", filename), ("length", length.as_str())]),
            )
            .await?;
        let upload_url = ticket
            .upload_url
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("slack files.getUploadURLExternal missing upload_url"))?;
        let file_id = ticket
            .file_id
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("slack files.getUploadURLExternal missing file_id"))?;

        let response = self
            .http
            .post(&upload_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .context("failed to upload file payload to slack external upload URL")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!(
                "slack external upload failed: status={} body={}",
                status,
                truncate_for_error(&body, 320)
            );
        }

        let _: Empty = self
            .call(
                "files.completeUploadExternal",
                self.http
                    .post(self.method_url("files.completeUploadExternal"))
                    .bearer_auth(&self.bot_token)
                    .json(&json!({
                        "files": [{ "id": file_id, "title": filename }],
                        "channel_id": channel,
                    })),
            )
            .await?;
        Ok(file_id)
    }
}

fn transport(err: anyhow::Error) -> BotError {
    BotError::Transport(format!("{:#}", err))
}

#[async_trait]
impl ChatSink for SlackApiClient {
    async fn post(&self, msg: OutgoingMessage) -> anybot_core::Result<()> {
        debug!("Posting to {}", msg.channel);
        self.post_message(&message_payload(&msg)).await.map_err(transport)
    }

    async fn open_login_form(&self, trigger_id: &str, mode: LoginMode) -> anybot_core::Result<()> {
        debug!("Opening {} login form", mode);
        self.open_view(trigger_id, &login_view(mode))
            .await
            .map_err(transport)
    }

    async fn upload_file(&self, channel: &str, path: &Path) -> anybot_core::Result<()> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BotError::Validation(format!("no file name in {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        let file_id = self
            .upload_bytes(channel, &filename, bytes)
            .await
            .map_err(transport)?;
        info!("Uploaded {} to {} as {}", filename, channel, file_id);
        Ok(())
    }

    async fn user_name(&self, user_id: &str) -> anybot_core::Result<String> {
        SlackApiClient::user_name(self, user_id).await.map_err(transport)
    }
}
