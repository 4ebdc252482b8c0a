//! HTTP client for the Anypoint Platform REST API

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    AccountInfo, ApplicationRecord, AssetFile, AssetRecord, EnvironmentRecord, PlatformApi,
    StatusAction,
};
use crate::error::{BotError, Result, truncate_for_error};
use crate::types::{BusinessGroup, Credentials};

pub const DEFAULT_BASE_URL: &str = "https://anypoint.mulesoft.com";

const ORG_HEADER: &str = "X-ANYPNT-ORG-ID";
const ENV_HEADER: &str = "X-ANYPNT-ENV-ID";
const MAX_ERROR_BODY_CHARS: usize = 800;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    user: MeUser,
}

#[derive(Debug, Deserialize)]
struct MeUser {
    #[serde(rename = "contributorOfOrganizations", default)]
    organizations: Vec<BusinessGroup>,
}

#[derive(Debug, Deserialize)]
struct EnvironmentsResponse {
    #[serde(default)]
    data: Vec<EnvironmentRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkerType {
    #[serde(default)]
    cpu: String,
    #[serde(default)]
    memory: String,
}

#[derive(Debug, Default, Deserialize)]
struct Workers {
    #[serde(rename = "type", default)]
    kind: WorkerType,
}

#[derive(Debug, Deserialize)]
struct RawApplication {
    domain: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    workers: Workers,
}

impl From<RawApplication> for ApplicationRecord {
    fn from(app: RawApplication) -> Self {
        ApplicationRecord {
            domain: app.domain,
            status: app.status,
            worker_cpu: app.workers.kind.cpu,
            worker_memory: app.workers.kind.memory,
        }
    }
}

/// Stateless Anypoint client. Every call is a single request with no retry.
#[derive(Clone)]
pub struct AnypointClient {
    http: reqwest::Client,
    base_url: Url,
}

impl AnypointClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("anybot"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()?;

        let base_url = Url::parse(base_url).map_err(|e| {
            BotError::Validation(format!("invalid platform base url {}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(BotError::Validation(format!(
                "platform base url {} cannot carry a path",
                base_url
            )));
        }

        Ok(Self { http, base_url })
    }

    /// Base URL joined with `segments`, each one percent-escaped
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = checked(operation, request.send().await?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BotError::Decode(format!("{}: {}", operation, e)))
    }

    async fn send_empty(&self, operation: &'static str, request: RequestBuilder) -> Result<()> {
        checked(operation, request.send().await?).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into [`BotError::Api`]
async fn checked(operation: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("Platform call {} returned {}", operation, status);
    Err(BotError::Api {
        operation,
        status: status.as_u16(),
        body: truncate_for_error(&body, MAX_ERROR_BODY_CHARS),
    })
}

/// Reject names that would escape the download directory
fn safe_file_component(value: &str, what: &str) -> Result<()> {
    if value.is_empty() || value.contains(['/', '\\']) || value == ".." || value == "." {
        return Err(BotError::Validation(format!("invalid {}: {:?}", what, value)));
    }
    Ok(())
}

#[async_trait]
impl PlatformApi for AnypointClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<String> {
        let (url, body) = match credentials {
            Credentials::Password { username, password } => (
                self.endpoint(&["accounts", "login"]),
                json!({ "username": username, "password": password }),
            ),
            Credentials::ClientCredentials {
                client_id,
                client_secret,
            } => (
                self.endpoint(&["accounts", "api", "v2", "oauth2", "token"]),
                json!({
                    "client_id": client_id,
                    "client_secret": client_secret,
                    "grant_type": "client_credentials",
                }),
            ),
        };

        info!("Authenticating with platform using {} login", credentials.mode());
        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Platform login rejected with status {}", status);
            return Err(BotError::Auth {
                status: status.as_u16(),
                body: truncate_for_error(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BotError::Decode(format!("login: {}", e)))?;
        if token.access_token.trim().is_empty() {
            return Err(BotError::Decode("login returned an empty access token".to_string()));
        }
        Ok(token.access_token)
    }

    async fn fetch_account_info(&self, token: &str) -> Result<AccountInfo> {
        let request = self
            .http
            .get(self.endpoint(&["accounts", "api", "me"]))
            .bearer_auth(token);
        let me: MeResponse = self.send_json("account info", request).await?;
        debug!("Account has {} organization(s)", me.user.organizations.len());
        Ok(AccountInfo {
            organizations: me.user.organizations,
        })
    }

    async fn list_environments(&self, token: &str, org_id: &str) -> Result<Vec<EnvironmentRecord>> {
        let request = self
            .http
            .get(self.endpoint(&["accounts", "api", "organizations", org_id, "environments"]))
            .bearer_auth(token);
        let envs: EnvironmentsResponse = self.send_json("list environments", request).await?;
        Ok(envs.data)
    }

    async fn list_applications(
        &self,
        token: &str,
        org_id: &str,
        env_id: &str,
    ) -> Result<Vec<ApplicationRecord>> {
        let request = self
            .http
            .get(self.endpoint(&["cloudhub", "api", "v2", "applications"]))
            .bearer_auth(token)
            .header(ORG_HEADER, org_id)
            .header(ENV_HEADER, env_id);
        let apps: Vec<RawApplication> = self.send_json("list applications", request).await?;
        Ok(apps.into_iter().map(ApplicationRecord::from).collect())
    }

    async fn set_application_status(
        &self,
        token: &str,
        org_id: &str,
        env_id: &str,
        app_name: &str,
        action: StatusAction,
    ) -> Result<()> {
        info!("Requesting {} for application {}", action, app_name);
        let request = self
            .http
            .post(self.endpoint(&["cloudhub", "api", "applications", app_name, "status"]))
            .bearer_auth(token)
            .header(ORG_HEADER, org_id)
            .header(ENV_HEADER, env_id)
            .json(&json!({ "status": action.as_str() }));
        self.send_empty("change application status", request).await
    }

    async fn list_assets(&self, token: &str, org_id: &str) -> Result<Vec<AssetRecord>> {
        let request = self
            .http
            .get(self.endpoint(&["exchange", "api", "v1", "assets"]))
            .bearer_auth(token)
            .query(&[("organizationId", org_id)]);
        self.send_json("list assets", request).await
    }

    async fn fetch_asset_metadata(
        &self,
        token: &str,
        org_id: &str,
        asset_name: &str,
    ) -> Result<AssetRecord> {
        let request = self
            .http
            .get(self.endpoint(&["exchange", "api", "v1", "assets", org_id, asset_name]))
            .bearer_auth(token);
        self.send_json("asset metadata", request).await
    }

    async fn download_asset_file(
        &self,
        file: &AssetFile,
        asset_name: &str,
        dir: &Path,
    ) -> Result<PathBuf> {
        safe_file_component(asset_name, "asset name")?;
        safe_file_component(&file.packaging, "asset packaging")?;

        let response = self.http.get(&file.external_link).send().await?;
        let mut response = checked("download asset", response).await?;

        let path = dir.join(format!("{}.{}", asset_name, file.packaging));
        let mut out = tokio::fs::File::create(&path).await?;

        let written: Result<u64> = async {
            let mut total = 0u64;
            while let Some(chunk) = response.chunk().await? {
                out.write_all(&chunk).await?;
                total += chunk.len() as u64;
            }
            out.flush().await?;
            Ok(total)
        }
        .await;
        drop(out);

        match written {
            Ok(bytes) => {
                info!("Downloaded {} ({} bytes)", path.display(), bytes);
                Ok(path)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    warn!("Could not remove partial download {}: {}", path.display(), remove_err);
                }
                Err(e)
            }
        }
    }
}
