//! Anypoint Platform access
//!
//! [`PlatformApi`] is the seam the handlers talk to. [`AnypointClient`] is the
//! HTTP implementation; tests point it at a mock server.

pub mod anypoint;

pub use anypoint::AnypointClient;

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{BotError, Result};
use crate::types::{BusinessGroup, Credentials};

/// Lifecycle action accepted by the application status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Start,
    Stop,
    Restart,
}

impl StatusAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusAction::Start => "start",
            StatusAction::Stop => "stop",
            StatusAction::Restart => "restart",
        }
    }
}

impl fmt::Display for StatusAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusAction {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(StatusAction::Start),
            "stop" => Ok(StatusAction::Stop),
            "restart" => Ok(StatusAction::Restart),
            other => Err(BotError::Validation(format!(
                "Unknown status '{}'. Acceptable Status are Start, Stop, Restart",
                other
            ))),
        }
    }
}

/// Organizations visible to the logged-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub organizations: Vec<BusinessGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub is_production: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRecord {
    pub domain: String,
    pub status: String,
    pub worker_cpu: String,
    pub worker_memory: String,
}

/// Downloadable file attached to an exchange asset
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFile {
    pub packaging: String,
    pub external_link: String,
    #[serde(default)]
    pub classifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    #[serde(default)]
    pub name: String,
    pub group_id: String,
    pub asset_id: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Exchange page for the asset, present in listings
    #[serde(default)]
    pub asset_link: Option<String>,
    #[serde(default)]
    pub files: Vec<AssetFile>,
}

impl AssetRecord {
    /// The file that `/download-asset` fetches: the first one listed
    pub fn primary_file(&self) -> Option<&AssetFile> {
        self.files.first()
    }
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Exchange credentials for a bearer token
    async fn authenticate(&self, credentials: &Credentials) -> Result<String>;

    async fn fetch_account_info(&self, token: &str) -> Result<AccountInfo>;

    async fn list_environments(&self, token: &str, org_id: &str) -> Result<Vec<EnvironmentRecord>>;

    async fn list_applications(
        &self,
        token: &str,
        org_id: &str,
        env_id: &str,
    ) -> Result<Vec<ApplicationRecord>>;

    async fn set_application_status(
        &self,
        token: &str,
        org_id: &str,
        env_id: &str,
        app_name: &str,
        action: StatusAction,
    ) -> Result<()>;

    async fn list_assets(&self, token: &str, org_id: &str) -> Result<Vec<AssetRecord>>;

    async fn fetch_asset_metadata(
        &self,
        token: &str,
        org_id: &str,
        asset_name: &str,
    ) -> Result<AssetRecord>;

    /// Download `file` into `dir` as `<asset_name>.<packaging>`, returning the path
    async fn download_asset_file(
        &self,
        file: &AssetFile,
        asset_name: &str,
        dir: &Path,
    ) -> Result<PathBuf>;
}
