//! Cloud drive integration: implements the raw [`RemoteStore`] operations
//! against the drive's HTTP API. The size threshold, chunking and retry
//! policy live in the core archive client; this module only speaks the wire
//! protocol (single-request upload, upload sessions with Content-Range
//! chunks, folder listings).

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, error, info};

use edition_courier_core::contract::{RemoteEntry, RemoteStore, UploadSession};
use edition_courier_core::error::{CourierError, Result};

use crate::load_config::DriveSection;

pub struct DriveClient {
    http: reqwest::Client,
    base_url: String,
    root: Option<String>,
    token: String,
}

#[derive(Debug, Deserialize)]
struct UploadSessionDto {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct DriveEntryDto {
    name: String,
    path: String,
    #[serde(default)]
    size: u64,
}

impl DriveClient {
    /// Construct from the drive config section; the API token comes from
    /// the environment variable the section names.
    pub fn from_config(section: &DriveSection) -> Result<Self> {
        let token = std::env::var(&section.token_env).map_err(|_| {
            CourierError::Configuration(format!(
                "drive token missing: set {}",
                section.token_env
            ))
        })?;
        info!(base_url = %section.base_url, root = ?section.root, "Initialized drive client");
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: section.base_url.trim_end_matches('/').to_string(),
            root: section.root.clone(),
            token,
        })
    }

    /// Remote paths from the core are relative; the configured root folder
    /// is prefixed here so the whole archive lives under one subtree.
    fn full_path(&self, path: &str) -> String {
        match &self.root {
            Some(root) => format!("{root}/{path}"),
            None => path.to_string(),
        }
    }

    fn transport_error(&self, what: &str, e: reqwest::Error) -> CourierError {
        error!(error = %e, what, "drive transport failure");
        CourierError::Transient(format!("{what}: {e}"))
    }

    fn status_error(&self, what: &str, status: StatusCode) -> CourierError {
        error!(%status, what, "drive returned an error status");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                CourierError::Authentication(format!("{what}: drive rejected the token ({status})"))
            }
            s if s.is_server_error() => {
                CourierError::Transient(format!("{what}: upstream {status}"))
            }
            _ => CourierError::delivery("archive", format!("{what}: unexpected status {status}")),
        }
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn exists(&self, path: &str) -> Result<bool> {
        let url = format!("{}/items", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("path", self.full_path(path))])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.transport_error("existence check", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            status => Err(self.status_error("existence check", status)),
        }
    }

    async fn simple_upload(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let url = format!("{}/content", self.base_url);
        debug!(path, size = bytes.len(), "Single-request upload");
        let response = self
            .http
            .put(&url)
            .query(&[("path", self.full_path(path))])
            .bearer_auth(&self.token)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| self.transport_error("simple upload", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error("simple upload", status));
        }
        Ok(())
    }

    async fn create_upload_session(&self, path: &str) -> Result<UploadSession> {
        let url = format!("{}/upload-sessions", self.base_url);
        info!(path, "Opening upload session");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "path": self.full_path(path) }))
            .send()
            .await
            .map_err(|e| self.transport_error("create upload session", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error("create upload session", status));
        }
        let dto: UploadSessionDto = response
            .json()
            .await
            .map_err(|e| CourierError::Transient(format!("invalid session payload: {e}")))?;
        Ok(UploadSession {
            upload_url: dto.upload_url,
        })
    }

    async fn upload_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        total: u64,
        bytes: &[u8],
    ) -> Result<()> {
        let end = offset + bytes.len() as u64 - 1;
        debug!(offset, end, total, "Uploading chunk");
        let response = self
            .http
            .put(&session.upload_url)
            .header(
                reqwest::header::CONTENT_RANGE,
                format!("bytes {offset}-{end}/{total}"),
            )
            .bearer_auth(&self.token)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| self.transport_error("chunk upload", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error("chunk upload", status));
        }
        Ok(())
    }

    async fn list_folder(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let url = format!("{}/children", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("path", self.full_path(path))])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.transport_error("folder listing", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(self.status_error("folder listing", status));
        }
        let entries: Vec<DriveEntryDto> = response
            .json()
            .await
            .map_err(|e| CourierError::Transient(format!("invalid listing payload: {e}")))?;
        Ok(entries
            .into_iter()
            .map(|dto| RemoteEntry {
                name: dto.name,
                path: dto.path,
                size: dto.size,
            })
            .collect())
    }
}
