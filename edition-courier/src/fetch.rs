#![doc = "Kiosk integration: bridges the SourceFetcher trait to the authenticated subscription site."]
//
//! # Kiosk Client (CLI <-> Core)
//!
//! This module wires the [`SourceFetcher`] contract to the real kiosk
//! backend over HTTP. The stored auth cookie authenticates every request;
//! the client itself never refreshes it (the cookie command does).
//!
//! ## Client Usage
//! - Construct [`KioskClient`] from the kiosk config section plus the cookie
//!   out of the app-config snapshot.
//! - Status mapping is uniform: 401/403 become authentication errors (fatal
//!   for the run), 5xx and transport faults become transient errors
//!   (retried at the call site), anything else unexpected fails discovery.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, error, info};

use edition_courier_core::contract::{RemoteEdition, RemotePublication, SourceFetcher};
use edition_courier_core::error::{CourierError, Result};

pub struct KioskClient {
    http: reqwest::Client,
    base_url: String,
    cookie: String,
}

/// Wire shape of one subscription in the kiosk listing.
#[derive(Debug, Deserialize)]
struct SubscriptionDto {
    id: String,
    title: String,
    kind: String,
    window_start: Option<NaiveDate>,
    window_end: Option<NaiveDate>,
    #[serde(default)]
    large_file: bool,
}

#[derive(Debug, Deserialize)]
struct EditionDto {
    date: NaiveDate,
    #[serde(default)]
    title: Option<String>,
    download_url: String,
}

impl KioskClient {
    pub fn new(base_url: &str, cookie: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                CourierError::Configuration(format!("failed to construct kiosk http client: {e}"))
            })?;
        info!(base_url, timeout_seconds = timeout.as_secs(), "Initialized kiosk client");
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie: cookie.to_string(),
        })
    }

    fn transport_error(&self, what: &str, e: reqwest::Error) -> CourierError {
        error!(error = %e, what, "kiosk transport failure");
        CourierError::Transient(format!("{what}: {e}"))
    }

    fn status_error(&self, what: &str, status: StatusCode) -> CourierError {
        error!(%status, what, "kiosk returned an error status");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CourierError::Authentication(
                format!("{what}: kiosk rejected the auth cookie ({status})"),
            ),
            s if s.is_server_error() => {
                CourierError::Transient(format!("{what}: upstream {status}"))
            }
            _ => CourierError::Discovery(format!("{what}: unexpected status {status}")),
        }
    }

    fn dto_to_remote(dto: SubscriptionDto) -> RemotePublication {
        RemotePublication {
            id: dto.id,
            title: dto.title,
            kind: dto.kind,
            window_start: dto.window_start,
            window_end: dto.window_end,
            large_file: dto.large_file,
        }
    }
}

#[async_trait]
impl SourceFetcher for KioskClient {
    async fn list_publications(&self) -> Result<Vec<RemotePublication>> {
        let url = format!("{}/api/subscriptions", self.base_url);
        info!(url = %url, "Fetching subscription listing");
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::COOKIE, &self.cookie)
            .send()
            .await
            .map_err(|e| self.transport_error("subscription listing", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error("subscription listing", status));
        }
        let listing: Vec<SubscriptionDto> = response
            .json()
            .await
            .map_err(|e| CourierError::Discovery(format!("invalid listing payload: {e}")))?;
        info!(count = listing.len(), "Fetched subscription listing");
        Ok(listing.into_iter().map(Self::dto_to_remote).collect())
    }

    async fn current_edition(&self, publication_id: &str) -> Result<Option<RemoteEdition>> {
        let url = format!(
            "{}/api/subscriptions/{}/current-edition",
            self.base_url, publication_id
        );
        debug!(url = %url, publication_id, "Fetching current edition");
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::COOKIE, &self.cookie)
            .send()
            .await
            .map_err(|e| self.transport_error("current edition", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(publication_id, "No edition on offer");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(self.status_error("current edition", status));
        }
        let dto: EditionDto = response
            .json()
            .await
            .map_err(|e| CourierError::Transient(format!("invalid edition payload: {e}")))?;
        Ok(Some(RemoteEdition {
            publication_id: publication_id.to_string(),
            title: dto.title.unwrap_or_else(|| publication_id.to_string()),
            date: dto.date,
            download_url: dto.download_url,
        }))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        info!(url = %url, "Downloading edition bytes");
        let response = self
            .http
            .get(url)
            .header(reqwest::header::COOKIE, &self.cookie)
            .send()
            .await
            .map_err(|e| self.transport_error("edition download", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error("edition download", status));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error("edition download body", e))?;
        info!(size = bytes.len(), "Edition download complete");
        Ok(bytes.to_vec())
    }
}
