//! # contract: collaborator interfaces for the courier pipeline
//!
//! This module defines the trait seams towards every external collaborator
//! the pipeline talks to: the authenticated kiosk fetcher, the mail-transport
//! sender and the large-object remote store. The concrete network clients
//! live in the CLI crate; the core only ever sees these traits.
//!
//! ## Interface & Extensibility
//! - Implement [`SourceFetcher`] for a new kiosk/content backend.
//! - Implement [`MailSender`] for a new mail transport.
//! - Implement [`RemoteStore`] for a new archive backend; the chunked upload
//!   policy on top of it lives in [`crate::archive`] and stays unchanged.
//! - All methods are async and return [`crate::error::CourierError`], so the
//!   orchestrator can classify faults without downcasting.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; mocks are exported behind the
//!   `test-export-mocks` feature so integration tests can script
//!   deterministic collaborator behavior.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::Result;

/// One subscription as currently visible on the source site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePublication {
    pub id: String,
    pub title: String,
    pub kind: String,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    /// Set when the site flags the publication as too large for mail
    /// delivery; reconciliation then enables the archive channel by default.
    pub large_file: bool,
}

/// One dated issue offered for download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEdition {
    pub publication_id: String,
    pub title: String,
    pub date: NaiveDate,
    pub download_url: String,
}

/// Authenticated access to the source site: subscription listing for
/// discovery, current-edition lookup per publication, and raw edition bytes.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch the already-parsed list of subscriptions visible on the site.
    async fn list_publications(&self) -> Result<Vec<RemotePublication>>;

    /// Fetch the edition currently offered for one publication.
    /// `None` when the site offers nothing for it right now.
    async fn current_edition(&self, publication_id: &str) -> Result<Option<RemoteEdition>>;

    /// Download the raw bytes of an edition.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// One outbound message to a single recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<MailAttachment>,
}

/// Mail transport. Success or failure is reported per recipient.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: OutboundMail) -> Result<()>;
}

/// An open resumable upload, as handed out by the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSession {
    pub upload_url: String,
}

/// One entry in a remote folder listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
}

/// Raw operations of the large-object store. Implementors handle transport
/// and authentication; the size threshold, chunking and retry policy live in
/// [`crate::archive::ArchiveClient`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether an object already exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Single-request upload for small payloads.
    async fn simple_upload(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Open a resumable upload session for a large payload.
    async fn create_upload_session(&self, path: &str) -> Result<UploadSession>;

    /// Upload one chunk of `total` bytes starting at `offset`.
    async fn upload_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        total: u64,
        bytes: &[u8],
    ) -> Result<()>;

    /// List the entries directly under a remote folder.
    async fn list_folder(&self, path: &str) -> Result<Vec<RemoteEntry>>;
}
