//! Archive cache client.
//!
//! Upload policy over the [`RemoteStore`] collaborator: small payloads take
//! the single-request path, large ones go through a resumable session with
//! fixed-size chunks, a bounded per-chunk timeout and a small retry budget.
//! The thresholds are data ([`ArchivePolicy`]), not control flow, so the
//! client stays substitutable and tests can shrink them.

use std::time::Duration;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::contract::{RemoteEntry, RemoteStore};
use crate::error::{CourierError, Result};
use crate::preference::DeliveryDecision;

const MIB: usize = 1024 * 1024;

/// Tunables of the upload contract.
#[derive(Debug, Clone)]
pub struct ArchivePolicy {
    /// Payloads strictly under this size use the single-request path.
    pub simple_upload_limit: usize,
    /// Fixed chunk size for resumable sessions.
    pub chunk_size: usize,
    /// Per-chunk timeout; an elapsed timeout counts as a transient failure.
    pub chunk_timeout: Duration,
    /// Attempts per chunk before the whole archive attempt is failed.
    pub chunk_attempts: u32,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            simple_upload_limit: 4 * MIB,
            chunk_size: 10 * MIB,
            chunk_timeout: Duration::from_secs(120),
            chunk_attempts: 3,
        }
    }
}

/// Outcome of one successful archival.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveResult {
    pub path: String,
    pub bytes: u64,
    pub content_hash: String,
    pub chunked: bool,
}

pub struct ArchiveClient<'a, R: RemoteStore + ?Sized> {
    remote: &'a R,
    policy: ArchivePolicy,
}

impl<'a, R: RemoteStore + ?Sized> ArchiveClient<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        Self {
            remote,
            policy: ArchivePolicy::default(),
        }
    }

    pub fn with_policy(remote: &'a R, policy: ArchivePolicy) -> Self {
        Self { remote, policy }
    }

    /// Whether an object already exists at `path`.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        self.remote.exists(path).await
    }

    /// Upload `bytes` to `path`, choosing the simple or chunked path by
    /// size. Failures surface as delivery-channel errors so the caller can
    /// degrade instead of aborting the publication.
    pub async fn archive(&self, bytes: &[u8], path: &str) -> Result<ArchiveResult> {
        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            format!("{:x}", hasher.finalize())
        };

        let chunked = bytes.len() >= self.policy.simple_upload_limit;
        if chunked {
            self.archive_chunked(bytes, path).await?;
        } else {
            debug!(path, size = bytes.len(), "uploading via single-request path");
            self.remote
                .simple_upload(path, bytes)
                .await
                .map_err(|e| CourierError::delivery("archive", e))?;
        }

        info!(path, size = bytes.len(), chunked, "archived edition copy");
        Ok(ArchiveResult {
            path: path.to_string(),
            bytes: bytes.len() as u64,
            content_hash,
            chunked,
        })
    }

    async fn archive_chunked(&self, bytes: &[u8], path: &str) -> Result<()> {
        let session = self
            .remote
            .create_upload_session(path)
            .await
            .map_err(|e| CourierError::delivery("archive", e))?;
        let total = bytes.len() as u64;

        for (index, chunk) in bytes.chunks(self.policy.chunk_size).enumerate() {
            let offset = (index * self.policy.chunk_size) as u64;
            let mut attempt = 0;
            loop {
                attempt += 1;
                let upload = self.remote.upload_chunk(&session, offset, total, chunk);
                let outcome = match tokio::time::timeout(self.policy.chunk_timeout, upload).await {
                    Ok(result) => result,
                    Err(_) => Err(CourierError::Transient(format!(
                        "chunk at offset {offset} timed out after {:?}",
                        self.policy.chunk_timeout
                    ))),
                };
                match outcome {
                    Ok(()) => break,
                    Err(CourierError::Transient(reason)) if attempt < self.policy.chunk_attempts => {
                        warn!(path, offset, attempt, reason = %reason, "chunk upload failed, retrying");
                    }
                    Err(e) => {
                        return Err(CourierError::delivery(
                            "archive",
                            format!("chunk at offset {offset} failed after {attempt} attempts: {e}"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// List what is archived for one publication, optionally narrowed to a
    /// year folder.
    pub async fn list_archived(
        &self,
        publication_id: &str,
        year: Option<i32>,
    ) -> Result<Vec<RemoteEntry>> {
        let path = match year {
            Some(year) => format!("{publication_id}/{year}"),
            None => publication_id.to_string(),
        };
        self.remote.list_folder(&path).await
    }
}

/// Remote path for one archived edition under a resolved decision:
/// `folder/<year>/<file>` when the decision organises by period, else
/// `folder/<file>`.
pub fn archive_path(decision: &DeliveryDecision, date: NaiveDate, file_name: &str) -> String {
    use chrono::Datelike;
    if decision.organize_by_period {
        format!("{}/{}/{}", decision.archive_folder, date.year(), file_name)
    } else {
        format!("{}/{}", decision.archive_folder, file_name)
    }
}
