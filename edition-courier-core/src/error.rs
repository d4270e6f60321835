//! Error taxonomy for the courier pipeline.
//!
//! Every fallible operation in the core returns [`CourierError`], so the
//! orchestrator can decide per class what survives a run: authentication and
//! configuration faults abort the whole run, a duplicate ledger key is a
//! benign race, a delivery channel fault degrades one publication without
//! aborting the batch.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// Expired or invalid credential. Fatal for the run, never retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network timeout or upstream 5xx. Retried with bounded attempts at the
    /// call site, not at the orchestrator level.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// Missing or invalid required setting. Fatal at startup, before any
    /// state mutation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Second insert of the same edition key: another run already committed.
    #[error("edition already recorded under key {0}")]
    DuplicateKey(String),

    /// A specific recipient send or archive upload failed. Recorded, does
    /// not abort the publication or the batch.
    #[error("delivery channel {channel} failed: {reason}")]
    DeliveryChannel { channel: String, reason: String },

    /// Remote listing fetch failed. Aborts discovery only; known
    /// publications still process.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// Persistence fault in the store adapter.
    #[error("store failure: {0}")]
    Store(String),
}

impl CourierError {
    /// Errors that must terminate the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CourierError::Authentication(_) | CourierError::Configuration(_)
        )
    }

    pub fn delivery(channel: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        CourierError::DeliveryChannel {
            channel: channel.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for CourierError {
    fn from(e: std::io::Error) -> Self {
        CourierError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(e: serde_json::Error) -> Self {
        CourierError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CourierError>;

/// Delay between retry attempts. Kept short and flat: upstream failures that
/// survive a few spaced attempts are reported, not hammered.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Run `op` up to `attempts` times, retrying only [`CourierError::Transient`]
/// failures. Any other error class returns immediately.
pub async fn with_retries<T, F, Fut>(attempts: u32, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(CourierError::Transient(reason)) if attempt < attempts => {
                warn!(
                    what,
                    attempt,
                    attempts,
                    reason = %reason,
                    "transient failure, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}
