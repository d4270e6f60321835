//! Deduplication ledger.
//!
//! Thin operations over the store's processed-editions collection. The key
//! is the concurrency boundary for the whole system: overlapping runs race
//! on the atomic insert, and the loser treats the duplicate as benign.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::info;

use crate::error::Result;
use crate::model::ProcessedEditionRecord;
use crate::store::Store;

/// Deterministic idempotency key for one edition: normalized ISO date plus
/// the publication identifier, unique across publications sharing a date.
pub fn edition_key(publication_id: &str, date: NaiveDate) -> String {
    format!("{}_{}", date.format("%Y-%m-%d"), publication_id)
}

/// Whether an edition was already handled. Safe to call repeatedly.
pub async fn is_processed<S: Store + ?Sized>(store: &S, edition_key: &str) -> Result<bool> {
    Ok(store.get_processed(edition_key).await?.is_some())
}

/// Record an edition as handled. A [`crate::error::CourierError::DuplicateKey`]
/// from the store means another run already committed; callers treat it as a
/// benign race, not a fault.
pub async fn mark_processed<S: Store + ?Sized>(
    store: &S,
    record: ProcessedEditionRecord,
) -> Result<()> {
    store.insert_processed(record).await
}

/// Drop ledger records older than the retention window, returning the count
/// removed. Only the dedup witness goes away; re-processing after a purge is
/// an accepted, bounded risk. The age gate keeps the sweep safe to run
/// concurrently with fresh inserts.
pub async fn purge_expired<S: Store + ?Sized>(
    store: &S,
    retention_days: i64,
    now: DateTime<Utc>,
) -> Result<usize> {
    let cutoff = now - Duration::days(retention_days);
    let removed = store.delete_processed_before(cutoff).await?;
    if removed > 0 {
        info!(removed, retention_days, "purged expired ledger records");
    }
    Ok(removed)
}
