//! Discovery reconciliation.
//!
//! Diffs the remote-observed subscription set against the stored publication
//! set and applies create/update/deactivate transitions. Nothing here is
//! destructive: a publication that vanished from the site is deactivated,
//! never deleted, so its history stays available for reporting.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::contract::RemotePublication;
use crate::error::Result;
use crate::model::Publication;
use crate::store::Store;

/// Counts of the transitions applied by one reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub deactivated: usize,
    pub unchanged: usize,
}

/// Sync the remote listing into the store.
///
/// Runs once per orchestrator invocation, before the per-publication loop.
/// The listing is taken as-is; callers decide what a fetch failure means
/// (discovery aborts, known publications still process).
pub async fn reconcile<S: Store + ?Sized>(
    store: &S,
    remote: &[RemotePublication],
    now: DateTime<Utc>,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for entry in remote {
        match store.get_publication(&entry.id).await? {
            None => {
                // First sighting: email on by default, archive only when the
                // site flags the publication as too large for mail.
                let publication = Publication {
                    id: entry.id.clone(),
                    title: entry.title.clone(),
                    kind: entry.kind.clone(),
                    window_start: entry.window_start,
                    window_end: entry.window_end,
                    email_enabled: !entry.large_file,
                    archive_enabled: entry.large_file,
                    archive_folder: None,
                    active: true,
                    created_at: now,
                    updated_at: now,
                };
                info!(publication_id = %entry.id, title = %entry.title, "discovered new publication");
                store.insert_publication(publication).await?;
                report.created += 1;
            }
            Some(mut existing) => {
                if metadata_differs(&existing, entry) {
                    debug!(publication_id = %entry.id, "publication metadata drifted, updating");
                    existing.title = entry.title.clone();
                    existing.kind = entry.kind.clone();
                    existing.window_start = entry.window_start;
                    existing.window_end = entry.window_end;
                    existing.updated_at = now;
                    // `active` is deliberately untouched here.
                    store.update_publication(existing).await?;
                    report.updated += 1;
                } else {
                    report.unchanged += 1;
                }
            }
        }
    }

    let remote_ids: HashSet<&str> = remote.iter().map(|entry| entry.id.as_str()).collect();
    for mut publication in store.list_publications().await? {
        if publication.active && !remote_ids.contains(publication.id.as_str()) {
            info!(publication_id = %publication.id, "publication gone from listing, deactivating");
            publication.active = false;
            publication.updated_at = now;
            store.update_publication(publication).await?;
            report.deactivated += 1;
        }
    }

    info!(
        created = report.created,
        updated = report.updated,
        deactivated = report.deactivated,
        unchanged = report.unchanged,
        "reconciliation complete"
    );
    Ok(report)
}

fn metadata_differs(stored: &Publication, remote: &RemotePublication) -> bool {
    stored.title != remote.title
        || stored.kind != remote.kind
        || stored.window_start != remote.window_start
        || stored.window_end != remote.window_end
}
