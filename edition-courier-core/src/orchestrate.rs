//! High-level pipeline: one courier run from discovery to cleanup.
//!
//! This module provides the top-level orchestration logic for a scheduled
//! run. It implements a coordinated pipeline that:
//!   - Loads the app-config snapshot and checks credential freshness
//!   - Reconciles the remote subscription listing into the store
//!   - Walks every active publication strictly sequentially, and per unsent
//!     edition: dedup gate, download, recipient fan-out, archive, commit
//!   - Purges expired ledger records once at the end
//!   - Aggregates and returns a [`RunSummary`] of what succeeded and failed.
//!
//! # Responsibilities
//! - Fault isolation per publication: a failure inside one publication's
//!   pipeline is converted to a summary entry and the loop proceeds
//! - Invokes logging throughout for traceability (see tracing events)
//! - Holds no state across runs: every run re-fetches from the store
//!
//! # Error Handling
//! Authentication and configuration faults abort the run after an
//! administrator notification attempt; everything else degrades. The run
//! summary is always produced on a completed loop, even a partially failed
//! one.
//!
//! # Navigation
//! - Main entrypoints: [`Orchestrator::run`], [`Orchestrator::check`]
//! - Supporting types: [`RunOptions`], [`RunSummary`].

use std::collections::BTreeSet;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::archive::{archive_path, ArchiveClient, ArchivePolicy};
use crate::contract::{MailAttachment, MailSender, OutboundMail, RemoteStore, SourceFetcher};
use crate::error::{with_retries, CourierError, Result};
use crate::ledger;
use crate::model::{AppConfig, ProcessedEditionRecord, Publication, Recipient};
use crate::preference::{resolve, DeliveryDecision};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::store::Store;

/// Bounded attempts for the edition byte download.
const DOWNLOAD_ATTEMPTS: u32 = 3;

/// Per-run knobs set by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Bypass the dedup gate for this edition key; the ledger record is
    /// still written afterwards so normal dedup behavior resumes.
    pub force_edition: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PublicationFailure {
    pub publication_id: String,
    pub reason: String,
}

/// What one run did. Always produced on a completed loop, so no run is
/// silently incomplete.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<PublicationFailure>,
    /// `None` when the discovery fetch failed and the run fell back to the
    /// previously known publications.
    pub reconcile: Option<ReconcileReport>,
    pub purged: usize,
}

enum Outcome {
    Processed { degraded: usize },
    Skipped { reason: &'static str },
}

pub struct Orchestrator<'a, S, F, M, R>
where
    S: Store + ?Sized,
    F: SourceFetcher + ?Sized,
    M: MailSender + ?Sized,
    R: RemoteStore + ?Sized,
{
    store: &'a S,
    fetcher: &'a F,
    mailer: &'a M,
    remote: &'a R,
    options: RunOptions,
    archive_policy: ArchivePolicy,
}

impl<'a, S, F, M, R> Orchestrator<'a, S, F, M, R>
where
    S: Store + ?Sized,
    F: SourceFetcher + ?Sized,
    M: MailSender + ?Sized,
    R: RemoteStore + ?Sized,
{
    pub fn new(
        store: &'a S,
        fetcher: &'a F,
        mailer: &'a M,
        remote: &'a R,
        options: RunOptions,
    ) -> Self {
        Self {
            store,
            fetcher,
            mailer,
            remote,
            options,
            archive_policy: ArchivePolicy::default(),
        }
    }

    /// Override the archive upload policy (tests shrink the thresholds).
    pub fn archive_policy(mut self, policy: ArchivePolicy) -> Self {
        self.archive_policy = policy;
        self
    }

    /// Full pipeline: discover, process every active publication, clean up.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "[RUN] starting courier run");

        let config = self.store.load_app_config().await?;
        debug!(log_level = %config.log_level, retention_days = config.retention_days, "[RUN] loaded config snapshot");

        if config.auth_cookie.value.is_empty() {
            let err = CourierError::Authentication("stored auth cookie is empty".to_string());
            error!(error = %err, "[RUN] cannot authenticate against the kiosk");
            self.notify_admins(
                &config,
                "courier run aborted: missing auth cookie",
                "The courier could not start: no auth cookie is stored. Refresh it with the cookie command.",
            )
            .await;
            return Err(err);
        }
        let cookie_age = config.cookie_age_days(Utc::now());
        if config.cookie_is_stale(Utc::now()) {
            warn!(
                cookie_age_days = cookie_age,
                threshold_days = config.cookie_warning_days,
                "[RUN] auth cookie is aging, expect upstream logins to start failing"
            );
            self.notify_admins(
                &config,
                "courier warning: auth cookie is aging",
                &format!(
                    "The stored auth cookie is {cookie_age} days old (warning threshold {} days). Refresh it soon.",
                    config.cookie_warning_days
                ),
            )
            .await;
        }

        // Discovery is isolated: a listing failure must not prevent
        // processing of already known, active publications.
        let reconcile_report = match self.fetcher.list_publications().await {
            Ok(listing) => {
                info!(remote_count = listing.len(), "[DISCOVER] fetched subscription listing");
                Some(reconcile(self.store, &listing, Utc::now()).await?)
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "[DISCOVER] fatal failure fetching listing");
                self.notify_admins(&config, "courier run aborted", &e.to_string())
                    .await;
                return Err(e);
            }
            Err(e) => {
                error!(error = %e, "[DISCOVER] listing fetch failed, continuing with known publications");
                None
            }
        };

        let publications: Vec<Publication> = self
            .store
            .list_publications()
            .await?
            .into_iter()
            .filter(|p| p.active)
            .collect();
        let recipients: Vec<Recipient> = self
            .store
            .list_recipients()
            .await?
            .into_iter()
            .filter(|r| r.active)
            .collect();
        info!(
            publications = publications.len(),
            recipients = recipients.len(),
            "[RUN] starting publication loop"
        );

        let mut summary = RunSummary {
            run_id,
            processed: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
            reconcile: reconcile_report,
            purged: 0,
        };

        for publication in &publications {
            match self.process_publication(publication, &recipients).await {
                Ok(Outcome::Processed { degraded }) => {
                    if degraded > 0 {
                        warn!(
                            publication_id = %publication.id,
                            degraded,
                            "[RUN] publication processed with degraded channels"
                        );
                    }
                    summary.processed += 1;
                }
                Ok(Outcome::Skipped { reason }) => {
                    debug!(publication_id = %publication.id, reason, "[RUN] publication skipped");
                    summary.skipped += 1;
                }
                Err(e) if e.is_fatal() => {
                    error!(publication_id = %publication.id, error = %e, "[RUN] fatal failure, aborting run");
                    self.notify_admins(&config, "courier run aborted", &e.to_string())
                        .await;
                    return Err(e);
                }
                Err(e) => {
                    // Fault isolation: one bad edition never aborts the batch.
                    error!(publication_id = %publication.id, error = %e, "[RUN] publication failed, continuing");
                    summary.failed += 1;
                    summary.failures.push(PublicationFailure {
                        publication_id: publication.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        summary.purged =
            ledger::purge_expired(self.store, config.retention_days, Utc::now()).await?;

        info!(
            %run_id,
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            purged = summary.purged,
            "[RUN] run complete"
        );
        Ok(summary)
    }

    /// Discovery without delivery: fetch the listing and reconcile it.
    pub async fn check(&self) -> Result<ReconcileReport> {
        let _config = self.store.load_app_config().await?;
        let listing = self.fetcher.list_publications().await.map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                CourierError::Discovery(e.to_string())
            }
        })?;
        info!(remote_count = listing.len(), "[DISCOVER] fetched subscription listing");
        reconcile(self.store, &listing, Utc::now()).await
    }

    async fn process_publication(
        &self,
        publication: &Publication,
        recipients: &[Recipient],
    ) -> Result<Outcome> {
        let edition = match self.fetcher.current_edition(&publication.id).await? {
            Some(edition) => edition,
            None => return Ok(Outcome::Skipped { reason: "no edition on offer" }),
        };
        let edition_key = ledger::edition_key(&publication.id, edition.date);

        let forced = self.options.force_edition.as_deref() == Some(edition_key.as_str());
        if forced {
            info!(edition_key = %edition_key, "[DEDUP] force flag set, bypassing gate");
        } else if ledger::is_processed(self.store, &edition_key).await? {
            return Ok(Outcome::Skipped { reason: "already processed" });
        }

        info!(
            publication_id = %publication.id,
            edition_key = %edition_key,
            url = %edition.download_url,
            "[FETCH] downloading edition"
        );
        let bytes = with_retries(DOWNLOAD_ATTEMPTS, "edition download", || {
            self.fetcher.download(&edition.download_url)
        })
        .await?;
        debug!(edition_key = %edition_key, size = bytes.len(), "[FETCH] download complete");

        let decisions: Vec<(&Recipient, DeliveryDecision)> = recipients
            .iter()
            .map(|recipient| (recipient, resolve(recipient, publication)))
            .collect();
        let file_name = edition_file_name(&edition_key, &edition.download_url);

        let mut degraded = 0;

        // Recipient fan-out: sends run concurrently, recipients share no
        // state; the statistics bump afterwards goes through the store's
        // conditional update one row at a time.
        let email_targets: Vec<&(&Recipient, DeliveryDecision)> = decisions
            .iter()
            .filter(|(_, decision)| decision.send_email)
            .collect();
        let sends = email_targets.iter().map(|(recipient, _)| {
            let mail = OutboundMail {
                to: recipient.email.clone(),
                subject: format!("{} {}", publication.title, edition.date),
                body: format!(
                    "Attached is the {} edition of {}.",
                    edition.date, publication.title
                ),
                attachment: Some(MailAttachment {
                    filename: file_name.clone(),
                    bytes: bytes.clone(),
                }),
            };
            async move { self.mailer.send(mail).await }
        });
        let mut emails_sent = 0;
        for ((recipient, _), result) in email_targets.iter().zip(join_all(sends).await) {
            match result {
                Ok(()) => {
                    self.store
                        .record_delivery(&recipient.email, &publication.id, Utc::now())
                        .await?;
                    emails_sent += 1;
                }
                Err(e) => {
                    warn!(
                        recipient = %recipient.email,
                        edition_key = %edition_key,
                        error = %e,
                        "[DELIVER] recipient send failed"
                    );
                    degraded += 1;
                }
            }
        }

        // Archive fan-out: one upload per distinct resolved location. The
        // existence check keeps re-runs from re-uploading identical copies.
        let archive_targets: BTreeSet<String> = decisions
            .iter()
            .filter(|(_, decision)| decision.archive_to_cloud)
            .map(|(_, decision)| archive_path(decision, edition.date, &file_name))
            .collect();
        let client = ArchiveClient::with_policy(self.remote, self.archive_policy.clone());
        let uploads = archive_targets.iter().map(|path| {
            let client = &client;
            let bytes = &bytes;
            async move {
                match client.exists(path).await {
                    Ok(true) => {
                        debug!(path = %path, "[ARCHIVE] copy already present, skipping upload");
                        Ok(path.clone())
                    }
                    _ => client.archive(bytes, path).await.map(|result| result.path),
                }
            }
        });
        let mut archived = Vec::new();
        for outcome in join_all(uploads).await {
            match outcome {
                Ok(path) => archived.push(path),
                Err(e) => {
                    warn!(edition_key = %edition_key, error = %e, "[ARCHIVE] upload failed");
                    degraded += 1;
                }
            }
        }

        // Commit only when something actually went out (or every channel was
        // skipped by preference). Total channel failure means the edition
        // was not delivered anywhere; committing would silently lose it.
        let attempted = email_targets.len() + archive_targets.len();
        let succeeded = emails_sent + archived.len();
        if attempted > 0 && succeeded == 0 {
            return Err(CourierError::delivery(
                "all",
                format!("every configured channel failed for {edition_key}"),
            ));
        }

        let record = ProcessedEditionRecord {
            edition_key: edition_key.clone(),
            publication_id: publication.id.clone(),
            title: edition.title.clone(),
            publication_date: edition.date,
            source_url: edition.download_url.clone(),
            archive_path: archived.first().cloned(),
            processed_at: Utc::now(),
        };
        match ledger::mark_processed(self.store, record).await {
            Ok(()) => {}
            Err(CourierError::DuplicateKey(key)) => {
                // Benign race: another run, or a forced re-process, already
                // committed this edition.
                debug!(edition_key = %key, "[COMMIT] ledger row already present");
            }
            Err(e) => return Err(e),
        }
        info!(
            edition_key = %edition_key,
            emails_sent,
            archived = archived.len(),
            degraded,
            "[COMMIT] edition processed"
        );
        Ok(Outcome::Processed { degraded })
    }

    /// Best effort: fatal faults and warnings go to the configured
    /// administrator addresses; a failed notification is only logged.
    async fn notify_admins(&self, config: &AppConfig, subject: &str, body: &str) {
        for admin in &config.admin_emails {
            let mail = OutboundMail {
                to: admin.clone(),
                subject: subject.to_string(),
                body: body.to_string(),
                attachment: None,
            };
            if let Err(e) = self.mailer.send(mail).await {
                warn!(admin = %admin, error = %e, "failed to notify administrator");
            }
        }
    }
}

/// File name for an archived or mailed edition: the edition key plus the
/// extension the source URL carries, defaulting to pdf.
fn edition_file_name(edition_key: &str, download_url: &str) -> String {
    let extension = download_url
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("pdf");
    format!("{edition_key}.{extension}")
}
