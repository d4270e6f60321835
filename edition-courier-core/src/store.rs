//! Persistent store adapter.
//!
//! [`Store`] is the typed seam every other component reads and writes
//! through; nothing else touches persistence. [`JsonFileStore`] is the
//! bundled implementation: one JSON document per collection under a data
//! directory, plus one file per processed edition so the filesystem's
//! create-new semantics enforce the at-most-one-record-per-key invariant.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{CourierError, Result};
use crate::model::{AppConfig, AuthCookie, ProcessedEditionRecord, Publication, Recipient};

/// Typed read/write access to the four record collections.
///
/// All other components hold transient in-memory copies for the duration of
/// one operation and re-fetch rather than cache across runs.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_publications(&self) -> Result<Vec<Publication>>;

    async fn get_publication(&self, id: &str) -> Result<Option<Publication>>;

    /// Insert a new publication. The id must not exist yet.
    async fn insert_publication(&self, publication: Publication) -> Result<()>;

    /// Replace the stored publication with the same id.
    async fn update_publication(&self, publication: Publication) -> Result<()>;

    async fn list_recipients(&self) -> Result<Vec<Recipient>>;

    /// Insert or replace a recipient keyed by email address.
    async fn upsert_recipient(&self, recipient: Recipient) -> Result<()>;

    /// Bump a recipient's send statistics after one successful delivery.
    /// A single conditional update on the addressed row, not a
    /// read-modify-write in application code.
    async fn record_delivery(
        &self,
        email: &str,
        publication_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_processed(&self, edition_key: &str) -> Result<Option<ProcessedEditionRecord>>;

    /// Insert the dedup witness. Fails with
    /// [`CourierError::DuplicateKey`] if the key is already recorded.
    async fn insert_processed(&self, record: ProcessedEditionRecord) -> Result<()>;

    /// Delete all processed-edition records older than `cutoff`, returning
    /// the number removed.
    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    async fn load_app_config(&self) -> Result<AppConfig>;

    /// The single config write path: refresh the stored auth cookie.
    async fn update_auth_cookie(
        &self,
        value: &str,
        updated_by: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// File-backed store: `publications.json`, `recipients.json`, `config.json`
/// and a `processed/` directory under one root.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the data directory layout. Idempotent.
    pub fn initialise(&self) -> Result<()> {
        fs::create_dir_all(self.processed_dir())?;
        Ok(())
    }

    fn publications_path(&self) -> PathBuf {
        self.root.join("publications.json")
    }

    fn recipients_path(&self) -> PathBuf {
        self.root.join("recipients.json")
    }

    fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    fn processed_path(&self, edition_key: &str) -> PathBuf {
        // Same sanitisation as for download directories: keys may embed
        // remote identifiers with path-hostile characters.
        let file_name = edition_key.replace('/', "_").replace(':', "_");
        self.processed_dir().join(format!("{file_name}.json"))
    }

    fn read_collection<T: DeserializeOwned>(&self, path: &Path) -> Result<BTreeMap<String, T>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_collection<T: Serialize>(
        &self,
        path: &Path,
        collection: &BTreeMap<String, T>,
    ) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string_pretty(collection)?;
        // Write-then-rename so a crash mid-write never truncates the
        // collection document.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_publications(&self) -> Result<BTreeMap<String, Publication>> {
        self.read_collection(&self.publications_path())
    }

    fn read_recipients(&self) -> Result<BTreeMap<String, Recipient>> {
        self.read_collection(&self.recipients_path())
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn list_publications(&self) -> Result<Vec<Publication>> {
        Ok(self.read_publications()?.into_values().collect())
    }

    async fn get_publication(&self, id: &str) -> Result<Option<Publication>> {
        Ok(self.read_publications()?.remove(id))
    }

    async fn insert_publication(&self, publication: Publication) -> Result<()> {
        let mut publications = self.read_publications()?;
        if publications.contains_key(&publication.id) {
            return Err(CourierError::Store(format!(
                "publication {} already exists",
                publication.id
            )));
        }
        debug!(publication_id = %publication.id, "inserting publication");
        publications.insert(publication.id.clone(), publication);
        self.write_collection(&self.publications_path(), &publications)
    }

    async fn update_publication(&self, publication: Publication) -> Result<()> {
        let mut publications = self.read_publications()?;
        if !publications.contains_key(&publication.id) {
            return Err(CourierError::Store(format!(
                "publication {} does not exist",
                publication.id
            )));
        }
        publications.insert(publication.id.clone(), publication);
        self.write_collection(&self.publications_path(), &publications)
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>> {
        Ok(self.read_recipients()?.into_values().collect())
    }

    async fn upsert_recipient(&self, recipient: Recipient) -> Result<()> {
        let mut recipients = self.read_recipients()?;
        recipients.insert(recipient.email.clone(), recipient);
        self.write_collection(&self.recipients_path(), &recipients)
    }

    async fn record_delivery(
        &self,
        email: &str,
        publication_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut recipients = self.read_recipients()?;
        let recipient = recipients.get_mut(email).ok_or_else(|| {
            CourierError::Store(format!("recipient {email} does not exist"))
        })?;
        recipient.send_count += 1;
        recipient.last_sent_at = Some(at);
        *recipient
            .sends_by_publication
            .entry(publication_id.to_string())
            .or_insert(0) += 1;
        self.write_collection(&self.recipients_path(), &recipients)
    }

    async fn get_processed(&self, edition_key: &str) -> Result<Option<ProcessedEditionRecord>> {
        let path = self.processed_path(edition_key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn insert_processed(&self, record: ProcessedEditionRecord) -> Result<()> {
        fs::create_dir_all(self.processed_dir())?;
        let path = self.processed_path(&record.edition_key);
        // create_new is the uniqueness constraint: the first writer wins,
        // every later insert of the same key observes AlreadyExists.
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(CourierError::DuplicateKey(record.edition_key));
            }
            Err(e) => return Err(e.into()),
        };
        let json = serde_json::to_string_pretty(&record)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let dir = self.processed_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let record: ProcessedEditionRecord = match fs::read_to_string(&path)
                .map_err(CourierError::from)
                .and_then(|content| serde_json::from_str(&content).map_err(CourierError::from))
            {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable ledger record");
                    continue;
                }
            };
            if record.processed_at < cutoff {
                fs::remove_file(&path)?;
                debug!(edition_key = %record.edition_key, "purged expired ledger record");
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn load_app_config(&self) -> Result<AppConfig> {
        let path = self.config_path();
        if !path.exists() {
            return Err(CourierError::Configuration(format!(
                "config document missing at {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| CourierError::Configuration(format!("invalid config document: {e}")))
    }

    async fn update_auth_cookie(
        &self,
        value: &str,
        updated_by: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let cookie = AuthCookie {
            value: value.to_string(),
            updated_at: at,
            updated_by: updated_by.to_string(),
        };
        let config = match self.load_app_config().await {
            Ok(mut config) => {
                config.auth_cookie = cookie;
                config
            }
            // First write on a fresh store seeds the document with defaults.
            Err(CourierError::Configuration(_)) => AppConfig {
                log_level: "info".to_string(),
                cookie_warning_days: 14,
                admin_emails: Vec::new(),
                auth_cookie: cookie,
                retention_days: 90,
            },
            Err(e) => return Err(e),
        };
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string_pretty(&config)?;
        let tmp = self.config_path().with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.config_path())?;
        Ok(())
    }
}
