use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A trackable subscription source on the kiosk site.
///
/// The `id` is the remote identifier and is immutable once a record exists.
/// Records are never hard-deleted: `active = false` is the only removal
/// mechanism, so the history of a subscription stays queryable after it
/// disappears from the site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub id: String,
    pub title: String,
    pub kind: String,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub email_enabled: bool,
    pub archive_enabled: bool,
    pub archive_folder: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Regular,
    Admin,
}

/// Per-publication channel preference of a recipient.
///
/// Every field is optional: an absent value inherits the publication
/// default. Only the set fields override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelPreference {
    #[serde(default)]
    pub email_enabled: Option<bool>,
    #[serde(default)]
    pub archive_enabled: Option<bool>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub organize_by_period: Option<bool>,
}

/// An addressable delivery target, uniquely identified by email address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub role: Role,
    /// Keyed by publication id; absence means "inherit publication defaults".
    #[serde(default)]
    pub preferences: BTreeMap<String, ChannelPreference>,
    #[serde(default)]
    pub send_count: u64,
    #[serde(default)]
    pub last_sent_at: Option<DateTime<Utc>>,
    /// Per-publication send counters, keyed by publication id.
    #[serde(default)]
    pub sends_by_publication: BTreeMap<String, u64>,
    pub created_at: DateTime<Utc>,
}

/// The deduplication witness: one record per processed edition.
///
/// Its presence is the sole truth of "already handled", independent of which
/// delivery channels actually succeeded for that edition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEditionRecord {
    pub edition_key: String,
    pub publication_id: String,
    pub title: String,
    pub publication_date: NaiveDate,
    pub source_url: String,
    pub archive_path: Option<String>,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthCookie {
    pub value: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// Single mutable config document, read once per run as a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_cookie_warning_days")]
    pub cookie_warning_days: i64,
    #[serde(default)]
    pub admin_emails: Vec<String>,
    pub auth_cookie: AuthCookie,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cookie_warning_days() -> i64 {
    14
}

fn default_retention_days() -> i64 {
    90
}

impl AppConfig {
    /// Age of the stored auth cookie in whole days at `now`.
    pub fn cookie_age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.auth_cookie.updated_at).num_days()
    }

    /// True once the cookie is older than the configured warning threshold.
    pub fn cookie_is_stale(&self, now: DateTime<Utc>) -> bool {
        self.cookie_age_days(now) > self.cookie_warning_days
    }
}
