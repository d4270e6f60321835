//! Delivery preference resolution.
//!
//! Pure functions over one (recipient, publication) pair. Publication-level
//! flags are a hard ceiling: a channel the publication disables stays off no
//! matter what the recipient asks for. Below the ceiling, the recipient's
//! per-publication entry overrides; absence inherits the publication
//! default.

use crate::model::{Publication, Recipient};

/// Effective delivery decision for one recipient and one publication.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryDecision {
    pub send_email: bool,
    pub archive_to_cloud: bool,
    pub archive_folder: String,
    pub organize_by_period: bool,
}

/// Resolve the effective channels and archive location.
///
/// Folder precedence: recipient per-publication override, then the
/// publication's archive-location override, then the publication id.
pub fn resolve(recipient: &Recipient, publication: &Publication) -> DeliveryDecision {
    let preference = recipient.preferences.get(&publication.id);

    let send_email = publication.email_enabled
        && preference
            .and_then(|p| p.email_enabled)
            .unwrap_or(publication.email_enabled);

    let archive_to_cloud = publication.archive_enabled
        && preference
            .and_then(|p| p.archive_enabled)
            .unwrap_or(publication.archive_enabled);

    let archive_folder = preference
        .and_then(|p| p.folder.clone())
        .or_else(|| publication.archive_folder.clone())
        .unwrap_or_else(|| publication.id.clone());

    let organize_by_period = preference
        .and_then(|p| p.organize_by_period)
        .unwrap_or(false);

    DeliveryDecision {
        send_email,
        archive_to_cloud,
        archive_folder,
        organize_by_period,
    }
}
