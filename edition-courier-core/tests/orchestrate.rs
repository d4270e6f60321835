use std::fs;
use std::path::Path;

use chrono::{Duration, NaiveDate, Utc};
use serial_test::serial;
use tempfile::tempdir;

use edition_courier_core::contract::{
    MockMailSender, MockRemoteStore, MockSourceFetcher, RemoteEdition, RemotePublication,
};
use edition_courier_core::error::CourierError;
use edition_courier_core::model::{
    AppConfig, AuthCookie, ChannelPreference, Publication, Recipient, Role,
};
use edition_courier_core::orchestrate::{Orchestrator, RunOptions};
use edition_courier_core::store::{JsonFileStore, Store};

fn seed_config(root: &Path, cookie_value: &str, admin_emails: Vec<String>) {
    let config = AppConfig {
        log_level: "info".to_string(),
        cookie_warning_days: 14,
        admin_emails,
        auth_cookie: AuthCookie {
            value: cookie_value.to_string(),
            updated_at: Utc::now(),
            updated_by: "ops@example.com".to_string(),
        },
        retention_days: 90,
    };
    fs::write(
        root.join("config.json"),
        serde_json::to_string_pretty(&config).unwrap(),
    )
    .unwrap();
}

fn publication(id: &str, title: &str, email_enabled: bool, archive_enabled: bool) -> Publication {
    let now = Utc::now();
    Publication {
        id: id.to_string(),
        title: title.to_string(),
        kind: "daily".to_string(),
        window_start: None,
        window_end: None,
        email_enabled,
        archive_enabled,
        archive_folder: None,
        active: true,
        created_at: now,
        updated_at: now,
    }
}

fn recipient(email: &str) -> Recipient {
    Recipient {
        email: email.to_string(),
        first_name: "Robin".to_string(),
        last_name: "Reader".to_string(),
        active: true,
        role: Role::Regular,
        preferences: Default::default(),
        send_count: 0,
        last_sent_at: None,
        sends_by_publication: Default::default(),
        created_at: Utc::now(),
    }
}

fn edition(publication_id: &str, date: NaiveDate) -> RemoteEdition {
    RemoteEdition {
        publication_id: publication_id.to_string(),
        title: format!("{publication_id} {date}"),
        date,
        download_url: format!("https://kiosk.example.com/editions/{publication_id}/{date}.pdf"),
    }
}

fn listing_entry(publication: &Publication) -> RemotePublication {
    RemotePublication {
        id: publication.id.clone(),
        title: publication.title.clone(),
        kind: publication.kind.clone(),
        window_start: publication.window_start,
        window_end: publication.window_end,
        large_file: false,
    }
}

fn unreachable_listing(fetcher: &mut MockSourceFetcher) {
    fetcher
        .expect_list_publications()
        .returning(|| Err(CourierError::Transient("kiosk unreachable".to_string())));
}

#[tokio::test]
#[serial]
async fn end_to_end_discovers_delivers_and_commits_one_edition() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed_config(dir.path(), "session=abc", vec![]);
    store.upsert_recipient(recipient("reader@example.com")).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
    let mut fetcher = MockSourceFetcher::new();
    // First sighting: discovery creates P with email on, archive off.
    fetcher.expect_list_publications().returning(|| {
        Ok(vec![RemotePublication {
            id: "P".to_string(),
            title: "The Post".to_string(),
            kind: "daily".to_string(),
            window_start: None,
            window_end: None,
            large_file: false,
        }])
    });
    fetcher
        .expect_current_edition()
        .withf(|id| id == "P")
        .returning(move |_| Ok(Some(edition("P", date))));
    fetcher
        .expect_download()
        .withf(|url| url.ends_with("/P/2025-11-26.pdf"))
        .times(1)
        .returning(|_| Ok(b"edition bytes".to_vec()));

    let mut mailer = MockMailSender::new();
    mailer
        .expect_send()
        .withf(|mail| {
            mail.to == "reader@example.com"
                && mail.subject.contains("The Post")
                && mail
                    .attachment
                    .as_ref()
                    .is_some_and(|a| a.filename == "2025-11-26_P.pdf" && a.bytes == b"edition bytes")
        })
        .times(1)
        .returning(|_| Ok(()));

    // Archive is off for P: any remote-store call would fail the test.
    let remote = MockRemoteStore::new();

    let orchestrator =
        Orchestrator::new(&store, &fetcher, &mailer, &remote, RunOptions::default());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.reconcile.as_ref().map(|r| r.created), Some(1));

    let record = store
        .get_processed("2025-11-26_P")
        .await
        .unwrap()
        .expect("ledger row must exist after the run");
    assert_eq!(record.publication_id, "P");
    assert_eq!(record.archive_path, None);

    let reader = &store.list_recipients().await.unwrap()[0];
    assert_eq!(reader.send_count, 1);
    assert_eq!(reader.sends_by_publication.get("P"), Some(&1));
}

#[tokio::test]
#[serial]
async fn a_failing_publication_does_not_abort_the_batch() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed_config(dir.path(), "session=abc", vec![]);
    store
        .insert_publication(publication("aaa-bad", "Bad Daily", true, false))
        .await
        .unwrap();
    store
        .insert_publication(publication("bbb-good", "Good Daily", true, false))
        .await
        .unwrap();
    store.upsert_recipient(recipient("reader@example.com")).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
    let mut fetcher = MockSourceFetcher::new();
    unreachable_listing(&mut fetcher);
    fetcher
        .expect_current_edition()
        .withf(|id| id == "aaa-bad")
        .returning(|_| Err(CourierError::Transient("edition page 500".to_string())));
    fetcher
        .expect_current_edition()
        .withf(|id| id == "bbb-good")
        .returning(move |_| Ok(Some(edition("bbb-good", date))));
    fetcher
        .expect_download()
        .returning(|_| Ok(b"good bytes".to_vec()));

    let mut mailer = MockMailSender::new();
    mailer.expect_send().times(1).returning(|_| Ok(()));
    let remote = MockRemoteStore::new();

    let orchestrator =
        Orchestrator::new(&store, &fetcher, &mailer, &remote, RunOptions::default());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].publication_id, "aaa-bad");
    assert!(store.get_processed("2025-11-26_bbb-good").await.unwrap().is_some());
    assert!(store.get_processed("2025-11-26_aaa-bad").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn discovery_failure_still_processes_known_publications() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed_config(dir.path(), "session=abc", vec![]);
    store
        .insert_publication(publication("post", "The Post", true, false))
        .await
        .unwrap();
    store.upsert_recipient(recipient("reader@example.com")).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
    let mut fetcher = MockSourceFetcher::new();
    unreachable_listing(&mut fetcher);
    fetcher
        .expect_current_edition()
        .returning(move |_| Ok(Some(edition("post", date))));
    fetcher
        .expect_download()
        .returning(|_| Ok(b"edition bytes".to_vec()));

    let mut mailer = MockMailSender::new();
    mailer.expect_send().times(1).returning(|_| Ok(()));
    let remote = MockRemoteStore::new();

    let orchestrator =
        Orchestrator::new(&store, &fetcher, &mailer, &remote, RunOptions::default());
    let summary = orchestrator.run().await.unwrap();

    assert!(summary.reconcile.is_none());
    assert_eq!(summary.processed, 1);
    // The publication survived the failed sweep untouched.
    assert!(store.get_publication("post").await.unwrap().unwrap().active);
}

#[tokio::test]
#[serial]
async fn an_already_processed_edition_is_skipped_without_a_download() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed_config(dir.path(), "session=abc", vec![]);
    let post = publication("post", "The Post", true, false);
    store.insert_publication(post.clone()).await.unwrap();
    store.upsert_recipient(recipient("reader@example.com")).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
    store
        .insert_processed(edition_courier_core::model::ProcessedEditionRecord {
            edition_key: "2025-11-26_post".to_string(),
            publication_id: "post".to_string(),
            title: "The Post 2025-11-26".to_string(),
            publication_date: date,
            source_url: "https://kiosk.example.com/editions/post/2025-11-26.pdf".to_string(),
            archive_path: None,
            processed_at: Utc::now(),
        })
        .await
        .unwrap();

    let mut fetcher = MockSourceFetcher::new();
    fetcher
        .expect_list_publications()
        .returning(move || Ok(vec![listing_entry(&post)]));
    fetcher
        .expect_current_edition()
        .returning(move |_| Ok(Some(edition("post", date))));
    // No expect_download: a download attempt would fail the test.

    let mailer = MockMailSender::new();
    let remote = MockRemoteStore::new();

    let orchestrator =
        Orchestrator::new(&store, &fetcher, &mailer, &remote, RunOptions::default());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.processed, 0);
}

#[tokio::test]
#[serial]
async fn the_force_flag_bypasses_the_gate_and_keeps_the_ledger_row() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed_config(dir.path(), "session=abc", vec![]);
    store
        .insert_publication(publication("post", "The Post", true, false))
        .await
        .unwrap();
    store.upsert_recipient(recipient("reader@example.com")).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
    store
        .insert_processed(edition_courier_core::model::ProcessedEditionRecord {
            edition_key: "2025-11-26_post".to_string(),
            publication_id: "post".to_string(),
            title: "The Post 2025-11-26".to_string(),
            publication_date: date,
            source_url: "https://kiosk.example.com/editions/post/2025-11-26.pdf".to_string(),
            archive_path: None,
            processed_at: Utc::now(),
        })
        .await
        .unwrap();

    let mut fetcher = MockSourceFetcher::new();
    unreachable_listing(&mut fetcher);
    fetcher
        .expect_current_edition()
        .returning(move |_| Ok(Some(edition("post", date))));
    fetcher
        .expect_download()
        .times(1)
        .returning(|_| Ok(b"edition bytes".to_vec()));

    let mut mailer = MockMailSender::new();
    mailer.expect_send().times(1).returning(|_| Ok(()));
    let remote = MockRemoteStore::new();

    let options = RunOptions {
        force_edition: Some("2025-11-26_post".to_string()),
    };
    let orchestrator = Orchestrator::new(&store, &fetcher, &mailer, &remote, options);
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.processed, 1);
    // Normal dedup behavior resumes: the witness is still there.
    assert!(store.get_processed("2025-11-26_post").await.unwrap().is_some());
}

#[tokio::test]
#[serial]
async fn one_bounced_recipient_degrades_but_still_commits() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed_config(dir.path(), "session=abc", vec![]);
    store
        .insert_publication(publication("post", "The Post", true, false))
        .await
        .unwrap();
    store.upsert_recipient(recipient("bounce@example.com")).await.unwrap();
    store.upsert_recipient(recipient("reader@example.com")).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
    let mut fetcher = MockSourceFetcher::new();
    unreachable_listing(&mut fetcher);
    fetcher
        .expect_current_edition()
        .returning(move |_| Ok(Some(edition("post", date))));
    fetcher
        .expect_download()
        .returning(|_| Ok(b"edition bytes".to_vec()));

    let mut mailer = MockMailSender::new();
    mailer
        .expect_send()
        .withf(|mail| mail.to == "bounce@example.com")
        .times(1)
        .returning(|_| {
            Err(CourierError::delivery("email", "mailbox unavailable"))
        });
    mailer
        .expect_send()
        .withf(|mail| mail.to == "reader@example.com")
        .times(1)
        .returning(|_| Ok(()));
    let remote = MockRemoteStore::new();

    let orchestrator =
        Orchestrator::new(&store, &fetcher, &mailer, &remote, RunOptions::default());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);
    assert!(store.get_processed("2025-11-26_post").await.unwrap().is_some());

    let recipients = store.list_recipients().await.unwrap();
    let bounce = recipients.iter().find(|r| r.email == "bounce@example.com").unwrap();
    let reader = recipients.iter().find(|r| r.email == "reader@example.com").unwrap();
    assert_eq!(bounce.send_count, 0);
    assert_eq!(reader.send_count, 1);
}

#[tokio::test]
#[serial]
async fn total_channel_failure_blocks_the_commit() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed_config(dir.path(), "session=abc", vec![]);
    store
        .insert_publication(publication("post", "The Post", true, false))
        .await
        .unwrap();
    store.upsert_recipient(recipient("reader@example.com")).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
    let mut fetcher = MockSourceFetcher::new();
    unreachable_listing(&mut fetcher);
    fetcher
        .expect_current_edition()
        .returning(move |_| Ok(Some(edition("post", date))));
    fetcher
        .expect_download()
        .returning(|_| Ok(b"edition bytes".to_vec()));

    let mut mailer = MockMailSender::new();
    mailer
        .expect_send()
        .returning(|_| Err(CourierError::delivery("email", "relay rejected the message")));
    let remote = MockRemoteStore::new();

    let orchestrator =
        Orchestrator::new(&store, &fetcher, &mailer, &remote, RunOptions::default());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed, 1);
    // Nothing went out anywhere: committing would silently lose the edition.
    assert!(store.get_processed("2025-11-26_post").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn archive_only_publications_upload_once_per_resolved_folder() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed_config(dir.path(), "session=abc", vec![]);
    store
        .insert_publication(publication("atlas", "Atlas Folio", false, true))
        .await
        .unwrap();
    let mut organised = recipient("reader@example.com");
    organised.preferences.insert(
        "atlas".to_string(),
        ChannelPreference {
            organize_by_period: Some(true),
            ..Default::default()
        },
    );
    store.upsert_recipient(organised).await.unwrap();
    store.upsert_recipient(recipient("other@example.com")).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
    let mut fetcher = MockSourceFetcher::new();
    unreachable_listing(&mut fetcher);
    fetcher
        .expect_current_edition()
        .returning(move |_| Ok(Some(edition("atlas", date))));
    fetcher
        .expect_download()
        .returning(|_| Ok(b"folio bytes".to_vec()));

    // Email is off at publication level: no send may happen.
    let mailer = MockMailSender::new();

    let mut remote = MockRemoteStore::new();
    remote
        .expect_exists()
        .returning(|_| Ok(false));
    remote
        .expect_simple_upload()
        .withf(|path, _| path == "atlas/2025/2025-11-26_atlas.pdf")
        .times(1)
        .returning(|_, _| Ok(()));
    remote
        .expect_simple_upload()
        .withf(|path, _| path == "atlas/2025-11-26_atlas.pdf")
        .times(1)
        .returning(|_, _| Ok(()));

    let orchestrator =
        Orchestrator::new(&store, &fetcher, &mailer, &remote, RunOptions::default());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.processed, 1);
    let record = store.get_processed("2025-11-26_atlas").await.unwrap().unwrap();
    assert!(record.archive_path.is_some());
}

#[tokio::test]
#[serial]
async fn an_empty_auth_cookie_aborts_the_run_and_notifies_admins() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed_config(dir.path(), "", vec!["ops@example.com".to_string()]);

    let fetcher = MockSourceFetcher::new();
    let mut mailer = MockMailSender::new();
    mailer
        .expect_send()
        .withf(|mail| mail.to == "ops@example.com" && mail.subject.contains("aborted"))
        .times(1)
        .returning(|_| Ok(()));
    let remote = MockRemoteStore::new();

    let orchestrator =
        Orchestrator::new(&store, &fetcher, &mailer, &remote, RunOptions::default());
    let err = orchestrator.run().await.expect_err("run must abort");
    assert!(matches!(err, CourierError::Authentication(_)));
}

#[tokio::test]
#[serial]
async fn check_reconciles_without_delivering() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed_config(dir.path(), "session=abc", vec![]);
    store
        .insert_publication(publication("gone", "Gone Weekly", true, false))
        .await
        .unwrap();

    let mut fetcher = MockSourceFetcher::new();
    fetcher.expect_list_publications().returning(|| {
        Ok(vec![RemotePublication {
            id: "fresh".to_string(),
            title: "Fresh Weekly".to_string(),
            kind: "weekly".to_string(),
            window_start: None,
            window_end: None,
            large_file: false,
        }])
    });
    // No current_edition, download, mail or upload expectations: check-only
    // must not touch any delivery collaborator.
    let mailer = MockMailSender::new();
    let remote = MockRemoteStore::new();

    let orchestrator =
        Orchestrator::new(&store, &fetcher, &mailer, &remote, RunOptions::default());
    let report = orchestrator.check().await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.deactivated, 1);
    assert!(!store.get_publication("gone").await.unwrap().unwrap().active);
}

#[tokio::test]
#[serial]
async fn the_run_purges_expired_ledger_records() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    seed_config(dir.path(), "session=abc", vec![]);

    store
        .insert_processed(edition_courier_core::model::ProcessedEditionRecord {
            edition_key: "2025-08-01_old".to_string(),
            publication_id: "old".to_string(),
            title: "Old".to_string(),
            publication_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            source_url: "https://kiosk.example.com/editions/old.pdf".to_string(),
            archive_path: None,
            processed_at: Utc::now() - Duration::days(120),
        })
        .await
        .unwrap();

    let mut fetcher = MockSourceFetcher::new();
    unreachable_listing(&mut fetcher);
    let mailer = MockMailSender::new();
    let remote = MockRemoteStore::new();

    let orchestrator =
        Orchestrator::new(&store, &fetcher, &mailer, &remote, RunOptions::default());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.purged, 1);
    assert!(store.get_processed("2025-08-01_old").await.unwrap().is_none());
}
