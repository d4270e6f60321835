use chrono::Utc;
use edition_courier_core::model::{ChannelPreference, Publication, Recipient, Role};
use edition_courier_core::preference::resolve;

fn publication(email_enabled: bool, archive_enabled: bool, folder: Option<&str>) -> Publication {
    let now = Utc::now();
    Publication {
        id: "weekly-gazette".to_string(),
        title: "Weekly Gazette".to_string(),
        kind: "weekly".to_string(),
        window_start: None,
        window_end: None,
        email_enabled,
        archive_enabled,
        archive_folder: folder.map(str::to_string),
        active: true,
        created_at: now,
        updated_at: now,
    }
}

fn recipient(preference: Option<ChannelPreference>) -> Recipient {
    let mut recipient = Recipient {
        email: "reader@example.com".to_string(),
        first_name: "Robin".to_string(),
        last_name: "Reader".to_string(),
        active: true,
        role: Role::Regular,
        preferences: Default::default(),
        send_count: 0,
        last_sent_at: None,
        sends_by_publication: Default::default(),
        created_at: Utc::now(),
    };
    if let Some(preference) = preference {
        recipient
            .preferences
            .insert("weekly-gazette".to_string(), preference);
    }
    recipient
}

struct Case {
    name: &'static str,
    publication: Publication,
    preference: Option<ChannelPreference>,
    expect_email: bool,
    expect_archive: bool,
}

#[test]
fn channel_flags_follow_three_tier_precedence() {
    let cases = vec![
        Case {
            name: "no preference inherits publication defaults",
            publication: publication(true, false, None),
            preference: None,
            expect_email: true,
            expect_archive: false,
        },
        Case {
            name: "publication email off is a hard ceiling over recipient opt-in",
            publication: publication(false, true, None),
            preference: Some(ChannelPreference {
                email_enabled: Some(true),
                ..Default::default()
            }),
            expect_email: false,
            expect_archive: true,
        },
        Case {
            name: "publication archive off is a hard ceiling over recipient opt-in",
            publication: publication(true, false, None),
            preference: Some(ChannelPreference {
                archive_enabled: Some(true),
                ..Default::default()
            }),
            expect_email: true,
            expect_archive: false,
        },
        Case {
            name: "recipient opt-out wins under an enabled publication",
            publication: publication(true, true, None),
            preference: Some(ChannelPreference {
                email_enabled: Some(false),
                archive_enabled: Some(false),
                ..Default::default()
            }),
            expect_email: false,
            expect_archive: false,
        },
        Case {
            name: "empty preference entry behaves like no entry",
            publication: publication(true, true, None),
            preference: Some(ChannelPreference::default()),
            expect_email: true,
            expect_archive: true,
        },
    ];

    for case in cases {
        let recipient = recipient(case.preference.clone());
        let decision = resolve(&recipient, &case.publication);
        assert_eq!(decision.send_email, case.expect_email, "{}", case.name);
        assert_eq!(decision.archive_to_cloud, case.expect_archive, "{}", case.name);
    }
}

#[test]
fn preference_for_another_publication_does_not_apply() {
    let mut recipient = recipient(None);
    recipient.preferences.insert(
        "other-journal".to_string(),
        ChannelPreference {
            email_enabled: Some(false),
            ..Default::default()
        },
    );
    let decision = resolve(&recipient, &publication(true, false, None));
    assert!(decision.send_email);
}

#[test]
fn folder_resolution_prefers_recipient_then_publication_then_id() {
    let with_override = recipient(Some(ChannelPreference {
        folder: Some("Press/Gazette".to_string()),
        ..Default::default()
    }));
    let without_override = recipient(None);

    let decision = resolve(&with_override, &publication(true, true, Some("Shared/Gazette")));
    assert_eq!(decision.archive_folder, "Press/Gazette");

    let decision = resolve(&without_override, &publication(true, true, Some("Shared/Gazette")));
    assert_eq!(decision.archive_folder, "Shared/Gazette");

    let decision = resolve(&without_override, &publication(true, true, None));
    assert_eq!(decision.archive_folder, "weekly-gazette");
}

#[test]
fn organize_by_period_defaults_off_and_follows_recipient_override() {
    let decision = resolve(&recipient(None), &publication(true, true, None));
    assert!(!decision.organize_by_period);

    let organised = recipient(Some(ChannelPreference {
        organize_by_period: Some(true),
        ..Default::default()
    }));
    let decision = resolve(&organised, &publication(true, true, None));
    assert!(decision.organize_by_period);
}
