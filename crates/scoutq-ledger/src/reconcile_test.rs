use chrono::TimeZone;
use proptest::prelude::*;
use scoutq_core::BusinessFields;
use scoutq_store::MemoryStore;

use super::*;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn stored_profile() -> ProfileRecord {
    ProfileRecord {
        display_name: "Acme Co".into(),
        biography: "we make things".into(),
        follower_count: 1200,
        following_count: 80,
        post_count: 34,
        external_url: "https://acme.test".into(),
        avatar_url: "http://x/a.jpg".into(),
        avatar_url_hd: "http://x/a_hd.jpg".into(),
        account_type: "branding".into(),
        posting_style: "casual".into(),
        business_fields: Some(BusinessFields {
            category_name: "Retail".into(),
            is_business_account: true,
        }),
        ..ProfileRecord::empty(Platform::Instagram, "acme")
    }
}

#[test]
fn first_snapshot_is_taken_as_is() {
    let new = ProfileRecord {
        follower_count: 5,
        ..ProfileRecord::empty(Platform::Twitter, "acme")
    };
    let merged = merge(new, None, now());
    assert_eq!(merged.follower_count, 5);
    assert_eq!(merged.extracted_at, Some(now()));
}

#[test]
fn degraded_snapshot_keeps_stored_values() {
    let existing = stored_profile();
    let new = ProfileRecord {
        post_count: 40,
        verified: true,
        ..ProfileRecord::empty(Platform::Instagram, "acme")
    };

    let merged = merge(new, Some(&existing), now());

    assert_eq!(merged.follower_count, 1200);
    assert_eq!(merged.following_count, 80);
    assert_eq!(merged.post_count, 40);
    assert_eq!(merged.display_name, "Acme Co");
    assert_eq!(merged.biography, "we make things");
    assert_eq!(merged.external_url, "https://acme.test");
    assert_eq!(merged.avatar_url, "http://x/a.jpg");
    assert_eq!(merged.avatar_url_hd, "http://x/a_hd.jpg");
    assert_eq!(merged.account_type, "branding");
    assert_eq!(merged.posting_style, "casual");
    assert!(merged.verified);
    assert_eq!(merged.business_fields, existing.business_fields);
    assert_eq!(merged.extracted_at, Some(now()));
}

#[test]
fn complete_snapshot_replaces_wholesale_but_keeps_sticky_fields() {
    let existing = stored_profile();
    let new = ProfileRecord {
        follower_count: 10,
        following_count: 2,
        avatar_url_hd: "http://x/new_hd.jpg".into(),
        ..ProfileRecord::empty(Platform::Instagram, "acme")
    };

    let merged = merge(new, Some(&existing), now());

    assert_eq!(merged.follower_count, 10);
    assert_eq!(merged.following_count, 2);
    assert_eq!(merged.post_count, 0);
    assert_eq!(merged.biography, "");
    assert_eq!(merged.avatar_url_hd, "http://x/new_hd.jpg");
    assert_eq!(merged.account_type, "branding");
    assert_eq!(merged.posting_style, "casual");
    assert!(merged.business_fields.is_none());
}

#[test]
fn new_account_type_wins_when_present() {
    let existing = stored_profile();
    let new = ProfileRecord {
        account_type: "personal".into(),
        ..ProfileRecord::empty(Platform::Instagram, "acme")
    };
    let merged = merge(new, Some(&existing), now());
    assert_eq!(merged.account_type, "personal");
    assert_eq!(merged.posting_style, "casual");
}

#[test]
fn completeness_requires_counts_and_an_avatar() {
    let mut profile = ProfileRecord {
        follower_count: 1,
        following_count: 1,
        ..ProfileRecord::empty(Platform::Twitter, "acme")
    };
    assert!(!is_complete(&profile));
    profile.avatar_url_hd = "http://x/hd.jpg".into();
    assert!(is_complete(&profile));
    profile.following_count = 0;
    assert!(!is_complete(&profile));
}

#[tokio::test]
async fn reconcile_persists_merged_profile() {
    let store = Arc::new(MemoryStore::new());
    let profiles = ProfileStore::new(store.clone());

    profiles.reconcile_at(stored_profile(), now()).await.unwrap();
    let degraded = ProfileRecord::empty(Platform::Instagram, "acme");
    let merged = profiles.reconcile_at(degraded, now()).await.unwrap();
    assert_eq!(merged.follower_count, 1200);

    let stored = profiles
        .get(Platform::Instagram, "acme")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, merged);

    let raw = store
        .get("ProfileInfo/instagram/acme.json")
        .await
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&raw.data).unwrap();
    assert_eq!(value["followerCount"], 1200);
    assert_eq!(value["extractedAt"], "2025-06-01T12:00:00.000Z");
}

#[tokio::test]
async fn unreadable_stored_profile_is_replaced() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(
            "ProfileInfo/twitter/acme.json",
            Bytes::from_static(b"{broken"),
            PutOptions::json(),
        )
        .await
        .unwrap();
    let profiles = ProfileStore::new(store.clone());

    let new = ProfileRecord {
        follower_count: 3,
        ..ProfileRecord::empty(Platform::Twitter, "acme")
    };
    let merged = profiles.reconcile_at(new, now()).await.unwrap();
    assert_eq!(merged.follower_count, 3);
    assert!(profiles.get(Platform::Twitter, "acme").await.unwrap().is_some());
}

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "[a-z]{1,12}"]
}

fn arb_profile() -> impl Strategy<Value = ProfileRecord> {
    (
        (0u64..5_000, 0u64..5_000, 0u64..5_000),
        (arb_text(), arb_text(), arb_text()),
        (arb_text(), arb_text(), arb_text()),
        any::<bool>(),
    )
        .prop_map(
            |(
                (follower_count, following_count, post_count),
                (avatar_url, avatar_url_hd, biography),
                (account_type, posting_style, external_url),
                verified,
            )| ProfileRecord {
                follower_count,
                following_count,
                post_count,
                avatar_url,
                avatar_url_hd,
                biography,
                account_type,
                posting_style,
                external_url,
                verified,
                ..ProfileRecord::empty(Platform::Instagram, "acme")
            },
        )
}

proptest! {
    /// Counts never fall back to zero when a nonzero value was stored.
    #[test]
    fn counts_never_regress_to_zero(new in arb_profile(), existing in arb_profile()) {
        let merged = merge(new.clone(), Some(&existing), now());
        if existing.follower_count > 0 {
            prop_assert!(merged.follower_count > 0);
        }
        if existing.following_count > 0 {
            prop_assert!(merged.following_count > 0);
        }
        if existing.post_count > 0 && !is_complete(&new) {
            prop_assert!(merged.post_count > 0);
        }
    }

    /// Sticky classification survives any snapshot that does not carry one.
    #[test]
    fn account_type_is_sticky(new in arb_profile(), existing in arb_profile()) {
        let merged = merge(new.clone(), Some(&existing), now());
        if new.account_type.is_empty() {
            prop_assert_eq!(&merged.account_type, &existing.account_type);
        } else {
            prop_assert_eq!(&merged.account_type, &new.account_type);
        }
        if new.posting_style.is_empty() {
            prop_assert_eq!(&merged.posting_style, &existing.posting_style);
        }
    }

    /// Some avatar URL survives whenever either side had one.
    #[test]
    fn avatar_never_disappears(new in arb_profile(), existing in arb_profile()) {
        let merged = merge(new.clone(), Some(&existing), now());
        let had_avatar = |p: &ProfileRecord| !p.avatar_url.is_empty() || !p.avatar_url_hd.is_empty();
        if had_avatar(&new) || had_avatar(&existing) {
            prop_assert!(had_avatar(&merged));
        }
        if !new.avatar_url.is_empty() {
            prop_assert_eq!(&merged.avatar_url, &new.avatar_url);
        }
    }

    /// New booleans always win.
    #[test]
    fn booleans_follow_new(new in arb_profile(), existing in arb_profile()) {
        let merged = merge(new.clone(), Some(&existing), now());
        prop_assert_eq!(merged.verified, new.verified);
        prop_assert_eq!(merged.extracted_at, Some(now()));
    }
}
