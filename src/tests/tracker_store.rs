//! Store behavior against a real SQLite database: patch merging, date range
//! listing and food cache expiry.

use serde_json::json;
use tempfile::tempdir;

use crate::store::tracker::{DayPatch, Store, UserPatch};

#[tokio::test]
async fn user_patch_merges_with_stored_profile() {
    let store = Store::in_memory().unwrap();

    store
        .upsert_user(
            1,
            UserPatch {
                email: Some("runner@example.com".to_string()),
                user_metadata: Some(json!({"height_cm": 180})),
            },
        )
        .await
        .unwrap();

    // Patch only the metadata; the email must survive.
    store
        .upsert_user(
            1,
            UserPatch {
                email: None,
                user_metadata: Some(json!({"height_cm": 181})),
            },
        )
        .await
        .unwrap();

    let user = store.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.email.as_deref(), Some("runner@example.com"));
    assert_eq!(user.user_metadata.unwrap()["height_cm"], 181);
}

#[tokio::test]
async fn missing_user_reads_as_none() {
    let store = Store::in_memory().unwrap();
    assert!(store.get_user(99).await.unwrap().is_none());
}

#[tokio::test]
async fn day_patch_preserves_unpatched_fields() {
    let store = Store::in_memory().unwrap();

    store
        .upsert_day(
            7,
            "2026-08-24",
            DayPatch {
                meals: Some(json!([{"food_id": "33691"}])),
                water_intake: Some(5),
                weight: Some(72.4),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    store
        .upsert_day(
            7,
            "2026-08-24",
            DayPatch {
                notes: Some("easy day".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let day = store.get_day(7, "2026-08-24").await.unwrap().unwrap();
    assert_eq!(day.meals[0]["food_id"], "33691");
    assert_eq!(day.notes, "easy day");
    assert_eq!(day.water_intake, 5);
    assert_eq!(day.weight, Some(72.4));
    assert!(day.updated_at.is_some());
}

#[tokio::test]
async fn days_list_newest_first_within_range_and_limit() {
    let store = Store::in_memory().unwrap();
    for date in ["2026-08-20", "2026-08-21", "2026-08-22", "2026-08-23"] {
        store
            .upsert_day(
                7,
                date,
                DayPatch {
                    water_intake: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
    // Another user's rows must not leak in.
    store
        .upsert_day(8, "2026-08-22", DayPatch::default())
        .await
        .unwrap();

    let all = store.list_days(7, None, None, 30).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].date, "2026-08-23");
    assert_eq!(all[3].date, "2026-08-20");

    let ranged = store
        .list_days(
            7,
            Some("2026-08-21".to_string()),
            Some("2026-08-22".to_string()),
            30,
        )
        .await
        .unwrap();
    assert_eq!(ranged.len(), 2);
    assert_eq!(ranged[0].date, "2026-08-22");

    let limited = store.list_days(7, None, None, 2).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].date, "2026-08-23");
}

#[tokio::test]
async fn day_summary_flags_reflect_content() {
    let store = Store::in_memory().unwrap();
    store
        .upsert_day(
            7,
            "2026-08-25",
            DayPatch {
                meals: Some(json!([])),
                notes: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let days = store.list_days(7, None, None, 30).await.unwrap();
    assert!(!days[0].has_meals, "empty meal list does not count");
    assert!(!days[0].has_notes, "empty notes do not count");
}

#[tokio::test]
async fn food_cache_honors_its_ttl() {
    let store = Store::in_memory().unwrap();
    let payload = json!({"food": {"food_id": "33691", "food_name": "Cheddar Cheese"}});

    store.put_cached_food("33691", &payload, 3600).await.unwrap();
    let hit = store.get_cached_food("33691").await.unwrap();
    assert_eq!(hit, Some(payload.clone()));

    // Re-insert with a TTL already in the past.
    store.put_cached_food("33691", &payload, -1).await.unwrap();
    assert!(store.get_cached_food("33691").await.unwrap().is_none());

    assert!(store.get_cached_food("unknown").await.unwrap().is_none());
}

#[tokio::test]
async fn store_survives_reopen_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tracker.db");
    let path = path.to_str().unwrap();

    {
        let store = Store::open(path).unwrap();
        store
            .upsert_user(
                1,
                UserPatch {
                    email: Some("runner@example.com".to_string()),
                    user_metadata: None,
                },
            )
            .await
            .unwrap();
    }

    let reopened = Store::open(path).unwrap();
    let user = reopened.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.email.as_deref(), Some("runner@example.com"));
}
