use hireloop_actors::{keys, spawn_actor, StoreActor, StoreHandle};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct Prefs {
    keywords: String,
    remote_only: bool,
}

async fn memory_store() -> StoreHandle {
    let actor = StoreActor::in_memory().await.expect("in-memory store");
    StoreHandle::new(spawn_actor(actor, 64).addr)
}

#[tokio::test]
async fn missing_keys_read_as_empty_values() {
    let store = memory_store().await;
    assert_eq!(store.get_string(keys::LAST_SEARCH_URL).await, None);
    assert_eq!(store.get_counter(keys::APPLICATION_COUNTER).await, 0);
    assert_eq!(store.get_json::<Prefs>(keys::USER_PREFERENCES).await, Prefs::default());
    assert!(store.load_processed().await.is_empty());
}

#[tokio::test]
async fn json_values_round_trip_and_bad_json_defaults() {
    let store = memory_store().await;
    let prefs = Prefs {
        keywords: "rust engineer".into(),
        remote_only: true,
    };
    store.set_json(keys::USER_PREFERENCES, &prefs).await.unwrap();
    assert_eq!(store.get_json::<Prefs>(keys::USER_PREFERENCES).await, prefs);

    store.set_string(keys::USER_PROFILE, "{not json").await.unwrap();
    assert_eq!(store.get_json::<Prefs>(keys::USER_PROFILE).await, Prefs::default());
}

#[tokio::test]
async fn counter_increments_from_zero() {
    let store = memory_store().await;
    assert_eq!(store.increment(keys::APPLICATION_COUNTER).await.unwrap(), 1);
    assert_eq!(store.increment(keys::APPLICATION_COUNTER).await.unwrap(), 2);
    assert_eq!(store.get_counter(keys::APPLICATION_COUNTER).await, 2);
}

#[tokio::test]
async fn processed_set_is_idempotent() {
    let store = memory_store().await;
    assert!(store.mark_processed("listing:a").await.unwrap());
    assert!(!store.mark_processed("listing:a").await.unwrap());
    assert!(store.mark_processed("https://jobs.example.test/view/2").await.unwrap());

    let set = store.load_processed().await;
    assert_eq!(set.len(), 2);
    assert!(set.contains("listing:a"));
    assert_eq!(store.processed_count().await, 2);
}

#[tokio::test]
async fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("nested").join("state.db").display());

    {
        let store = StoreHandle::new(spawn_actor(StoreActor::connect(&url).await.unwrap(), 8).addr);
        store.mark_processed("listing:kept").await.unwrap();
        store
            .set_string(keys::LAST_SEARCH_URL, "https://jobs.example.test/search?q=rust")
            .await
            .unwrap();
    }

    let reopened = StoreHandle::new(spawn_actor(StoreActor::connect(&url).await.unwrap(), 8).addr);
    assert!(reopened.load_processed().await.contains("listing:kept"));
    assert_eq!(
        reopened.get_string(keys::LAST_SEARCH_URL).await.as_deref(),
        Some("https://jobs.example.test/search?q=rust")
    );
}
