/// Concurrency tests
///
/// Optimistic version checks, conflict retry and lazy type creation under
/// concurrent scopes
/// Run with: cargo test --test concurrency_tests

use activity_tracker::auth::AuthConfig;
use activity_tracker::connection::ConnectionConfig;
use activity_tracker::fields;
use activity_tracker::models::{ActivityType, GENERAL_TYPE_COLOR, GENERAL_TYPE_NAME};
use activity_tracker::services::{NewActivity, NewUser};
use activity_tracker::storage::Filter;
use activity_tracker::transaction::RetryPolicy;
use activity_tracker::{AppConfig, Database};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.connection = ConnectionConfig::new().acquire_retry_delay(Duration::from_millis(10));
    config.retry = RetryPolicy::new(3, Duration::from_millis(10));
    config.auth = AuthConfig::default().bcrypt_cost(4);
    config
}

#[tokio::test]
async fn test_concurrent_updates_from_same_version_never_overwrite() {
    let db = Database::open(fast_config()).await.unwrap();
    let types = db.repository::<ActivityType>();
    let original = types.create(fields! { "name" => "Climbing" }).await.unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = vec![];
    for color in ["#111111", "#222222"] {
        let types = types.clone();
        let original = original.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            types.update(original, fields! { "color" => color }).await
        }));
    }

    let mut committed = vec![];
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(updated) => committed.push(updated),
            Err(err) => {
                assert!(err.is_conflict(), "unexpected error: {}", err);
                conflicts += 1;
            }
        }
    }
    assert_eq!(committed.len(), 1);
    assert_eq!(conflicts, 1);

    let stored = types.read_by_id(&original.id).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.color, committed[0].color);
}

#[tokio::test]
async fn test_concurrent_updates_by_id_both_apply() {
    let db = Database::open(fast_config()).await.unwrap();
    let types = db.repository::<ActivityType>();
    let original = types.create(fields! { "name" => "Fencing" }).await.unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = vec![];
    for color in ["#111111", "#222222"] {
        let types = types.clone();
        let id = original.id.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            types.update(id, fields! { "color" => color }).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = types.read_by_id(&original.id).await.unwrap();
    assert_eq!(stored.version, 3);
}

#[tokio::test]
async fn test_concurrent_default_type_is_created_once() {
    let db = Database::open(fast_config()).await.unwrap();
    let user = db
        .users()
        .create_user(NewUser::new("racer", "racer@example.com", "secret"))
        .await
        .unwrap();
    let activities = db.activities();

    let results = join_all((0..4).map(|i| {
        let activities = activities.clone();
        let user_id = user.id.clone();
        async move {
            activities
                .create_activity(&user_id, NewActivity::new(format!("lap {}", i)))
                .await
        }
    }))
    .await;

    let created: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    let type_id = created[0].type_id.clone();
    assert!(type_id.is_some());
    assert!(created.iter().all(|activity| activity.type_id == type_id));

    let (general, total) = db
        .repository::<ActivityType>()
        .read_all(None, None, vec![Filter::eq("name", GENERAL_TYPE_NAME)])
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(general[0].color, GENERAL_TYPE_COLOR);
}

#[tokio::test]
async fn test_concurrent_duplicate_registration_keeps_one_user() {
    let db = Database::open(fast_config()).await.unwrap();
    let users = db.users();

    let results = join_all((0..3).map(|i| {
        let users = users.clone();
        async move {
            users
                .create_user(NewUser::new(
                    format!("twin{}", i),
                    "twin@example.com",
                    "secret",
                ))
                .await
        }
    }))
    .await;

    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert!(
            matches!(err, activity_tracker::ServiceError::DuplicateUser(_)),
            "unexpected error: {}",
            err
        );
    }

    let (_, total) = users.list_users(None, None).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_conflict_retries_reach_the_budget() {
    let db = Database::open(fast_config()).await.unwrap();
    let types = db.repository::<ActivityType>();
    let created = types.create(fields! { "name" => "Karate" }).await.unwrap();
    types
        .update(created.clone(), fields! { "color" => "#010101" })
        .await
        .unwrap();

    let err = types
        .update(created, fields! { "color" => "#020202" })
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            activity_tracker::PersistError::ConcurrencyExhausted { attempts: 3, .. }
        ),
        "unexpected error: {}",
        err
    );
}
