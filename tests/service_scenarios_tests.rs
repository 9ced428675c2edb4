/// Domain service scenarios
///
/// Users, activity types and activities end to end over the memory store
/// Run with: cargo test --test service_scenarios_tests

use activity_tracker::auth::AuthConfig;
use activity_tracker::connection::ConnectionConfig;
use activity_tracker::models::{DEFAULT_TYPE_COLOR, GENERAL_TYPE_COLOR, GENERAL_TYPE_NAME, User};
use activity_tracker::services::{ActivityPatch, NewActivity, NewUser, UserUpdate};
use activity_tracker::transaction::RetryPolicy;
use activity_tracker::{AppConfig, Database, ErrorKind, ServiceError};
use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.connection = ConnectionConfig::new().acquire_retry_delay(Duration::from_millis(10));
    config.retry = RetryPolicy::new(3, Duration::from_millis(10));
    config.auth = AuthConfig::default().bcrypt_cost(4);
    config
}

async fn open_with_user(username: &str) -> (Database, User) {
    let db = Database::open(fast_config()).await.unwrap();
    let user = db
        .users()
        .create_user(NewUser::new(
            username,
            format!("{}@example.com", username),
            "s3cret",
        ))
        .await
        .unwrap();
    (db, user)
}

#[tokio::test]
async fn test_new_user_defaults() {
    let (_db, user) = open_with_user("alice").await;
    assert!(user.is_active);
    assert!(!user.is_staff);
    assert!(user.last_login.is_some());
    assert_ne!(user.hashed_password, "s3cret");
    assert_eq!(user.version, 1);
}

#[tokio::test]
async fn test_duplicate_email_keeps_first_user() {
    let (db, first) = open_with_user("alice").await;
    let users = db.users();

    let err = users
        .create_user(NewUser::new("alice2", "alice@example.com", "other"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateUser(_)));
    assert_eq!(err.kind(), ErrorKind::ClientData);

    let err = users
        .create_user(NewUser::new("alice", "alice2@example.com", "other"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateUser(_)));

    let stored = users.get_user(&first.id).await.unwrap();
    assert_eq!(stored, first);
    let (_, total) = users.list_users(None, None).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_user_input_validation() {
    let db = Database::open(fast_config()).await.unwrap();
    let users = db.users();

    for new_user in [
        NewUser::new("bob", "not-an-email", "pw"),
        NewUser::new("bob", "bob@example.com", ""),
        NewUser::new("", "bob@example.com", "pw"),
        NewUser::new("b".repeat(21), "bob@example.com", "pw"),
    ] {
        let err = users.create_user(new_user).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "got {}", err);
    }
}

#[tokio::test]
async fn test_user_lookup_and_update() {
    let (db, user) = open_with_user("carol").await;
    let users = db.users();

    assert_eq!(
        users.get_by_email("carol@example.com").await.unwrap(),
        Some(user.clone())
    );
    assert_eq!(users.get_by_username("").await.unwrap(), None);
    assert_eq!(users.get_by_username("nobody").await.unwrap(), None);

    let updated = users
        .update_user(
            &user.id,
            UserUpdate {
                email: Some("carol@work.example.com".into()),
                password: Some("n3w".into()),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.email, "carol@work.example.com");
    assert_ne!(updated.hashed_password, user.hashed_password);

    assert!(users.authenticate("carol", "n3w").await.is_ok());
    assert_eq!(
        users.authenticate("carol", "s3cret").await.unwrap_err(),
        ServiceError::InvalidCredentials
    );
    assert_eq!(
        users.authenticate("ghost", "n3w").await.unwrap_err(),
        ServiceError::InvalidCredentials
    );
}

#[tokio::test]
async fn test_update_user_to_taken_username_is_duplicate() {
    let (db, _first) = open_with_user("dave").await;
    let users = db.users();
    let second = users
        .create_user(NewUser::new("erin", "erin@example.com", "pw"))
        .await
        .unwrap();

    let err = users
        .update_user(
            &second.id,
            UserUpdate {
                username: Some("dave".into()),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateUser(_)));
}

#[tokio::test]
async fn test_activities_without_type_share_general() {
    let (db, user) = open_with_user("frank").await;
    let activities = db.activities();

    let first = activities
        .create_activity(&user.id, NewActivity::new("Morning run"))
        .await
        .unwrap();
    let second = activities
        .create_activity(&user.id, NewActivity::new("Evening walk").description("dog"))
        .await
        .unwrap();

    assert_eq!(first.type_id, second.type_id);
    let general = activities.activity_type_of(&first).await.unwrap().unwrap();
    assert_eq!(general.name, GENERAL_TYPE_NAME);
    assert_eq!(general.color, GENERAL_TYPE_COLOR);
    assert_eq!(second.description.as_deref(), Some("dog"));

    let (_, total) = db.activity_types().list_activity_types(None, None).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_named_type_created_on_demand() {
    let (db, user) = open_with_user("gina").await;
    let activities = db.activities();

    let plain = activities
        .create_activity(&user.id, NewActivity::new("Chess").activity_type("Games", None))
        .await
        .unwrap();
    let games = activities.activity_type_of(&plain).await.unwrap().unwrap();
    assert_eq!(games.name, "Games");
    assert_eq!(games.color, DEFAULT_TYPE_COLOR);

    let again = activities
        .create_activity(
            &user.id,
            NewActivity::new("Go").activity_type("Games", Some("#000000")),
        )
        .await
        .unwrap();
    assert_eq!(again.type_id, plain.type_id);
}

#[tokio::test]
async fn test_activity_for_missing_user_is_not_found() {
    let db = Database::open(fast_config()).await.unwrap();
    let err = db
        .activities()
        .create_activity("ghost", NewActivity::new("Nap"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_only_owner_reads_and_changes_activity() {
    let (db, owner) = open_with_user("hank").await;
    let intruder = db
        .users()
        .create_user(NewUser::new("ivy", "ivy@example.com", "pw"))
        .await
        .unwrap();
    let activities = db.activities();
    let activity = activities
        .create_activity(&owner.id, NewActivity::new("Swim"))
        .await
        .unwrap();

    let err = activities
        .get_activity(&intruder.id, &activity.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let patch = ActivityPatch {
        title: Some("Hijacked".into()),
        ..ActivityPatch::default()
    };
    let err = activities
        .update_activity(&intruder.id, &activity.id, patch)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = activities
        .delete_activity(&intruder.id, &activity.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let stored = activities.get_activity(&owner.id, &activity.id).await.unwrap();
    assert_eq!(stored, activity);
}

#[tokio::test]
async fn test_owner_updates_and_deletes_activity() {
    let (db, user) = open_with_user("jack").await;
    let activities = db.activities();
    let activity = activities
        .create_activity(&user.id, NewActivity::new("Ride").description("hills"))
        .await
        .unwrap();

    let tomorrow = Utc::now() + ChronoDuration::days(1);
    let updated = activities
        .update_activity(
            &user.id,
            &activity.id,
            ActivityPatch {
                title: Some("Long ride".into()),
                description: Some(None),
                activity_date: Some(tomorrow),
                type_name: Some("Cycling".into()),
                type_color: Some("#00AA00".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.title, "Long ride");
    assert_eq!(updated.description, None);
    assert_eq!(updated.activity_date, tomorrow);
    let cycling = activities.activity_type_of(&updated).await.unwrap().unwrap();
    assert_eq!(cycling.name, "Cycling");
    assert_eq!(cycling.color, "#00AA00");

    activities.delete_activity(&user.id, &activity.id).await.unwrap();
    let err = activities.get_activity(&user.id, &activity.id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_list_user_activities_pages() {
    let (db, user) = open_with_user("kate").await;
    let other = db
        .users()
        .create_user(NewUser::new("leo", "leo@example.com", "pw"))
        .await
        .unwrap();
    let activities = db.activities();

    for i in 0..12 {
        activities
            .create_activity(&user.id, NewActivity::new(format!("set {}", i)))
            .await
            .unwrap();
    }
    activities
        .create_activity(&other.id, NewActivity::new("elsewhere"))
        .await
        .unwrap();

    let (page, total) = activities
        .list_user_activities(&user.id, Some(2), Some(5))
        .await
        .unwrap();
    assert_eq!(page.len(), 5);
    assert_eq!(total, 12);
    assert!(page.iter().all(|activity| activity.user_id == user.id));

    let (rest, _) = activities
        .list_user_activities(&user.id, Some(3), Some(5))
        .await
        .unwrap();
    assert_eq!(rest.len(), 2);
}

#[tokio::test]
async fn test_activity_type_management() {
    let db = Database::open(fast_config()).await.unwrap();
    let types = db.activity_types();

    let music = types.create_activity_type("Music", "#FF00FF").await.unwrap();
    let err = types
        .create_activity_type("Music", "#00FF00")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists(_)));

    let err = types.create_activity_type("Art", "red").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let renamed = types
        .update_activity_type(&music.id, Some("Concerts"), None)
        .await
        .unwrap();
    assert_eq!(renamed.name, "Concerts");
    assert_eq!(renamed.color, "#FF00FF");
    assert_eq!(
        types.get_by_name("Concerts").await.unwrap().map(|t| t.id),
        Some(music.id.clone())
    );

    types.delete_activity_type(&music.id).await.unwrap();
    let err = types.delete_activity_type(&music.id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_activity_type_update_errors_name_the_cause() {
    let db = Database::open(fast_config()).await.unwrap();
    let types = db.activity_types();
    types.create_activity_type("Yoga", "#112233").await.unwrap();
    let pilates = types.create_activity_type("Pilates", "#445566").await.unwrap();

    let recolored = types
        .update_activity_type(&pilates.id, None, Some("#ABCDEF"))
        .await
        .unwrap();
    assert_eq!(recolored.name, "Pilates");
    assert_eq!(recolored.color, "#ABCDEF");

    let err = types
        .update_activity_type(&pilates.id, Some("Yoga"), None)
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::AlreadyExists("activity type 'Yoga'".into()));

    let err = types
        .update_activity_type("missing", None, Some("#000000"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_referenced_rows_cannot_be_deleted() {
    let (db, user) = open_with_user("mia").await;
    let activity = db
        .activities()
        .create_activity(&user.id, NewActivity::new("Stretch"))
        .await
        .unwrap();

    let err = db.users().delete_user(&user.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClientData);

    let type_id = activity.type_id.clone().unwrap();
    let err = db
        .activity_types()
        .delete_activity_type(&type_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClientData);

    db.activities()
        .delete_activity(&user.id, &activity.id)
        .await
        .unwrap();
    db.users().delete_user(&user.id).await.unwrap();
    assert!(db.users().get_user(&user.id).await.unwrap_err().is_not_found());
}
