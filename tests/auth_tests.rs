/// Authentication tests
///
/// Login, refresh-token rotation and access-token lookup
/// Run with: cargo test --test auth_tests

use activity_tracker::auth::{AuthConfig, AuthService, MemoryTokenStore, TokenStore};
use activity_tracker::services::{NewUser, UserUpdate};
use activity_tracker::{AppConfig, Database, ErrorKind, ServiceError};
use std::sync::Arc;
use std::time::Duration;

async fn setup(config: AuthConfig) -> (Database, AuthService, Arc<MemoryTokenStore>) {
    let mut app = AppConfig::default();
    app.auth = config.bcrypt_cost(4);
    let db = Database::open(app).await.unwrap();
    db.users()
        .create_user(NewUser::new("nora", "nora@example.com", "pa55word"))
        .await
        .unwrap();

    let tokens = Arc::new(MemoryTokenStore::new());
    let auth = db.auth(Arc::clone(&tokens) as Arc<dyn TokenStore>);
    (db, auth, tokens)
}

#[tokio::test]
async fn test_login_issues_bearer_pair() {
    let (_db, auth, _tokens) = setup(AuthConfig::default()).await;

    let pair = auth.login("nora", "pa55word").await.unwrap();
    assert_eq!(pair.token_type, "bearer");
    assert_ne!(pair.access_token, pair.refresh_token);

    let user = auth.current_user(&pair.access_token).await.unwrap();
    assert_eq!(user.username, "nora");
    assert_eq!(user.version, 2);
}

#[tokio::test]
async fn test_login_with_bad_credentials() {
    let (_db, auth, tokens) = setup(AuthConfig::default()).await;

    let err = auth.login("nora", "wrong").await.unwrap_err();
    assert_eq!(err, ServiceError::InvalidCredentials);
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(auth.login("nobody", "pa55word").await.is_err());
    assert!(tokens.is_empty().await);
}

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let (_db, auth, _tokens) = setup(AuthConfig::default()).await;
    let first = auth.login("nora", "pa55word").await.unwrap();

    let second = auth.refresh(&first.refresh_token).await.unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);
    assert!(auth.current_user(&second.access_token).await.is_ok());

    let err = auth.refresh(&first.refresh_token).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken(_)));

    assert!(auth.refresh(&second.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_new_login_revokes_previous_refresh_token() {
    let (_db, auth, _tokens) = setup(AuthConfig::default()).await;
    let first = auth.login("nora", "pa55word").await.unwrap();
    let second = auth.login("nora", "pa55word").await.unwrap();

    assert!(auth.refresh(&first.refresh_token).await.is_err());
    assert!(auth.refresh(&second.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_unknown_access_token() {
    let (_db, auth, _tokens) = setup(AuthConfig::default()).await;
    let err = auth.current_user("made-up").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken(_)));
}

#[tokio::test]
async fn test_access_token_expires() {
    let (_db, auth, _tokens) =
        setup(AuthConfig::default().access_ttl(Duration::from_millis(50))).await;
    let pair = auth.login("nora", "pa55word").await.unwrap();
    assert!(auth.current_user(&pair.access_token).await.is_ok());

    tokio::time::sleep(Duration::from_millis(80)).await;
    let err = auth.current_user(&pair.access_token).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken(_)));
}

#[tokio::test]
async fn test_tokens_of_renamed_user_stop_working() {
    let (db, auth, _tokens) = setup(AuthConfig::default()).await;
    let pair = auth.login("nora", "pa55word").await.unwrap();
    let user = auth.current_user(&pair.access_token).await.unwrap();

    db.users()
        .update_user(
            &user.id,
            UserUpdate {
                username: Some("nora2".into()),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();

    assert!(auth.current_user(&pair.access_token).await.is_err());
    assert!(auth.refresh(&pair.refresh_token).await.is_err());
}
