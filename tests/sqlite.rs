#![cfg(feature = "sqlite")]

use std::sync::Arc;

use chrono::Duration;
use sesame::{
    Destination, Issuance, Redemption, RequestContext, Role, Sesame, User,
    notifier::TracingNotifier,
    repositories::{MarkUsed, RepositoryProvider, TokenRepository, UserRepository},
    sqlite::SqliteRepositories,
};
use sqlx::sqlite::SqlitePoolOptions;

async fn sqlite_repos() -> Arc<SqliteRepositories> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    // A single connection keeps every query on the same in-memory
    // database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    let repos = Arc::new(SqliteRepositories::new(pool));
    repos.migrate().await.unwrap();
    repos
}

async fn seed_user(repos: &SqliteRepositories, email: &str, role: Role) -> User {
    let user = User::builder()
        .email(email.to_string())
        .role(role)
        .build()
        .unwrap();
    repos.users().insert(&user).await.unwrap();
    user
}

#[tokio::test]
async fn test_sqlite_full_flow() {
    let repos = sqlite_repos().await;
    seed_user(&repos, "alice@example.com", Role::Operations).await;

    let auth = Sesame::new(repos.clone(), Arc::new(TracingNotifier));
    auth.health_check().await.unwrap();

    let ctx = RequestContext::new(Some("127.0.0.1".to_string()), None);
    let outcome = auth.issue_magic_link("alice@example.com", &ctx).await.unwrap();
    let token = match outcome {
        Issuance::LinkSent { token } => token.token,
        other => panic!("expected LinkSent, got {other:?}"),
    };

    match auth.redeem_magic_link(&token, &ctx).await.unwrap() {
        Redemption::Granted {
            user,
            session,
            destination,
        } => {
            assert_eq!(user.email, "alice@example.com");
            assert_eq!(destination, Destination::Operations);
            let fetched = auth.get_session(&session.token).await.unwrap();
            assert_eq!(fetched.user_id, user.id);
        }
        other => panic!("expected Granted, got {other:?}"),
    }

    assert!(matches!(
        auth.redeem_magic_link(&token, &ctx).await.unwrap(),
        Redemption::AlreadyUsed
    ));
}

#[tokio::test]
async fn test_sqlite_user_roundtrip_preserves_role_and_flags() {
    let repos = sqlite_repos().await;

    let mut user = User::builder()
        .email("bob@example.com".to_string())
        .name(Some("Bob".to_string()))
        .role(Role::Client)
        .build()
        .unwrap();
    user.is_active = false;
    repos.users().insert(&user).await.unwrap();

    let loaded = repos
        .users()
        .find_by_email("bob@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.id, user.id);
    assert_eq!(loaded.name.as_deref(), Some("Bob"));
    assert_eq!(loaded.role, Role::Client);
    assert!(!loaded.is_active);

    let by_id = repos.users().find_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(by_id.email, "bob@example.com");
}

#[tokio::test]
async fn test_sqlite_conditional_update_consumes_once() {
    let repos = sqlite_repos().await;
    let user = seed_user(&repos, "alice@example.com", Role::Operations).await;

    let tokens = repos.tokens();
    let token = tokens.create(&user.id, Duration::minutes(15)).await.unwrap();

    assert_eq!(
        tokens.mark_used(&token.token).await.unwrap(),
        MarkUsed::Consumed
    );
    assert_eq!(
        tokens.mark_used(&token.token).await.unwrap(),
        MarkUsed::AlreadyUsed
    );
    assert_eq!(
        tokens.mark_used("never-issued").await.unwrap(),
        MarkUsed::NotFound
    );

    let stored = tokens.find_by_token(&token.token).await.unwrap().unwrap();
    assert!(stored.used());
}

#[tokio::test]
async fn test_sqlite_latest_unused_for() {
    let repos = sqlite_repos().await;
    let user = seed_user(&repos, "alice@example.com", Role::Client).await;

    let tokens = repos.tokens();
    assert!(tokens.latest_unused_for(&user.id).await.unwrap().is_none());

    let consumed = tokens.create(&user.id, Duration::minutes(15)).await.unwrap();
    tokens.mark_used(&consumed.token).await.unwrap();
    tokens.create(&user.id, Duration::seconds(-5)).await.unwrap();

    assert!(tokens.latest_unused_for(&user.id).await.unwrap().is_none());

    let live = tokens.create(&user.id, Duration::minutes(15)).await.unwrap();
    let latest = tokens.latest_unused_for(&user.id).await.unwrap().unwrap();
    assert_eq!(latest.token, live.token);
}

#[tokio::test]
async fn test_sqlite_cleanup_expired_tokens() {
    let repos = sqlite_repos().await;
    let user = seed_user(&repos, "alice@example.com", Role::Client).await;

    let tokens = repos.tokens();
    tokens.create(&user.id, Duration::seconds(-10)).await.unwrap();
    tokens.create(&user.id, Duration::seconds(-10)).await.unwrap();
    let live = tokens.create(&user.id, Duration::minutes(15)).await.unwrap();

    assert_eq!(tokens.cleanup_expired().await.unwrap(), 2);
    assert!(tokens.find_by_token(&live.token).await.unwrap().is_some());
}

#[tokio::test]
async fn test_sqlite_expired_token_redeems_as_expired() {
    let repos = sqlite_repos().await;
    let user = seed_user(&repos, "alice@example.com", Role::Client).await;

    let token = repos
        .tokens()
        .create(&user.id, Duration::seconds(-1))
        .await
        .unwrap();

    let auth = Sesame::new(repos, Arc::new(TracingNotifier));
    assert!(matches!(
        auth.redeem_magic_link(&token.token, &RequestContext::default())
            .await
            .unwrap(),
        Redemption::Expired
    ));
}
