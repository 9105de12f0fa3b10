use std::time::Duration;

use isx_auth::{AuthError, AuthService};
use isx_domain::model::{AccountRole, IsnVisibility, Permission};
use isx_store::Store;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

async fn service() -> (AuthService, Store) {
    let store = Store::connect("sqlite::memory:", 1, 1, Duration::from_secs(3600))
        .await
        .expect("in-memory store");
    (AuthService::new(store.clone(), SECRET), store)
}

#[tokio::test]
async fn register_then_login_yields_matching_subject() {
    let (auth, _) = service().await;
    let (account, user) = auth
        .register_user("A@X.org", "passwordAAA")
        .await
        .expect("register");
    assert_eq!(user.email, "a@x.org", "email stored lowercase");
    assert_eq!(account.role, AccountRole::Owner);

    // Case-insensitive login.
    let session = auth.login("a@X.ORG", "passwordAAA").await.expect("login");
    let claims = auth.verifier().verify(&session.access_token).unwrap();
    assert_eq!(claims.sub, account.id);
    assert!(session.refresh_token.is_some());
}

#[tokio::test]
async fn short_password_rejected() {
    let (auth, _) = service().await;
    let err = auth.register_user("a@x.org", "tencharss!").await.unwrap_err();
    assert!(matches!(err, AuthError::WeakPassword(_)));
}

#[tokio::test]
async fn bad_password_and_disabled_account() {
    let (auth, store) = service().await;
    let (account, _) = auth.register_user("a@x.org", "passwordAAA").await.unwrap();

    assert!(matches!(
        auth.login("a@x.org", "wrong-password").await,
        Err(AuthError::InvalidCredentials)
    ));

    store.set_account_active(account.id, false).await.unwrap();
    assert!(matches!(
        auth.login("a@x.org", "passwordAAA").await,
        Err(AuthError::AccountDisabled)
    ));
}

#[tokio::test]
async fn rotation_chain_and_reuse_detection() {
    let (auth, _) = service().await;
    auth.register_user("a@x.org", "passwordAAA").await.unwrap();
    let session = auth.login("a@x.org", "passwordAAA").await.unwrap();
    let first = session.refresh_token.unwrap();

    let second = auth
        .rotate_refresh_token(&first)
        .await
        .unwrap()
        .refresh_token
        .unwrap();
    let third = auth
        .rotate_refresh_token(&second)
        .await
        .unwrap()
        .refresh_token
        .unwrap();
    assert_ne!(first, second);
    assert_ne!(second, third);

    // Replaying a rotated token trips reuse detection...
    assert!(matches!(
        auth.rotate_refresh_token(&first).await,
        Err(AuthError::TokenReuseDetected)
    ));
    // ...and the whole chain is dead, including the newest link.
    assert!(matches!(
        auth.rotate_refresh_token(&third).await,
        Err(AuthError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn unknown_refresh_token_rejected() {
    let (auth, _) = service().await;
    assert!(matches!(
        auth.rotate_refresh_token("deadbeef").await,
        Err(AuthError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn owner_claims_carry_write_on_all_isns() {
    let (auth, store) = service().await;
    let (owner, _) = auth.register_user("o@x.org", "passwordAAA").await.unwrap();
    let isn = store
        .create_isn("isn-a", "A", None, IsnVisibility::Private, owner.id)
        .await
        .unwrap();
    store
        .create_signal_type(isn.id, "incident", "1.0.0", "Incident", "url", "{}", None)
        .await
        .unwrap();

    let session = auth.login("o@x.org", "passwordAAA").await.unwrap();
    let claims = auth.verifier().verify(&session.access_token).unwrap();

    let perm = claims.isn_perm("isn-a").expect("owner sees the ISN");
    assert_eq!(perm.permission, Permission::Write);
    assert!(perm.isn_admin);
    assert_eq!(perm.signal_type_paths, vec!["incident/v1.0.0".to_string()]);
    assert!(perm.signal_batch_id.is_none(), "no batch opened yet");
}

#[tokio::test]
async fn member_claims_reflect_explicit_grants_only() {
    let (auth, store) = service().await;
    let (owner, _) = auth.register_user("o@x.org", "passwordAAA").await.unwrap();
    let (member, _) = auth.register_user("m@x.org", "passwordAAA").await.unwrap();
    let isn = store
        .create_isn("isn-a", "A", None, IsnVisibility::Private, owner.id)
        .await
        .unwrap();

    let session = auth.login("m@x.org", "passwordAAA").await.unwrap();
    let claims = auth.verifier().verify(&session.access_token).unwrap();
    assert!(claims.isn_perm("isn-a").is_none());

    store
        .grant_isn_permission(isn.id, member.id, Permission::Read)
        .await
        .unwrap();
    let session = auth.login("m@x.org", "passwordAAA").await.unwrap();
    let claims = auth.verifier().verify(&session.access_token).unwrap();
    let perm = claims.isn_perm("isn-a").unwrap();
    assert_eq!(perm.permission, Permission::Read);
    assert!(!perm.isn_admin);
    assert!(!claims.has_isn_permission("isn-a", Permission::Write));
}

#[tokio::test]
async fn write_claims_carry_open_batch_id() {
    let (auth, store) = service().await;
    let (owner, _) = auth.register_user("o@x.org", "passwordAAA").await.unwrap();
    let isn = store
        .create_isn("isn-a", "A", None, IsnVisibility::Private, owner.id)
        .await
        .unwrap();
    let batch = store.create_batch(isn.id, owner.id).await.unwrap();

    let session = auth.login("o@x.org", "passwordAAA").await.unwrap();
    let claims = auth.verifier().verify(&session.access_token).unwrap();
    assert_eq!(claims.isn_perm("isn-a").unwrap().signal_batch_id, Some(batch.id));
}

#[tokio::test]
async fn client_credentials_issue_access_token_without_refresh() {
    let (auth, _) = service().await;
    let (_, sa, secret) = auth.create_service_account("Acme Corp").await.unwrap();
    assert!(sa.client_id.starts_with("acme-corp-"));

    let session = auth
        .client_credentials(&sa.client_id, &secret.client_secret)
        .await
        .expect("valid client credentials");
    assert!(session.refresh_token.is_none());

    assert!(matches!(
        auth.client_credentials(&sa.client_id, "wrong-secret").await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        auth.client_credentials("no-such-client", &secret.client_secret).await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn rotated_client_secret_invalidates_old_one() {
    let (auth, _) = service().await;
    let (_, sa, old) = auth.create_service_account("Acme Corp").await.unwrap();
    let new = auth.rotate_client_secret(&sa.client_id).await.unwrap();

    assert!(auth
        .client_credentials(&sa.client_id, &new.client_secret)
        .await
        .is_ok());
    assert!(matches!(
        auth.client_credentials(&sa.client_id, &old.client_secret).await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn password_reset_flow() {
    let (auth, _) = service().await;
    auth.register_user("a@x.org", "passwordAAA").await.unwrap();

    // Unknown emails do not reveal whether an account exists.
    assert!(auth
        .request_password_reset("nobody@x.org")
        .await
        .unwrap()
        .is_none());

    let token = auth
        .request_password_reset("a@x.org")
        .await
        .unwrap()
        .expect("reset token");
    auth.confirm_password_reset(&token, "newPasswordBBB")
        .await
        .expect("confirm");

    assert!(matches!(
        auth.login("a@x.org", "passwordAAA").await,
        Err(AuthError::InvalidCredentials)
    ));
    auth.login("a@x.org", "newPasswordBBB").await.expect("new password works");

    // Single use.
    assert!(matches!(
        auth.confirm_password_reset(&token, "anotherPassCCC").await,
        Err(AuthError::InvalidToken(_))
    ));
}
