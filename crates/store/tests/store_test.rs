use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use isx_domain::model::{AccountRole, IsnVisibility, Permission};
use isx_store::{NewSignalVersion, SearchParams, Store, StoreError};

async fn open_store() -> Store {
    Store::connect("sqlite::memory:", 1, 1, Duration::from_secs(3600))
        .await
        .expect("in-memory store")
}

/// Owner account + private ISN + one signal type, the common fixture.
async fn seed(store: &Store) -> (Uuid, Uuid, Uuid) {
    let (account, _) = store.create_user("owner@example.org", "hash").await.unwrap();
    let isn = store
        .create_isn("isn-a", "ISN A", None, IsnVisibility::Private, account.id)
        .await
        .unwrap();
    let signal_type = store
        .create_signal_type(
            isn.id,
            "incident",
            "1.0.0",
            "Incident",
            "https://example.org/skip/validation/main/schema.json",
            "{}",
            None,
        )
        .await
        .unwrap();
    (account.id, isn.id, signal_type.id)
}

fn submission(account_id: Uuid, isn_id: Uuid, signal_type_id: Uuid, local_ref: &str) -> NewSignalVersion {
    NewSignalVersion {
        account_id,
        isn_id,
        signal_type_id,
        local_ref: local_ref.to_string(),
        content: r#"{"test":"ok"}"#.to_string(),
        batch_id: None,
        correlated_to_signal_id: None,
    }
}

fn search_all(isn_id: Uuid, signal_type_id: Uuid) -> SearchParams {
    SearchParams {
        isn_id,
        signal_type_id,
        start_date: None,
        end_date: None,
        account_id: None,
        signal_id: None,
        local_ref: None,
        include_withdrawn: false,
        limit: 100,
    }
}

#[tokio::test]
async fn first_user_is_owner_then_members() {
    let store = open_store().await;
    let (first, _) = store.create_user("a@x.org", "h1").await.unwrap();
    let (second, _) = store.create_user("b@x.org", "h2").await.unwrap();
    assert_eq!(first.role, AccountRole::Owner);
    assert_eq!(second.role, AccountRole::Member);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let store = open_store().await;
    store.create_user("a@x.org", "h").await.unwrap();
    let err = store.create_user("a@x.org", "h").await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn resubmission_increments_version_without_duplicating_signal() {
    let store = open_store().await;
    let (account_id, isn_id, type_id) = seed(&store).await;
    let new = submission(account_id, isn_id, type_id, "L1");

    let v1 = store.upsert_signal_version(&new).await.unwrap();
    let v2 = store.upsert_signal_version(&new).await.unwrap();

    assert_eq!(v1.version_number, 1);
    assert_eq!(v2.version_number, 2);
    assert_eq!(v1.signal_id, v2.signal_id);

    let rows = store.search_signals(&search_all(isn_id, type_id)).await.unwrap();
    assert_eq!(rows.len(), 1, "one logical signal");
    assert_eq!(rows[0].version_number, 2, "search returns latest version");
}

#[tokio::test]
async fn version_numbers_are_gapless_per_local_ref() {
    let store = open_store().await;
    let (account_id, isn_id, type_id) = seed(&store).await;

    for _ in 0..3 {
        store
            .upsert_signal_version(&submission(account_id, isn_id, type_id, "L1"))
            .await
            .unwrap();
    }
    store
        .upsert_signal_version(&submission(account_id, isn_id, type_id, "L2"))
        .await
        .unwrap();

    let rows = store.search_signals(&search_all(isn_id, type_id)).await.unwrap();
    let l1 = rows.iter().find(|r| r.local_ref == "L1").unwrap();
    let l2 = rows.iter().find(|r| r.local_ref == "L2").unwrap();
    assert_eq!(l1.version_number, 3);
    assert_eq!(l2.version_number, 1);

    let previous = store.previous_versions(l1.signal_id, l1.version_number).await.unwrap();
    let numbers: Vec<i64> = previous.iter().map(|(_, n, _, _)| *n).collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn withdraw_hides_then_resubmit_reactivates() {
    let store = open_store().await;
    let (account_id, isn_id, type_id) = seed(&store).await;
    let new = submission(account_id, isn_id, type_id, "L1");

    store.upsert_signal_version(&new).await.unwrap();
    store
        .withdraw_signal(account_id, isn_id, type_id, "L1")
        .await
        .unwrap();

    let visible = store.search_signals(&search_all(isn_id, type_id)).await.unwrap();
    assert!(visible.is_empty(), "withdrawn signals are excluded by default");

    let mut with_withdrawn = search_all(isn_id, type_id);
    with_withdrawn.include_withdrawn = true;
    let rows = store.search_signals(&with_withdrawn).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_withdrawn);

    let v = store.upsert_signal_version(&new).await.unwrap();
    assert_eq!(v.version_number, 2);
    let rows = store.search_signals(&search_all(isn_id, type_id)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].is_withdrawn, "resubmission reactivates");
}

#[tokio::test]
async fn at_most_one_latest_batch_per_isn_account() {
    let store = open_store().await;
    let (account_id, isn_id, _) = seed(&store).await;

    let first = store.create_batch(isn_id, account_id).await.unwrap();
    let second = store.create_batch(isn_id, account_id).await.unwrap();
    assert_ne!(first.id, second.id);

    let latest = store.latest_batch(isn_id, account_id).await.unwrap().unwrap();
    assert_eq!(latest.id, second.id, "new batch closes the previous one");
}

#[tokio::test]
async fn get_or_create_batch_reuses_latest() {
    let store = open_store().await;
    let (account_id, isn_id, _) = seed(&store).await;

    let a = store.get_or_create_latest_batch(isn_id, account_id).await.unwrap();
    let b = store.get_or_create_latest_batch(isn_id, account_id).await.unwrap();
    assert_eq!(a.id, b.id);
}

#[tokio::test]
async fn correlated_signals_are_one_hop() {
    let store = open_store().await;
    let (account_id, isn_id, type_id) = seed(&store).await;

    let target = store
        .upsert_signal_version(&submission(account_id, isn_id, type_id, "T"))
        .await
        .unwrap();

    let mut linked = submission(account_id, isn_id, type_id, "C1");
    linked.correlated_to_signal_id = Some(target.signal_id);
    store.upsert_signal_version(&linked).await.unwrap();

    let correlated = store.correlated_signals(target.signal_id, false).await.unwrap();
    assert_eq!(correlated.len(), 1);
    assert_eq!(correlated[0].local_ref, "C1");
    assert_eq!(correlated[0].correlated_to_signal_id, Some(target.signal_id));
}

#[tokio::test]
async fn search_filters_by_date_account_and_local_ref() {
    let store = open_store().await;
    let (account_id, isn_id, type_id) = seed(&store).await;
    store
        .upsert_signal_version(&submission(account_id, isn_id, type_id, "L1"))
        .await
        .unwrap();

    let mut params = search_all(isn_id, type_id);
    params.local_ref = Some("L1".to_string());
    assert_eq!(store.search_signals(&params).await.unwrap().len(), 1);

    params.local_ref = Some("other".to_string());
    assert!(store.search_signals(&params).await.unwrap().is_empty());

    let mut params = search_all(isn_id, type_id);
    params.end_date = Some(Utc::now() - chrono::Duration::hours(1));
    assert!(
        store.search_signals(&params).await.unwrap().is_empty(),
        "end_date before submission excludes it"
    );

    let mut params = search_all(isn_id, type_id);
    params.account_id = Some(Uuid::new_v4());
    assert!(store.search_signals(&params).await.unwrap().is_empty());
}

#[tokio::test]
async fn public_feed_lists_only_in_use_public_types() {
    let store = open_store().await;
    let (owner, _, _) = seed(&store).await;

    let public = store
        .create_isn("isn-p", "Public ISN", None, IsnVisibility::Public, owner)
        .await
        .unwrap();
    store
        .create_signal_type(public.id, "alert", "1.0.0", "Alert", "url", "{}", None)
        .await
        .unwrap();
    store
        .create_signal_type(public.id, "retired", "1.0.0", "Retired", "url", "{}", None)
        .await
        .unwrap();
    store
        .set_signal_type_in_use(public.id, "retired", "1.0.0", false)
        .await
        .unwrap();

    let rows = store.get_in_use_public_isn_signal_types().await.unwrap();
    assert_eq!(rows.len(), 1, "private ISN and retired type are excluded");
    assert_eq!(rows[0].isn_slug, "isn-p");
    assert_eq!(rows[0].signal_type_slug, "alert");
}

#[tokio::test]
async fn sem_ver_ordering_is_numeric() {
    let store = open_store().await;
    let (_, isn_id, _) = seed(&store).await;

    for v in ["9.0.0", "10.0.0", "2.0.0"] {
        store
            .create_signal_type(isn_id, "multi", v, "Multi", "url", "{}", None)
            .await
            .unwrap();
    }
    let latest = store.latest_sem_ver(isn_id, "multi").await.unwrap();
    assert_eq!(latest.as_deref(), Some("10.0.0"));
}

#[tokio::test]
async fn duplicate_signal_type_version_conflicts() {
    let store = open_store().await;
    let (_, isn_id, _) = seed(&store).await;
    let err = store
        .create_signal_type(isn_id, "incident", "1.0.0", "Incident", "url", "{}", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn refresh_token_round_trip_and_chain_revocation() {
    let store = open_store().await;
    let (account, _) = store.create_user("a@x.org", "h").await.unwrap();
    let expires = Utc::now() + chrono::Duration::days(30);

    store
        .insert_refresh_token(account.id, "hash-1", None, expires)
        .await
        .unwrap();
    store
        .insert_refresh_token(account.id, "hash-2", Some("hash-1"), expires)
        .await
        .unwrap();

    assert!(store.refresh_token_was_rotated("hash-1").await.unwrap());
    assert!(!store.refresh_token_was_rotated("hash-2").await.unwrap());

    let revoked = store.revoke_account_refresh_tokens(account.id).await.unwrap();
    assert_eq!(revoked, 2);
    let row = store.find_refresh_token("hash-2").await.unwrap().unwrap();
    assert!(row.revoked_at.is_some());
}

#[tokio::test]
async fn password_reset_token_is_single_use() {
    let store = open_store().await;
    let (account, _) = store.create_user("a@x.org", "h").await.unwrap();
    let expires = Utc::now() + chrono::Duration::hours(1);

    store
        .insert_password_reset_token(account.id, "reset-hash", expires)
        .await
        .unwrap();

    let first = store.consume_password_reset_token("reset-hash").await.unwrap();
    assert_eq!(first, Some(account.id));
    let second = store.consume_password_reset_token("reset-hash").await.unwrap();
    assert_eq!(second, None, "second consumption fails");
}

#[tokio::test]
async fn permission_grants_upsert_and_revoke() {
    let store = open_store().await;
    let (owner, isn_id, _) = seed(&store).await;
    let (member, _) = store.create_user("m@x.org", "h").await.unwrap();

    store
        .grant_isn_permission(isn_id, member.id, Permission::Read)
        .await
        .unwrap();
    store
        .grant_isn_permission(isn_id, member.id, Permission::Write)
        .await
        .unwrap();

    let grants = store.explicit_grants_for_account(member.id).await.unwrap();
    assert_eq!(grants.len(), 1, "grant upserts rather than duplicating");
    assert_eq!(grants[0].1, Permission::Write);

    store.revoke_isn_permission(isn_id, member.id).await.unwrap();
    assert!(store.explicit_grants_for_account(member.id).await.unwrap().is_empty());

    let owned = store.isns_owned_by(owner).await.unwrap();
    assert_eq!(owned.len(), 1);
}

#[tokio::test]
async fn client_secret_lifecycle() {
    let store = open_store().await;
    let (account, sa) = store
        .create_service_account("Acme Corp", "acme-corp-1234")
        .await
        .unwrap();
    assert_eq!(sa.client_id, "acme-corp-1234");

    let expires = Utc::now() + chrono::Duration::days(365);
    store
        .insert_client_secret(account.id, "secret-hash-1", expires)
        .await
        .unwrap();
    store
        .insert_client_secret(account.id, "secret-hash-2", expires)
        .await
        .unwrap();

    let latest = store.latest_active_client_secret(account.id).await.unwrap();
    assert!(latest.is_some());

    store.revoke_client_secrets(account.id).await.unwrap();
    assert!(store.latest_active_client_secret(account.id).await.unwrap().is_none());
}
