//! The auth facade used by handlers: registration, login, token issuance
//! and rotation, and service-account credentials.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use uuid::Uuid;

use isx_domain::model::{slugify, Account, AccountRole, Isn, Permission, ServiceAccount, User};
use isx_store::Store;

use crate::error::{AuthError, Result};
use crate::jwt::{Claims, IsnPermClaim, TokenVerifier, ACCESS_TOKEN_TTL};
use crate::password::{hash_password, validate_password, verify_password};
use crate::tokens::{generate_opaque_token, hash_opaque_token, secret_matches, REFRESH_TOKEN_TTL};

const CLIENT_SECRET_TTL_DAYS: i64 = 365;
const PASSWORD_RESET_TTL_HOURS: i64 = 1;

/// A successful authentication: access token plus, for user logins, the
/// plaintext refresh token to be set as a cookie.
#[derive(Debug, Clone)]
pub struct Session {
    pub account: Account,
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
}

/// A newly issued client secret — the plaintext is shown exactly once.
#[derive(Debug, Clone)]
pub struct IssuedSecret {
    pub client_id: String,
    pub client_secret: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuthService {
    store: Store,
    verifier: TokenVerifier,
}

impl AuthService {
    pub fn new(store: Store, secret_key: &str) -> Self {
        AuthService {
            store,
            verifier: TokenVerifier::new(secret_key),
        }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    // ── registration & login ────────────────────────────────────────

    /// Register a user. Emails are stored lowercase; the first registrant
    /// becomes owner (enforced by the store).
    pub async fn register_user(&self, email: &str, password: &str) -> Result<(Account, User)> {
        let email = normalize_email(email)?;
        validate_password(password)?;
        let hash = hash_password(password)?;
        Ok(self.store.create_user(&email, &hash).await?)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let email = normalize_email(email)?;
        let credentials = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &credentials.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        if !credentials.account.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let refresh = self.issue_refresh_token(credentials.account.id, None).await?;
        self.session(credentials.account, Some(refresh)).await
    }

    // ── access tokens ───────────────────────────────────────────────

    /// Issue an access token for an account, baking the resolved per-ISN
    /// permissions into the claims.
    pub async fn session(&self, account: Account, refresh_token: Option<String>) -> Result<Session> {
        let isn_perms = self.build_isn_perms(&account).await?;
        let claims = Claims::new(account.id, account.kind, account.role, isn_perms);
        let access_token = self.verifier.sign(&claims)?;
        Ok(Session {
            account,
            access_token,
            expires_in: ACCESS_TOKEN_TTL.as_secs(),
            refresh_token,
        })
    }

    /// Union of implicit grants (global owner → write everywhere, ISN owner
    /// → write on own) and explicit grants. Explicit grants widen, never
    /// narrow.
    async fn build_isn_perms(&self, account: &Account) -> Result<HashMap<String, IsnPermClaim>> {
        let mut entries: HashMap<String, (Isn, Permission, bool)> = HashMap::new();

        if account.role == AccountRole::Owner {
            for isn in self.store.list_isns().await? {
                entries.insert(isn.slug.clone(), (isn, Permission::Write, true));
            }
        } else {
            for isn in self.store.isns_owned_by(account.id).await? {
                entries.insert(isn.slug.clone(), (isn, Permission::Write, true));
            }
        }

        for (isn, permission) in self.store.explicit_grants_for_account(account.id).await? {
            entries
                .entry(isn.slug.clone())
                .and_modify(|(_, existing, _)| {
                    if permission == Permission::Write {
                        *existing = Permission::Write;
                    }
                })
                .or_insert((isn, permission, false));
        }

        let mut perms = HashMap::new();
        for (slug, (isn, permission, isn_admin)) in entries {
            let signal_type_paths = self.store.in_use_signal_type_paths(isn.id).await?;
            let signal_batch_id = if permission == Permission::Write {
                self.store
                    .latest_batch(isn.id, account.id)
                    .await?
                    .map(|b| b.id)
            } else {
                None
            };
            perms.insert(
                slug,
                IsnPermClaim {
                    permission,
                    signal_batch_id,
                    signal_type_paths,
                    visibility: isn.visibility,
                    isn_admin,
                },
            );
        }
        Ok(perms)
    }

    // ── refresh tokens ──────────────────────────────────────────────

    async fn issue_refresh_token(
        &self,
        account_id: Uuid,
        previous_hash: Option<&str>,
    ) -> Result<String> {
        let plain = generate_opaque_token();
        let expires_at = Utc::now() + ChronoDuration::seconds(REFRESH_TOKEN_TTL.as_secs() as i64);
        self.store
            .insert_refresh_token(account_id, &hash_opaque_token(&plain), previous_hash, expires_at)
            .await?;
        Ok(plain)
    }

    /// Rotate a presented refresh token. Replaying an already-rotated token
    /// revokes the whole chain for the account.
    pub async fn rotate_refresh_token(&self, presented: &str) -> Result<Session> {
        let presented_hash = hash_opaque_token(presented);
        let row = self
            .store
            .find_refresh_token(&presented_hash)
            .await?
            .ok_or_else(|| AuthError::InvalidToken("unknown refresh token".into()))?;

        if row.revoked_at.is_some() {
            if self.store.refresh_token_was_rotated(&presented_hash).await? {
                let revoked = self
                    .store
                    .revoke_account_refresh_tokens(row.account_id)
                    .await?;
                tracing::warn!(
                    account_id = %row.account_id,
                    revoked,
                    "refresh token reuse detected, chain revoked"
                );
                return Err(AuthError::TokenReuseDetected);
            }
            return Err(AuthError::InvalidToken("refresh token revoked".into()));
        }
        if row.expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }

        let account = self
            .store
            .get_account(row.account_id)
            .await?
            .ok_or_else(|| AuthError::InvalidToken("account gone".into()))?;
        if !account.is_active {
            return Err(AuthError::AccountDisabled);
        }

        self.store.revoke_refresh_token(row.id).await?;
        let next = self
            .issue_refresh_token(account.id, Some(&presented_hash))
            .await?;
        self.session(account, Some(next)).await
    }

    /// Revoke the presented refresh token (logout / `POST /oauth/revoke`).
    pub async fn revoke_presented_refresh_token(&self, presented: &str) -> Result<()> {
        let row = self
            .store
            .find_refresh_token(&hash_opaque_token(presented))
            .await?
            .ok_or_else(|| AuthError::InvalidToken("unknown refresh token".into()))?;
        self.store.revoke_refresh_token(row.id).await?;
        Ok(())
    }

    // ── client credentials ──────────────────────────────────────────

    /// `grant_type=client_credentials`: validate against the most recent
    /// live secret hash. Issues an access token only — no refresh token.
    pub async fn client_credentials(&self, client_id: &str, client_secret: &str) -> Result<Session> {
        let (account, _sa) = self
            .store
            .find_service_account_by_client_id(client_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !account.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let stored_hash = self
            .store
            .latest_active_client_secret(account.id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !secret_matches(client_secret, &stored_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        self.session(account, None).await
    }

    /// Create a service account. The client id is derived from the
    /// organization name with a random suffix to keep it unique.
    pub async fn create_service_account(
        &self,
        organization: &str,
    ) -> Result<(Account, ServiceAccount, IssuedSecret)> {
        let base = slugify(organization);
        if base.is_empty() {
            return Err(AuthError::InvalidInput(
                "organization name must contain at least one alphanumeric character".into(),
            ));
        }

        let mut client_id = format!("{base}-{}", random_suffix());
        while self.store.client_id_exists(&client_id).await? {
            client_id = format!("{base}-{}", random_suffix());
        }

        let (account, sa) = self
            .store
            .create_service_account(organization, &client_id)
            .await?;
        let secret = self.issue_client_secret(account.id, &client_id).await?;
        Ok((account, sa, secret))
    }

    /// Revoke all live secrets for the client and issue a fresh one.
    pub async fn rotate_client_secret(&self, client_id: &str) -> Result<IssuedSecret> {
        let (account, _) = self
            .store
            .find_service_account_by_client_id(client_id)
            .await?
            .ok_or(isx_store::StoreError::NotFound)?;
        self.store.revoke_client_secrets(account.id).await?;
        self.issue_client_secret(account.id, client_id).await
    }

    async fn issue_client_secret(&self, account_id: Uuid, client_id: &str) -> Result<IssuedSecret> {
        let plain = generate_opaque_token();
        let expires_at = Utc::now() + ChronoDuration::days(CLIENT_SECRET_TTL_DAYS);
        self.store
            .insert_client_secret(account_id, &hash_opaque_token(&plain), expires_at)
            .await?;
        Ok(IssuedSecret {
            client_id: client_id.to_string(),
            client_secret: plain,
            expires_at,
        })
    }

    // ── password reset ──────────────────────────────────────────────

    /// Issue a single-use reset token. Returns `None` for unknown emails so
    /// the endpoint cannot be used to probe for accounts.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>> {
        let email = normalize_email(email)?;
        let account = match self.store.find_account_by_email(&email).await? {
            Some(a) if a.is_active => a,
            _ => return Ok(None),
        };

        let plain = generate_opaque_token();
        let expires_at = Utc::now() + ChronoDuration::hours(PASSWORD_RESET_TTL_HOURS);
        self.store
            .insert_password_reset_token(account.id, &hash_opaque_token(&plain), expires_at)
            .await?;
        Ok(Some(plain))
    }

    /// Consume the token and set the new password atomically; every live
    /// refresh token for the account is revoked.
    pub async fn confirm_password_reset(&self, token: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;
        let account_id = self
            .store
            .consume_password_reset_token(&hash_opaque_token(token))
            .await?
            .ok_or_else(|| AuthError::InvalidToken("invalid or expired reset token".into()))?;

        let hash = hash_password(new_password)?;
        self.store.update_password(account_id, &hash).await?;
        self.store.revoke_account_refresh_tokens(account_id).await?;
        Ok(())
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(email)
}

fn random_suffix() -> String {
    let mut bytes = [0u8; 2];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
