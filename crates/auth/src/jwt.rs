//! Access tokens: HS256 JWTs carrying the caller's resolved role and
//! per-ISN permissions, so the middleware never touches the database.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use isx_domain::model::{AccountKind, AccountRole, IsnVisibility, Permission};

use crate::error::{AuthError, Result};

pub const TOKEN_ISSUER: &str = "isx";
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Per-ISN entry under the `isn_perms` claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsnPermClaim {
    pub permission: Permission,
    /// Current open batch, present only for write-permitted accounts that
    /// have one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signal_batch_id: Option<Uuid>,
    pub signal_type_paths: Vec<String>,
    pub visibility: IsnVisibility,
    /// True when the account owns the ISN or is the global owner.
    pub isn_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub account_type: AccountKind,
    pub role: AccountRole,
    pub isn_perms: HashMap<String, IsnPermClaim>,
}

impl Claims {
    pub fn new(
        account_id: Uuid,
        account_type: AccountKind,
        role: AccountRole,
        isn_perms: HashMap<String, IsnPermClaim>,
    ) -> Self {
        let now = Utc::now().timestamp();
        Claims {
            sub: account_id,
            iss: TOKEN_ISSUER.to_string(),
            iat: now,
            exp: now + ACCESS_TOKEN_TTL.as_secs() as i64,
            account_type,
            role,
            isn_perms,
        }
    }

    /// Permission entry for one ISN, if any.
    pub fn isn_perm(&self, isn_slug: &str) -> Option<&IsnPermClaim> {
        self.isn_perms.get(isn_slug)
    }

    /// Whether the caller holds at least `required` on the ISN.
    pub fn has_isn_permission(&self, isn_slug: &str, required: Permission) -> bool {
        self.isn_perm(isn_slug)
            .map(|p| p.permission.allows(required))
            .unwrap_or(false)
    }
}

/// Signs and verifies access tokens with the process-wide secret.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        TokenVerifier {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenVerifier {
        TokenVerifier::new("0123456789abcdef0123456789abcdef")
    }

    fn claims() -> Claims {
        let mut perms = HashMap::new();
        perms.insert(
            "isn-a".to_string(),
            IsnPermClaim {
                permission: Permission::Write,
                signal_batch_id: None,
                signal_type_paths: vec!["incident/v1.0.0".to_string()],
                visibility: IsnVisibility::Private,
                isn_admin: true,
            },
        );
        Claims::new(Uuid::new_v4(), AccountKind::User, AccountRole::Owner, perms)
    }

    #[test]
    fn sign_verify_round_trip() {
        let signer = signer();
        let claims = claims();
        let token = signer.sign(&claims).unwrap();
        let decoded = signer.verify(&token).unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.role, AccountRole::Owner);
        assert!(decoded.has_isn_permission("isn-a", Permission::Write));
        assert!(!decoded.has_isn_permission("isn-b", Permission::Read));
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = signer().sign(&claims()).unwrap();
        let other = TokenVerifier::new("another-secret-another-secret-ab");
        assert!(matches!(
            other.verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_token_rejected() {
        let signer = signer();
        let mut claims = claims();
        claims.iat -= 7200;
        claims.exp = claims.iat + 60;
        let token = signer.sign(&claims).unwrap();
        assert!(matches!(signer.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn garbage_is_invalid_token() {
        assert!(matches!(
            signer().verify("not.a.jwt"),
            Err(AuthError::InvalidToken(_))
        ));
    }
}
