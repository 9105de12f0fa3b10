//! Core data model: accounts, ISNs, signal types, batches, signals.
//!
//! These are the persisted shapes; wire-facing views live beside the
//! handlers that serve them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Accounts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    User,
    ServiceAccount,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountKind::User => "user",
            AccountKind::ServiceAccount => "service_account",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(AccountKind::User),
            "service_account" => Some(AccountKind::ServiceAccount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Owner,
    Admin,
    Member,
}

impl AccountRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountRole::Owner => "owner",
            AccountRole::Admin => "admin",
            AccountRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(AccountRole::Owner),
            "admin" => Some(AccountRole::Admin),
            "member" => Some(AccountRole::Member),
            _ => None,
        }
    }

    /// Owner and admin may manage ISNs and accounts.
    pub fn is_admin(self) -> bool {
        matches!(self, AccountRole::Owner | AccountRole::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub kind: AccountKind,
    pub role: AccountRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub account_id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub account_id: Uuid,
    pub organization: String,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ISNs and signal types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsnVisibility {
    Public,
    Private,
}

impl IsnVisibility {
    pub fn as_str(self) -> &'static str {
        match self {
            IsnVisibility::Public => "public",
            IsnVisibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(IsnVisibility::Public),
            "private" => Some(IsnVisibility::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Isn {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub detail: Option<String>,
    pub visibility: IsnVisibility,
    pub is_in_use: bool,
    pub owner_account_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Versioned, JSON-Schema-validated payload shape inside an ISN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalType {
    pub id: Uuid,
    pub isn_id: Uuid,
    pub slug: String,
    pub sem_ver: String,
    pub title: String,
    pub schema_url: String,
    /// Raw schema document; compiled once by the schema cache.
    pub schema_content: String,
    pub readme_url: Option<String>,
    pub is_in_use: bool,
    pub created_at: DateTime<Utc>,
}

impl SignalType {
    /// Path identifying this signal type inside its ISN.
    pub fn path(&self) -> String {
        signal_type_path(&self.slug, &self.sem_ver)
    }
}

/// `"{slug}/v{sem_ver}"`.
pub fn signal_type_path(slug: &str, sem_ver: &str) -> String {
    format!("{slug}/v{sem_ver}")
}

/// Reserved schema-URL suffix meaning "accept any JSON payload".
pub const SKIP_VALIDATION_SUFFIX: &str = "/skip/validation/main/schema.json";

pub fn is_skip_validation_url(url: &str) -> bool {
    url.ends_with(SKIP_VALIDATION_SUFFIX)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Permissions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Permission::Read),
            "write" => Some(Permission::Write),
            _ => None,
        }
    }

    /// Write subsumes read.
    pub fn allows(self, required: Permission) -> bool {
        match required {
            Permission::Read => true,
            Permission::Write => self == Permission::Write,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Batches and signals
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub isn_id: Uuid,
    pub account_id: Uuid,
    pub is_latest: bool,
    pub created_at: DateTime<Utc>,
}

/// Logical signal identity: `(account, isn, signal_type, local_ref)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub account_id: Uuid,
    pub isn_id: Uuid,
    pub signal_type_id: Uuid,
    pub local_ref: String,
    pub is_withdrawn: bool,
    pub created_at: DateTime<Utc>,
}

/// Append-only version row. `version_number` starts at 1 and is gapless
/// per signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalVersion {
    pub id: Uuid,
    pub signal_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub version_number: i64,
    pub content: serde_json::Value,
    pub correlated_to_signal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ── slugs ───────────────────────────────────────────────────────────

/// URL-safe slug: lowercase alphanumerics and hyphens, non-empty, no
/// leading/trailing hyphen.
pub fn is_valid_slug(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Lowercase a free-text name into a slug, collapsing runs of
/// non-alphanumerics into single hyphens.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_hyphen = true;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            out.push('-');
            last_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_validation() {
        assert!(is_valid_slug("isn-a"));
        assert!(is_valid_slug("a2"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("trailing-"));
        assert!(!is_valid_slug("Upper"));
        assert!(!is_valid_slug("has space"));
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Acme Corp. (EU)"), "acme-corp-eu");
        assert_eq!(slugify("--x--"), "x");
    }

    #[test]
    fn signal_type_path_format() {
        assert_eq!(signal_type_path("incident", "1.0.0"), "incident/v1.0.0");
    }

    #[test]
    fn skip_validation_detection() {
        assert!(is_skip_validation_url(
            "https://github.com/skip/validation/main/schema.json"
        ));
        assert!(!is_skip_validation_url(
            "https://github.com/org/repo/blob/main/schema.json"
        ));
    }

    #[test]
    fn write_subsumes_read() {
        assert!(Permission::Write.allows(Permission::Read));
        assert!(Permission::Write.allows(Permission::Write));
        assert!(Permission::Read.allows(Permission::Read));
        assert!(!Permission::Read.allows(Permission::Write));
    }
}
