//! Account queries: users, service accounts, roles, activation.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use isx_domain::model::{Account, AccountKind, AccountRole, ServiceAccount, User};

use crate::db::{col_time, col_uuid, now_millis, Store};
use crate::error::{conflict_on_unique, Result, StoreError};

/// A user row joined with its account and stored password hash, as needed
/// by login.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub account: Account,
    pub user: User,
    pub password_hash: String,
}

pub(crate) fn account_from_row(row: &SqliteRow) -> Result<Account> {
    let kind_raw: String = row.try_get("kind")?;
    let role_raw: String = row.try_get("role")?;
    Ok(Account {
        id: col_uuid(row, "id")?,
        kind: AccountKind::parse(&kind_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("kind: {kind_raw}")))?,
        role: AccountRole::parse(&role_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("role: {role_raw}")))?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        created_at: col_time(row, "created_at")?,
    })
}

impl Store {
    /// Register a user. The very first user in the system becomes owner;
    /// everyone after is a member. Email must already be lowercased.
    pub async fn create_user(&self, email: &str, password_hash: &str) -> Result<(Account, User)> {
        let mut tx = self.pool.begin().await?;

        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await?;
        let role = if user_count == 0 {
            AccountRole::Owner
        } else {
            AccountRole::Member
        };

        let account_id = Uuid::new_v4();
        let now = now_millis();
        sqlx::query("INSERT INTO accounts (id, kind, role, is_active, created_at) VALUES (?, ?, ?, 1, ?)")
            .bind(account_id.to_string())
            .bind(AccountKind::User.as_str())
            .bind(role.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO users (account_id, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind(account_id.to_string())
            .bind(email)
            .bind(password_hash)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "email"))?;

        tx.commit().await?;

        let created_at = DateTime::from_timestamp_millis(now).unwrap_or_else(Utc::now);
        Ok((
            Account {
                id: account_id,
                kind: AccountKind::User,
                role,
                is_active: true,
                created_at,
            },
            User {
                account_id,
                email: email.to_string(),
                created_at,
            },
        ))
    }

    /// Lookup for login. Email must already be lowercased.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let row = sqlx::query(
            "SELECT a.id, a.kind, a.role, a.is_active, a.created_at, \
                    u.email, u.password_hash, u.created_at AS user_created_at \
             FROM users u JOIN accounts a ON a.id = u.account_id \
             WHERE u.email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let account = account_from_row(&row)?;
            Ok(UserCredentials {
                user: User {
                    account_id: account.id,
                    email: row.try_get("email")?,
                    created_at: col_time(&row, "user_created_at")?,
                },
                password_hash: row.try_get("password_hash")?,
                account,
            })
        })
        .transpose()
    }

    pub async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT id, kind, role, is_active, created_at FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| account_from_row(&r)).transpose()
    }

    /// Find a user account by email, without credentials (permission grants
    /// and admin lookups).
    pub async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT a.id, a.kind, a.role, a.is_active, a.created_at \
             FROM users u JOIN accounts a ON a.id = u.account_id WHERE u.email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| account_from_row(&r)).transpose()
    }

    pub async fn set_account_active(&self, id: Uuid, active: bool) -> Result<()> {
        let res = sqlx::query("UPDATE accounts SET is_active = ? WHERE id = ?")
            .bind(active as i64)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Promote or demote between admin and member. The owner role is fixed
    /// at registration time and never granted here.
    pub async fn set_account_role(&self, id: Uuid, role: AccountRole) -> Result<()> {
        let res = sqlx::query("UPDATE accounts SET role = ? WHERE id = ? AND role != 'owner'")
            .bind(role.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub async fn update_password(&self, account_id: Uuid, password_hash: &str) -> Result<()> {
        let res = sqlx::query("UPDATE users SET password_hash = ? WHERE account_id = ?")
            .bind(password_hash)
            .bind(account_id.to_string())
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ── service accounts ────────────────────────────────────────────

    pub async fn create_service_account(
        &self,
        organization: &str,
        client_id: &str,
    ) -> Result<(Account, ServiceAccount)> {
        let mut tx = self.pool.begin().await?;

        let account_id = Uuid::new_v4();
        let now = now_millis();
        sqlx::query("INSERT INTO accounts (id, kind, role, is_active, created_at) VALUES (?, ?, 'member', 1, ?)")
            .bind(account_id.to_string())
            .bind(AccountKind::ServiceAccount.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO service_accounts (account_id, organization, client_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(account_id.to_string())
        .bind(organization)
        .bind(client_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "client_id"))?;

        tx.commit().await?;

        let created_at = DateTime::from_timestamp_millis(now).unwrap_or_else(Utc::now);
        Ok((
            Account {
                id: account_id,
                kind: AccountKind::ServiceAccount,
                role: AccountRole::Member,
                is_active: true,
                created_at,
            },
            ServiceAccount {
                account_id,
                organization: organization.to_string(),
                client_id: client_id.to_string(),
                created_at,
            },
        ))
    }

    pub async fn find_service_account_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<(Account, ServiceAccount)>> {
        let row = sqlx::query(
            "SELECT a.id, a.kind, a.role, a.is_active, a.created_at, \
                    s.organization, s.client_id, s.created_at AS sa_created_at \
             FROM service_accounts s JOIN accounts a ON a.id = s.account_id \
             WHERE s.client_id = ?",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let account = account_from_row(&row)?;
            let sa = ServiceAccount {
                account_id: account.id,
                organization: row.try_get("organization")?,
                client_id: row.try_get("client_id")?,
                created_at: col_time(&row, "sa_created_at")?,
            };
            Ok((account, sa))
        })
        .transpose()
    }

    /// Accounts with their identifying handle (email or client_id), newest
    /// first. Admin listing.
    pub async fn list_accounts(&self) -> Result<Vec<(Account, String)>> {
        let rows = sqlx::query(
            "SELECT a.id, a.kind, a.role, a.is_active, a.created_at, \
                    COALESCE(u.email, s.client_id, '') AS handle \
             FROM accounts a \
             LEFT JOIN users u ON u.account_id = a.id \
             LEFT JOIN service_accounts s ON s.account_id = a.id \
             ORDER BY a.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let account = account_from_row(row)?;
                let handle: String = row.try_get("handle")?;
                Ok((account, handle))
            })
            .collect()
    }

    /// Used when deriving a unique client id from an organization name.
    pub async fn client_id_exists(&self, client_id: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM service_accounts WHERE client_id = ?")
                .bind(client_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }
}
