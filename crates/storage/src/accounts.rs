use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use aqua_talent_core::types::Role;

use crate::{parse_enum, to_rfc3339, RepoError, Tx};

/// Repository for login credentials of every role.
#[derive(Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

/// Parameters required to create an account.
pub struct NewAccount<'a> {
    pub id: &'a str,
    pub role: Role,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Stored credentials for a single account.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub id: String,
    pub role: Role,
    pub email: String,
    pub password_hash: String,
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    role: String,
    email: String,
    password_hash: String,
}

impl AccountRow {
    fn into_domain(self) -> Result<AccountRecord, RepoError> {
        Ok(AccountRecord {
            id: self.id,
            role: parse_enum("role", &self.role)?,
            email: self.email,
            password_hash: self.password_hash,
        })
    }
}

impl AccountRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a new account; a taken `(role, email)` pair yields [`RepoError::Conflict`].
    pub async fn insert(&self, tx: &mut Tx<'_>, account: &NewAccount<'_>) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO accounts (id, role, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(account.id)
        .bind(account.role.as_str())
        .bind(account.email)
        .bind(account.password_hash)
        .bind(to_rfc3339(account.created_at))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Looks up the credentials registered for `email` under `role`.
    pub async fn find_by_email(
        &self,
        role: Role,
        email: &str,
    ) -> Result<Option<AccountRecord>, RepoError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, role, email, password_hash FROM accounts WHERE role = ? AND email = ?",
        )
        .bind(role.as_str())
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AccountRow::into_domain).transpose()
    }

    /// Creates the administrator account or refreshes its password.
    pub async fn upsert_admin(
        &self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<String, RepoError> {
        let id: (String,) = sqlx::query_as(
            "INSERT INTO accounts (id, role, email, password_hash, created_at) \
             VALUES (?, 'admin', ?, ?, ?) \
             ON CONFLICT(role, email) DO UPDATE SET password_hash = excluded.password_hash \
             RETURNING id",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(email)
        .bind(password_hash)
        .bind(to_rfc3339(now))
        .fetch_one(&self.pool)
        .await?;
        Ok(id.0)
    }
}
