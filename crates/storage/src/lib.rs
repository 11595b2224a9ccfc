mod accounts;
mod applications;
mod companies;
mod jobs;
mod notifications;
mod plans;
mod students;

use std::{str::FromStr, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Sqlite, SqlitePool, Transaction,
};
use thiserror::Error;

pub use accounts::{AccountRecord, AccountRepository, NewAccount};
pub use applications::{ApplicationDetail, ApplicationRepository};
pub use companies::{CompanyProfileUpdate, CompanyRepository};
pub use jobs::{JobContentUpdate, JobFilter, JobRepository, PublicJob};
pub use notifications::NotificationRepository;
pub use plans::{PlanChanges, PlanRepository};
pub use students::{StudentProfileUpdate, StudentRepository};

/// Transaction type shared by every multi-row mutation.
pub type Tx<'a> = Transaction<'a, Sqlite>;

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    ///
    /// The database file is created when missing. Pragmas are set on the
    /// connect options so every pooled connection enforces foreign keys.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Begins a SQLite transaction.
    pub async fn begin(&self) -> Result<Tx<'static>, RepoError> {
        Ok(self.pool.begin().await?)
    }

    pub fn accounts(&self) -> AccountRepository {
        AccountRepository::new(self.pool.clone())
    }

    pub fn companies(&self) -> CompanyRepository {
        CompanyRepository::new(self.pool.clone())
    }

    pub fn students(&self) -> StudentRepository {
        StudentRepository::new(self.pool.clone())
    }

    pub fn jobs(&self) -> JobRepository {
        JobRepository::new(self.pool.clone())
    }

    pub fn applications(&self) -> ApplicationRepository {
        ApplicationRepository::new(self.pool.clone())
    }

    pub fn plans(&self) -> PlanRepository {
        PlanRepository::new(self.pool.clone())
    }

    pub fn notifications(&self) -> NotificationRepository {
        NotificationRepository::new(self.pool.clone())
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
}

/// Errors returned by repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    #[error("record conflicts with an existing one")]
    Conflict,
    #[error("foreign key constraint failed")]
    ForeignKey,
    #[error("failed to decode column {column}: {reason}")]
    Decode {
        column: &'static str,
        reason: String,
    },
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY) => Self::Conflict,
                Some(SQLITE_CONSTRAINT_FOREIGNKEY) => Self::ForeignKey,
                _ => Self::Database(sqlx::Error::Database(db_err)),
            },
            other => Self::Database(other),
        }
    }
}

pub(crate) fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_enum<T>(column: &'static str, value: &str) -> Result<T, RepoError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err: T::Err| RepoError::Decode {
        column,
        reason: err.to_string(),
    })
}

pub(crate) fn decode_list(column: &'static str, value: &str) -> Result<Vec<String>, RepoError> {
    serde_json::from_str(value).map_err(|err| RepoError::Decode {
        column,
        reason: err.to_string(),
    })
}

pub(crate) fn encode_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn migrations_apply_and_seed_plans() {
        let (_dir, db) = setup_db().await;

        let tables: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
                .fetch_one(db.pool())
                .await
                .expect("fetch tables");
        assert!(tables.0 >= 7, "expected core tables to be created");

        let plans = db.plans().list(false).await.expect("plans");
        assert_eq!(plans.len(), 2);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced_on_every_connection() {
        let (_dir, db) = setup_db().await;
        let err = sqlx::query(
            "INSERT INTO companies (id, email, name, status, created_at, updated_at) \
             VALUES ('ghost', 'g@x', 'Ghost', 'pending', '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
        )
        .execute(db.pool())
        .await
        .map_err(RepoError::from)
        .unwrap_err();
        assert!(matches!(err, RepoError::ForeignKey));
    }
}
