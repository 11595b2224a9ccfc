use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteExecutor, SqlitePool};

use aqua_talent_core::types::{Application, ApplicationStatus};

use crate::{parse_enum, to_rfc3339, RepoError, Tx};

const APPLICATION_COLUMNS: &str =
    "a.id, a.student_id, a.job_id, a.cover_letter, a.status, a.created_at, a.updated_at";

/// Repository for job applications.
#[derive(Clone)]
pub struct ApplicationRepository {
    pool: SqlitePool,
}

/// Application joined with the names dashboards display next to it.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    pub job_title: String,
    pub company_id: String,
    pub company_name: String,
    pub student_name: String,
    pub student_email: String,
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: String,
    student_id: String,
    job_id: String,
    cover_letter: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ApplicationRow {
    fn into_domain(self) -> Result<Application, RepoError> {
        Ok(Application {
            status: parse_enum("status", &self.status)?,
            id: self.id,
            student_id: self.student_id,
            job_id: self.job_id,
            cover_letter: self.cover_letter,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ApplicationDetailRow {
    #[sqlx(flatten)]
    application: ApplicationRow,
    job_title: String,
    company_id: String,
    company_name: String,
    student_name: String,
    student_email: String,
}

impl ApplicationDetailRow {
    fn into_domain(self) -> Result<ApplicationDetail, RepoError> {
        Ok(ApplicationDetail {
            application: self.application.into_domain()?,
            job_title: self.job_title,
            company_id: self.company_id,
            company_name: self.company_name,
            student_name: self.student_name,
            student_email: self.student_email,
        })
    }
}

/// Scope of a detail listing.
enum DetailScope<'a> {
    Student(&'a str),
    Job(&'a str),
    Status(Option<ApplicationStatus>),
}

async fn fetch_with<'e>(
    executor: impl SqliteExecutor<'e>,
    id: &str,
) -> Result<Application, RepoError> {
    let query = format!("SELECT {APPLICATION_COLUMNS} FROM applications AS a WHERE a.id = ?");
    sqlx::query_as::<_, ApplicationRow>(&query)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(RepoError::NotFound)?
        .into_domain()
}

impl ApplicationRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts an application; a second one for the same student and job conflicts.
    pub async fn insert(&self, tx: &mut Tx<'_>, application: &Application) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO applications (id, student_id, job_id, cover_letter, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&application.id)
        .bind(&application.student_id)
        .bind(&application.job_id)
        .bind(&application.cover_letter)
        .bind(application.status.as_str())
        .bind(to_rfc3339(application.created_at))
        .bind(to_rfc3339(application.updated_at))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn fetch(&self, id: &str) -> Result<Application, RepoError> {
        fetch_with(&self.pool, id).await
    }

    pub async fn fetch_in(&self, tx: &mut Tx<'_>, id: &str) -> Result<Application, RepoError> {
        fetch_with(&mut **tx, id).await
    }

    pub async fn find_for_student_job(
        &self,
        tx: &mut Tx<'_>,
        student_id: &str,
        job_id: &str,
    ) -> Result<Option<Application>, RepoError> {
        let query = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications AS a \
             WHERE a.student_id = ? AND a.job_id = ?"
        );
        let row = sqlx::query_as::<_, ApplicationRow>(&query)
            .bind(student_id)
            .bind(job_id)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(ApplicationRow::into_domain).transpose()
    }

    /// Applications created by the student at or after `since`.
    pub async fn count_created_since(
        &self,
        tx: &mut Tx<'_>,
        student_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, RepoError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM applications WHERE student_id = ? AND created_at >= ?",
        )
        .bind(student_id)
        .bind(to_rfc3339(since))
        .fetch_one(&mut **tx)
        .await?;
        Ok(u32::try_from(row.0).unwrap_or(u32::MAX))
    }

    pub async fn set_status(
        &self,
        tx: &mut Tx<'_>,
        id: &str,
        status: ApplicationStatus,
        now: DateTime<Utc>,
    ) -> Result<Application, RepoError> {
        let result = sqlx::query("UPDATE applications SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(to_rfc3339(now))
            .bind(id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        self.fetch_in(tx, id).await
    }

    /// Rejects every open application of a job and returns them in their new state.
    pub async fn reject_open_for_job(
        &self,
        tx: &mut Tx<'_>,
        job_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Application>, RepoError> {
        let rows = sqlx::query_as::<_, ApplicationRow>(
            "UPDATE applications SET status = 'rejected', updated_at = ? \
             WHERE job_id = ? AND status IN ('pending', 'reviewed') \
             RETURNING id, student_id, job_id, cover_letter, status, created_at, updated_at",
        )
        .bind(to_rfc3339(now))
        .bind(job_id)
        .fetch_all(&mut **tx)
        .await?;
        rows.into_iter().map(ApplicationRow::into_domain).collect()
    }

    pub async fn list_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<ApplicationDetail>, RepoError> {
        self.list_details(DetailScope::Student(student_id)).await
    }

    pub async fn list_for_job(&self, job_id: &str) -> Result<Vec<ApplicationDetail>, RepoError> {
        self.list_details(DetailScope::Job(job_id)).await
    }

    pub async fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationDetail>, RepoError> {
        self.list_details(DetailScope::Status(status)).await
    }

    async fn list_details(
        &self,
        scope: DetailScope<'_>,
    ) -> Result<Vec<ApplicationDetail>, RepoError> {
        let condition = match scope {
            DetailScope::Student(_) => "a.student_id = ?1",
            DetailScope::Job(_) => "a.job_id = ?1",
            DetailScope::Status(_) => "(?1 IS NULL OR a.status = ?1)",
        };
        let query = format!(
            "SELECT {APPLICATION_COLUMNS}, \
                    j.title AS job_title, \
                    j.company_id AS company_id, \
                    c.name AS company_name, \
                    s.full_name AS student_name, \
                    s.email AS student_email \
               FROM applications AS a \
               JOIN job_postings AS j ON j.id = a.job_id \
               JOIN companies AS c ON c.id = j.company_id \
               JOIN students AS s ON s.id = a.student_id \
              WHERE {condition} \
              ORDER BY a.created_at DESC, a.id ASC"
        );
        let bound = match scope {
            DetailScope::Student(id) | DetailScope::Job(id) => Some(id),
            DetailScope::Status(status) => status.map(ApplicationStatus::as_str),
        };
        let rows = sqlx::query_as::<_, ApplicationDetailRow>(&query)
            .bind(bound)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(ApplicationDetailRow::into_domain)
            .collect()
    }

    /// Number of applications per status.
    pub async fn count_by_status(&self) -> Result<Vec<(String, i64)>, RepoError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM applications GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
