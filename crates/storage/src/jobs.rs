use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteExecutor, SqlitePool};

use aqua_talent_core::types::{JobPosting, JobStatus, JobType};

use crate::{decode_list, encode_list, parse_enum, to_rfc3339, RepoError, Tx};

const JOB_COLUMNS: &str = "j.id, j.company_id, j.title, j.description, j.location, j.job_type, \
     j.salary_min, j.salary_max, j.requirements_json, j.status, j.rejection_reason, \
     j.created_at, j.updated_at";

/// Repository for job postings.
#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

/// Editable job content; `None` leaves the stored value untouched.
#[derive(Debug, Default, Clone)]
pub struct JobContentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<JobType>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub requirements: Option<Vec<String>>,
}

/// Search parameters for the public job board.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub query: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<JobType>,
}

/// Approved job joined with its company's display name.
#[derive(Debug, Clone, Serialize)]
pub struct PublicJob {
    #[serde(flatten)]
    pub job: JobPosting,
    pub company_name: String,
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    company_id: String,
    title: String,
    description: String,
    location: Option<String>,
    job_type: String,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    requirements_json: String,
    status: String,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_domain(self) -> Result<JobPosting, RepoError> {
        Ok(JobPosting {
            job_type: parse_enum("job_type", &self.job_type)?,
            status: parse_enum("status", &self.status)?,
            requirements: decode_list("requirements_json", &self.requirements_json)?,
            id: self.id,
            company_id: self.company_id,
            title: self.title,
            description: self.description,
            location: self.location,
            salary_min: self.salary_min,
            salary_max: self.salary_max,
            rejection_reason: self.rejection_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PublicJobRow {
    #[sqlx(flatten)]
    job: JobRow,
    company_name: String,
}

async fn fetch_with<'e>(
    executor: impl SqliteExecutor<'e>,
    id: &str,
) -> Result<JobPosting, RepoError> {
    let query = format!("SELECT {JOB_COLUMNS} FROM job_postings AS j WHERE j.id = ?");
    sqlx::query_as::<_, JobRow>(&query)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(RepoError::NotFound)?
        .into_domain()
}

impl JobRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, job: &JobPosting) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO job_postings \
             (id, company_id, title, description, location, job_type, salary_min, salary_max, requirements_json, status, rejection_reason, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id)
        .bind(&job.company_id)
        .bind(&job.title)
        .bind(&job.description)
        .bind(&job.location)
        .bind(job.job_type.as_str())
        .bind(job.salary_min)
        .bind(job.salary_max)
        .bind(encode_list(&job.requirements))
        .bind(job.status.as_str())
        .bind(&job.rejection_reason)
        .bind(to_rfc3339(job.created_at))
        .bind(to_rfc3339(job.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch(&self, id: &str) -> Result<JobPosting, RepoError> {
        fetch_with(&self.pool, id).await
    }

    pub async fn fetch_in(&self, tx: &mut Tx<'_>, id: &str) -> Result<JobPosting, RepoError> {
        fetch_with(&mut **tx, id).await
    }

    /// Jobs owned by a company, newest first.
    pub async fn list_by_company(&self, company_id: &str) -> Result<Vec<JobPosting>, RepoError> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM job_postings AS j \
             WHERE j.company_id = ? ORDER BY j.created_at DESC, j.id ASC"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(JobRow::into_domain).collect()
    }

    /// All jobs for moderation, oldest first, optionally filtered by status.
    pub async fn list(&self, status: Option<JobStatus>) -> Result<Vec<JobPosting>, RepoError> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM job_postings AS j \
             WHERE (?1 IS NULL OR j.status = ?1) ORDER BY j.created_at ASC, j.id ASC"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(status.map(JobStatus::as_str))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(JobRow::into_domain).collect()
    }

    /// Approved jobs of approved companies matching the filter, newest first.
    pub async fn list_public(&self, filter: &JobFilter) -> Result<Vec<PublicJob>, RepoError> {
        let query = format!(
            "SELECT {JOB_COLUMNS}, c.name AS company_name \
               FROM job_postings AS j \
               JOIN companies AS c ON c.id = j.company_id \
              WHERE j.status = 'approved' \
                AND c.status = 'approved' \
                AND (?1 IS NULL OR j.title LIKE '%' || ?1 || '%' OR j.description LIKE '%' || ?1 || '%') \
                AND (?2 IS NULL OR j.location LIKE '%' || ?2 || '%') \
                AND (?3 IS NULL OR j.job_type = ?3) \
              ORDER BY j.created_at DESC, j.id ASC"
        );
        let rows = sqlx::query_as::<_, PublicJobRow>(&query)
            .bind(filter.query.as_deref())
            .bind(filter.location.as_deref())
            .bind(filter.job_type.map(JobType::as_str))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                Ok(PublicJob {
                    job: row.job.into_domain()?,
                    company_name: row.company_name,
                })
            })
            .collect()
    }

    /// Loads one job if it is publicly visible.
    pub async fn fetch_public(&self, id: &str) -> Result<PublicJob, RepoError> {
        let query = format!(
            "SELECT {JOB_COLUMNS}, c.name AS company_name \
               FROM job_postings AS j \
               JOIN companies AS c ON c.id = j.company_id \
              WHERE j.id = ? AND j.status = 'approved' AND c.status = 'approved'"
        );
        let row = sqlx::query_as::<_, PublicJobRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)?;
        Ok(PublicJob {
            job: row.job.into_domain()?,
            company_name: row.company_name,
        })
    }

    /// Edits a job's content while it is a draft or rejected. Returns `None`
    /// when the job exists in any other status.
    pub async fn update_content(
        &self,
        id: &str,
        update: &JobContentUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<JobPosting>, RepoError> {
        let result = sqlx::query(
            "UPDATE job_postings SET \
                 title = COALESCE(?, title), \
                 description = COALESCE(?, description), \
                 location = COALESCE(?, location), \
                 job_type = COALESCE(?, job_type), \
                 salary_min = COALESCE(?, salary_min), \
                 salary_max = COALESCE(?, salary_max), \
                 requirements_json = COALESCE(?, requirements_json), \
                 updated_at = ? \
             WHERE id = ? AND status IN ('draft', 'rejected')",
        )
        .bind(&update.title)
        .bind(&update.description)
        .bind(&update.location)
        .bind(update.job_type.map(JobType::as_str))
        .bind(update.salary_min)
        .bind(update.salary_max)
        .bind(update.requirements.as_deref().map(encode_list))
        .bind(to_rfc3339(now))
        .bind(id)
        .execute(&self.pool)
        .await?;

        let job = self.fetch(id).await?;
        Ok((result.rows_affected() > 0).then_some(job))
    }

    pub async fn set_status(
        &self,
        tx: &mut Tx<'_>,
        id: &str,
        status: JobStatus,
        rejection_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<JobPosting, RepoError> {
        let result = sqlx::query(
            "UPDATE job_postings SET status = ?, rejection_reason = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(rejection_reason)
        .bind(to_rfc3339(now))
        .bind(id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        self.fetch_in(tx, id).await
    }

    /// Deletes a job that is still a draft. Returns `false` when nothing matched.
    pub async fn delete_draft(&self, id: &str) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM job_postings WHERE id = ? AND status = 'draft'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of jobs per status.
    pub async fn count_by_status(&self) -> Result<Vec<(String, i64)>, RepoError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM job_postings GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
