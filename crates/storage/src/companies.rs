use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteExecutor, SqlitePool};

use aqua_talent_core::types::{Company, CompanyStatus};

use crate::{parse_enum, to_rfc3339, RepoError, Tx};

const COMPANY_COLUMNS: &str = "id, email, name, industry, location, website, description, \
     status, rejection_reason, created_at, updated_at";

/// Repository for company profiles.
#[derive(Clone)]
pub struct CompanyRepository {
    pool: SqlitePool,
}

/// Profile fields a company may change; `None` leaves the stored value untouched.
#[derive(Debug, Default, Clone)]
pub struct CompanyProfileUpdate {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
}

#[derive(sqlx::FromRow)]
struct CompanyRow {
    id: String,
    email: String,
    name: String,
    industry: Option<String>,
    location: Option<String>,
    website: Option<String>,
    description: Option<String>,
    status: String,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CompanyRow {
    fn into_domain(self) -> Result<Company, RepoError> {
        Ok(Company {
            id: self.id,
            email: self.email,
            name: self.name,
            industry: self.industry,
            location: self.location,
            website: self.website,
            description: self.description,
            status: parse_enum("status", &self.status)?,
            rejection_reason: self.rejection_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

async fn fetch_with<'e>(executor: impl SqliteExecutor<'e>, id: &str) -> Result<Company, RepoError> {
    let query = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ?");
    sqlx::query_as::<_, CompanyRow>(&query)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(RepoError::NotFound)?
        .into_domain()
}

impl CompanyRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, tx: &mut Tx<'_>, company: &Company) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO companies \
             (id, email, name, industry, location, website, description, status, rejection_reason, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&company.id)
        .bind(&company.email)
        .bind(&company.name)
        .bind(&company.industry)
        .bind(&company.location)
        .bind(&company.website)
        .bind(&company.description)
        .bind(company.status.as_str())
        .bind(&company.rejection_reason)
        .bind(to_rfc3339(company.created_at))
        .bind(to_rfc3339(company.updated_at))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn fetch(&self, id: &str) -> Result<Company, RepoError> {
        fetch_with(&self.pool, id).await
    }

    /// Reads the company inside an open transaction.
    pub async fn fetch_in(&self, tx: &mut Tx<'_>, id: &str) -> Result<Company, RepoError> {
        fetch_with(&mut **tx, id).await
    }

    /// Lists companies, oldest first, optionally filtered by status.
    pub async fn list(&self, status: Option<CompanyStatus>) -> Result<Vec<Company>, RepoError> {
        let query = format!(
            "SELECT {COMPANY_COLUMNS} FROM companies \
             WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, CompanyRow>(&query)
            .bind(status.map(CompanyStatus::as_str))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CompanyRow::into_domain).collect()
    }

    pub async fn update_profile(
        &self,
        id: &str,
        update: &CompanyProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<Company, RepoError> {
        let result = sqlx::query(
            "UPDATE companies SET \
                 name = COALESCE(?, name), \
                 industry = COALESCE(?, industry), \
                 location = COALESCE(?, location), \
                 website = COALESCE(?, website), \
                 description = COALESCE(?, description), \
                 updated_at = ? \
             WHERE id = ?",
        )
        .bind(&update.name)
        .bind(&update.industry)
        .bind(&update.location)
        .bind(&update.website)
        .bind(&update.description)
        .bind(to_rfc3339(now))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        self.fetch(id).await
    }

    pub async fn set_status(
        &self,
        tx: &mut Tx<'_>,
        id: &str,
        status: CompanyStatus,
        rejection_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Company, RepoError> {
        let result = sqlx::query(
            "UPDATE companies SET status = ?, rejection_reason = ?, updated_at = ? WHERE id = ?",
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

    /// Number of companies per status.
    pub async fn count_by_status(&self) -> Result<Vec<(String, i64)>, RepoError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM companies GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, seed_company, setup_db};

    #[tokio::test]
    async fn status_filter_and_profile_update() {
        let (_dir, db) = setup_db().await;
        seed_company(&db, "c-1", CompanyStatus::Pending).await;
        seed_company(&db, "c-2", CompanyStatus::Approved).await;
        let repo = db.companies();

        let pending = repo.list(Some(CompanyStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "c-1");
        assert_eq!(repo.list(None).await.unwrap().len(), 2);

        let updated = repo
            .update_profile(
                "c-2",
                &CompanyProfileUpdate {
                    website: Some("https://acme.test".into()),
                    ..CompanyProfileUpdate::default()
                },
                at(5),
            )
            .await
            .unwrap();
        assert_eq!(updated.website.as_deref(), Some("https://acme.test"));
        assert_eq!(updated.industry.as_deref(), Some("Software"));
        assert_eq!(updated.updated_at, at(5));
    }

    #[tokio::test]
    async fn schema_ties_reason_to_rejected_status() {
        let (_dir, db) = setup_db().await;
        seed_company(&db, "c-1", CompanyStatus::Pending).await;
        let repo = db.companies();

        let mut tx = db.begin().await.unwrap();
        let err = repo
            .set_status(&mut tx, "c-1", CompanyStatus::Rejected, None, at(3))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Database(_)));

        let company = repo
            .set_status(&mut tx, "c-1", CompanyStatus::Rejected, Some("spam"), at(3))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(company.rejection_reason.as_deref(), Some("spam"));
    }

    #[tokio::test]
    async fn missing_company_is_not_found() {
        let (_dir, db) = setup_db().await;
        assert!(matches!(
            db.companies().fetch("nope").await,
            Err(RepoError::NotFound)
        ));
    }
}
