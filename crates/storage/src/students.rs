use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteExecutor, SqlitePool};

use aqua_talent_core::types::Student;

use crate::{decode_list, encode_list, to_rfc3339, RepoError, Tx};

const STUDENT_COLUMNS: &str = "id, email, full_name, university, major, graduation_year, \
     skills_json, bio, resume_url, is_hired, subscription_plan_id, created_at, updated_at";

/// Repository for student profiles.
#[derive(Clone)]
pub struct StudentRepository {
    pool: SqlitePool,
}

/// Profile fields a student may change; `None` leaves the stored value untouched.
#[derive(Debug, Default, Clone)]
pub struct StudentProfileUpdate {
    pub full_name: Option<String>,
    pub university: Option<String>,
    pub major: Option<String>,
    pub graduation_year: Option<i32>,
    pub skills: Option<Vec<String>>,
    pub bio: Option<String>,
    pub resume_url: Option<String>,
}

#[derive(sqlx::FromRow)]
struct StudentRow {
    id: String,
    email: String,
    full_name: String,
    university: Option<String>,
    major: Option<String>,
    graduation_year: Option<i32>,
    skills_json: String,
    bio: Option<String>,
    resume_url: Option<String>,
    is_hired: bool,
    subscription_plan_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StudentRow {
    fn into_domain(self) -> Result<Student, RepoError> {
        Ok(Student {
            skills: decode_list("skills_json", &self.skills_json)?,
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            university: self.university,
            major: self.major,
            graduation_year: self.graduation_year,
            bio: self.bio,
            resume_url: self.resume_url,
            is_hired: self.is_hired,
            subscription_plan_id: self.subscription_plan_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

async fn fetch_with<'e>(executor: impl SqliteExecutor<'e>, id: &str) -> Result<Student, RepoError> {
    let query = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    sqlx::query_as::<_, StudentRow>(&query)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(RepoError::NotFound)?
        .into_domain()
}

impl StudentRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, tx: &mut Tx<'_>, student: &Student) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO students \
             (id, email, full_name, university, major, graduation_year, skills_json, bio, resume_url, is_hired, subscription_plan_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&student.id)
        .bind(&student.email)
        .bind(&student.full_name)
        .bind(&student.university)
        .bind(&student.major)
        .bind(student.graduation_year)
        .bind(encode_list(&student.skills))
        .bind(&student.bio)
        .bind(&student.resume_url)
        .bind(student.is_hired)
        .bind(&student.subscription_plan_id)
        .bind(to_rfc3339(student.created_at))
        .bind(to_rfc3339(student.updated_at))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn fetch(&self, id: &str) -> Result<Student, RepoError> {
        fetch_with(&self.pool, id).await
    }

    pub async fn fetch_in(&self, tx: &mut Tx<'_>, id: &str) -> Result<Student, RepoError> {
        fetch_with(&mut **tx, id).await
    }

    pub async fn list(&self) -> Result<Vec<Student>, RepoError> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY created_at ASC, id ASC");
        let rows = sqlx::query_as::<_, StudentRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(StudentRow::into_domain).collect()
    }

    pub async fn update_profile(
        &self,
        id: &str,
        update: &StudentProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<Student, RepoError> {
        let result = sqlx::query(
            "UPDATE students SET \
                 full_name = COALESCE(?, full_name), \
                 university = COALESCE(?, university), \
                 major = COALESCE(?, major), \
                 graduation_year = COALESCE(?, graduation_year), \
                 skills_json = COALESCE(?, skills_json), \
                 bio = COALESCE(?, bio), \
                 resume_url = COALESCE(?, resume_url), \
                 updated_at = ? \
             WHERE id = ?",
        )
        .bind(&update.full_name)
        .bind(&update.university)
        .bind(&update.major)
        .bind(update.graduation_year)
        .bind(update.skills.as_deref().map(encode_list))
        .bind(&update.bio)
        .bind(&update.resume_url)
        .bind(to_rfc3339(now))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        self.fetch(id).await
    }

    /// Flags the student as hired.
    pub async fn mark_hired(
        &self,
        tx: &mut Tx<'_>,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE students SET is_hired = 1, updated_at = ? WHERE id = ?")
            .bind(to_rfc3339(now))
            .bind(id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    pub async fn assign_plan(
        &self,
        tx: &mut Tx<'_>,
        id: &str,
        plan_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Student, RepoError> {
        let result = sqlx::query(
            "UPDATE students SET subscription_plan_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(plan_id)
        .bind(to_rfc3339(now))
        .bind(id)
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        self.fetch_in(tx, id).await
    }

    /// Counts students subscribed to the plan.
    pub async fn count_on_plan(&self, plan_id: &str) -> Result<i64, RepoError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM students WHERE subscription_plan_id = ?")
                .bind(plan_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// Returns `(total, hired)` student counts.
    pub async fn counts(&self) -> Result<(i64, i64), RepoError> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(is_hired), 0) FROM students",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
