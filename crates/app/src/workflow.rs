use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use aqua_talent_core::lifecycle::{self, ApplyError, TransitionError};
use aqua_talent_core::notify::{NotificationDraft, Notifier};
use aqua_talent_core::quota::{self, QuotaStatus};
use aqua_talent_core::types::{
    Application, ApplicationStatus, Company, CompanyStatus, JobPosting, JobStatus, Role, Student,
};
use aqua_talent_storage::{Database, NewAccount, RepoError, Tx};

use crate::problem::ProblemResponse;

/// Fields collected when a student signs up.
#[derive(Debug, Clone)]
pub struct StudentRegistration {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub university: Option<String>,
    pub major: Option<String>,
    pub graduation_year: Option<i32>,
}

/// Fields collected when a company signs up.
#[derive(Debug, Clone)]
pub struct CompanyRegistration {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
}

/// Runs every multi-row mutation in a single transaction together with the
/// notifications it emits.
#[derive(Clone)]
pub struct WorkflowExecutor {
    database: Database,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl WorkflowExecutor {
    pub fn new(database: Database, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        Self { database, clock }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub async fn register_student(
        &self,
        registration: StudentRegistration,
    ) -> Result<Student, WorkflowError> {
        let now = self.now();
        let student = Student {
            id: Uuid::new_v4().to_string(),
            email: registration.email,
            full_name: registration.full_name,
            university: registration.university,
            major: registration.major,
            graduation_year: registration.graduation_year,
            skills: Vec::new(),
            bio: None,
            resume_url: None,
            is_hired: false,
            subscription_plan_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.database.begin().await?;
        self.insert_account(
            &mut tx,
            &student.id,
            Role::Student,
            &student.email,
            &registration.password_hash,
            now,
        )
        .await?;
        self.database.students().insert(&mut tx, &student).await?;
        tx.commit().await.map_err(RepoError::from)?;

        counter!("auth_registrations_total", "role" => Role::Student.as_str()).increment(1);
        info!(stage = "workflow", student_id = %student.id, "student registered");
        Ok(student)
    }

    pub async fn register_company(
        &self,
        registration: CompanyRegistration,
    ) -> Result<Company, WorkflowError> {
        let now = self.now();
        let company = Company {
            id: Uuid::new_v4().to_string(),
            email: registration.email,
            name: registration.name,
            industry: registration.industry,
            location: registration.location,
            website: registration.website,
            description: registration.description,
            status: CompanyStatus::Pending,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.database.begin().await?;
        self.insert_account(
            &mut tx,
            &company.id,
            Role::Company,
            &company.email,
            &registration.password_hash,
            now,
        )
        .await?;
        self.database.companies().insert(&mut tx, &company).await?;
        let drafts = vec![Notifier::company_registered(&company)];
        self.commit_with(tx, &drafts, now).await?;

        counter!("auth_registrations_total", "role" => Role::Company.as_str()).increment(1);
        info!(stage = "workflow", company_id = %company.id, "company registered");
        Ok(company)
    }

    /// Approves or rejects a company account.
    pub async fn decide_company(
        &self,
        company_id: &str,
        target: CompanyStatus,
        reason: Option<&str>,
    ) -> Result<Company, WorkflowError> {
        let now = self.now();
        let companies = self.database.companies();

        let mut tx = self.database.begin().await?;
        let current = companies.fetch_in(&mut tx, company_id).await?;
        let decision = lifecycle::decide_company(current.status, target, reason)?;
        let updated = companies
            .set_status(
                &mut tx,
                company_id,
                decision.status,
                decision.rejection_reason.as_deref(),
                now,
            )
            .await?;
        let drafts = vec![Notifier::company_decided(&updated)];
        self.commit_with(tx, &drafts, now).await?;

        record_transition("company", updated.status.as_str());
        info!(
            stage = "workflow",
            company_id,
            from = current.status.as_str(),
            to = updated.status.as_str(),
            "company decided"
        );
        Ok(updated)
    }

    /// Moves a job posting to `target` on behalf of a company or an administrator.
    ///
    /// Companies may only act on their own postings. Closing a job rejects its
    /// open applications and tells each affected student.
    pub async fn transition_job(
        &self,
        role: Role,
        actor_id: &str,
        job_id: &str,
        target: JobStatus,
        reason: Option<&str>,
    ) -> Result<JobPosting, WorkflowError> {
        let now = self.now();
        let jobs = self.database.jobs();

        let mut tx = self.database.begin().await?;
        let current = jobs.fetch_in(&mut tx, job_id).await?;
        if role == Role::Company && current.company_id != actor_id {
            return Err(WorkflowError::NotOwner("job"));
        }
        let company = self
            .database
            .companies()
            .fetch_in(&mut tx, &current.company_id)
            .await?;

        let transition =
            lifecycle::transition_job(role, company.status, current.status, target, reason)?;
        let updated = jobs
            .set_status(
                &mut tx,
                job_id,
                transition.status,
                transition.rejection_reason.as_deref(),
                now,
            )
            .await?;

        let mut drafts = Vec::new();
        let mut auto_rejected = 0u64;
        if transition.closes_applications {
            let rejected = self
                .database
                .applications()
                .reject_open_for_job(&mut tx, job_id, now)
                .await?;
            auto_rejected = rejected.len() as u64;
            drafts.extend(
                rejected
                    .iter()
                    .filter_map(|application| Notifier::application_updated(application, &updated)),
            );
        }
        if updated.status == JobStatus::Pending {
            drafts.push(Notifier::job_submitted(&updated, &company));
        }
        if role == Role::Admin {
            drafts.extend(Notifier::job_moderated(&updated));
        }
        self.commit_with(tx, &drafts, now).await?;

        record_transition("job", updated.status.as_str());
        if auto_rejected > 0 {
            counter!("applications_auto_rejected_total").increment(auto_rejected);
        }
        info!(
            stage = "workflow",
            job_id,
            role = role.as_str(),
            from = current.status.as_str(),
            to = updated.status.as_str(),
            auto_rejected,
            "job transitioned"
        );
        Ok(updated)
    }

    /// Creates a pending application after every precondition holds.
    pub async fn apply(
        &self,
        student_id: &str,
        job_id: &str,
        cover_letter: Option<String>,
    ) -> Result<Application, WorkflowError> {
        let now = self.now();
        let applications = self.database.applications();

        let mut tx = self.database.begin().await?;
        let student = self.database.students().fetch_in(&mut tx, student_id).await?;
        let job = self.database.jobs().fetch_in(&mut tx, job_id).await?;
        let existing = applications
            .find_for_student_job(&mut tx, student_id, job_id)
            .await?;
        let company = self
            .database
            .companies()
            .fetch_in(&mut tx, &job.company_id)
            .await?;
        let quota = self.quota_in(&mut tx, &student, now).await?;
        lifecycle::check_apply(&student, &job, company.status, existing.as_ref(), &quota)?;

        let application = Application {
            id: Uuid::new_v4().to_string(),
            student_id: student.id.clone(),
            job_id: job.id.clone(),
            cover_letter: cover_letter
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            status: ApplicationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        applications
            .insert(&mut tx, &application)
            .await
            .map_err(|err| match err {
                RepoError::Conflict => WorkflowError::Apply(ApplyError::AlreadyApplied),
                other => other.into(),
            })?;
        let drafts = vec![Notifier::application_received(&application, &job, &student)];
        self.commit_with(tx, &drafts, now).await?;

        counter!("applications_submitted_total").increment(1);
        info!(
            stage = "workflow",
            application_id = %application.id,
            student_id,
            job_id,
            "application submitted"
        );
        Ok(application)
    }

    /// Moves an application on behalf of its student, the job's company or an administrator.
    pub async fn transition_application(
        &self,
        role: Role,
        actor_id: &str,
        application_id: &str,
        target: ApplicationStatus,
    ) -> Result<Application, WorkflowError> {
        let now = self.now();
        let applications = self.database.applications();

        let mut tx = self.database.begin().await?;
        let current = applications.fetch_in(&mut tx, application_id).await?;
        let job = self.database.jobs().fetch_in(&mut tx, &current.job_id).await?;
        let owned = match role {
            Role::Student => current.student_id == actor_id,
            Role::Company => job.company_id == actor_id,
            Role::Admin => true,
        };
        if !owned {
            return Err(WorkflowError::NotOwner("application"));
        }

        let status = lifecycle::transition_application(role, current.status, target)?;
        let updated = applications
            .set_status(&mut tx, application_id, status, now)
            .await?;
        if status == ApplicationStatus::Hired {
            self.database
                .students()
                .mark_hired(&mut tx, &updated.student_id, now)
                .await?;
        }
        let drafts: Vec<_> = Notifier::application_updated(&updated, &job)
            .into_iter()
            .collect();
        self.commit_with(tx, &drafts, now).await?;

        record_transition("application", status.as_str());
        info!(
            stage = "workflow",
            application_id,
            role = role.as_str(),
            from = current.status.as_str(),
            to = status.as_str(),
            "application transitioned"
        );
        Ok(updated)
    }

    /// Assigns an active subscription plan to a student.
    pub async fn assign_subscription(
        &self,
        student_id: &str,
        plan_id: &str,
    ) -> Result<Student, WorkflowError> {
        let now = self.now();

        let mut tx = self.database.begin().await?;
        let plan = self.database.plans().fetch_in(&mut tx, plan_id).await?;
        if !plan.is_active {
            return Err(WorkflowError::PlanInactive);
        }
        let student = self
            .database
            .students()
            .assign_plan(&mut tx, student_id, plan_id, now)
            .await?;
        let drafts = vec![Notifier::subscription_assigned(&student, &plan)];
        self.commit_with(tx, &drafts, now).await?;

        info!(stage = "workflow", student_id, plan_id, "subscription assigned");
        Ok(student)
    }

    /// Current application allowance for a student.
    pub async fn quota(&self, student_id: &str) -> Result<QuotaStatus, WorkflowError> {
        let now = self.now();
        let mut tx = self.database.begin().await?;
        let student = self.database.students().fetch_in(&mut tx, student_id).await?;
        let quota = self.quota_in(&mut tx, &student, now).await?;
        tx.commit().await.map_err(RepoError::from)?;
        Ok(quota)
    }

    async fn quota_in(
        &self,
        tx: &mut Tx<'_>,
        student: &Student,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, RepoError> {
        let plans = self.database.plans();
        let assigned = match &student.subscription_plan_id {
            Some(plan_id) => Some(plans.fetch_in(tx, plan_id).await?),
            None => None,
        };
        let fallback = match assigned {
            Some(_) => None,
            None => plans.default_free(tx).await?,
        };
        let window_start = quota::window_start(now);
        let used = self
            .database
            .applications()
            .count_created_since(tx, &student.id, window_start)
            .await?;

        Ok(QuotaStatus::resolve(
            assigned.as_ref(),
            fallback.as_ref(),
            used,
            window_start,
        ))
    }

    async fn insert_account(
        &self,
        tx: &mut Tx<'_>,
        id: &str,
        role: Role,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.database
            .accounts()
            .insert(
                tx,
                &NewAccount {
                    id,
                    role,
                    email,
                    password_hash,
                    created_at: now,
                },
            )
            .await
            .map_err(|err| match err {
                RepoError::Conflict => WorkflowError::EmailTaken,
                other => other.into(),
            })
    }

    async fn commit_with(
        &self,
        mut tx: Tx<'_>,
        drafts: &[NotificationDraft],
        now: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        if !drafts.is_empty() {
            self.database
                .notifications()
                .insert_all(&mut tx, drafts, now)
                .await?;
        }
        tx.commit().await?;

        for draft in drafts {
            counter!("notifications_emitted_total", "kind" => draft.kind.as_str()).increment(1);
        }
        Ok(())
    }
}

fn record_transition(entity: &'static str, status: &'static str) {
    counter!("status_transitions_total", "entity" => entity, "status" => status).increment(1);
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error("{0} does not belong to the caller")]
    NotOwner(&'static str),
    #[error("email is already registered")]
    EmailTaken,
    #[error("subscription plan is not active")]
    PlanInactive,
}

impl From<WorkflowError> for ProblemResponse {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Repo(err) => err.into(),
            WorkflowError::Transition(err) => err.into(),
            WorkflowError::Apply(err) => err.into(),
            WorkflowError::NotOwner(_) => ProblemResponse::forbidden(err.to_string()),
            WorkflowError::EmailTaken => ProblemResponse::conflict("email_taken", err.to_string()),
            WorkflowError::PlanInactive => {
                ProblemResponse::conflict("plan_inactive", err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixed_clock, setup_db};
    use aqua_talent_core::types::{JobType, NotificationKind};
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn setup_executor() -> (TempDir, WorkflowExecutor) {
        let (dir, database) = setup_db().await;
        let clock = fixed_clock(Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap());
        (dir, WorkflowExecutor::new(database, clock))
    }

    async fn approved_company(executor: &WorkflowExecutor, email: &str) -> Company {
        let company = executor
            .register_company(CompanyRegistration {
                email: email.to_string(),
                password_hash: "salt$hash".into(),
                name: "Aqua Works".into(),
                industry: None,
                location: None,
                website: None,
                description: None,
            })
            .await
            .expect("register company");
        executor
            .decide_company(&company.id, CompanyStatus::Approved, None)
            .await
            .expect("approve company")
    }

    async fn student(executor: &WorkflowExecutor, email: &str) -> Student {
        executor
            .register_student(StudentRegistration {
                email: email.to_string(),
                password_hash: "salt$hash".into(),
                full_name: "Rina".into(),
                university: None,
                major: None,
                graduation_year: None,
            })
            .await
            .expect("register student")
    }

    async fn live_job(executor: &WorkflowExecutor, company: &Company) -> JobPosting {
        let now = executor.now();
        let job = JobPosting {
            id: Uuid::new_v4().to_string(),
            company_id: company.id.clone(),
            title: "Backend Intern".into(),
            description: "Build services".into(),
            location: None,
            job_type: JobType::Internship,
            salary_min: None,
            salary_max: None,
            requirements: Vec::new(),
            status: JobStatus::Draft,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };
        executor.database.jobs().insert(&job).await.expect("insert job");
        executor
            .transition_job(Role::Company, &company.id, &job.id, JobStatus::Pending, None)
            .await
            .expect("submit");
        executor
            .transition_job(Role::Admin, "admin-1", &job.id, JobStatus::Approved, None)
            .await
            .expect("approve")
    }

    #[tokio::test]
    async fn duplicate_email_per_role_is_rejected() {
        let (_dir, executor) = setup_executor().await;
        student(&executor, "rina@example.test").await;

        let err = executor
            .register_student(StudentRegistration {
                email: "rina@example.test".into(),
                password_hash: "salt$hash".into(),
                full_name: "Other".into(),
                university: None,
                major: None,
                graduation_year: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::EmailTaken));
    }

    #[tokio::test]
    async fn company_registration_notifies_admins() {
        let (_dir, executor) = setup_executor().await;
        approved_company(&executor, "hr@aqua.test").await;

        let inbox = executor
            .database
            .notifications()
            .list_for(Role::Admin, "admin", false)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::CompanyRegistered);
    }

    #[tokio::test]
    async fn other_companies_cannot_touch_a_job() {
        let (_dir, executor) = setup_executor().await;
        let owner = approved_company(&executor, "owner@aqua.test").await;
        let intruder = approved_company(&executor, "intruder@aqua.test").await;
        let job = live_job(&executor, &owner).await;

        let err = executor
            .transition_job(Role::Company, &intruder.id, &job.id, JobStatus::Closed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotOwner("job")));
    }

    #[tokio::test]
    async fn closing_a_job_rejects_open_applications() {
        let (_dir, executor) = setup_executor().await;
        let company = approved_company(&executor, "hr@aqua.test").await;
        let job = live_job(&executor, &company).await;
        let first = student(&executor, "a@example.test").await;
        let second = student(&executor, "b@example.test").await;

        let pending = executor.apply(&first.id, &job.id, None).await.unwrap();
        let reviewed = executor.apply(&second.id, &job.id, None).await.unwrap();
        executor
            .transition_application(Role::Admin, "admin-1", &reviewed.id, ApplicationStatus::Reviewed)
            .await
            .unwrap();

        let closed = executor
            .transition_job(Role::Company, &company.id, &job.id, JobStatus::Closed, None)
            .await
            .unwrap();
        assert_eq!(closed.status, JobStatus::Closed);

        let applications = executor.database.applications();
        for id in [&pending.id, &reviewed.id] {
            assert_eq!(
                applications.fetch(id).await.unwrap().status,
                ApplicationStatus::Rejected
            );
        }
        let notices = executor
            .database
            .notifications()
            .list_for(Role::Student, &first.id, false)
            .await
            .unwrap();
        assert!(notices
            .iter()
            .any(|notice| notice.kind == NotificationKind::ApplicationRejected));
    }

    #[tokio::test]
    async fn hiring_marks_the_student_and_blocks_new_applications() {
        let (_dir, executor) = setup_executor().await;
        let company = approved_company(&executor, "hr@aqua.test").await;
        let job = live_job(&executor, &company).await;
        let other_job = live_job(&executor, &company).await;
        let candidate = student(&executor, "a@example.test").await;

        let application = executor.apply(&candidate.id, &job.id, None).await.unwrap();
        executor
            .transition_application(Role::Admin, "admin-1", &application.id, ApplicationStatus::Reviewed)
            .await
            .unwrap();
        executor
            .transition_application(Role::Company, &company.id, &application.id, ApplicationStatus::Hired)
            .await
            .unwrap();

        let stored = executor.database.students().fetch(&candidate.id).await.unwrap();
        assert!(stored.is_hired);

        let err = executor
            .apply(&candidate.id, &other_job.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Apply(ApplyError::StudentHired)));
    }

    #[tokio::test]
    async fn quota_counts_withdrawn_applications() {
        let (_dir, executor) = setup_executor().await;
        let company = approved_company(&executor, "hr@aqua.test").await;
        let candidate = student(&executor, "a@example.test").await;

        for _ in 0..5 {
            let job = live_job(&executor, &company).await;
            let application = executor.apply(&candidate.id, &job.id, None).await.unwrap();
            executor
                .transition_application(
                    Role::Student,
                    &candidate.id,
                    &application.id,
                    ApplicationStatus::Withdrawn,
                )
                .await
                .unwrap();
        }

        let quota = executor.quota(&candidate.id).await.unwrap();
        assert_eq!(quota.used, 5);
        assert_eq!(quota.remaining, Some(0));

        let job = live_job(&executor, &company).await;
        let err = executor.apply(&candidate.id, &job.id, None).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Apply(ApplyError::QuotaExceeded { limit: 5 })
        ));

        executor
            .assign_subscription(&candidate.id, "plan-premium")
            .await
            .unwrap();
        executor
            .apply(&candidate.id, &job.id, None)
            .await
            .expect("premium plan is unlimited");
    }

    #[tokio::test]
    async fn rejected_company_closes_jobs_before_quota_applies() {
        let (_dir, executor) = setup_executor().await;
        let company = approved_company(&executor, "hr@aqua.test").await;
        let candidate = student(&executor, "a@example.test").await;

        for _ in 0..5 {
            let job = live_job(&executor, &company).await;
            executor.apply(&candidate.id, &job.id, None).await.unwrap();
        }
        let job = live_job(&executor, &company).await;
        executor
            .decide_company(&company.id, CompanyStatus::Rejected, Some("lapsed documents"))
            .await
            .unwrap();

        let err = executor.apply(&candidate.id, &job.id, None).await.unwrap_err();
        assert!(
            matches!(err, WorkflowError::Apply(ApplyError::JobNotOpen)),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn students_cannot_withdraw_for_someone_else() {
        let (_dir, executor) = setup_executor().await;
        let company = approved_company(&executor, "hr@aqua.test").await;
        let job = live_job(&executor, &company).await;
        let owner = student(&executor, "a@example.test").await;
        let other = student(&executor, "b@example.test").await;

        let application = executor.apply(&owner.id, &job.id, None).await.unwrap();
        let err = executor
            .transition_application(
                Role::Student,
                &other.id,
                &application.id,
                ApplicationStatus::Withdrawn,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotOwner("application")));
    }
}
