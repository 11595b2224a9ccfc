use serde::Serialize;

use crate::types::{Application, Company, JobPosting, NotificationKind, Role, Student, SubscriptionPlan};

/// Recipient id shared by every administrator.
pub const ADMIN_RECIPIENT: &str = "admin";

/// Notification ready to be persisted; id and timestamp are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationDraft {
    pub recipient_id: String,
    pub recipient_type: Role,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: Option<String>,
}

impl NotificationDraft {
    fn new(
        recipient_type: Role,
        recipient_id: &str,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        related_id: &str,
    ) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            recipient_type,
            kind,
            title: title.into(),
            message: message.into(),
            related_id: Some(related_id.to_string()),
        }
    }
}

/// Pure builders turning lifecycle events into notification drafts.
pub struct Notifier;

impl Notifier {
    /// Tells administrators a company is waiting for review.
    pub fn company_registered(company: &Company) -> NotificationDraft {
        NotificationDraft::new(
            Role::Admin,
            ADMIN_RECIPIENT,
            NotificationKind::CompanyRegistered,
            "New company registration",
            format!("{} registered and is waiting for review.", company.name),
            &company.id,
        )
    }

    /// Reports an approval or rejection back to the company.
    pub fn company_decided(company: &Company) -> NotificationDraft {
        match company.rejection_reason.as_deref() {
            Some(reason) => NotificationDraft::new(
                Role::Company,
                &company.id,
                NotificationKind::CompanyRejected,
                "Company registration rejected",
                format!("Your company registration was rejected: {reason}"),
                &company.id,
            ),
            None => NotificationDraft::new(
                Role::Company,
                &company.id,
                NotificationKind::CompanyApproved,
                "Company approved",
                "Your company has been approved. You can now publish job postings.",
                &company.id,
            ),
        }
    }

    pub fn job_submitted(job: &JobPosting, company: &Company) -> NotificationDraft {
        NotificationDraft::new(
            Role::Admin,
            ADMIN_RECIPIENT,
            NotificationKind::JobSubmitted,
            "Job posting awaiting review",
            format!("{} submitted \"{}\" for review.", company.name, job.title),
            &job.id,
        )
    }

    /// Builds the company-facing notice for an admin decision on a job.
    ///
    /// Returns `None` for transitions the company performed itself.
    pub fn job_moderated(job: &JobPosting) -> Option<NotificationDraft> {
        use crate::types::JobStatus;

        let (kind, title, message) = match job.status {
            JobStatus::Approved => (
                NotificationKind::JobApproved,
                "Job posting approved",
                format!("\"{}\" is now live.", job.title),
            ),
            JobStatus::Rejected => (
                NotificationKind::JobRejected,
                "Job posting rejected",
                format!(
                    "\"{}\" was rejected: {}",
                    job.title,
                    job.rejection_reason.as_deref().unwrap_or("no reason given")
                ),
            ),
            JobStatus::Unpublished => (
                NotificationKind::JobUnpublishedByAdmin,
                "Job posting unpublished",
                format!("\"{}\" was unpublished by an administrator.", job.title),
            ),
            JobStatus::Closed => (
                NotificationKind::JobClosedByAdmin,
                "Job posting closed",
                format!("\"{}\" was closed by an administrator.", job.title),
            ),
            JobStatus::Draft | JobStatus::Pending => return None,
        };

        Some(NotificationDraft::new(
            Role::Company,
            &job.company_id,
            kind,
            title,
            message,
            &job.id,
        ))
    }

    pub fn application_received(
        application: &Application,
        job: &JobPosting,
        student: &Student,
    ) -> NotificationDraft {
        NotificationDraft::new(
            Role::Company,
            &job.company_id,
            NotificationKind::ApplicationReceived,
            "New application",
            format!("{} applied to \"{}\".", student.full_name, job.title),
            &application.id,
        )
    }

    /// Builds the notice for an application that changed status.
    ///
    /// Withdrawals go to the company; every other outcome goes to the student.
    pub fn application_updated(
        application: &Application,
        job: &JobPosting,
    ) -> Option<NotificationDraft> {
        use crate::types::ApplicationStatus;

        let (kind, title, message) = match application.status {
            ApplicationStatus::Reviewed => (
                NotificationKind::ApplicationReviewed,
                "Application reviewed",
                format!(
                    "Your application to \"{}\" was reviewed and forwarded to the company.",
                    job.title
                ),
            ),
            ApplicationStatus::Hired => (
                NotificationKind::ApplicationHired,
                "Congratulations!",
                format!("You have been hired for \"{}\".", job.title),
            ),
            ApplicationStatus::Rejected => (
                NotificationKind::ApplicationRejected,
                "Application update",
                format!("Your application to \"{}\" was not successful.", job.title),
            ),
            ApplicationStatus::Withdrawn => {
                return Some(NotificationDraft::new(
                    Role::Company,
                    &job.company_id,
                    NotificationKind::ApplicationWithdrawn,
                    "Application withdrawn",
                    format!("An applicant withdrew from \"{}\".", job.title),
                    &application.id,
                ))
            }
            ApplicationStatus::Pending => return None,
        };

        Some(NotificationDraft::new(
            Role::Student,
            &application.student_id,
            kind,
            title,
            message,
            &application.id,
        ))
    }

    pub fn subscription_assigned(student: &Student, plan: &SubscriptionPlan) -> NotificationDraft {
        NotificationDraft::new(
            Role::Student,
            &student.id,
            NotificationKind::SubscriptionAssigned,
            "Subscription updated",
            format!("Your subscription is now {}.", plan.name),
            &plan.id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApplicationStatus, CompanyStatus, JobStatus, JobType};
    use chrono::{TimeZone, Utc};

    fn company(reason: Option<&str>) -> Company {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Company {
            id: "c-1".into(),
            email: "hr@acme.test".into(),
            name: "Acme".into(),
            industry: None,
            location: None,
            website: None,
            description: None,
            status: if reason.is_some() {
                CompanyStatus::Rejected
            } else {
                CompanyStatus::Approved
            },
            rejection_reason: reason.map(str::to_string),
            created_at: at,
            updated_at: at,
        }
    }

    fn job(status: JobStatus) -> JobPosting {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        JobPosting {
            id: "j-1".into(),
            company_id: "c-1".into(),
            title: "Data Analyst".into(),
            description: "Numbers".into(),
            location: None,
            job_type: JobType::Internship,
            salary_min: None,
            salary_max: None,
            requirements: Vec::new(),
            status,
            rejection_reason: Some("duplicate listing".into()),
            created_at: at,
            updated_at: at,
        }
    }

    fn application(status: ApplicationStatus) -> Application {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        Application {
            id: "a-1".into(),
            student_id: "s-1".into(),
            job_id: "j-1".into(),
            cover_letter: None,
            status,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn company_decision_follows_reason() {
        let rejected = Notifier::company_decided(&company(Some("missing documents")));
        assert_eq!(rejected.kind, NotificationKind::CompanyRejected);
        assert!(rejected.message.contains("missing documents"));

        let approved = Notifier::company_decided(&company(None));
        assert_eq!(approved.kind, NotificationKind::CompanyApproved);
        assert_eq!(approved.recipient_type, Role::Company);
    }

    #[test]
    fn registrations_go_to_admins() {
        let draft = Notifier::company_registered(&company(None));
        assert_eq!(draft.recipient_id, ADMIN_RECIPIENT);
        assert_eq!(draft.recipient_type, Role::Admin);
    }

    #[test]
    fn moderation_notices_target_the_company() {
        let draft = Notifier::job_moderated(&job(JobStatus::Rejected)).unwrap();
        assert_eq!(draft.recipient_id, "c-1");
        assert!(draft.message.contains("duplicate listing"));
        assert!(Notifier::job_moderated(&job(JobStatus::Pending)).is_none());
    }

    #[test]
    fn withdrawals_notify_company_others_notify_student() {
        let job = job(JobStatus::Approved);
        let withdrawn =
            Notifier::application_updated(&application(ApplicationStatus::Withdrawn), &job)
                .unwrap();
        assert_eq!(withdrawn.recipient_type, Role::Company);

        let hired =
            Notifier::application_updated(&application(ApplicationStatus::Hired), &job).unwrap();
        assert_eq!(hired.recipient_type, Role::Student);
        assert_eq!(hired.recipient_id, "s-1");
        assert_eq!(hired.kind, NotificationKind::ApplicationHired);
    }
}
