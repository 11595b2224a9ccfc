use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error returned when a persisted or user supplied enum value is unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a string backed enum with `as_str`, `FromStr` and `Display`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Returns the canonical wire/database representation.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Account role; also the recipient type of notifications.
    Role ("role") {
        Student => "student",
        Company => "company",
        Admin => "admin",
    }
}

string_enum! {
    /// Review state of a company account.
    CompanyStatus ("company status") {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

string_enum! {
    /// Publication state of a job posting.
    JobStatus ("job status") {
        Draft => "draft",
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Unpublished => "unpublished",
        Closed => "closed",
    }
}

string_enum! {
    JobType ("job type") {
        FullTime => "full_time",
        PartTime => "part_time",
        Internship => "internship",
        Contract => "contract",
    }
}

string_enum! {
    /// Progress of a student's application to a job.
    ApplicationStatus ("application status") {
        Pending => "pending",
        Reviewed => "reviewed",
        Hired => "hired",
        Rejected => "rejected",
        Withdrawn => "withdrawn",
    }
}

string_enum! {
    PlanTier ("plan tier") {
        Free => "free",
        Paid => "paid",
    }
}

string_enum! {
    BillingPeriod ("billing period") {
        Monthly => "monthly",
        Yearly => "yearly",
        OneTime => "one_time",
    }
}

string_enum! {
    /// Type tag carried by every notification.
    NotificationKind ("notification kind") {
        CompanyRegistered => "company_registered",
        CompanyApproved => "company_approved",
        CompanyRejected => "company_rejected",
        JobSubmitted => "job_submitted",
        JobApproved => "job_approved",
        JobRejected => "job_rejected",
        JobUnpublishedByAdmin => "job_unpublished_by_admin",
        JobClosedByAdmin => "job_closed_by_admin",
        ApplicationReceived => "application_received",
        ApplicationReviewed => "application_reviewed",
        ApplicationHired => "application_hired",
        ApplicationRejected => "application_rejected",
        ApplicationWithdrawn => "application_withdrawn",
        SubscriptionAssigned => "subscription_assigned",
    }
}

impl ApplicationStatus {
    /// Open applications can still move; the rest are final.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Reviewed)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_open()
    }
}

impl JobStatus {
    /// Returns `true` when students may apply to a job in this state.
    pub fn accepts_applications(self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Job content may only be edited before it goes live.
    pub fn is_editable(self) -> bool {
        matches!(self, Self::Draft | Self::Rejected)
    }
}

/// Company profile and review state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub email: String,
    pub name: String,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub status: CompanyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Student profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub university: Option<String>,
    pub major: Option<String>,
    pub graduation_year: Option<i32>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub bio: Option<String>,
    pub resume_url: Option<String>,
    pub is_hired: bool,
    pub subscription_plan_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Job posting owned by a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    pub company_id: String,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub job_type: JobType,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A student's application to a job posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub student_id: String,
    pub job_id: String,
    pub cover_letter: Option<String>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pricing and quota metadata for a subscription tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    pub tier: PlanTier,
    pub price_cents: i64,
    pub currency: String,
    pub billing_period: BillingPeriod,
    /// Applications allowed per calendar month; `None` means unlimited.
    pub application_quota: Option<u32>,
    #[serde(default)]
    pub features: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-app notification addressed to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub recipient_type: Role,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_their_text_form() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(*status));
        }
        for kind in NotificationKind::ALL {
            assert_eq!(kind.to_string().parse::<NotificationKind>(), Ok(*kind));
        }
    }

    #[test]
    fn unknown_values_are_reported_with_their_kind() {
        let err = "archived".parse::<ApplicationStatus>().unwrap_err();
        assert_eq!(err.kind, "application status");
        assert_eq!(err.to_string(), "unknown application status value: archived");
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let value = serde_json::to_value(JobType::FullTime).unwrap();
        assert_eq!(value, serde_json::json!("full_time"));
        let parsed: BillingPeriod = serde_json::from_value(serde_json::json!("one_time")).unwrap();
        assert_eq!(parsed, BillingPeriod::OneTime);
    }

    #[test]
    fn open_applications_are_pending_or_reviewed() {
        let open: Vec<_> = ApplicationStatus::ALL
            .iter()
            .filter(|status| status.is_open())
            .collect();
        assert_eq!(
            open,
            vec![&ApplicationStatus::Pending, &ApplicationStatus::Reviewed]
        );
        assert!(ApplicationStatus::Withdrawn.is_terminal());
    }
}
