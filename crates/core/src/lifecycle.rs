//! Status transition rules for companies, job postings and applications.
//!
//! Every function here is pure: callers load the current record, ask whether
//! the transition is allowed, then persist the outcome themselves.

use thiserror::Error;

use crate::quota::QuotaStatus;
use crate::types::{
    Application, ApplicationStatus, CompanyStatus, JobPosting, JobStatus, Role, Student,
};

/// Reasons a requested transition is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{entity} cannot move from {from} to {to}")]
    Invalid {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
    #[error("{entity} is already {status}")]
    Unchanged {
        entity: &'static str,
        status: &'static str,
    },
    #[error("{role} is not allowed to move {entity} to {to}")]
    Forbidden {
        entity: &'static str,
        role: &'static str,
        to: &'static str,
    },
    #[error("a rejection reason is required")]
    ReasonRequired,
    #[error("company must be approved before submitting jobs")]
    CompanyNotApproved,
}

/// Outcome of an allowed company decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyDecision {
    pub status: CompanyStatus,
    pub rejection_reason: Option<String>,
}

/// Validates an administrator's decision on a company account.
///
/// `rejected` requires a non-blank reason and `approved` clears any previous
/// one, so the stored reason is present exactly when the company is rejected.
pub fn decide_company(
    current: CompanyStatus,
    target: CompanyStatus,
    reason: Option<&str>,
) -> Result<CompanyDecision, TransitionError> {
    if target == CompanyStatus::Pending {
        return Err(TransitionError::Invalid {
            entity: "company",
            from: current.as_str(),
            to: target.as_str(),
        });
    }
    if current == target {
        return Err(TransitionError::Unchanged {
            entity: "company",
            status: current.as_str(),
        });
    }

    let rejection_reason = match target {
        CompanyStatus::Rejected => Some(required_reason(reason)?),
        _ => None,
    };

    Ok(CompanyDecision {
        status: target,
        rejection_reason,
    })
}

/// Side effects that accompany an allowed job transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTransition {
    pub status: JobStatus,
    pub rejection_reason: Option<String>,
    /// Open applications must be rejected in the same unit of work.
    pub closes_applications: bool,
}

/// Validates a job status change requested by `role`.
///
/// `company_status` is the owning company's current status; it only matters
/// when a job is submitted for review.
pub fn transition_job(
    role: Role,
    company_status: CompanyStatus,
    current: JobStatus,
    target: JobStatus,
    reason: Option<&str>,
) -> Result<JobTransition, TransitionError> {
    use JobStatus::*;

    if current == target {
        return Err(TransitionError::Unchanged {
            entity: "job",
            status: current.as_str(),
        });
    }

    let structurally_valid = matches!(
        (current, target),
        (Draft | Rejected, Pending)
            | (Pending, Approved)
            | (Pending | Approved, Rejected)
            | (Approved, Unpublished)
            | (Unpublished, Approved)
            | (Approved | Unpublished, Closed)
    );
    if !structurally_valid {
        return Err(TransitionError::Invalid {
            entity: "job",
            from: current.as_str(),
            to: target.as_str(),
        });
    }

    let permitted = match role {
        Role::Company => matches!(
            (current, target),
            (_, Pending) | (Approved, Unpublished) | (Unpublished, Approved) | (_, Closed)
        ),
        Role::Admin => matches!(
            (current, target),
            (Pending, Approved) | (_, Rejected) | (Approved, Unpublished) | (_, Closed)
        ),
        Role::Student => false,
    };
    if !permitted {
        return Err(TransitionError::Forbidden {
            entity: "job",
            role: role.as_str(),
            to: target.as_str(),
        });
    }

    if target == Pending && company_status != CompanyStatus::Approved {
        return Err(TransitionError::CompanyNotApproved);
    }

    let rejection_reason = match target {
        Rejected => Some(required_reason(reason)?),
        _ => None,
    };

    Ok(JobTransition {
        status: target,
        rejection_reason,
        closes_applications: target == Closed,
    })
}

/// Validates an application status change requested by `role`.
///
/// Ownership (the student who applied, the company that owns the job) is
/// checked by the caller; this only encodes who may perform which step.
pub fn transition_application(
    role: Role,
    current: ApplicationStatus,
    target: ApplicationStatus,
) -> Result<ApplicationStatus, TransitionError> {
    use ApplicationStatus::*;

    if current == target {
        return Err(TransitionError::Unchanged {
            entity: "application",
            status: current.as_str(),
        });
    }
    if current.is_terminal() || target == Pending {
        return Err(TransitionError::Invalid {
            entity: "application",
            from: current.as_str(),
            to: target.as_str(),
        });
    }

    let allowed = match role {
        Role::Admin => matches!((current, target), (Pending, Reviewed | Rejected)),
        Role::Company => matches!((current, target), (Reviewed, Hired | Rejected)),
        Role::Student => target == Withdrawn,
    };
    if allowed {
        return Ok(target);
    }

    // Distinguish "wrong actor" from "wrong order" for clearer errors.
    let reachable_by_anyone = matches!(
        (current, target),
        (Pending, Reviewed | Rejected | Withdrawn) | (Reviewed, Hired | Rejected | Withdrawn)
    );
    if reachable_by_anyone {
        Err(TransitionError::Forbidden {
            entity: "application",
            role: role.as_str(),
            to: target.as_str(),
        })
    } else {
        Err(TransitionError::Invalid {
            entity: "application",
            from: current.as_str(),
            to: target.as_str(),
        })
    }
}

/// Reasons a student may not apply to a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("student has already been hired")]
    StudentHired,
    #[error("job is not accepting applications")]
    JobNotOpen,
    #[error("student already applied to this job")]
    AlreadyApplied,
    #[error("monthly application quota of {limit} reached")]
    QuotaExceeded { limit: u32 },
}

/// Checks every precondition for a new application, in a fixed order.
///
/// A job is only open while it is approved and its company is approved too.
pub fn check_apply(
    student: &Student,
    job: &JobPosting,
    company_status: CompanyStatus,
    existing: Option<&Application>,
    quota: &QuotaStatus,
) -> Result<(), ApplyError> {
    if student.is_hired {
        return Err(ApplyError::StudentHired);
    }
    if !job.status.accepts_applications() || company_status != CompanyStatus::Approved {
        return Err(ApplyError::JobNotOpen);
    }
    if existing.is_some() {
        return Err(ApplyError::AlreadyApplied);
    }
    match quota.limit {
        Some(limit) if quota.is_exhausted() => Err(ApplyError::QuotaExceeded { limit }),
        _ => Ok(()),
    }
}

fn required_reason(reason: Option<&str>) -> Result<String, TransitionError> {
    reason
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(TransitionError::ReasonRequired)
}
