//! Jobs and the time logged against them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::event_types;
use crate::domain::money::{check_amount, extend};
use crate::domain::status::{Status, Transition};
use crate::domain::tenant::TenantId;
use crate::error::{JobBuildaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl Status for JobStatus {
    const ENTITY: &'static str = "job";

    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(JobStatus::Scheduled),
            "in_progress" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

impl JobStatus {
    /// Job still accepts variations
    pub fn is_open(&self) -> bool {
        matches!(self, JobStatus::Scheduled | JobStatus::InProgress)
    }
}

pub mod transitions {
    use super::*;

    pub const START: Transition<JobStatus> = Transition {
        action: "start",
        from: &[JobStatus::Scheduled],
        to: JobStatus::InProgress,
        event_type: event_types::JOB_STARTED,
    };

    pub const COMPLETE: Transition<JobStatus> = Transition {
        action: "complete",
        from: &[JobStatus::InProgress],
        to: JobStatus::Completed,
        event_type: event_types::JOB_COMPLETED,
    };

    pub const CANCEL: Transition<JobStatus> = Transition {
        action: "cancel",
        from: &[JobStatus::Scheduled, JobStatus::InProgress],
        to: JobStatus::Cancelled,
        event_type: event_types::JOB_CANCELLED,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub tenant_id: TenantId,
    pub job_number: String,
    pub client_id: String,
    pub quote_id: Option<String>,
    pub title: String,
    pub site_address: Option<String>,
    pub scheduled_for: Option<NaiveDate>,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Hours worked on a job by one worker on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: String,
    pub tenant_id: TenantId,
    pub job_id: String,
    pub worker: String,
    pub hours: f64,
    pub rate_pence: i64,
    pub cost_pence: i64,
    pub worked_on: NaiveDate,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validate hours/rate and compute the labour cost.
pub fn labour_cost(hours: f64, rate_pence: i64) -> Result<i64> {
    if !hours.is_finite() || hours <= 0.0 || hours > 24.0 {
        return Err(JobBuildaError::validation(format!(
            "hours must be greater than 0 and at most 24, got {}",
            hours
        )));
    }
    check_amount("rate_pence", rate_pence)?;
    extend("labour cost", hours, rate_pence)
}
