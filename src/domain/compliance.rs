//! BS 7671 compliance tests and their circuit results.
//!
//! A test is scheduled, carried out (circuit readings recorded while in
//! progress) and completed, at which point the outcome is derived from the
//! readings and a certificate number is issued.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::event_types;
use crate::domain::status::{Status, Transition};
use crate::domain::tenant::TenantId;
use crate::error::{JobBuildaError, Result};

/// Minimum insulation resistance for circuits up to 500 V (Table 64)
pub const MIN_INSULATION_RESISTANCE_MOHM: f64 = 1.0;

/// Maximum RCD disconnection time at rated residual current
pub const MAX_RCD_TRIP_MS: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Scheduled,
    InProgress,
    Completed,
}

impl Status for TestStatus {
    const ENTITY: &'static str = "test";

    fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Scheduled => "scheduled",
            TestStatus::InProgress => "in_progress",
            TestStatus::Completed => "completed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(TestStatus::Scheduled),
            "in_progress" => Some(TestStatus::InProgress),
            "completed" => Some(TestStatus::Completed),
            _ => None,
        }
    }
}

pub mod transitions {
    use super::*;

    pub const START: Transition<TestStatus> = Transition {
        action: "start",
        from: &[TestStatus::Scheduled],
        to: TestStatus::InProgress,
        event_type: event_types::TEST_STARTED,
    };

    pub const COMPLETE: Transition<TestStatus> = Transition {
        action: "complete",
        from: &[TestStatus::InProgress],
        to: TestStatus::Completed,
        event_type: event_types::TEST_COMPLETED,
    };
}

/// Certificate issued at the end of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateType {
    /// Electrical Installation Certificate
    Eic,
    /// Electrical Installation Condition Report
    Eicr,
    /// Minor Electrical Installation Works Certificate
    Mwc,
}

impl CertificateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateType::Eic => "eic",
            CertificateType::Eicr => "eicr",
            CertificateType::Mwc => "mwc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eic" => Some(CertificateType::Eic),
            "eicr" => Some(CertificateType::Eicr),
            "mwc" => Some(CertificateType::Mwc),
            _ => None,
        }
    }

    /// Prefix used for certificate numbers
    pub fn prefix(&self) -> &'static str {
        match self {
            CertificateType::Eic => "EIC",
            CertificateType::Eicr => "EICR",
            CertificateType::Mwc => "MWC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Satisfactory,
    Unsatisfactory,
}

impl TestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestOutcome::Satisfactory => "satisfactory",
            TestOutcome::Unsatisfactory => "unsatisfactory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "satisfactory" => Some(TestOutcome::Satisfactory),
            "unsatisfactory" => Some(TestOutcome::Unsatisfactory),
            _ => None,
        }
    }

    /// Satisfactory only when every circuit passed.
    pub fn from_results(results: &[CircuitResult]) -> Self {
        if results.iter().all(|r| r.passed) {
            TestOutcome::Satisfactory
        } else {
            TestOutcome::Unsatisfactory
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceTest {
    pub id: String,
    pub tenant_id: TenantId,
    pub job_id: Option<String>,
    pub certificate_type: CertificateType,
    pub inspector: String,
    pub scheduled_for: Option<NaiveDate>,
    pub status: TestStatus,
    pub outcome: Option<TestOutcome>,
    pub certificate_number: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Readings as supplied by the inspector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitReadings {
    pub circuit_ref: String,
    #[serde(default)]
    pub description: Option<String>,
    pub insulation_resistance_mohm: f64,
    #[serde(default)]
    pub zs_ohm: Option<f64>,
    #[serde(default)]
    pub max_zs_ohm: Option<f64>,
    #[serde(default)]
    pub rcd_trip_ms: Option<f64>,
}

impl CircuitReadings {
    pub fn validate(&self) -> Result<()> {
        if self.circuit_ref.trim().is_empty() {
            return Err(JobBuildaError::validation("circuit_ref must not be empty"));
        }
        let readings = [
            ("insulation_resistance_mohm", Some(self.insulation_resistance_mohm)),
            ("zs_ohm", self.zs_ohm),
            ("max_zs_ohm", self.max_zs_ohm),
            ("rcd_trip_ms", self.rcd_trip_ms),
        ];
        for (name, value) in readings {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(JobBuildaError::validation(format!(
                        "{} must be a non-negative number, got {}",
                        name, v
                    )));
                }
            }
        }
        Ok(())
    }

    /// Apply the pass criteria to these readings.
    pub fn passes(&self) -> bool {
        if self.insulation_resistance_mohm < MIN_INSULATION_RESISTANCE_MOHM {
            return false;
        }
        if let (Some(zs), Some(max_zs)) = (self.zs_ohm, self.max_zs_ohm) {
            if zs > max_zs {
                return false;
            }
        }
        if let Some(trip) = self.rcd_trip_ms {
            if trip > MAX_RCD_TRIP_MS {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitResult {
    pub id: String,
    pub tenant_id: TenantId,
    pub test_id: String,
    #[serde(flatten)]
    pub readings: CircuitReadings,
    pub passed: bool,
    pub recorded_at: DateTime<Utc>,
}
