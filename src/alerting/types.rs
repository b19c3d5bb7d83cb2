use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config;
use crate::db::DatabaseError;
use crate::models::{AlertSeverity, ComplianceStatus};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum AlertingError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("History window of {days} days exceeds the {max}-day limit")]
    HistoryTooLong { days: u32, max: u32 },
}

impl From<rusqlite::Error> for AlertingError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::from(e))
    }
}

/// Wall-clock "now" at storage precision (whole seconds, local time).
pub fn local_now() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables consumed by the evaluators and the deduplicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertingConfig {
    /// Look-back for the unresolved-duplicate pre-check.
    pub dedup_window_hours: i64,
    /// Run the pre-check before every alert insert. Clear-before-sweep
    /// happens regardless.
    pub enforce_dedup_precheck: bool,
    pub glucose_window_hours: i64,
    /// Trailing days (today included) inspected by the compliance rules.
    pub compliance_window_days: u32,
    /// An intake this recent means adherence resumed.
    pub intake_recency_days: i64,
    pub clear_batch_size: usize,
    pub glucose: GlucoseThresholds,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            dedup_window_hours: config::DEFAULT_DEDUP_WINDOW_HOURS,
            enforce_dedup_precheck: true,
            glucose_window_hours: 24,
            compliance_window_days: 3,
            intake_recency_days: 2,
            clear_batch_size: config::CLEAR_BATCH_SIZE,
            glucose: GlucoseThresholds::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Glucose thresholds (mg/dL)
// ---------------------------------------------------------------------------

/// Meal-relative glucose limits. All comparisons are strict, so a value
/// sitting exactly on a limit is inside the range it bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseThresholds {
    pub before_meal_normal_min: f64,
    pub before_meal_normal_max: f64,
    pub before_meal_severe_low: f64,
    pub before_meal_severe_high: f64,
    pub after_meal_normal_max: f64,
    pub after_meal_severe_high: f64,

    pub before_meal_critical_low: f64,
    pub before_meal_critical_high: f64,
    pub after_meal_critical_high: f64,
    pub before_meal_elevated_low: f64,
    pub before_meal_elevated_high: f64,
    pub after_meal_elevated_high: f64,
}

impl Default for GlucoseThresholds {
    fn default() -> Self {
        Self {
            before_meal_normal_min: 80.0,
            before_meal_normal_max: 130.0,
            before_meal_severe_low: 70.0,
            before_meal_severe_high: 180.0,
            after_meal_normal_max: 180.0,
            after_meal_severe_high: 250.0,

            before_meal_critical_low: 60.0,
            before_meal_critical_high: 200.0,
            after_meal_critical_high: 300.0,
            before_meal_elevated_low: 70.0,
            before_meal_elevated_high: 160.0,
            after_meal_elevated_high: 220.0,
        }
    }
}

/// Doctor-facing classification used by the threshold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlucoseTier {
    InRange,
    Elevated,
    Critical,
}

impl GlucoseThresholds {
    /// Severity of a reading outside its normal range, `None` when normal.
    pub fn abnormal_severity(&self, value: f64, is_before_meal: bool) -> Option<AlertSeverity> {
        if is_before_meal {
            if value >= self.before_meal_normal_min && value <= self.before_meal_normal_max {
                return None;
            }
            if value < self.before_meal_severe_low || value > self.before_meal_severe_high {
                Some(AlertSeverity::High)
            } else {
                Some(AlertSeverity::Medium)
            }
        } else {
            if value <= self.after_meal_normal_max {
                return None;
            }
            if value > self.after_meal_severe_high {
                Some(AlertSeverity::High)
            } else {
                Some(AlertSeverity::Medium)
            }
        }
    }

    pub fn tier(&self, value: f64, is_before_meal: bool) -> GlucoseTier {
        let (critical, elevated) = if is_before_meal {
            (
                value < self.before_meal_critical_low || value > self.before_meal_critical_high,
                value < self.before_meal_elevated_low || value > self.before_meal_elevated_high,
            )
        } else {
            (
                value > self.after_meal_critical_high,
                value > self.after_meal_elevated_high,
            )
        };
        if critical {
            GlucoseTier::Critical
        } else if elevated {
            GlucoseTier::Elevated
        } else {
            GlucoseTier::InRange
        }
    }

    /// Human-readable normal range for alert messages.
    pub fn normal_range_label(&self, is_before_meal: bool) -> String {
        if is_before_meal {
            format!(
                "{}-{} mg/dL",
                self.before_meal_normal_min, self.before_meal_normal_max
            )
        } else {
            format!("<= {} mg/dL", self.after_meal_normal_max)
        }
    }
}

// ---------------------------------------------------------------------------
// Adherence
// ---------------------------------------------------------------------------

/// A streak of this many under-dosed days (ending today) is non-compliance.
pub const NON_COMPLIANCE_STREAK_DAYS: u32 = 3;
/// This many under-dosed days in the window, without a full streak, earns a reminder.
pub const REMINDER_MISSING_DAYS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAdherence {
    pub day: NaiveDate,
    pub expected: u32,
    pub actual: u32,
}

impl DayAdherence {
    pub fn is_missing(&self) -> bool {
        self.actual < self.expected
    }
}

/// Per-day intake counts for one therapy, newest day (today) first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdherenceWindow {
    pub days: Vec<DayAdherence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceFinding {
    Adherent,
    Reminder { missing_days: u32 },
    NonCompliant { consecutive_missing_days: u32 },
}

impl AdherenceWindow {
    /// Bucket `counts` into `window_days` calendar days ending at `today`.
    /// Days without an entry count as zero intakes.
    pub fn assess(
        daily_doses: u32,
        counts: &BTreeMap<NaiveDate, u32>,
        today: NaiveDate,
        window_days: u32,
    ) -> Self {
        let days = (0..window_days)
            .filter_map(|offset| today.checked_sub_days(Days::new(u64::from(offset))))
            .map(|day| DayAdherence {
                day,
                expected: daily_doses,
                actual: counts.get(&day).copied().unwrap_or(0),
            })
            .collect();
        Self { days }
    }

    pub fn missing_days(&self) -> u32 {
        self.days.iter().filter(|d| d.is_missing()).count() as u32
    }

    /// Unbroken run of missing days counted back from today.
    pub fn consecutive_missing_days(&self) -> u32 {
        self.days.iter().take_while(|d| d.is_missing()).count() as u32
    }

    pub fn total_expected(&self) -> u32 {
        self.days.iter().fold(0, |sum, d| sum.saturating_add(d.expected))
    }

    pub fn total_actual(&self) -> u32 {
        self.days.iter().fold(0, |sum, d| sum.saturating_add(d.actual))
    }

    /// The streak rule takes precedence over the missing-days rule.
    pub fn finding(&self) -> ComplianceFinding {
        let streak = self.consecutive_missing_days();
        if streak >= NON_COMPLIANCE_STREAK_DAYS {
            return ComplianceFinding::NonCompliant {
                consecutive_missing_days: streak,
            };
        }
        let missing = self.missing_days();
        if missing >= REMINDER_MISSING_DAYS {
            ComplianceFinding::Reminder {
                missing_days: missing,
            }
        } else {
            ComplianceFinding::Adherent
        }
    }
}

/// Read-only compliance report row for one active therapy.
#[derive(Debug, Clone, Serialize)]
pub struct TherapyComplianceSummary {
    pub therapy_id: Uuid,
    pub drug_name: String,
    pub daily_doses: u32,
    pub window_days: u32,
    pub total_expected: u32,
    pub total_actual: u32,
    pub compliance_percentage: f64,
    pub status: ComplianceStatus,
}

impl TherapyComplianceSummary {
    pub(crate) fn from_window(
        therapy_id: Uuid,
        drug_name: String,
        daily_doses: u32,
        window_days: u32,
        window: &AdherenceWindow,
    ) -> Self {
        let total_expected = window.total_expected();
        let total_actual = window.total_actual();
        let compliance_percentage = if total_expected == 0 {
            0.0
        } else {
            f64::from(total_actual) / f64::from(total_expected) * 100.0
        };
        Self {
            therapy_id,
            drug_name,
            daily_doses,
            window_days,
            total_expected,
            total_actual,
            compliance_percentage,
            status: ComplianceStatus::from_percentage(compliance_percentage),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one compliance evaluation of a patient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComplianceEvaluation {
    pub therapies_checked: usize,
    pub therapies_failed: usize,
    pub alerts_created: usize,
}

/// Result of a bulk compliance clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub resolved: usize,
    pub failed_batches: usize,
}
