use chrono::{Days, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::config::MAX_HISTORY_DAYS;
use crate::db;
use crate::models::{AlertSeverity, AlertType, NewAlert, Patient, Therapy};

use super::dedup::AlertDeduplicator;
use super::glucose::{log_failure, require_patient};
use super::types::{
    AdherenceWindow, AlertingError, ComplianceEvaluation, ComplianceFinding,
    TherapyComplianceSummary,
};

/// Default window for the compliance report.
pub const DEFAULT_REPORT_DAYS: u32 = 7;

/// Medication-adherence rules over each active therapy of a patient.
#[derive(Debug, Clone)]
pub struct ComplianceEvaluator {
    dedup: AlertDeduplicator,
}

impl ComplianceEvaluator {
    pub fn new(dedup: AlertDeduplicator) -> Self {
        Self { dedup }
    }

    /// Evaluate every active therapy. Never fails; returns alerts created.
    pub fn evaluate(&self, conn: &Connection, patient_id: &Uuid) -> usize {
        self.evaluate_at(conn, patient_id, &super::local_now())
    }

    pub fn evaluate_at(&self, conn: &Connection, patient_id: &Uuid, now: &NaiveDateTime) -> usize {
        match self.try_evaluate_at(conn, patient_id, now) {
            Ok(outcome) => outcome.alerts_created,
            Err(e) => {
                log_failure("compliance", patient_id, &e);
                0
            }
        }
    }

    /// Fails only when the patient or its therapy list cannot be loaded. A
    /// therapy that fails is logged, counted and skipped.
    pub fn try_evaluate_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        now: &NaiveDateTime,
    ) -> Result<ComplianceEvaluation, AlertingError> {
        let patient = require_patient(conn, patient_id)?;
        let therapies = db::get_active_therapies(conn, patient_id)?;

        let mut outcome = ComplianceEvaluation::default();
        for therapy in &therapies {
            outcome.therapies_checked += 1;
            match self.evaluate_therapy(conn, &patient, therapy, now) {
                Ok(created) => outcome.alerts_created += created,
                Err(e) => {
                    outcome.therapies_failed += 1;
                    tracing::warn!(
                        patient_id = %patient_id,
                        therapy_id = %therapy.id,
                        error = %e,
                        "Therapy compliance check failed"
                    );
                }
            }
        }
        Ok(outcome)
    }

    fn evaluate_therapy(
        &self,
        conn: &Connection,
        patient: &Patient,
        therapy: &Therapy,
        now: &NaiveDateTime,
    ) -> Result<usize, AlertingError> {
        let window_days = self.dedup.config().compliance_window_days;
        let window = adherence_window(conn, therapy, now, window_days)?;

        let alerts = match window.finding() {
            ComplianceFinding::Adherent => return Ok(0),
            ComplianceFinding::NonCompliant {
                consecutive_missing_days,
            } => {
                tracing::debug!(
                    patient_id = %patient.id,
                    therapy_id = %therapy.id,
                    consecutive_missing_days,
                    "Non-compliance streak"
                );
                let mut alerts = vec![NewAlert {
                    patient_id: patient.id,
                    doctor_id: None,
                    therapy_id: Some(therapy.id),
                    alert_type: AlertType::MedicationCompliance,
                    message: format!(
                        "You have not taken {} as prescribed for {} consecutive days. \
                         Please follow your therapy and contact your doctor if needed.",
                        therapy.drug_name, consecutive_missing_days
                    ),
                    severity: AlertSeverity::High,
                }];
                if let Some(doctor_id) = patient.assigned_doctor_id {
                    alerts.push(NewAlert {
                        patient_id: patient.id,
                        doctor_id: Some(doctor_id),
                        therapy_id: Some(therapy.id),
                        alert_type: AlertType::PatientNonCompliance,
                        message: format!(
                            "Patient {} has not followed the {} therapy for {} consecutive days",
                            patient.name, therapy.drug_name, consecutive_missing_days
                        ),
                        severity: AlertSeverity::High,
                    });
                }
                alerts
            }
            ComplianceFinding::Reminder { missing_days } => vec![NewAlert {
                patient_id: patient.id,
                doctor_id: None,
                therapy_id: Some(therapy.id),
                alert_type: AlertType::MedicationReminder,
                message: format!(
                    "Reminder: {} doses were missed on {} of the last {} days ({} per day prescribed)",
                    therapy.drug_name, missing_days, window_days, therapy.daily_doses
                ),
                severity: AlertSeverity::Medium,
            }],
        };

        let mut created = 0;
        for alert in alerts {
            if self.dedup.create_alert(conn, alert, now)?.is_some() {
                created += 1;
            }
        }
        Ok(created)
    }

    pub fn get_therapy_compliance_status(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        days: u32,
    ) -> Result<Vec<TherapyComplianceSummary>, AlertingError> {
        self.get_therapy_compliance_status_at(conn, patient_id, days, &super::local_now())
    }

    /// Read-only adherence report over the last `days` days (today included),
    /// at most `MAX_HISTORY_DAYS`.
    pub fn get_therapy_compliance_status_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        days: u32,
        now: &NaiveDateTime,
    ) -> Result<Vec<TherapyComplianceSummary>, AlertingError> {
        if days > MAX_HISTORY_DAYS {
            return Err(AlertingError::HistoryTooLong {
                days,
                max: MAX_HISTORY_DAYS,
            });
        }
        require_patient(conn, patient_id)?;
        let therapies = db::get_active_therapies(conn, patient_id)?;

        therapies
            .into_iter()
            .map(|therapy| {
                let window = adherence_window(conn, &therapy, now, days)?;
                Ok(TherapyComplianceSummary::from_window(
                    therapy.id,
                    therapy.drug_name,
                    therapy.daily_doses,
                    days,
                    &window,
                ))
            })
            .collect()
    }
}

/// Load per-day intake counts for the `window_days` days ending today.
fn adherence_window(
    conn: &Connection,
    therapy: &Therapy,
    now: &NaiveDateTime,
    window_days: u32,
) -> Result<AdherenceWindow, AlertingError> {
    let today = now.date();
    if window_days == 0 {
        return Ok(AdherenceWindow::assess(therapy.daily_doses, &Default::default(), today, 0));
    }
    let first_day = today
        .checked_sub_days(Days::new(u64::from(window_days - 1)))
        .unwrap_or(today);
    let counts = db::count_intakes_by_day(conn, &therapy.id, &first_day, &today)?;
    Ok(AdherenceWindow::assess(therapy.daily_doses, &counts, today, window_days))
}
