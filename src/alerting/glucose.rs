use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db;
use crate::models::{AlertSeverity, AlertType, GlucoseReading, NewAlert, Patient};

use super::dedup::AlertDeduplicator;
use super::types::{AlertingError, GlucoseThresholds, GlucoseTier};

/// Meal-relative glucose checks over a patient's recent readings.
#[derive(Debug, Clone)]
pub struct GlucoseAlertEvaluator {
    dedup: AlertDeduplicator,
}

impl GlucoseAlertEvaluator {
    pub fn new(dedup: AlertDeduplicator) -> Self {
        Self { dedup }
    }

    fn thresholds(&self) -> &GlucoseThresholds {
        &self.dedup.config().glucose
    }

    /// Per-reading abnormal-range check. Never fails; returns alerts created.
    pub fn evaluate(&self, conn: &Connection, patient_id: &Uuid) -> usize {
        self.evaluate_at(conn, patient_id, &super::local_now())
    }

    pub fn evaluate_at(&self, conn: &Connection, patient_id: &Uuid, now: &NaiveDateTime) -> usize {
        match self.try_evaluate_at(conn, patient_id, now) {
            Ok(created) => created,
            Err(e) => {
                log_failure("glucose", patient_id, &e);
                0
            }
        }
    }

    /// One `glucose_abnormal` alert per out-of-range reading in the window,
    /// addressed to the assigned doctor when there is one.
    pub fn try_evaluate_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        now: &NaiveDateTime,
    ) -> Result<usize, AlertingError> {
        let patient = require_patient(conn, patient_id)?;
        let readings = self.recent_readings(conn, patient_id, now)?;
        let thresholds = self.thresholds();

        let mut created = 0;
        for reading in &readings {
            let Some(severity) = thresholds.abnormal_severity(reading.value, reading.is_before_meal)
            else {
                continue;
            };
            let message = format!(
                "Glucose {} mg/dL {} at {} is outside the normal range ({})",
                format_value(reading.value),
                reading.meal_timing(),
                reading.measured_at.format("%Y-%m-%d %H:%M"),
                thresholds.normal_range_label(reading.is_before_meal),
            );
            let alert = NewAlert {
                patient_id: patient.id,
                doctor_id: patient.assigned_doctor_id,
                therapy_id: None,
                alert_type: AlertType::GlucoseAbnormal,
                message,
                severity,
            };
            if self.dedup.create_alert(conn, alert, now)?.is_some() {
                created += 1;
            }
        }
        Ok(created)
    }

    pub fn check_glucose_thresholds_and_alert(&self, conn: &Connection, patient_id: &Uuid) -> usize {
        self.check_glucose_thresholds_and_alert_at(conn, patient_id, &super::local_now())
    }

    pub fn check_glucose_thresholds_and_alert_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        now: &NaiveDateTime,
    ) -> usize {
        match self.try_check_thresholds_at(conn, patient_id, now) {
            Ok(created) => created,
            Err(e) => {
                log_failure("glucose_thresholds", patient_id, &e);
                0
            }
        }
    }

    /// Doctor-facing two-tier check: one `glucose_critical` alert per
    /// critical reading, plus one merged `glucose_elevated` summary for all
    /// elevated readings. A summary over a different set of readings
    /// replaces the open one. Patients without a doctor are skipped.
    pub fn try_check_thresholds_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        now: &NaiveDateTime,
    ) -> Result<usize, AlertingError> {
        let patient = require_patient(conn, patient_id)?;
        let Some(doctor_id) = patient.assigned_doctor_id else {
            tracing::debug!(patient_id = %patient_id, "No assigned doctor, threshold check skipped");
            return Ok(0);
        };

        let readings = self.recent_readings(conn, patient_id, now)?;
        let thresholds = self.thresholds();

        let mut created = 0;
        let mut elevated: Vec<&GlucoseReading> = Vec::new();
        for reading in &readings {
            match thresholds.tier(reading.value, reading.is_before_meal) {
                GlucoseTier::Critical => {
                    let alert = NewAlert {
                        patient_id: patient.id,
                        doctor_id: Some(doctor_id),
                        therapy_id: None,
                        alert_type: AlertType::GlucoseCritical,
                        message: critical_message(&patient, reading),
                        severity: AlertSeverity::High,
                    };
                    if self.dedup.create_alert(conn, alert, now)?.is_some() {
                        created += 1;
                    }
                }
                GlucoseTier::Elevated => elevated.push(reading),
                GlucoseTier::InRange => {}
            }
        }

        if !elevated.is_empty() {
            let alert = NewAlert {
                patient_id: patient.id,
                doctor_id: Some(doctor_id),
                therapy_id: None,
                alert_type: AlertType::GlucoseElevated,
                message: elevated_message(&patient, &elevated),
                severity: AlertSeverity::Medium,
            };
            if self.dedup.create_alert(conn, alert, now)?.is_some() {
                created += 1;
            }
        }

        Ok(created)
    }

    fn recent_readings(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        now: &NaiveDateTime,
    ) -> Result<Vec<GlucoseReading>, AlertingError> {
        let from = *now - Duration::hours(self.dedup.config().glucose_window_hours);
        Ok(db::get_glucose_readings_in_range(conn, patient_id, &from, now)?)
    }
}

pub(crate) fn require_patient(conn: &Connection, patient_id: &Uuid) -> Result<Patient, AlertingError> {
    db::get_patient(conn, patient_id)?.ok_or(AlertingError::PatientNotFound(*patient_id))
}

/// Missing patients are routine (deleted between trigger and evaluation).
pub(crate) fn log_failure(check: &str, patient_id: &Uuid, error: &AlertingError) {
    match error {
        AlertingError::PatientNotFound(_) => {
            tracing::debug!(check, patient_id = %patient_id, "Patient not found, evaluation skipped");
        }
        _ => {
            tracing::warn!(check, patient_id = %patient_id, error = %error, "Evaluation failed");
        }
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

fn critical_message(patient: &Patient, reading: &GlucoseReading) -> String {
    format!(
        "CRITICAL: {} recorded {} mg/dL {} at {}",
        patient.name,
        format_value(reading.value),
        reading.meal_timing(),
        reading.measured_at.format("%Y-%m-%d %H:%M"),
    )
}

fn elevated_message(patient: &Patient, readings: &[&GlucoseReading]) -> String {
    let values = readings
        .iter()
        .map(|r| {
            format!(
                "{} mg/dL {} at {}",
                format_value(r.value),
                r.meal_timing(),
                r.measured_at.format("%H:%M")
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} has {} elevated glucose reading(s) in the last 24 hours: {}",
        patient.name,
        readings.len(),
        values
    )
}
