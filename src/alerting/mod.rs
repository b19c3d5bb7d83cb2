//! Alert evaluation: glucose thresholds, medication adherence and the
//! deduplication policy that keeps repeated evaluations from piling up.
//!
//! Every evaluator takes the caller's connection. Each alert write runs in
//! its own short transaction, so callers must not hold one open.

pub mod compliance;
pub mod dedup;
pub mod glucose;
pub mod types;

pub use compliance::{ComplianceEvaluator, DEFAULT_REPORT_DAYS};
pub use dedup::AlertDeduplicator;
pub use glucose::GlucoseAlertEvaluator;
pub use types::*;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

/// The three alerting components sharing one configuration.
#[derive(Debug, Clone)]
pub struct AlertingEngine {
    pub glucose: GlucoseAlertEvaluator,
    pub compliance: ComplianceEvaluator,
    pub dedup: AlertDeduplicator,
}

impl AlertingEngine {
    pub fn new(config: AlertingConfig) -> Self {
        let dedup = AlertDeduplicator::new(config);
        Self {
            glucose: GlucoseAlertEvaluator::new(dedup.clone()),
            compliance: ComplianceEvaluator::new(dedup.clone()),
            dedup,
        }
    }

    pub fn config(&self) -> &AlertingConfig {
        self.dedup.config()
    }

    /// Checks triggered by a newly recorded glucose reading. A missed dose
    /// often shows up in glucose first, so adherence is re-checked too.
    pub fn on_glucose_reading(&self, conn: &Connection, patient_id: &Uuid, now: &NaiveDateTime) -> usize {
        self.glucose.evaluate_at(conn, patient_id, now)
            + self.glucose.check_glucose_thresholds_and_alert_at(conn, patient_id, now)
            + self.compliance.evaluate_at(conn, patient_id, now)
    }

    /// Checks triggered by a newly recorded intake: stale compliance alerts
    /// are cleared first, then adherence is re-evaluated.
    pub fn on_medication_intake(&self, conn: &Connection, patient_id: &Uuid, now: &NaiveDateTime) -> usize {
        if let Err(e) = self.dedup.check_and_clear_compliance_alerts_at(conn, patient_id, now) {
            tracing::warn!(patient_id = %patient_id, error = %e, "Compliance alert clear failed");
        }
        self.compliance.evaluate_at(conn, patient_id, now)
    }
}

impl Default for AlertingEngine {
    fn default() -> Self {
        Self::new(AlertingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::fixtures::*;
    use crate::models::AlertType;

    #[test]
    fn intake_clears_then_reevaluates() {
        let conn = open_memory_database().unwrap();
        let doctor = seed_doctor(&conn, "Dr. Neri");
        let patient = seed_patient(&conn, "Sara", Some(doctor));
        let therapy = seed_therapy(&conn, patient, doctor, "Metformin", 1);
        let engine = AlertingEngine::default();

        let monday = at("2026-03-10 20:00:00");
        assert_eq!(engine.compliance.evaluate_at(&conn, &patient, &monday), 2);

        let now = at("2026-03-10 21:00:00");
        seed_intake(&conn, patient, therapy, now);
        engine.on_medication_intake(&conn, &patient, &now);

        assert_eq!(count_open_alerts(&conn, &patient, AlertType::MedicationCompliance), 0);
        assert_eq!(count_open_alerts(&conn, &patient, AlertType::PatientNonCompliance), 0);
        // Two missed days remain in the window, so a reminder follows.
        assert_eq!(count_open_alerts(&conn, &patient, AlertType::MedicationReminder), 1);
    }

    #[test]
    fn reading_runs_all_glucose_checks_and_compliance() {
        let conn = open_memory_database().unwrap();
        let doctor = seed_doctor(&conn, "Dr. Neri");
        let patient = seed_patient(&conn, "Sara", Some(doctor));
        let now = at("2026-03-10 09:00:00");
        seed_reading(&conn, patient, 350.0, false, at("2026-03-10 08:30:00"));

        let created = AlertingEngine::default().on_glucose_reading(&conn, &patient, &now);
        assert_eq!(created, 2);
        assert_eq!(count_alerts(&conn, &patient, AlertType::GlucoseAbnormal), 1);
        assert_eq!(count_alerts(&conn, &patient, AlertType::GlucoseCritical), 1);
    }
}
