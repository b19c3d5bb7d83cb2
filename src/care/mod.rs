//! Care operations: the library surface used by the dashboard layer.
//!
//! Record-keeping calls trigger the alerting checks synchronously on the
//! caller's connection. Evaluation failures never fail the write that
//! triggered them; they are logged by the evaluators.

pub mod types;

pub use types::*;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::alerting::{local_now, AlertingEngine, TherapyComplianceSummary};
use crate::config::MAX_HISTORY_DAYS;
use crate::db;
use crate::models::{
    Alert, AlertSeverity, Doctor, GlucoseReading, MedicationIntake, Patient, Symptom, Therapy,
};

#[derive(Debug, Clone, Default)]
pub struct CareService {
    engine: AlertingEngine,
}

impl CareService {
    pub fn new(engine: AlertingEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &AlertingEngine {
        &self.engine
    }

    // ── People ─────────────────────────────────────────────

    pub fn create_doctor(
        &self,
        conn: &Connection,
        name: &str,
        specialization: Option<&str>,
    ) -> Result<Uuid, CareError> {
        let name = require_text("doctor name", name)?;
        let doctor = Doctor {
            id: Uuid::new_v4(),
            name,
            specialization: specialization.map(str::to_string),
            created_at: local_now(),
        };
        db::insert_doctor(conn, &doctor)?;
        tracing::info!(doctor_id = %doctor.id, "Doctor created");
        Ok(doctor.id)
    }

    pub fn create_patient(&self, conn: &Connection, new: NewPatient) -> Result<Uuid, CareError> {
        let name = require_text("patient name", &new.name)?;
        if let Some(doctor_id) = &new.assigned_doctor_id {
            require_doctor(conn, doctor_id)?;
        }
        if let Some(kind) = new.diabetes_type {
            if !(1..=2).contains(&kind) {
                return Err(CareError::Validation(format!("unknown diabetes type {kind}")));
            }
        }
        let patient = Patient {
            id: Uuid::new_v4(),
            name,
            assigned_doctor_id: new.assigned_doctor_id,
            birth_date: new.birth_date,
            diabetes_type: new.diabetes_type,
            risk_factors: new.risk_factors,
            medical_history: new.medical_history,
            comorbidities: new.comorbidities,
            created_at: local_now(),
        };
        db::insert_patient(conn, &patient)?;
        tracing::info!(patient_id = %patient.id, "Patient created");
        Ok(patient.id)
    }

    pub fn assign_doctor(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        doctor_id: Option<&Uuid>,
    ) -> Result<(), CareError> {
        if let Some(doctor_id) = doctor_id {
            require_doctor(conn, doctor_id)?;
        }
        db::set_assigned_doctor(conn, patient_id, doctor_id)?;
        Ok(())
    }

    pub fn update_patient_info(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        update: PatientInfoUpdate,
    ) -> Result<(), CareError> {
        if update.is_empty() {
            require_patient(conn, patient_id)?;
            return Ok(());
        }
        db::update_patient_clinical_fields(
            conn,
            patient_id,
            update.risk_factors.as_deref(),
            update.medical_history.as_deref(),
            update.comorbidities.as_deref(),
        )?;
        Ok(())
    }

    /// Removes the patient and every record it owns.
    pub fn delete_patient(&self, conn: &Connection, patient_id: &Uuid) -> Result<(), CareError> {
        db::delete_patient(conn, patient_id)?;
        tracing::info!(patient_id = %patient_id, "Patient deleted");
        Ok(())
    }

    pub fn list_doctor_patients(&self, conn: &Connection, doctor_id: &Uuid) -> Result<Vec<Patient>, CareError> {
        require_doctor(conn, doctor_id)?;
        Ok(db::list_patients_for_doctor(conn, doctor_id)?)
    }

    // ── Therapies ──────────────────────────────────────────

    pub fn add_therapy(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        doctor_id: &Uuid,
        new: NewTherapy,
    ) -> Result<Uuid, CareError> {
        require_patient(conn, patient_id)?;
        require_doctor(conn, doctor_id)?;

        let drug_name = require_text("drug name", &new.drug_name)?;
        if new.daily_doses < 1 {
            return Err(CareError::Validation("daily doses must be at least 1".into()));
        }
        if !new.dose_amount.is_finite() || new.dose_amount <= 0.0 {
            return Err(CareError::Validation("dose amount must be positive".into()));
        }
        let start_date = new.start_date.unwrap_or_else(|| local_now().date());
        if new.end_date.is_some_and(|end| end < start_date) {
            return Err(CareError::Validation("end date precedes start date".into()));
        }

        let therapy = Therapy {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            doctor_id: *doctor_id,
            drug_name,
            daily_doses: new.daily_doses,
            dose_amount: new.dose_amount,
            dose_unit: new.dose_unit,
            instructions: new.instructions,
            start_date,
            end_date: new.end_date,
            is_active: true,
        };
        db::insert_therapy(conn, &therapy)?;
        tracing::info!(
            patient_id = %patient_id,
            therapy_id = %therapy.id,
            daily_doses = therapy.daily_doses,
            "Therapy added"
        );
        Ok(therapy.id)
    }

    pub fn deactivate_therapy(
        &self,
        conn: &Connection,
        therapy_id: &Uuid,
        end_date: Option<NaiveDate>,
    ) -> Result<(), CareError> {
        let end_date = end_date.unwrap_or_else(|| local_now().date());
        db::deactivate_therapy(conn, therapy_id, &end_date)?;
        tracing::info!(therapy_id = %therapy_id, "Therapy deactivated");
        Ok(())
    }

    pub fn get_patient_active_therapies(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
    ) -> Result<Vec<Therapy>, CareError> {
        require_patient(conn, patient_id)?;
        Ok(db::get_active_therapies(conn, patient_id)?)
    }

    pub fn get_therapy_compliance_status(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        days: u32,
    ) -> Result<Vec<TherapyComplianceSummary>, CareError> {
        Ok(self
            .engine
            .compliance
            .get_therapy_compliance_status(conn, patient_id, days)?)
    }

    // ── Readings and intakes ───────────────────────────────

    pub fn add_glucose_reading(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        value: f64,
        is_before_meal: bool,
        notes: Option<&str>,
    ) -> Result<Uuid, CareError> {
        self.add_glucose_reading_at(conn, patient_id, value, is_before_meal, notes, &local_now())
    }

    /// Record a reading taken at `now`, then run the glucose checks and
    /// re-check adherence.
    pub fn add_glucose_reading_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        value: f64,
        is_before_meal: bool,
        notes: Option<&str>,
        now: &NaiveDateTime,
    ) -> Result<Uuid, CareError> {
        if !value.is_finite() {
            return Err(CareError::Validation(format!("glucose value {value} is not a number")));
        }
        require_patient(conn, patient_id)?;

        let reading = GlucoseReading {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            value,
            measured_at: *now,
            is_before_meal,
            notes: notes.map(str::to_string),
        };
        db::insert_glucose_reading(conn, &reading)?;

        let alerts = self.engine.on_glucose_reading(conn, patient_id, now);
        tracing::debug!(patient_id = %patient_id, alerts, "Glucose reading recorded");
        Ok(reading.id)
    }

    pub fn get_patient_glucose_readings(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        days: u32,
    ) -> Result<Vec<GlucoseReading>, CareError> {
        self.get_patient_glucose_readings_at(conn, patient_id, days, &local_now())
    }

    /// Readings of the last `days` days, oldest first.
    pub fn get_patient_glucose_readings_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        days: u32,
        now: &NaiveDateTime,
    ) -> Result<Vec<GlucoseReading>, CareError> {
        let from = history_start(now, days)?;
        require_patient(conn, patient_id)?;
        Ok(db::get_glucose_readings_in_range(conn, patient_id, &from, now)?)
    }

    pub fn record_medication_intake(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        therapy_id: &Uuid,
        dose_taken: f64,
        notes: Option<&str>,
        intake_time: Option<NaiveDateTime>,
    ) -> Result<Uuid, CareError> {
        self.record_medication_intake_at(conn, patient_id, therapy_id, dose_taken, notes, intake_time, &local_now())
    }

    /// Record a dose (taken at `intake_time`, default `now`), clear stale
    /// compliance alerts and re-evaluate adherence.
    #[allow(clippy::too_many_arguments)]
    pub fn record_medication_intake_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        therapy_id: &Uuid,
        dose_taken: f64,
        notes: Option<&str>,
        intake_time: Option<NaiveDateTime>,
        now: &NaiveDateTime,
    ) -> Result<Uuid, CareError> {
        if !dose_taken.is_finite() || dose_taken <= 0.0 {
            return Err(CareError::Validation("dose taken must be positive".into()));
        }
        require_patient(conn, patient_id)?;
        let therapy = db::get_therapy(conn, therapy_id)?
            .ok_or_else(|| CareError::not_found("therapy", therapy_id))?;
        if therapy.patient_id != *patient_id {
            return Err(CareError::Validation(format!(
                "therapy {therapy_id} does not belong to patient {patient_id}"
            )));
        }

        let intake = MedicationIntake {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            therapy_id: *therapy_id,
            intake_time: intake_time.unwrap_or(*now),
            dose_taken,
            notes: notes.map(str::to_string),
        };
        db::insert_intake(conn, &intake)?;

        let alerts = self.engine.on_medication_intake(conn, patient_id, now);
        tracing::debug!(
            patient_id = %patient_id,
            therapy_id = %therapy_id,
            alerts,
            "Medication intake recorded"
        );
        Ok(intake.id)
    }

    // ── Symptoms ───────────────────────────────────────────

    pub fn add_symptom(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        name: &str,
        description: Option<&str>,
        severity: u8,
    ) -> Result<Uuid, CareError> {
        let name = require_text("symptom name", name)?;
        if !(1..=10).contains(&severity) {
            return Err(CareError::Validation(format!(
                "symptom severity {severity} is outside 1-10"
            )));
        }
        require_patient(conn, patient_id)?;
        let symptom = Symptom {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            name,
            description: description.map(str::to_string),
            severity,
            recorded_at: local_now(),
        };
        db::insert_symptom(conn, &symptom)?;
        Ok(symptom.id)
    }

    pub fn get_patient_symptoms(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        days: u32,
    ) -> Result<Vec<Symptom>, CareError> {
        let since = history_start(&local_now(), days)?;
        require_patient(conn, patient_id)?;
        Ok(db::get_symptoms_since(conn, patient_id, &since)?)
    }

    // ── Alerts ─────────────────────────────────────────────

    /// Unread, unresolved alerts for one party, newest first. Patients do
    /// not see the alerts addressed to their doctor.
    pub fn get_unread_alerts(
        &self,
        conn: &Connection,
        recipient: AlertRecipient,
    ) -> Result<Vec<Alert>, CareError> {
        let alerts = match recipient {
            AlertRecipient::Patient(patient_id) => {
                require_patient(conn, &patient_id)?;
                db::list_open_alerts_for_patient(conn, &patient_id)?
            }
            AlertRecipient::Doctor(doctor_id) => {
                require_doctor(conn, &doctor_id)?;
                db::list_open_alerts_for_doctor(conn, &doctor_id)?
            }
        };
        Ok(alerts)
    }

    pub fn mark_alert_read(&self, conn: &Connection, alert_id: &Uuid) -> Result<(), CareError> {
        db::mark_alert_read(conn, alert_id)?;
        Ok(())
    }

    pub fn resolve_alert(&self, conn: &Connection, alert_id: &Uuid) -> Result<(), CareError> {
        db::resolve_alert(conn, alert_id, &local_now())?;
        Ok(())
    }

    // ── Dashboards ─────────────────────────────────────────

    pub fn get_patient_overview(&self, conn: &Connection, patient_id: &Uuid) -> Result<PatientOverview, CareError> {
        self.get_patient_overview_at(conn, patient_id, &local_now())
    }

    pub fn get_patient_overview_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        now: &NaiveDateTime,
    ) -> Result<PatientOverview, CareError> {
        require_patient(conn, patient_id)?;

        let day_ago = *now - Duration::hours(24);
        let latest_glucose = db::get_latest_glucose_reading(conn, patient_id, now)?
            .filter(|r| r.measured_at >= day_ago)
            .map(|r| r.value);

        let week = db::get_glucose_readings_in_range(conn, patient_id, &(*now - Duration::days(7)), now)?;
        let week_average_glucose = if week.is_empty() {
            None
        } else {
            Some(week.iter().map(|r| r.value).sum::<f64>() / week.len() as f64)
        };

        Ok(PatientOverview {
            latest_glucose,
            active_therapies: db::get_active_therapies(conn, patient_id)?.len(),
            week_average_glucose,
            unread_alerts: db::list_open_alerts_for_patient(conn, patient_id)?.len(),
        })
    }

    pub fn get_doctor_overview(&self, conn: &Connection, doctor_id: &Uuid) -> Result<DoctorOverview, CareError> {
        require_doctor(conn, doctor_id)?;
        let alerts = db::list_open_alerts_for_doctor(conn, doctor_id)?;
        Ok(DoctorOverview {
            patients: db::list_patients_for_doctor(conn, doctor_id)?.len(),
            unread_alerts: alerts.len(),
            high_priority_alerts: alerts
                .iter()
                .filter(|a| a.severity == AlertSeverity::High)
                .count(),
        })
    }
}

fn require_patient(conn: &Connection, patient_id: &Uuid) -> Result<Patient, CareError> {
    db::get_patient(conn, patient_id)?.ok_or_else(|| CareError::not_found("patient", patient_id))
}

fn require_doctor(conn: &Connection, doctor_id: &Uuid) -> Result<Doctor, CareError> {
    db::get_doctor(conn, doctor_id)?.ok_or_else(|| CareError::not_found("doctor", doctor_id))
}

/// Start of a `days`-long look-back ending at `now`.
fn history_start(now: &NaiveDateTime, days: u32) -> Result<NaiveDateTime, CareError> {
    if days > MAX_HISTORY_DAYS {
        return Err(CareError::Validation(format!(
            "days must be at most {MAX_HISTORY_DAYS}, got {days}"
        )));
    }
    Ok(*now - Duration::days(i64::from(days)))
}

fn require_text(field: &str, value: &str) -> Result<String, CareError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CareError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}
