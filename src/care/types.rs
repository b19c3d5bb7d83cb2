use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::alerting::AlertingError;
use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum CareError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),

    #[error("Alerting error: {0}")]
    Alerting(AlertingError),
}

impl CareError {
    pub(crate) fn not_found(entity: &str, id: &Uuid) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}

impl From<DatabaseError> for CareError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound { entity_type, id } => Self::NotFound {
                entity: entity_type,
                id,
            },
            other => Self::Database(other),
        }
    }
}

impl From<AlertingError> for CareError {
    fn from(e: AlertingError) -> Self {
        match e {
            AlertingError::PatientNotFound(id) => Self::not_found("patient", &id),
            AlertingError::Database(db) => db.into(),
            e @ AlertingError::HistoryTooLong { .. } => Self::Validation(e.to_string()),
        }
    }
}

/// Whose unread alerts to list. Exactly one party per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertRecipient {
    Doctor(Uuid),
    Patient(Uuid),
}

impl AlertRecipient {
    /// Accepts exactly one of the two ids.
    pub fn from_ids(doctor_id: Option<Uuid>, patient_id: Option<Uuid>) -> Result<Self, CareError> {
        match (doctor_id, patient_id) {
            (Some(doctor), None) => Ok(Self::Doctor(doctor)),
            (None, Some(patient)) => Ok(Self::Patient(patient)),
            _ => Err(CareError::Validation(
                "exactly one of doctor_id or patient_id is required".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub assigned_doctor_id: Option<Uuid>,
    pub birth_date: Option<NaiveDate>,
    pub diabetes_type: Option<u8>,
    pub risk_factors: Option<String>,
    pub medical_history: Option<String>,
    pub comorbidities: Option<String>,
}

/// Partial update of the free-text clinical fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientInfoUpdate {
    pub risk_factors: Option<String>,
    pub medical_history: Option<String>,
    pub comorbidities: Option<String>,
}

impl PatientInfoUpdate {
    pub fn is_empty(&self) -> bool {
        self.risk_factors.is_none() && self.medical_history.is_none() && self.comorbidities.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTherapy {
    pub drug_name: String,
    pub daily_doses: u32,
    pub dose_amount: f64,
    pub dose_unit: String,
    pub instructions: Option<String>,
    /// Defaults to today.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Patient dashboard figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientOverview {
    pub latest_glucose: Option<f64>,
    pub active_therapies: usize,
    pub week_average_glucose: Option<f64>,
    pub unread_alerts: usize,
}

/// Doctor dashboard figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DoctorOverview {
    pub patients: usize,
    pub unread_alerts: usize,
    pub high_priority_alerts: usize,
}
