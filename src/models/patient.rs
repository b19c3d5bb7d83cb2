use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregation root for a patient's health records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    /// Lookup-only reference; the doctor does not own the patient.
    pub assigned_doctor_id: Option<Uuid>,
    pub birth_date: Option<NaiveDate>,
    pub diabetes_type: Option<u8>,
    pub risk_factors: Option<String>,
    pub medical_history: Option<String>,
    pub comorbidities: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub specialization: Option<String>,
    pub created_at: NaiveDateTime,
}
