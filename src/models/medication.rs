use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A prescription written by a doctor for a patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Therapy {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub drug_name: String,
    /// Expected intakes per calendar day, always >= 1.
    pub daily_doses: u32,
    pub dose_amount: f64,
    pub dose_unit: String,
    pub instructions: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

/// One dose actually taken. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationIntake {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub therapy_id: Uuid,
    pub intake_time: NaiveDateTime,
    pub dose_taken: f64,
    pub notes: Option<String>,
}
