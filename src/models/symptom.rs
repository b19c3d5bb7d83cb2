use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symptom {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Patient-rated intensity, 1-10.
    pub severity: u8,
    pub recorded_at: NaiveDateTime,
}
