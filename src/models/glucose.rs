use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single blood glucose measurement in mg/dL.
///
/// Readings are facts: never updated after insert. `measured_at` is the
/// ordering key for every window query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlucoseReading {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub value: f64,
    pub measured_at: NaiveDateTime,
    pub is_before_meal: bool,
    pub notes: Option<String>,
}

impl GlucoseReading {
    pub fn meal_timing(&self) -> &'static str {
        if self.is_before_meal {
            "before meal"
        } else {
            "after meal"
        }
    }
}
