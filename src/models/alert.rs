use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AlertSeverity, AlertType};

/// An alert raised by the evaluators for a patient, optionally addressed to a doctor.
/// Compliance alerts also name the therapy they are about.
///
/// `resolved_at` set implies `is_read`; the repository enforces this on every
/// resolve and the schema rejects rows that violate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub therapy_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub message: String,
    pub severity: AlertSeverity,
    pub created_at: NaiveDateTime,
    pub is_read: bool,
    pub resolved_at: Option<NaiveDateTime>,
}

/// Alert content produced by an evaluator before it passes deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub therapy_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub message: String,
    pub severity: AlertSeverity,
}

impl NewAlert {
    pub fn into_alert(self, created_at: NaiveDateTime) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            therapy_id: self.therapy_id,
            alert_type: self.alert_type,
            message: self.message,
            severity: self.severity,
            created_at,
            is_read: false,
            resolved_at: None,
        }
    }
}
