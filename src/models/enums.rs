use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(AlertType {
    GlucoseAbnormal => "glucose_abnormal",
    GlucoseCritical => "glucose_critical",
    GlucoseElevated => "glucose_elevated",
    MedicationCompliance => "medication_compliance",
    PatientNonCompliance => "patient_non_compliance",
    MedicationReminder => "medication_reminder",
    ComplianceIssue => "compliance_issue",
    MedicationMissed => "medication_missed",
});

str_enum!(AlertSeverity {
    Low => "low",
    Medium => "medium",
    High => "high",
});

str_enum!(ComplianceStatus {
    Good => "good",
    Moderate => "moderate",
    Poor => "poor",
});

/// Alert types cleared by the compliance sweep and by resumed adherence.
pub const COMPLIANCE_ALERT_TYPES: [AlertType; 5] = [
    AlertType::MedicationCompliance,
    AlertType::PatientNonCompliance,
    AlertType::MedicationReminder,
    AlertType::ComplianceIssue,
    AlertType::MedicationMissed,
];

/// Alerts addressed to the treating doctor rather than the patient.
pub const DOCTOR_FACING_ALERT_TYPES: [AlertType; 3] = [
    AlertType::PatientNonCompliance,
    AlertType::GlucoseCritical,
    AlertType::GlucoseElevated,
];

impl AlertType {
    pub fn is_compliance(&self) -> bool {
        COMPLIANCE_ALERT_TYPES.contains(self)
    }
}

impl ComplianceStatus {
    /// good (>= 80%), moderate (60-79%), poor (< 60%).
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 80.0 {
            Self::Good
        } else if percentage >= 60.0 {
            Self::Moderate
        } else {
            Self::Poor
        }
    }
}
