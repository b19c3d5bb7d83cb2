//! Seeding helpers shared by repository, evaluator and service tests.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use super::*;
use crate::models::*;

pub fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

pub fn seed_doctor(conn: &Connection, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    insert_doctor(conn, &Doctor {
        id,
        name: name.into(),
        specialization: Some("Diabetology".into()),
        created_at: at("2026-01-01 09:00:00"),
    })
    .unwrap();
    id
}

pub fn seed_patient(conn: &Connection, name: &str, doctor_id: Option<Uuid>) -> Uuid {
    let id = Uuid::new_v4();
    insert_patient(conn, &Patient {
        id,
        name: name.into(),
        assigned_doctor_id: doctor_id,
        birth_date: None,
        diabetes_type: Some(2),
        risk_factors: None,
        medical_history: None,
        comorbidities: None,
        created_at: at("2026-01-01 09:00:00"),
    })
    .unwrap();
    id
}

pub fn seed_therapy(conn: &Connection, patient_id: Uuid, doctor_id: Uuid, drug: &str, daily_doses: u32) -> Uuid {
    let id = Uuid::new_v4();
    insert_therapy(conn, &Therapy {
        id,
        patient_id,
        doctor_id,
        drug_name: drug.into(),
        daily_doses,
        dose_amount: 500.0,
        dose_unit: "mg".into(),
        instructions: Some("Take with meals".into()),
        start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        end_date: None,
        is_active: true,
    })
    .unwrap();
    id
}

pub fn seed_intake(conn: &Connection, patient_id: Uuid, therapy_id: Uuid, when: NaiveDateTime) -> Uuid {
    let id = Uuid::new_v4();
    insert_intake(conn, &MedicationIntake {
        id,
        patient_id,
        therapy_id,
        intake_time: when,
        dose_taken: 500.0,
        notes: None,
    })
    .unwrap();
    id
}

pub fn seed_reading(conn: &Connection, patient_id: Uuid, value: f64, before_meal: bool, when: NaiveDateTime) -> Uuid {
    let id = Uuid::new_v4();
    insert_glucose_reading(conn, &GlucoseReading {
        id,
        patient_id,
        value,
        measured_at: when,
        is_before_meal: before_meal,
        notes: None,
    })
    .unwrap();
    id
}

pub fn count_alerts(conn: &Connection, patient_id: &Uuid, alert_type: AlertType) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM alerts WHERE patient_id = ?1 AND alert_type = ?2",
        rusqlite::params![patient_id.to_string(), alert_type.as_str()],
        |row| row.get(0),
    )
    .unwrap()
}

pub fn count_open_alerts(conn: &Connection, patient_id: &Uuid, alert_type: AlertType) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM alerts
         WHERE patient_id = ?1 AND alert_type = ?2 AND resolved_at IS NULL",
        rusqlite::params![patient_id.to_string(), alert_type.as_str()],
        |row| row.get(0),
    )
    .unwrap()
}
