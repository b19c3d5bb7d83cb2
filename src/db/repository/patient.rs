use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_date, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::{Doctor, Patient};

const PATIENT_COLUMNS: &str = "id, name, assigned_doctor_id, birth_date, diabetes_type,
     risk_factors, medical_history, comorbidities, created_at";

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, name, specialization, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            doctor.id.to_string(),
            doctor.name,
            doctor.specialization,
            format_timestamp(&doctor.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    let doctor = conn
        .query_row(
            "SELECT id, name, specialization, created_at FROM doctors WHERE id = ?1",
            params![id.to_string()],
            |row| {
                let id_str: String = row.get(0)?;
                let created_str: String = row.get(3)?;
                Ok(Doctor {
                    id: parse_uuid(0, &id_str)?,
                    name: row.get(1)?,
                    specialization: row.get(2)?,
                    created_at: parse_timestamp(3, &created_str)?,
                })
            },
        )
        .optional()?;
    Ok(doctor)
}

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, name, assigned_doctor_id, birth_date, diabetes_type,
         risk_factors, medical_history, comorbidities, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            patient.id.to_string(),
            patient.name,
            patient.assigned_doctor_id.map(|id| id.to_string()),
            patient.birth_date.map(|d| d.to_string()),
            patient.diabetes_type,
            patient.risk_factors,
            patient.medical_history,
            patient.comorbidities,
            format_timestamp(&patient.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let patient = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
            params![id.to_string()],
            row_to_patient,
        )
        .optional()?;
    Ok(patient)
}

/// Every patient id in the store, in insertion-independent stable order.
pub fn list_patient_ids(conn: &Connection) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id FROM patients ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        let id_str: String = row.get(0)?;
        parse_uuid(0, &id_str)
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

pub fn list_patients_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients WHERE assigned_doctor_id = ?1 ORDER BY name"
    ))?;
    let rows = stmt.query_map(params![doctor_id.to_string()], row_to_patient)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

pub fn set_assigned_doctor(
    conn: &Connection,
    patient_id: &Uuid,
    doctor_id: Option<&Uuid>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE patients SET assigned_doctor_id = ?1 WHERE id = ?2",
        params![doctor_id.map(|id| id.to_string()), patient_id.to_string()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("patient", patient_id));
    }
    Ok(())
}

/// Update free-text clinical fields. `None` leaves the stored value untouched.
pub fn update_patient_clinical_fields(
    conn: &Connection,
    patient_id: &Uuid,
    risk_factors: Option<&str>,
    medical_history: Option<&str>,
    comorbidities: Option<&str>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE patients SET
            risk_factors = COALESCE(?1, risk_factors),
            medical_history = COALESCE(?2, medical_history),
            comorbidities = COALESCE(?3, comorbidities)
         WHERE id = ?4",
        params![risk_factors, medical_history, comorbidities, patient_id.to_string()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("patient", patient_id));
    }
    Ok(())
}

/// Delete a patient; readings, therapies, intakes, alerts and symptoms cascade.
pub fn delete_patient(conn: &Connection, patient_id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM patients WHERE id = ?1",
        params![patient_id.to_string()],
    )?;
    if deleted == 0 {
        return Err(DatabaseError::not_found("patient", patient_id));
    }
    Ok(())
}

fn row_to_patient(row: &rusqlite::Row) -> Result<Patient, rusqlite::Error> {
    let id_str: String = row.get(0)?;
    let doctor_str: Option<String> = row.get(2)?;
    let birth_str: Option<String> = row.get(3)?;
    let created_str: String = row.get(8)?;

    Ok(Patient {
        id: parse_uuid(0, &id_str)?,
        name: row.get(1)?,
        assigned_doctor_id: doctor_str.map(|s| parse_uuid(2, &s)).transpose()?,
        birth_date: birth_str.map(|s| parse_date(3, &s)).transpose()?,
        diabetes_type: row.get(4)?,
        risk_factors: row.get(5)?,
        medical_history: row.get(6)?,
        comorbidities: row.get(7)?,
        created_at: parse_timestamp(8, &created_str)?,
    })
}
