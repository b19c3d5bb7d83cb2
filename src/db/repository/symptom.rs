use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::*;

pub fn insert_symptom(conn: &Connection, symptom: &Symptom) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO symptoms (id, patient_id, name, description, severity, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            symptom.id.to_string(),
            symptom.patient_id.to_string(),
            symptom.name,
            symptom.description,
            symptom.severity,
            format_timestamp(&symptom.recorded_at),
        ],
    )?;
    Ok(())
}

/// Symptoms a patient recorded at or after `since`, newest first.
pub fn get_symptoms_since(
    conn: &Connection,
    patient_id: &Uuid,
    since: &NaiveDateTime,
) -> Result<Vec<Symptom>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, name, description, severity, recorded_at
         FROM symptoms WHERE patient_id = ?1 AND recorded_at >= ?2
         ORDER BY recorded_at DESC",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string(), format_timestamp(since)], |row| {
        let id_str: String = row.get(0)?;
        let patient_str: String = row.get(1)?;
        let recorded_str: String = row.get(5)?;
        Ok(Symptom {
            id: parse_uuid(0, &id_str)?,
            patient_id: parse_uuid(1, &patient_str)?,
            name: row.get(2)?,
            description: row.get(3)?,
            severity: row.get(4)?,
            recorded_at: parse_timestamp(5, &recorded_str)?,
        })
    })?;

    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;

    fn make_symptom(patient_id: Uuid, name: &str, severity: u8, recorded_at: NaiveDateTime) -> Symptom {
        Symptom {
            id: Uuid::new_v4(),
            patient_id,
            name: name.into(),
            description: None,
            severity,
            recorded_at,
        }
    }

    #[test]
    fn symptoms_newest_first_within_window() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Giulia", None);
        insert_symptom(&conn, &make_symptom(patient, "Dizziness", 4, at("2026-03-09 08:00:00"))).unwrap();
        insert_symptom(&conn, &make_symptom(patient, "Thirst", 2, at("2026-03-10 08:00:00"))).unwrap();
        insert_symptom(&conn, &make_symptom(patient, "Fatigue", 3, at("2026-02-01 08:00:00"))).unwrap();

        let symptoms = get_symptoms_since(&conn, &patient, &at("2026-03-03 00:00:00")).unwrap();
        assert_eq!(symptoms.len(), 2);
        assert_eq!(symptoms[0].name, "Thirst");
        assert_eq!(symptoms[1].severity, 4);
    }

    #[test]
    fn severity_out_of_range_rejected_by_schema() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Giulia", None);
        let result = insert_symptom(&conn, &make_symptom(patient, "Pain", 11, at("2026-03-09 08:00:00")));
        assert!(result.is_err());
    }
}
