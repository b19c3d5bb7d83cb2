use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::GlucoseReading;

/// Insert a glucose reading record.
pub fn insert_glucose_reading(conn: &Connection, reading: &GlucoseReading) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO glucose_readings (id, patient_id, value, measured_at, is_before_meal, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            reading.id.to_string(),
            reading.patient_id.to_string(),
            reading.value,
            format_timestamp(&reading.measured_at),
            reading.is_before_meal as i32,
            reading.notes,
        ],
    )?;
    Ok(())
}

/// Get a patient's readings within a time range, ordered by measured_at ascending.
pub fn get_glucose_readings_in_range(
    conn: &Connection,
    patient_id: &Uuid,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> Result<Vec<GlucoseReading>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, value, measured_at, is_before_meal, notes
         FROM glucose_readings
         WHERE patient_id = ?1 AND measured_at >= ?2 AND measured_at <= ?3
         ORDER BY measured_at ASC",
    )?;
    let rows = stmt.query_map(
        params![
            patient_id.to_string(),
            format_timestamp(from),
            format_timestamp(to),
        ],
        row_to_glucose_reading,
    )?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Get the most recent reading for a patient at or before `at`.
pub fn get_latest_glucose_reading(
    conn: &Connection,
    patient_id: &Uuid,
    at: &NaiveDateTime,
) -> Result<Option<GlucoseReading>, DatabaseError> {
    let reading = conn
        .query_row(
            "SELECT id, patient_id, value, measured_at, is_before_meal, notes
             FROM glucose_readings
             WHERE patient_id = ?1 AND measured_at <= ?2
             ORDER BY measured_at DESC
             LIMIT 1",
            params![patient_id.to_string(), format_timestamp(at)],
            row_to_glucose_reading,
        )
        .optional()?;
    Ok(reading)
}

fn row_to_glucose_reading(row: &rusqlite::Row) -> Result<GlucoseReading, rusqlite::Error> {
    let id_str: String = row.get(0)?;
    let patient_str: String = row.get(1)?;
    let measured_str: String = row.get(3)?;
    let before_meal: i32 = row.get(4)?;

    Ok(GlucoseReading {
        id: parse_uuid(0, &id_str)?,
        patient_id: parse_uuid(1, &patient_str)?,
        value: row.get(2)?,
        measured_at: parse_timestamp(3, &measured_str)?,
        is_before_meal: before_meal != 0,
        notes: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::seed_patient;
    use crate::db::sqlite::open_memory_database;
    use chrono::Duration;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn make_reading(patient_id: Uuid, value: f64, measured_at: NaiveDateTime, before_meal: bool) -> GlucoseReading {
        GlucoseReading {
            id: Uuid::new_v4(),
            patient_id,
            value,
            measured_at,
            is_before_meal: before_meal,
            notes: None,
        }
    }

    #[test]
    fn insert_and_range_query_ascending() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Anna", None);
        let now = at("2026-03-10 12:00:00");

        insert_glucose_reading(&conn, &make_reading(patient, 140.0, now - Duration::hours(2), false)).unwrap();
        insert_glucose_reading(&conn, &make_reading(patient, 95.0, now - Duration::hours(5), true)).unwrap();
        insert_glucose_reading(&conn, &make_reading(patient, 210.0, now - Duration::hours(30), false)).unwrap();

        let readings =
            get_glucose_readings_in_range(&conn, &patient, &(now - Duration::hours(24)), &now).unwrap();
        assert_eq!(readings.len(), 2);
        assert!((readings[0].value - 95.0).abs() < 0.01);
        assert!(readings[0].is_before_meal);
        assert!((readings[1].value - 140.0).abs() < 0.01);
    }

    #[test]
    fn range_query_is_scoped_to_patient() {
        let conn = open_memory_database().unwrap();
        let anna = seed_patient(&conn, "Anna", None);
        let luca = seed_patient(&conn, "Luca", None);
        let now = at("2026-03-10 12:00:00");

        insert_glucose_reading(&conn, &make_reading(luca, 300.0, now, false)).unwrap();

        let readings =
            get_glucose_readings_in_range(&conn, &anna, &(now - Duration::hours(24)), &now).unwrap();
        assert!(readings.is_empty());
    }

    #[test]
    fn latest_reading() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Anna", None);
        let now = at("2026-03-10 12:00:00");
        assert!(get_latest_glucose_reading(&conn, &patient, &now).unwrap().is_none());

        insert_glucose_reading(&conn, &make_reading(patient, 101.0, now - Duration::hours(3), true)).unwrap();
        insert_glucose_reading(&conn, &make_reading(patient, 155.0, now - Duration::hours(1), false)).unwrap();

        let latest = get_latest_glucose_reading(&conn, &patient, &now).unwrap().unwrap();
        assert!((latest.value - 155.0).abs() < 0.01);
    }

    #[test]
    fn readings_cascade_with_patient() {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Anna", None);
        let now = at("2026-03-10 12:00:00");
        insert_glucose_reading(&conn, &make_reading(patient, 101.0, now, true)).unwrap();

        crate::db::repository::delete_patient(&conn, &patient).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM glucose_readings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
