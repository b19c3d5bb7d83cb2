use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_date, parse_uuid, DatabaseError};
use crate::models::*;

const THERAPY_COLUMNS: &str = "id, patient_id, doctor_id, drug_name, daily_doses, dose_amount,
     dose_unit, instructions, start_date, end_date, is_active";

// ═══════════════════════════════════════════
// Therapies
// ═══════════════════════════════════════════

pub fn insert_therapy(conn: &Connection, therapy: &Therapy) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO therapies (id, patient_id, doctor_id, drug_name, daily_doses, dose_amount,
         dose_unit, instructions, start_date, end_date, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            therapy.id.to_string(),
            therapy.patient_id.to_string(),
            therapy.doctor_id.to_string(),
            therapy.drug_name,
            therapy.daily_doses,
            therapy.dose_amount,
            therapy.dose_unit,
            therapy.instructions,
            therapy.start_date.to_string(),
            therapy.end_date.map(|d| d.to_string()),
            therapy.is_active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_therapy(conn: &Connection, id: &Uuid) -> Result<Option<Therapy>, DatabaseError> {
    let therapy = conn
        .query_row(
            &format!("SELECT {THERAPY_COLUMNS} FROM therapies WHERE id = ?1"),
            params![id.to_string()],
            row_to_therapy,
        )
        .optional()?;
    Ok(therapy)
}

/// Active therapies of a patient, most recently started first.
pub fn get_active_therapies(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Therapy>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {THERAPY_COLUMNS} FROM therapies
         WHERE patient_id = ?1 AND is_active = 1
         ORDER BY start_date DESC, drug_name ASC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], row_to_therapy)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Deactivation is the only mutation a therapy supports.
pub fn deactivate_therapy(
    conn: &Connection,
    therapy_id: &Uuid,
    end_date: &NaiveDate,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE therapies SET is_active = 0, end_date = ?1 WHERE id = ?2",
        params![end_date.to_string(), therapy_id.to_string()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("therapy", therapy_id));
    }
    Ok(())
}

fn row_to_therapy(row: &rusqlite::Row) -> Result<Therapy, rusqlite::Error> {
    let id_str: String = row.get(0)?;
    let patient_str: String = row.get(1)?;
    let doctor_str: String = row.get(2)?;
    let start_str: String = row.get(8)?;
    let end_str: Option<String> = row.get(9)?;
    let active: i32 = row.get(10)?;

    Ok(Therapy {
        id: parse_uuid(0, &id_str)?,
        patient_id: parse_uuid(1, &patient_str)?,
        doctor_id: parse_uuid(2, &doctor_str)?,
        drug_name: row.get(3)?,
        daily_doses: row.get(4)?,
        dose_amount: row.get(5)?,
        dose_unit: row.get(6)?,
        instructions: row.get(7)?,
        start_date: parse_date(8, &start_str)?,
        end_date: end_str.map(|s| parse_date(9, &s)).transpose()?,
        is_active: active != 0,
    })
}

// ═══════════════════════════════════════════
// Medication intakes
// ═══════════════════════════════════════════

pub fn insert_intake(conn: &Connection, intake: &MedicationIntake) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medication_intakes (id, patient_id, therapy_id, intake_time, dose_taken, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            intake.id.to_string(),
            intake.patient_id.to_string(),
            intake.therapy_id.to_string(),
            format_timestamp(&intake.intake_time),
            intake.dose_taken,
            intake.notes,
        ],
    )?;
    Ok(())
}

/// Intake counts per calendar day for one therapy, over `[first_day, last_day]`.
///
/// Days without any intake are absent from the map. Uses the
/// `(therapy_id, intake_time)` index so cost follows the window, not history.
pub fn count_intakes_by_day(
    conn: &Connection,
    therapy_id: &Uuid,
    first_day: &NaiveDate,
    last_day: &NaiveDate,
) -> Result<BTreeMap<NaiveDate, u32>, DatabaseError> {
    let from = first_day.and_hms_opt(0, 0, 0).unwrap_or_default();
    let until = (*last_day + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap_or_default();

    let mut stmt = conn.prepare(
        "SELECT date(intake_time) AS day, COUNT(*)
         FROM medication_intakes
         WHERE therapy_id = ?1 AND intake_time >= ?2 AND intake_time < ?3
         GROUP BY day",
    )?;
    let rows = stmt.query_map(
        params![therapy_id.to_string(), format_timestamp(&from), format_timestamp(&until)],
        |row| {
            let day: String = row.get(0)?;
            Ok((parse_date(0, &day)?, row.get::<_, u32>(1)?))
        },
    )?;

    let mut counts = BTreeMap::new();
    for row in rows {
        let (day, count) = row?;
        counts.insert(day, count);
    }
    Ok(counts)
}

/// Number of intakes (any therapy) a patient recorded at or after `since`.
pub fn count_patient_intakes_since(
    conn: &Connection,
    patient_id: &Uuid,
    since: &NaiveDateTime,
) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM medication_intakes WHERE patient_id = ?1 AND intake_time >= ?2",
        params![patient_id.to_string(), format_timestamp(since)],
        |row| row.get::<_, u32>(0),
    )?;
    Ok(count)
}
