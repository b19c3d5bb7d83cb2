use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, DatabaseError};
use crate::models::*;

const ALERT_COLUMNS: &str =
    "id, patient_id, doctor_id, therapy_id, alert_type, message, severity, created_at, is_read, resolved_at";

/// Raw alert row. Enum columns stay as text until `into_alert` so a single
/// malformed row can be skipped without failing the whole listing.
struct AlertRow {
    id: String,
    patient_id: String,
    doctor_id: Option<String>,
    therapy_id: Option<String>,
    alert_type: String,
    message: String,
    severity: String,
    created_at: String,
    is_read: i32,
    resolved_at: Option<String>,
}

impl AlertRow {
    fn from_row(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            doctor_id: row.get(2)?,
            therapy_id: row.get(3)?,
            alert_type: row.get(4)?,
            message: row.get(5)?,
            severity: row.get(6)?,
            created_at: row.get(7)?,
            is_read: row.get(8)?,
            resolved_at: row.get(9)?,
        })
    }

    fn into_alert(self) -> Result<Alert, DatabaseError> {
        let uuid = |s: &str| {
            Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
        };
        Ok(Alert {
            id: uuid(&self.id)?,
            patient_id: uuid(&self.patient_id)?,
            doctor_id: self.doctor_id.as_deref().map(uuid).transpose()?,
            therapy_id: self.therapy_id.as_deref().map(uuid).transpose()?,
            alert_type: AlertType::from_str(&self.alert_type)?,
            message: self.message,
            severity: AlertSeverity::from_str(&self.severity)?,
            created_at: parse_timestamp(7, &self.created_at)?,
            is_read: self.is_read != 0,
            resolved_at: self
                .resolved_at
                .as_deref()
                .map(|s| parse_timestamp(9, s))
                .transpose()?,
        })
    }
}

/// Collect alert rows, skipping (and logging) rows with unknown enum values.
fn collect_alerts(
    rows: impl Iterator<Item = Result<AlertRow, rusqlite::Error>>,
) -> Result<Vec<Alert>, DatabaseError> {
    let mut alerts = Vec::new();
    for row in rows {
        let row = row?;
        let alert_id = row.id.clone();
        match row.into_alert() {
            Ok(alert) => alerts.push(alert),
            Err(e) => {
                tracing::warn!(alert_id = %alert_id, error = %e, "Skipping malformed alert row");
            }
        }
    }
    Ok(alerts)
}

/// `'a', 'b'` list for an SQL `IN (...)` clause built from enum constants.
fn sql_type_list<'a>(types: impl IntoIterator<Item = &'a AlertType>) -> String {
    types
        .into_iter()
        .map(|t| format!("'{}'", t.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Extra narrowing for `find_recent_open_alert` beyond type and pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertMatch<'a> {
    /// Any alert of the type.
    Any,
    /// Only alerts about this therapy (`None` matches alerts about no therapy).
    Therapy(Option<&'a Uuid>),
    /// Only alerts with this exact message.
    Message(&'a str),
}

pub fn insert_alert(conn: &Connection, alert: &Alert) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO alerts (id, patient_id, doctor_id, therapy_id, alert_type, message,
         severity, created_at, is_read, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            alert.id.to_string(),
            alert.patient_id.to_string(),
            alert.doctor_id.map(|id| id.to_string()),
            alert.therapy_id.map(|id| id.to_string()),
            alert.alert_type.as_str(),
            alert.message,
            alert.severity.as_str(),
            format_timestamp(&alert.created_at),
            alert.is_read as i32,
            alert.resolved_at.as_ref().map(format_timestamp),
        ],
    )?;
    Ok(())
}

pub fn get_alert(conn: &Connection, id: &Uuid) -> Result<Option<Alert>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
            params![id.to_string()],
            AlertRow::from_row,
        )
        .optional()?;
    row.map(AlertRow::into_alert).transpose()
}

/// Find an unread, unresolved alert of `alert_type` for this patient/doctor
/// pairing created at or after `since`, narrowed by `matching`. A `None`
/// doctor matches only alerts without a doctor.
pub fn find_recent_open_alert(
    conn: &Connection,
    patient_id: &Uuid,
    alert_type: AlertType,
    doctor_id: Option<&Uuid>,
    since: &NaiveDateTime,
    matching: AlertMatch<'_>,
) -> Result<Option<Uuid>, DatabaseError> {
    let (filter, value) = match matching {
        AlertMatch::Any => ("?5 IS NULL", None),
        AlertMatch::Therapy(therapy_id) => ("therapy_id IS ?5", therapy_id.map(|id| id.to_string())),
        AlertMatch::Message(message) => ("message = ?5", Some(message.to_string())),
    };
    let id: Option<String> = conn
        .query_row(
            &format!(
                "SELECT id FROM alerts
                 WHERE patient_id = ?1 AND alert_type = ?2 AND doctor_id IS ?3
                   AND created_at >= ?4 AND is_read = 0 AND resolved_at IS NULL
                   AND {filter}
                 ORDER BY created_at DESC
                 LIMIT 1"
            ),
            params![
                patient_id.to_string(),
                alert_type.as_str(),
                doctor_id.map(|id| id.to_string()),
                format_timestamp(since),
                value,
            ],
            |row| row.get(0),
        )
        .optional()?;
    id.map(|s| Uuid::parse_str(&s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string())))
        .transpose()
}

/// Unread, unresolved alerts about a patient that are meant for the patient.
/// Newest first.
pub fn list_open_alerts_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Alert>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts
         WHERE patient_id = ?1 AND is_read = 0 AND resolved_at IS NULL
           AND alert_type NOT IN ({})
         ORDER BY created_at DESC, id ASC",
        sql_type_list(&DOCTOR_FACING_ALERT_TYPES)
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], AlertRow::from_row)?;
    collect_alerts(rows)
}

/// Unread, unresolved alerts addressed to a doctor. Newest first.
pub fn list_open_alerts_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<Alert>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts
         WHERE doctor_id = ?1 AND is_read = 0 AND resolved_at IS NULL
         ORDER BY created_at DESC, id ASC"
    ))?;
    let rows = stmt.query_map(params![doctor_id.to_string()], AlertRow::from_row)?;
    collect_alerts(rows)
}

pub fn mark_alert_read(conn: &Connection, alert_id: &Uuid) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE alerts SET is_read = 1 WHERE id = ?1",
        params![alert_id.to_string()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("alert", alert_id));
    }
    Ok(())
}

/// Resolve one alert. Resolution always marks the alert read. Already
/// resolved alerts keep their original `resolved_at`.
pub fn resolve_alert(
    conn: &Connection,
    alert_id: &Uuid,
    resolved_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE alerts SET is_read = 1, resolved_at = COALESCE(resolved_at, ?1) WHERE id = ?2",
        params![format_timestamp(resolved_at), alert_id.to_string()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("alert", alert_id));
    }
    Ok(())
}

/// One keyset page of unresolved compliance-type alert ids, ordered by id,
/// strictly after `after` when given.
pub fn open_compliance_alert_ids_page(
    conn: &Connection,
    after: Option<&str>,
    limit: usize,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM alerts
         WHERE resolved_at IS NULL AND alert_type IN ({})
           AND (?1 IS NULL OR id > ?1)
         ORDER BY id ASC
         LIMIT ?2",
        sql_type_list(&COMPLIANCE_ALERT_TYPES)
    ))?;
    let rows = stmt.query_map(params![after, limit as i64], |row| row.get::<_, String>(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Resolve the given alerts (those still unresolved) and mark them read.
/// Returns how many rows changed. Callers wrap this in a transaction.
pub fn resolve_alerts_by_id(
    conn: &Connection,
    ids: &[String],
    resolved_at: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let mut stmt = conn.prepare(
        "UPDATE alerts SET is_read = 1, resolved_at = ?1 WHERE id = ?2 AND resolved_at IS NULL",
    )?;
    let ts = format_timestamp(resolved_at);
    let mut resolved = 0;
    for id in ids {
        resolved += stmt.execute(params![ts, id])?;
    }
    Ok(resolved)
}

/// Resolve the unresolved alerts of one type for a patient/doctor pairing.
/// Used when a newer alert replaces them.
pub fn resolve_open_alerts_of_type(
    conn: &Connection,
    patient_id: &Uuid,
    alert_type: AlertType,
    doctor_id: Option<&Uuid>,
    resolved_at: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let resolved = conn.execute(
        "UPDATE alerts SET is_read = 1, resolved_at = ?1
         WHERE patient_id = ?2 AND alert_type = ?3 AND doctor_id IS ?4 AND resolved_at IS NULL",
        params![
            format_timestamp(resolved_at),
            patient_id.to_string(),
            alert_type.as_str(),
            doctor_id.map(|id| id.to_string()),
        ],
    )?;
    Ok(resolved)
}

/// Resolve every unresolved compliance-type alert of one patient.
pub fn resolve_open_compliance_alerts_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    resolved_at: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let resolved = conn.execute(
        &format!(
            "UPDATE alerts SET is_read = 1, resolved_at = ?1
             WHERE patient_id = ?2 AND resolved_at IS NULL AND alert_type IN ({})",
            sql_type_list(&COMPLIANCE_ALERT_TYPES)
        ),
        params![format_timestamp(resolved_at), patient_id.to_string()],
    )?;
    Ok(resolved)
}
