use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, begin_immediate, AlertMatch, DatabaseError};
use crate::models::{Alert, AlertType, NewAlert};

use super::types::{AlertingConfig, AlertingError, ClearReport};

/// What counts as "the same alert" for the pre-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DedupScope {
    /// An open alert of this type about the same therapy.
    Therapy,
    /// Only an open alert with the identical message. Per-reading glucose
    /// alerts name their reading, so distinct readings never collide.
    Message,
    /// Like `Message`, but a changed message replaces the open alert of this
    /// type instead of standing next to it.
    Latest,
}

fn dedup_scope(alert_type: AlertType) -> DedupScope {
    if alert_type.is_compliance() {
        return DedupScope::Therapy;
    }
    match alert_type {
        AlertType::GlucoseElevated => DedupScope::Latest,
        _ => DedupScope::Message,
    }
}

/// Alert lifecycle gatekeeper: suppresses recent duplicates and clears
/// stale compliance alerts.
#[derive(Debug, Clone)]
pub struct AlertDeduplicator {
    config: AlertingConfig,
}

impl AlertDeduplicator {
    pub fn new(config: AlertingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlertingConfig {
        &self.config
    }

    /// Is there an unread, unresolved alert of this type for this
    /// patient/doctor pairing created within the last `hours`?
    pub fn alert_exists_recent(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        alert_type: AlertType,
        doctor_id: Option<&Uuid>,
        hours: i64,
        now: &NaiveDateTime,
    ) -> Result<bool, AlertingError> {
        let since = *now - Duration::hours(hours);
        let found = db::find_recent_open_alert(
            conn,
            patient_id,
            alert_type,
            doctor_id,
            &since,
            AlertMatch::Any,
        )?;
        Ok(found.is_some())
    }

    /// Persist `new_alert` unless an equivalent open alert exists inside the
    /// dedup window. Compliance alerts are equivalent per therapy, glucose
    /// alerts per message. A new `glucose_elevated` summary resolves the one
    /// it replaces. Check and insert share one immediate transaction.
    /// Returns `None` when the alert was suppressed.
    pub fn create_alert(
        &self,
        conn: &Connection,
        new_alert: NewAlert,
        now: &NaiveDateTime,
    ) -> Result<Option<Alert>, AlertingError> {
        let tx = begin_immediate(conn)?;

        let scope = dedup_scope(new_alert.alert_type);
        if self.config.enforce_dedup_precheck {
            let since = *now - Duration::hours(self.config.dedup_window_hours);
            let matching = match scope {
                DedupScope::Therapy => AlertMatch::Therapy(new_alert.therapy_id.as_ref()),
                DedupScope::Message | DedupScope::Latest => {
                    AlertMatch::Message(new_alert.message.as_str())
                }
            };
            let existing = db::find_recent_open_alert(
                &tx,
                &new_alert.patient_id,
                new_alert.alert_type,
                new_alert.doctor_id.as_ref(),
                &since,
                matching,
            )?;
            if let Some(existing_id) = existing {
                tracing::debug!(
                    patient_id = %new_alert.patient_id,
                    alert_type = new_alert.alert_type.as_str(),
                    existing_id = %existing_id,
                    "Suppressed duplicate alert"
                );
                return Ok(None);
            }
        }

        if scope == DedupScope::Latest {
            let replaced = db::resolve_open_alerts_of_type(
                &tx,
                &new_alert.patient_id,
                new_alert.alert_type,
                new_alert.doctor_id.as_ref(),
                now,
            )?;
            if replaced > 0 {
                tracing::debug!(
                    patient_id = %new_alert.patient_id,
                    alert_type = new_alert.alert_type.as_str(),
                    replaced,
                    "Superseded open alerts"
                );
            }
        }

        let alert = new_alert.into_alert(*now);
        db::insert_alert(&tx, &alert)?;
        tx.commit()?;

        tracing::info!(
            patient_id = %alert.patient_id,
            alert_type = alert.alert_type.as_str(),
            severity = alert.severity.as_str(),
            "Alert created"
        );
        Ok(Some(alert))
    }

    pub fn clear_all_compliance_alerts(
        &self,
        conn: &Connection,
    ) -> Result<ClearReport, AlertingError> {
        self.clear_all_compliance_alerts_at(conn, &super::local_now())
    }

    /// Resolve every unresolved compliance-type alert, one transaction per
    /// batch. A failed batch is logged and skipped; the walk continues past
    /// it. Fails only if the first page cannot be read.
    pub fn clear_all_compliance_alerts_at(
        &self,
        conn: &Connection,
        now: &NaiveDateTime,
    ) -> Result<ClearReport, AlertingError> {
        let batch_size = self.config.clear_batch_size.max(1);
        let mut report = ClearReport::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = match db::open_compliance_alert_ids_page(conn, cursor.as_deref(), batch_size) {
                Ok(page) => page,
                Err(e) if cursor.is_none() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(error = %e, "Compliance clear stopped early");
                    report.failed_batches += 1;
                    break;
                }
            };
            let Some(last) = page.last().cloned() else {
                break;
            };

            match resolve_batch(conn, &page, now) {
                Ok(resolved) => report.resolved += resolved,
                Err(e) => {
                    tracing::warn!(batch_len = page.len(), error = %e, "Compliance clear batch failed");
                    report.failed_batches += 1;
                }
            }

            if page.len() < batch_size {
                break;
            }
            cursor = Some(last);
        }

        tracing::info!(
            resolved = report.resolved,
            failed_batches = report.failed_batches,
            "Cleared compliance alerts"
        );
        Ok(report)
    }

    pub fn check_and_clear_compliance_alerts(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
    ) -> Result<bool, AlertingError> {
        self.check_and_clear_compliance_alerts_at(conn, patient_id, &super::local_now())
    }

    /// When the patient took any dose recently, their open compliance alerts
    /// are stale: resolve them all and return `true`. Otherwise nothing
    /// changes and the result is `false`.
    pub fn check_and_clear_compliance_alerts_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        now: &NaiveDateTime,
    ) -> Result<bool, AlertingError> {
        let since = *now - Duration::days(self.config.intake_recency_days);
        let recent = db::count_patient_intakes_since(conn, patient_id, &since)?;
        if recent == 0 {
            return Ok(false);
        }

        let tx = begin_immediate(conn)?;
        let resolved = db::resolve_open_compliance_alerts_for_patient(&tx, patient_id, now)?;
        tx.commit()?;

        tracing::debug!(
            patient_id = %patient_id,
            recent_intakes = recent,
            resolved,
            "Adherence resumed, compliance alerts cleared"
        );
        Ok(true)
    }
}

fn resolve_batch(
    conn: &Connection,
    ids: &[String],
    now: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let tx = begin_immediate(conn)?;
    let resolved = db::resolve_alerts_by_id(&tx, ids, now)?;
    tx.commit()?;
    Ok(resolved)
}
