//! Periodic compliance sweep on a dedicated background thread.
//!
//! Each sweep clears every open compliance alert, then re-evaluates every
//! patient, so no patient carries alerts from two sweeps without a clear in
//! between. Stop is cooperative: the worker notices the flag at the next
//! sleep increment and never abandons a sweep halfway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::alerting::{local_now, AlertingEngine};
use crate::db::{self, ConnectionSource, DatabaseError};

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Scheduler worker panicked")]
    WorkerPanicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Counts from one full sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub patients_evaluated: usize,
    pub patients_failed: usize,
    pub alerts_created: usize,
    pub alerts_cleared: usize,
    /// Clear batches left unresolved. A clear that could not start counts as one.
    pub clear_failed_batches: usize,
    pub duration_ms: u64,
}

enum Worker {
    Stopped,
    Running {
        shutdown: Arc<AtomicBool>,
        handle: JoinHandle<()>,
    },
}

/// Drives the compliance sweep on a fixed interval.
///
/// One instance owns at most one worker. Share it behind an `Arc` where
/// several callers need to start or stop it.
pub struct ComplianceScheduler {
    source: Arc<dyn ConnectionSource>,
    engine: AlertingEngine,
    interval: Duration,
    worker: Mutex<Worker>,
}

impl ComplianceScheduler {
    pub fn new(source: Arc<dyn ConnectionSource>, engine: AlertingEngine, interval: Duration) -> Self {
        Self {
            source,
            engine,
            interval,
            worker: Mutex::new(Worker::Stopped),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock_worker(&self) -> MutexGuard<'_, Worker> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SchedulerState {
        match &*self.lock_worker() {
            Worker::Stopped => SchedulerState::Stopped,
            Worker::Running { handle, .. } if handle.is_finished() => SchedulerState::Stopped,
            Worker::Running { .. } => SchedulerState::Running,
        }
    }

    /// Start the worker. Returns `false` (and changes nothing) when it is
    /// already running.
    pub fn start(&self) -> Result<bool, SchedulerError> {
        let mut worker = self.lock_worker();
        if let Worker::Running { handle, .. } = &*worker {
            if !handle.is_finished() {
                tracing::info!("Compliance scheduler already running");
                return Ok(false);
            }
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let source = self.source.clone();
        let engine = self.engine.clone();
        let interval = self.interval;

        let handle = std::thread::Builder::new()
            .name("compliance-scheduler".into())
            .spawn(move || {
                tracing::info!(interval_secs = interval.as_secs(), "Compliance scheduler started");
                scheduler_loop(source.as_ref(), &engine, interval, &flag);
            })?;

        *worker = Worker::Running { shutdown, handle };
        Ok(true)
    }

    /// Signal the worker and wait for it to finish its current step.
    /// Returns whether it was running.
    pub fn stop(&self) -> Result<bool, SchedulerError> {
        let previous = std::mem::replace(&mut *self.lock_worker(), Worker::Stopped);
        match previous {
            Worker::Stopped => Ok(false),
            Worker::Running { shutdown, handle } => {
                shutdown.store(true, Ordering::Relaxed);
                handle.join().map_err(|_| SchedulerError::WorkerPanicked)?;
                Ok(true)
            }
        }
    }

    /// Run one sweep on the calling thread.
    pub fn run_immediate_compliance_check(&self) -> Result<SweepReport, SchedulerError> {
        run_sweep(self.source.as_ref(), &self.engine)
    }
}

impl Drop for ComplianceScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "Compliance scheduler did not stop cleanly");
        }
    }
}

fn scheduler_loop(
    source: &dyn ConnectionSource,
    engine: &AlertingEngine,
    interval: Duration,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::Relaxed) {
        if let Err(e) = run_sweep(source, engine) {
            tracing::warn!(error = %e, "Compliance sweep failed");
        }

        let deadline = Instant::now() + interval;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(SLEEP_GRANULARITY.min(deadline - now));
        }
    }
    tracing::info!("Compliance scheduler shutting down");
}

/// Clear all compliance alerts, then evaluate every patient. A failure in
/// the clear step or for one patient is logged and the sweep carries on.
/// Fails only when no connection can be opened or patients cannot be listed.
pub fn run_sweep(
    source: &dyn ConnectionSource,
    engine: &AlertingEngine,
) -> Result<SweepReport, SchedulerError> {
    let start = Instant::now();
    let conn = source.open()?;
    let mut report = SweepReport::default();

    tracing::info!("Compliance sweep starting");

    match engine.dedup.clear_all_compliance_alerts_at(&conn, &local_now()) {
        Ok(cleared) => {
            report.alerts_cleared = cleared.resolved;
            report.clear_failed_batches = cleared.failed_batches;
        }
        Err(e) => {
            report.clear_failed_batches = 1;
            tracing::warn!(error = %e, "Compliance clear failed, evaluating anyway");
        }
    }

    let patient_ids = db::list_patient_ids(&conn)?;
    for patient_id in &patient_ids {
        match engine.compliance.try_evaluate_at(&conn, patient_id, &local_now()) {
            Ok(outcome) => {
                report.patients_evaluated += 1;
                report.alerts_created += outcome.alerts_created;
            }
            Err(e) => {
                report.patients_failed += 1;
                tracing::warn!(patient_id = %patient_id, error = %e, "Patient compliance evaluation failed");
            }
        }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        patients_evaluated = report.patients_evaluated,
        patients_failed = report.patients_failed,
        alerts_created = report.alerts_created,
        alerts_cleared = report.alerts_cleared,
        clear_failed_batches = report.clear_failed_batches,
        duration_ms = report.duration_ms,
        "Compliance sweep completed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::DatabaseFile;
    use crate::models::AlertType;
    use rusqlite::Connection;

    fn file_source(dir: &tempfile::TempDir) -> Arc<DatabaseFile> {
        Arc::new(DatabaseFile::new(dir.path().join("glycare.db")))
    }

    fn scheduler(source: Arc<DatabaseFile>, interval: Duration) -> ComplianceScheduler {
        ComplianceScheduler::new(source, AlertingEngine::default(), interval)
    }

    fn open_compliance_alerts(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE resolved_at IS NULL
             AND alert_type IN ('medication_compliance', 'patient_non_compliance', 'medication_reminder')",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    struct BrokenSource;

    impl ConnectionSource for BrokenSource {
        fn open(&self) -> Result<Connection, DatabaseError> {
            Err(DatabaseError::ConstraintViolation("store unavailable".into()))
        }
    }

    #[test]
    fn starts_once_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(file_source(&dir), Duration::from_secs(3600));

        assert_eq!(sched.state(), SchedulerState::Stopped);
        assert!(sched.start().unwrap());
        assert!(!sched.start().unwrap(), "second start is a no-op");
        assert_eq!(sched.state(), SchedulerState::Running);

        assert!(sched.stop().unwrap());
        assert_eq!(sched.state(), SchedulerState::Stopped);
        assert!(!sched.stop().unwrap());
    }

    #[test]
    fn can_restart_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(file_source(&dir), Duration::from_secs(3600));
        assert!(sched.start().unwrap());
        assert!(sched.stop().unwrap());
        assert!(sched.start().unwrap());
        assert!(sched.stop().unwrap());
    }

    #[test]
    fn immediate_check_clears_then_reevaluates() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_source(&dir);
        let conn = source.open().unwrap();
        let doctor = seed_doctor(&conn, "Dr. Russo");
        let noncompliant = seed_patient(&conn, "Paolo", Some(doctor));
        seed_therapy(&conn, noncompliant, doctor, "Metformin", 2);
        seed_patient(&conn, "Anna", None);

        let sched = scheduler(source.clone(), Duration::from_secs(3600));
        let first = sched.run_immediate_compliance_check().unwrap();
        assert_eq!(first.patients_evaluated, 2);
        assert_eq!(first.patients_failed, 0);
        assert_eq!(first.alerts_created, 2);
        assert_eq!(first.alerts_cleared, 0);

        let second = sched.run_immediate_compliance_check().unwrap();
        assert_eq!(second.alerts_cleared, 2);
        assert_eq!(second.alerts_created, 2);

        // Old alerts resolved, one fresh set open.
        assert_eq!(open_compliance_alerts(&conn), 2);
        assert_eq!(count_alerts(&conn, &noncompliant, AlertType::MedicationCompliance), 2);
        assert_eq!(count_open_alerts(&conn, &noncompliant, AlertType::MedicationCompliance), 1);
    }

    #[test]
    fn failing_patient_does_not_stop_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_source(&dir);
        let conn = source.open().unwrap();
        let doctor = seed_doctor(&conn, "Dr. Russo");
        let broken = seed_patient(&conn, "Paolo", Some(doctor));
        let broken_therapy = seed_therapy(&conn, broken, doctor, "Metformin", 2);
        let healthy = seed_patient(&conn, "Anna", Some(doctor));
        seed_therapy(&conn, healthy, doctor, "Insulin", 1);
        conn.execute(
            "UPDATE therapies SET start_date = 'not-a-date' WHERE id = ?1",
            [broken_therapy.to_string()],
        )
        .unwrap();

        let report = scheduler(source.clone(), Duration::from_secs(3600))
            .run_immediate_compliance_check()
            .unwrap();
        assert_eq!(report.patients_failed, 1);
        assert_eq!(report.patients_evaluated, 1);
        assert_eq!(report.alerts_created, 2);
        assert_eq!(count_open_alerts(&conn, &healthy, AlertType::MedicationCompliance), 1);
        assert_eq!(count_open_alerts(&conn, &healthy, AlertType::PatientNonCompliance), 1);
        assert_eq!(count_alerts(&conn, &broken, AlertType::MedicationCompliance), 0);
    }

    #[test]
    fn failed_clear_still_evaluates_patients() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_source(&dir);
        let conn = source.open().unwrap();
        let doctor = seed_doctor(&conn, "Dr. Russo");
        let earlier = seed_patient(&conn, "Paolo", Some(doctor));
        seed_therapy(&conn, earlier, doctor, "Metformin", 2);

        let sched = scheduler(source.clone(), Duration::from_secs(3600));
        assert_eq!(sched.run_immediate_compliance_check().unwrap().alerts_created, 2);

        let newcomer = seed_patient(&conn, "Anna", Some(doctor));
        seed_therapy(&conn, newcomer, doctor, "Insulin", 1);
        conn.execute_batch(
            "CREATE TRIGGER freeze_alerts BEFORE UPDATE ON alerts
             BEGIN SELECT RAISE(ABORT, 'alerts are frozen'); END;",
        )
        .unwrap();

        let report = sched.run_immediate_compliance_check().unwrap();
        assert_eq!(report.alerts_cleared, 0);
        assert_eq!(report.clear_failed_batches, 1);
        assert_eq!(report.patients_evaluated, 2);
        assert_eq!(report.patients_failed, 0);
        // The earlier patient's alerts are still open, so only the newcomer gets new ones.
        assert_eq!(report.alerts_created, 2);
        assert_eq!(count_open_alerts(&conn, &earlier, AlertType::MedicationCompliance), 1);
        assert_eq!(count_open_alerts(&conn, &newcomer, AlertType::PatientNonCompliance), 1);
    }

    #[test]
    fn worker_sweeps_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_source(&dir);
        let conn = source.open().unwrap();
        let doctor = seed_doctor(&conn, "Dr. Russo");
        let patient = seed_patient(&conn, "Paolo", Some(doctor));
        seed_therapy(&conn, patient, doctor, "Metformin", 1);

        let sched = scheduler(source.clone(), Duration::from_secs(3600));
        assert!(sched.start().unwrap());

        let deadline = Instant::now() + Duration::from_secs(10);
        while count_alerts(&conn, &patient, AlertType::MedicationCompliance) == 0 {
            assert!(Instant::now() < deadline, "worker never swept");
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(sched.stop().unwrap());
        assert_eq!(count_open_alerts(&conn, &patient, AlertType::PatientNonCompliance), 1);
    }

    #[test]
    fn stop_interrupts_long_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(file_source(&dir), Duration::from_secs(3600));
        sched.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let begun = Instant::now();
        sched.stop().unwrap();
        assert!(begun.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn unavailable_store_fails_sweep() {
        let sched = ComplianceScheduler::new(
            Arc::new(BrokenSource),
            AlertingEngine::default(),
            Duration::from_secs(3600),
        );
        assert!(matches!(
            sched.run_immediate_compliance_check(),
            Err(SchedulerError::Database(_))
        ));
    }

    #[test]
    fn worker_survives_failing_sweeps() {
        let sched = ComplianceScheduler::new(
            Arc::new(BrokenSource),
            AlertingEngine::default(),
            Duration::from_millis(10),
        );
        sched.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sched.state(), SchedulerState::Running);
        assert!(sched.stop().unwrap());
    }

    #[test]
    fn drop_stops_worker() {
        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(file_source(&dir), Duration::from_secs(3600));
        sched.start().unwrap();
        drop(sched);
    }
}
