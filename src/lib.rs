pub mod config;
pub mod models;
pub mod db;
pub mod alerting; // Glucose + compliance evaluators, dedup policy
pub mod scheduler; // Periodic compliance sweep
pub mod care; // Operation surface for the dashboard layer

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::alerting::AlertingEngine;
use crate::config::RuntimeConfig;
use crate::db::{ConnectionSource, DatabaseFile};
use crate::scheduler::ComplianceScheduler;

pub fn run() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let runtime = match RuntimeConfig::from_env() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    if let Some(parent) = runtime.db_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::error!(path = %parent.display(), error = %e, "Cannot create data directory");
            std::process::exit(1);
        }
    }

    // Open once up front so an unusable store fails at startup, not mid-sweep.
    let source = Arc::new(DatabaseFile::new(&runtime.db_path));
    if let Err(e) = source.open() {
        tracing::error!(path = %source.path().display(), error = %e, "Cannot open record store");
        std::process::exit(1);
    }
    tracing::info!(path = %source.path().display(), "Record store ready");

    let scheduler = ComplianceScheduler::new(
        source,
        AlertingEngine::new(runtime.alerting),
        runtime.sweep_interval,
    );
    if let Err(e) = scheduler.start() {
        tracing::error!(error = %e, "Cannot start compliance scheduler");
        std::process::exit(1);
    }

    // The sweep worker runs until the process is terminated.
    loop {
        std::thread::park();
    }
}
