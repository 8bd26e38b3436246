// src/sweep/runner.rs
//! Single-flight wrapper around the sweep: one run at a time, a cancel
//! handle for the run in progress, and the last finished report.

use super::engine::ReconciliationSweep;
use super::SweepOptions;
use crate::error::SweepError;
use crate::types::{FieldName, SweepReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Clone)]
pub struct SweepRunner {
    sweep: Arc<ReconciliationSweep>,
    running: Arc<AtomicBool>,
    current: Arc<Mutex<Option<CancellationToken>>>,
    last_report: Arc<RwLock<Option<SweepReport>>>,
}

/// Clears the running flag when the run ends, however it ends
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SweepRunner {
    pub fn new(sweep: ReconciliationSweep) -> Self {
        Self {
            sweep: Arc::new(sweep),
            running: Arc::new(AtomicBool::new(false)),
            current: Arc::new(Mutex::new(None)),
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    pub fn sweep(&self) -> &Arc<ReconciliationSweep> {
        &self.sweep
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Result<RunGuard, SweepError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| RunGuard(self.running.clone()))
            .map_err(|_| SweepError::AlreadyRunning)
    }

    /// Run a sweep to completion on the current task
    pub async fn run(
        &self,
        fields: &[FieldName],
        options: SweepOptions,
    ) -> Result<SweepReport, SweepError> {
        let guard = self.try_begin()?;
        self.run_guarded(guard, fields, options).await
    }

    /// Start a sweep in the background. Fails immediately when one is running.
    pub fn spawn(
        &self,
        fields: Vec<FieldName>,
        options: SweepOptions,
    ) -> Result<JoinHandle<Result<SweepReport, SweepError>>, SweepError> {
        let guard = self.try_begin()?;
        let runner = self.clone();

        Ok(tokio::spawn(async move {
            let result = runner.run_guarded(guard, &fields, options).await;
            if let Err(e) = &result {
                error!("Background sweep failed: {}", e);
            }
            result
        }))
    }

    async fn run_guarded(
        &self,
        _guard: RunGuard,
        fields: &[FieldName],
        options: SweepOptions,
    ) -> Result<SweepReport, SweepError> {
        *self.current.lock().await = Some(options.cancel.clone());

        let result = self.sweep.run_sweep(fields, options).await;

        *self.current.lock().await = None;
        if let Ok(report) = &result {
            *self.last_report.write().await = Some(report.clone());
        }
        result
    }

    /// Cancel the run in progress. Returns false when nothing was running.
    pub async fn cancel(&self) -> bool {
        match self.current.lock().await.as_ref() {
            Some(token) => {
                info!("Cancelling running sweep");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn last_report(&self) -> Option<SweepReport> {
        self.last_report.read().await.clone()
    }
}
