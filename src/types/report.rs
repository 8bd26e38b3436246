// src/types/report.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Field name recorded for failures that concern the whole record
pub const RECORD_LEVEL_FIELD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepErrorEntry {
    pub record_id: String,
    pub field_name: String,
    pub message: String,
}

/// Aggregate counters for one sweep run
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub records_scanned: usize,
    pub records_with_files: usize,
    pub records_updated: usize,
    pub fields_converted: usize,
    pub fields_repaired: usize,
    pub fields_cleared: usize,
    pub errors: Vec<SweepErrorEntry>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SweepReport {
    pub fn start(dry_run: bool) -> Self {
        Self {
            records_scanned: 0,
            records_with_files: 0,
            records_updated: 0,
            fields_converted: 0,
            fields_repaired: 0,
            fields_cleared: 0,
            errors: Vec::new(),
            dry_run,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_error(
        &mut self,
        record_id: impl Into<String>,
        field_name: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.errors.push(SweepErrorEntry {
            record_id: record_id.into(),
            field_name: field_name.into(),
            message: message.into(),
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Log the report as one structured event
    pub fn emit(&self) {
        let duration_ms = self
            .finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
            .unwrap_or_default();

        info!(
            records_scanned = self.records_scanned,
            records_with_files = self.records_with_files,
            records_updated = self.records_updated,
            fields_converted = self.fields_converted,
            fields_repaired = self.fields_repaired,
            fields_cleared = self.fields_cleared,
            errors = self.errors.len(),
            dry_run = self.dry_run,
            cancelled = self.cancelled,
            duration_ms,
            "Sweep finished"
        );

        for entry in &self.errors {
            info!(
                record_id = %entry.record_id,
                field = %entry.field_name,
                "Sweep error: {}",
                entry.message
            );
        }
    }
}
