// src/sweep/mod.rs
//! Reconciliation sweep over CRM records: paginate, classify each tracked
//! file field, relay or repair, write back one partial update per record.

pub mod engine;
pub mod runner;

pub use engine::ReconciliationSweep;
pub use runner::SweepRunner;

use crate::types::{CrmRecord, FieldName};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A file field and the CRM field code it is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedField {
    pub field: FieldName,
    pub crm_code: String,
}

pub type RecordPredicate = Arc<dyn Fn(&CrmRecord) -> bool + Send + Sync>;

/// Per-run parameters. The CRM-side `filter` narrows what is listed; the
/// local `predicate` narrows what is processed.
#[derive(Clone, Default)]
pub struct SweepOptions {
    pub filter: Map<String, Value>,
    pub predicate: Option<RecordPredicate>,
    /// Classify and count without relaying or writing
    pub dry_run: bool,
    pub deadline: Option<Duration>,
    pub cancel: CancellationToken,
}

impl SweepOptions {
    pub fn for_contact(id: &str) -> Self {
        let mut filter = Map::new();
        filter.insert("ID".to_string(), Value::String(id.to_string()));
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Map<String, Value>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CrmRecord) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn accepts(&self, record: &CrmRecord) -> bool {
        self.predicate.as_ref().map_or(true, |predicate| predicate(record))
    }
}

impl std::fmt::Debug for SweepOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepOptions")
            .field("filter", &self.filter)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .field("dry_run", &self.dry_run)
            .field("deadline", &self.deadline)
            .finish()
    }
}
